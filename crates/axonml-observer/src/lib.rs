//! Axonml Observer - Weight Calibration for Quantization
//!
//! Calibrates per-channel quantization parameters of weight tensors before
//! a model is deployed with low-bit integer weights.
//!
//! The abs-max channel-wise observer takes each channel's absolute maximum
//! and refines it with a grid search over `0.30..=1.00` of that maximum,
//! keeping the scale with the lowest quantize-dequantize MSE. Quantization
//! is signed and symmetric, so every zero point is 0.
//!
//! # Example
//! ```
//! use axonml_observer::{AbsMaxChannelWiseObserver, ObserverConfig, WeightObserver};
//! use ndarray::arr2;
//!
//! let weight = arr2(&[[1.0f32, 2.0, 3.0, 4.0], [10.0, 20.0, 30.0, -40.0]]).into_dyn();
//! let observer = AbsMaxChannelWiseObserver::new(ObserverConfig::default())?;
//!
//! observer.observe(weight.view())?;
//! assert_eq!(observer.scales()?.len(), 2);
//! assert_eq!(observer.zero_points()?, vec![0, 0]);
//! # Ok::<(), axonml_observer::ObserverError>(())
//! ```
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod error;
pub mod observer;
pub mod search;
pub mod state;

pub use config::{LayerKind, ObserverConfig, QuantRange};
pub use error::{ObserverError, ObserverResult};
pub use observer::{
    AbsMaxChannelWiseObserver, AbsMaxChannelWiseObserverFactory, ObserverFactory, WeightObserver,
};
pub use search::{
    channel_abs_max, fake_quant_mse, grid_factors, quant_dequant, search_channel,
    search_channels, search_scales, ChannelSearch, ABS_MAX_EPSILON, GRID_POINTS,
};
pub use state::{Cached, ObserverState};

// =============================================================================
// Prelude
// =============================================================================

/// Convenient imports for calibration hooks.
pub mod prelude {
    pub use crate::{
        AbsMaxChannelWiseObserver, AbsMaxChannelWiseObserverFactory, LayerKind, ObserverConfig,
        ObserverError, ObserverFactory, ObserverResult, WeightObserver,
    };
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_constants() {
        assert_eq!(grid_factors().count(), GRID_POINTS as usize);
        assert!(ABS_MAX_EPSILON > 0.0);
    }
}
