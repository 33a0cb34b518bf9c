//! Channel-Wise Weight Observers
//!
//! Observers plug into a calibration pass: the host calls `observe` with a
//! layer's weight during the forward hook, then reads `scales` and
//! `zero_points` when thresholds are finalized.
//!
//! # Example
//! ```ignore
//! use axonml_observer::{AbsMaxChannelWiseObserverFactory, LayerKind, WeightObserver};
//!
//! let factory = AbsMaxChannelWiseObserverFactory::new(8)?;
//! let observer = factory.build(LayerKind::Linear)?;
//! observer.observe(weight.view())?;
//! let scales = observer.scales()?;
//! ```
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use ndarray::ArrayViewD;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::{LayerKind, ObserverConfig, QuantRange};
use crate::error::{ObserverError, ObserverResult};
use crate::search::ChannelSearch;
use crate::state::ObserverState;

// =============================================================================
// Observer Interface
// =============================================================================

/// Calibration capability of a weight observer.
pub trait WeightObserver: Send + Sync {
    /// Records `tensor` and hands it back unchanged.
    fn observe<'a>(&self, tensor: ArrayViewD<'a, f32>) -> ObserverResult<ArrayViewD<'a, f32>>;

    /// Observed minimum.
    fn min_value(&self) -> f32;

    /// Observed per-channel maximum.
    fn max_value(&self) -> ObserverResult<Vec<f32>>;

    /// Per-channel quantization scales.
    fn scales(&self) -> ObserverResult<Vec<f32>>;

    /// Per-channel zero points.
    fn zero_points(&self) -> ObserverResult<Vec<i32>>;

    /// Bit width of the quantized integers.
    fn bit_length(&self) -> u8;

    /// Weight dimension holding the channels.
    fn quant_axis(&self) -> usize;
}

/// Creates one observer per layer.
pub trait ObserverFactory {
    /// Builds an observer for a layer of the given kind.
    fn create(&self, layer: LayerKind) -> ObserverResult<Box<dyn WeightObserver>>;
}

// =============================================================================
// Abs-Max Channel-Wise Observer
// =============================================================================

/// Collects per-channel absolute maxima of a weight, refined by an MSE
/// scale search, and reports them as signed symmetric thresholds.
#[derive(Debug)]
pub struct AbsMaxChannelWiseObserver {
    config: ObserverConfig,
    range: QuantRange,
    state: RwLock<ObserverState>,
}

impl AbsMaxChannelWiseObserver {
    /// Creates an observer after validating `config`.
    pub fn new(config: ObserverConfig) -> ObserverResult<Self> {
        let range = config.quant_range()?;
        Ok(Self {
            config,
            range,
            state: RwLock::new(ObserverState::new()),
        })
    }

    /// Returns the observer configuration.
    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    /// Returns the signed symmetric code range.
    pub fn quant_range(&self) -> QuantRange {
        self.range
    }

    /// Returns true once a tensor has been observed.
    pub fn is_calibrated(&self) -> bool {
        self.state.read().is_calibrated()
    }

    /// Derives scales and zero points from the observed max.
    ///
    /// Does nothing when thresholds already exist.
    pub fn compute_thresholds(&self) -> ObserverResult<()> {
        let mut state = self.state.write();
        if !state.has_thresholds() {
            *state = state.with_thresholds()?;
            let channels = state.max_value()?.len();
            tracing::debug!(channels, "thresholds computed");
        }
        Ok(())
    }

    /// Per-channel search diagnostics of the calibrating observation.
    pub fn search_report(&self) -> Option<Vec<ChannelSearch>> {
        self.state.read().search_report().map(<[ChannelSearch]>::to_vec)
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> ObserverState {
        self.state.read().clone()
    }

    /// Consumes the observer, returning its final state.
    pub fn into_state(self) -> ObserverState {
        self.state.into_inner()
    }
}

impl WeightObserver for AbsMaxChannelWiseObserver {
    fn observe<'a>(&self, tensor: ArrayViewD<'a, f32>) -> ObserverResult<ArrayViewD<'a, f32>> {
        // Held across check, search and store so only one caller calibrates.
        let mut state = self.state.write();
        if state.is_calibrated() {
            tracing::debug!(shape = ?tensor.shape(), "observer already calibrated, skipping");
            return Ok(tensor);
        }

        *state = state.observed(&tensor, &self.config)?;
        let channels = state.max_value()?.len();
        tracing::debug!(
            shape = ?tensor.shape(),
            channel_axis = self.config.channel_axis,
            quant_bits = self.config.quant_bits,
            channels,
            "weight calibrated"
        );
        Ok(tensor)
    }

    fn min_value(&self) -> f32 {
        self.state.read().min_value()
    }

    fn max_value(&self) -> ObserverResult<Vec<f32>> {
        self.state.read().max_value().map(<[f32]>::to_vec)
    }

    fn scales(&self) -> ObserverResult<Vec<f32>> {
        let cached = self.state.read().scales().map(<[f32]>::to_vec);
        if let Some(scales) = cached {
            return Ok(scales);
        }

        self.compute_thresholds()?;
        self.state
            .read()
            .scales()
            .map(<[f32]>::to_vec)
            .ok_or(ObserverError::NotCalibrated)
    }

    fn zero_points(&self) -> ObserverResult<Vec<i32>> {
        let cached = self.state.read().zero_points().map(<[i32]>::to_vec);
        if let Some(zero_points) = cached {
            return Ok(zero_points);
        }

        self.compute_thresholds()?;
        self.state
            .read()
            .zero_points()
            .map(<[i32]>::to_vec)
            .ok_or(ObserverError::NotCalibrated)
    }

    fn bit_length(&self) -> u8 {
        self.config.quant_bits
    }

    fn quant_axis(&self) -> usize {
        self.config.channel_axis
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Builds [`AbsMaxChannelWiseObserver`]s sharing one bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsMaxChannelWiseObserverFactory {
    quant_bits: u8,
}

impl Default for AbsMaxChannelWiseObserverFactory {
    fn default() -> Self {
        Self { quant_bits: 8 }
    }
}

impl AbsMaxChannelWiseObserverFactory {
    /// Creates a factory for `quant_bits`-bit weights.
    pub fn new(quant_bits: u8) -> ObserverResult<Self> {
        ObserverConfig::new(quant_bits).validate()?;
        Ok(Self { quant_bits })
    }

    /// Returns the configured bit width.
    pub fn quant_bits(&self) -> u8 {
        self.quant_bits
    }

    /// Builds an observer whose channel axis follows the layer kind.
    pub fn build(&self, layer: LayerKind) -> ObserverResult<AbsMaxChannelWiseObserver> {
        AbsMaxChannelWiseObserver::new(ObserverConfig::for_layer(self.quant_bits, layer))
    }

    /// Builds an observer with an explicit channel axis.
    pub fn build_with_axis(
        &self,
        channel_axis: usize,
    ) -> ObserverResult<AbsMaxChannelWiseObserver> {
        let config = ObserverConfig::new(self.quant_bits).with_channel_axis(channel_axis);
        AbsMaxChannelWiseObserver::new(config)
    }
}

impl ObserverFactory for AbsMaxChannelWiseObserverFactory {
    fn create(&self, layer: LayerKind) -> ObserverResult<Box<dyn WeightObserver>> {
        Ok(Box::new(self.build(layer)?))
    }
}

// =============================================================================
// Tests
// =============================================================================
