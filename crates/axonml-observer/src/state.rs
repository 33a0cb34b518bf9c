//! Observer State
//!
//! Calibration results of a channel-wise observer as an explicit value.
//! Every transition returns a new state instead of mutating in place, so
//! the owner decides how the swap is synchronized.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use ndarray::ArrayViewD;

use crate::config::ObserverConfig;
use crate::error::{ObserverError, ObserverResult};
use crate::search::{search_channels, ChannelSearch};

// =============================================================================
// Cached Value
// =============================================================================

/// A lazily computed value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Cached<T> {
    /// Not computed yet.
    #[default]
    Unset,
    /// Computed and frozen.
    Computed(T),
}

impl<T> Cached<T> {
    /// Returns the value if computed.
    pub fn get(&self) -> Option<&T> {
        match self {
            Cached::Unset => None,
            Cached::Computed(value) => Some(value),
        }
    }

    /// Returns true once the value has been computed.
    pub fn is_computed(&self) -> bool {
        matches!(self, Cached::Computed(_))
    }
}

// =============================================================================
// Observer State
// =============================================================================

/// Cached outputs of one calibration session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObserverState {
    search: Cached<Vec<ChannelSearch>>,
    max: Cached<Vec<f32>>,
    scales: Cached<Vec<f32>>,
    zero_points: Cached<Vec<i32>>,
}

impl ObserverState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once a tensor has been observed.
    pub fn is_calibrated(&self) -> bool {
        self.max.is_computed()
    }

    /// Returns true once scales and zero points have been derived.
    pub fn has_thresholds(&self) -> bool {
        self.scales.is_computed() && self.zero_points.is_computed()
    }

    /// Returns the state after observing `tensor`.
    ///
    /// The first observation wins: a calibrated state is returned unchanged
    /// whatever the tensor holds.
    pub fn observed(
        &self,
        tensor: &ArrayViewD<'_, f32>,
        config: &ObserverConfig,
    ) -> ObserverResult<Self> {
        if self.is_calibrated() {
            return Ok(self.clone());
        }

        let range = config.quant_range()?;
        let search = search_channels(tensor, config.channel_axis, range)?;
        let max = search.iter().map(|result| result.scale).collect();

        Ok(Self {
            search: Cached::Computed(search),
            max: Cached::Computed(max),
            scales: Cached::Unset,
            zero_points: Cached::Unset,
        })
    }

    /// Returns the state with scales and zero points derived from the max.
    ///
    /// The scale of each channel is its searched max; zero points are all
    /// zero. Already derived thresholds are kept.
    pub fn with_thresholds(&self) -> ObserverResult<Self> {
        if self.has_thresholds() {
            return Ok(self.clone());
        }

        let max = self.max_value()?;
        Ok(Self {
            scales: Cached::Computed(max.to_vec()),
            zero_points: Cached::Computed(vec![0; max.len()]),
            ..self.clone()
        })
    }

    /// Observed minimum; symmetric quantization does not track it.
    pub fn min_value(&self) -> f32 {
        0.0
    }

    /// Per-channel max found by the scale search.
    pub fn max_value(&self) -> ObserverResult<&[f32]> {
        self.max
            .get()
            .map(Vec::as_slice)
            .ok_or(ObserverError::NotCalibrated)
    }

    /// Derived per-channel scales, if computed.
    pub fn scales(&self) -> Option<&[f32]> {
        self.scales.get().map(Vec::as_slice)
    }

    /// Derived per-channel zero points, if computed.
    pub fn zero_points(&self) -> Option<&[i32]> {
        self.zero_points.get().map(Vec::as_slice)
    }

    /// Per-channel search diagnostics, if calibrated.
    pub fn search_report(&self) -> Option<&[ChannelSearch]> {
        self.search.get().map(Vec::as_slice)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_cached() {
        let unset: Cached<u32> = Cached::default();
        assert!(!unset.is_computed());
        assert_eq!(unset.get(), None);

        let computed = Cached::Computed(3u32);
        assert!(computed.is_computed());
        assert_eq!(computed.get(), Some(&3));
    }

    #[test]
    fn test_new_state_not_calibrated() {
        let state = ObserverState::new();
        assert!(!state.is_calibrated());
        assert_eq!(state.min_value(), 0.0);
        assert!(matches!(state.max_value(), Err(ObserverError::NotCalibrated)));
        assert!(matches!(state.with_thresholds(), Err(ObserverError::NotCalibrated)));
        assert!(state.search_report().is_none());
    }

    #[test]
    fn test_observed_then_thresholds() {
        let weights = arr2(&[[1.0f32, 2.0, 3.0, 4.0], [10.0, 20.0, 30.0, -40.0]]).into_dyn();
        let config = ObserverConfig::default();

        let state = ObserverState::new().observed(&weights.view(), &config).unwrap();
        assert!(state.is_calibrated());
        assert!(!state.has_thresholds());
        assert_eq!(state.search_report().map(<[_]>::len), Some(2));

        let state = state.with_thresholds().unwrap();
        assert_eq!(state.scales().unwrap(), state.max_value().unwrap());
        assert_eq!(state.zero_points().unwrap(), &[0, 0]);
    }

    #[test]
    fn test_first_observation_wins() {
        let first = arr2(&[[1.0f32, -2.0], [0.5, 0.25]]).into_dyn();
        let second = arr2(&[[100.0f32, -200.0], [50.0, 25.0]]).into_dyn();
        let config = ObserverConfig::default();

        let state = ObserverState::new().observed(&first.view(), &config).unwrap();
        let max = state.max_value().unwrap().to_vec();

        let state = state.observed(&second.view(), &config).unwrap();
        assert_eq!(state.max_value().unwrap(), max.as_slice());
    }

    #[test]
    fn test_observed_is_pure() {
        let weights = arr2(&[[1.0f32, 2.0]]).into_dyn();
        let original = ObserverState::new();
        let _ = original.observed(&weights.view(), &ObserverConfig::default()).unwrap();
        assert!(!original.is_calibrated());
    }

    #[test]
    fn test_failed_observation_leaves_state_unset() {
        let weights = arr2(&[[1.0f32, 2.0]]).into_dyn();
        let config = ObserverConfig::default().with_channel_axis(5);

        let state = ObserverState::new();
        let err = state.observed(&weights.view(), &config).unwrap_err();
        assert!(matches!(err, ObserverError::InvalidAxis { axis: 5, ndim: 2 }));
        assert!(!state.is_calibrated());
    }
}
