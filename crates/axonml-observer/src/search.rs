//! Scale Search
//!
//! Per-channel grid search for the quantization scale that minimizes the
//! mean squared error of a simulated quantize-dequantize pass.
//!
//! Each channel starts from its absolute maximum. Candidate scales are
//! `factor * abs_max` for `factor` in `0.30, 0.32, ..., 1.00`, and the first
//! candidate with the strictly lowest error wins.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use ndarray::{ArrayViewD, Axis};

use crate::config::QuantRange;
use crate::error::{ObserverError, ObserverResult};

// =============================================================================
// Constants
// =============================================================================

/// Substitute for a zero absolute maximum.
pub const ABS_MAX_EPSILON: f32 = 1e-8;

/// Number of candidate factors in the search grid.
pub const GRID_POINTS: u16 = 36;

/// First candidate factor, in hundredths.
const GRID_START_PERCENT: u16 = 30;

/// Distance between candidate factors, in hundredths.
const GRID_STEP_PERCENT: u16 = 2;

/// Returns the candidate factors `0.30, 0.32, ..., 1.00`.
pub fn grid_factors() -> impl Iterator<Item = f32> {
    (0..GRID_POINTS).map(|k| f32::from(GRID_START_PERCENT + GRID_STEP_PERCENT * k) / 100.0)
}

// =============================================================================
// Search Result
// =============================================================================

/// Outcome of the scale search for one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSearch {
    /// Absolute maximum of the channel (epsilon-substituted).
    pub abs_max: f32,
    /// Grid factor of the chosen scale.
    pub factor: f32,
    /// Chosen scale, `factor * abs_max`.
    pub scale: f32,
    /// Mean squared reconstruction error at the chosen scale.
    pub loss: f64,
}

// =============================================================================
// Error Metric
// =============================================================================

/// Simulates quantizing and dequantizing one value at `scale`.
#[inline]
pub fn quant_dequant(value: f32, scale: f32, range: QuantRange) -> f32 {
    let qmax = range.qmax_f32();
    let q = (value / scale * qmax).round().clamp(range.qmin_f32(), qmax);
    q / qmax * scale
}

/// Mean squared error of a quantize-dequantize pass over `values`.
///
/// Returns 0 for an empty view.
pub fn fake_quant_mse(values: &ArrayViewD<'_, f32>, scale: f32, range: QuantRange) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let sum: f64 = values
        .iter()
        .map(|&x| {
            let diff = f64::from(x - quant_dequant(x, scale, range));
            diff * diff
        })
        .sum();

    sum / values.len() as f64
}

// =============================================================================
// Search
// =============================================================================

fn raw_abs_max(values: &ArrayViewD<'_, f32>) -> f32 {
    values.iter().fold(0.0f32, |acc, x| acc.max(x.abs()))
}

/// Absolute maximum of a channel, with zero replaced by [`ABS_MAX_EPSILON`].
pub fn channel_abs_max(values: &ArrayViewD<'_, f32>) -> f32 {
    let abs_max = raw_abs_max(values);
    if abs_max == 0.0 {
        ABS_MAX_EPSILON
    } else {
        abs_max
    }
}

fn search_from_abs_max(
    values: &ArrayViewD<'_, f32>,
    abs_max: f32,
    range: QuantRange,
) -> ChannelSearch {
    let mut best = ChannelSearch {
        abs_max,
        factor: 1.0,
        scale: abs_max,
        loss: f64::INFINITY,
    };

    for factor in grid_factors() {
        let scale = factor * abs_max;
        let loss = fake_quant_mse(values, scale, range);
        if loss < best.loss {
            best.factor = factor;
            best.scale = scale;
            best.loss = loss;
        }
    }

    best
}

/// Runs the grid search over a single channel.
pub fn search_channel(values: &ArrayViewD<'_, f32>, range: QuantRange) -> ChannelSearch {
    search_from_abs_max(values, channel_abs_max(values), range)
}

/// Checks that `tensor` can be calibrated along `channel_axis`.
pub fn check_tensor(tensor: &ArrayViewD<'_, f32>, channel_axis: usize) -> ObserverResult<()> {
    if channel_axis >= tensor.ndim() {
        return Err(ObserverError::InvalidAxis {
            axis: channel_axis,
            ndim: tensor.ndim(),
        });
    }
    if tensor.is_empty() {
        return Err(ObserverError::EmptyTensor {
            shape: tensor.shape().to_vec(),
        });
    }
    Ok(())
}

/// Runs the grid search independently for every channel of `tensor`.
///
/// Channels are the slices along `channel_axis`; the error of each
/// candidate is averaged over all remaining axes.
pub fn search_channels(
    tensor: &ArrayViewD<'_, f32>,
    channel_axis: usize,
    range: QuantRange,
) -> ObserverResult<Vec<ChannelSearch>> {
    check_tensor(tensor, channel_axis)?;

    let results = tensor
        .axis_iter(Axis(channel_axis))
        .enumerate()
        .map(|(channel, values)| {
            let abs_max = raw_abs_max(&values);
            if abs_max == 0.0 {
                tracing::warn!(
                    channel,
                    epsilon = ABS_MAX_EPSILON,
                    "all-zero channel, substituting epsilon abs-max"
                );
            }
            let abs_max = if abs_max == 0.0 { ABS_MAX_EPSILON } else { abs_max };

            let result = search_from_abs_max(&values, abs_max, range);
            tracing::trace!(
                channel,
                abs_max = result.abs_max,
                factor = result.factor,
                scale = result.scale,
                loss = result.loss,
                "channel scale searched"
            );
            result
        })
        .collect();

    Ok(results)
}

/// Returns the searched scale of every channel of `tensor`.
pub fn search_scales(
    tensor: &ArrayViewD<'_, f32>,
    channel_axis: usize,
    range: QuantRange,
) -> ObserverResult<Vec<f32>> {
    Ok(search_channels(tensor, channel_axis, range)?
        .into_iter()
        .map(|result| result.scale)
        .collect())
}

// =============================================================================
// Tests
// =============================================================================
