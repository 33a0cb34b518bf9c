//! Observer Error Types
//!
//! Error types for weight calibration observers.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use thiserror::Error;

/// Result type for observer operations.
pub type ObserverResult<T> = Result<T, ObserverError>;

/// Errors that can occur while calibrating weights.
#[derive(Error, Debug)]
pub enum ObserverError {
    /// A threshold or max accessor was used before any tensor was observed.
    #[error("Observer is not calibrated: observe() must run before thresholds are read")]
    NotCalibrated,

    /// Channel axis is outside the rank of the observed tensor.
    #[error("Invalid channel axis: axis {axis} for tensor with {ndim} dimensions")]
    InvalidAxis {
        /// The configured channel axis.
        axis: usize,
        /// Number of dimensions in the tensor.
        ndim: usize,
    },

    /// Bit width cannot describe a signed symmetric range.
    #[error("Invalid bit width: {0} (expected 2..=16)")]
    InvalidBitWidth(u8),

    /// Tensor has no elements to calibrate on.
    #[error("Cannot calibrate an empty tensor of shape {shape:?}")]
    EmptyTensor {
        /// Shape of the empty tensor.
        shape: Vec<usize>,
    },

    /// Configuration could not be parsed or serialized.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error while reading or writing configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for ObserverError {
    fn from(err: toml::de::Error) -> Self {
        ObserverError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ObserverError {
    fn from(err: toml::ser::Error) -> Self {
        ObserverError::Config(err.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================
