//! Observer Configuration
//!
//! Bit width, channel axis and the integer range they imply.
//!
//! Configuration can be built in code or loaded from a TOML file:
//!
//! ```toml
//! quant_bits = 8
//! channel_axis = 1
//! ```
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ObserverError, ObserverResult};

/// Smallest bit width with a non-empty signed symmetric range.
pub const MIN_QUANT_BITS: u8 = 2;

/// Largest supported bit width.
pub const MAX_QUANT_BITS: u8 = 16;

// =============================================================================
// Quantization Range
// =============================================================================

/// Integer code range `[qmin, qmax]` for a bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantRange {
    /// Smallest representable code.
    pub qmin: i32,
    /// Largest representable code.
    pub qmax: i32,
}

impl QuantRange {
    /// Computes the code range for `bits` under the given sign and symmetry.
    ///
    /// Signed symmetric ranges drop the most negative code so that
    /// `qmin == -qmax`.
    pub fn new(bits: u8, sign: bool, symmetric: bool) -> ObserverResult<Self> {
        if !(MIN_QUANT_BITS..=MAX_QUANT_BITS).contains(&bits) {
            return Err(ObserverError::InvalidBitWidth(bits));
        }

        let (qmin, qmax) = if sign {
            let qmax = (1i32 << (bits - 1)) - 1;
            if symmetric {
                (-qmax, qmax)
            } else {
                (-qmax - 1, qmax)
            }
        } else {
            (0, (1i32 << bits) - 1)
        };

        Ok(Self { qmin, qmax })
    }

    /// Signed symmetric range used by weight observers.
    pub fn signed_symmetric(bits: u8) -> ObserverResult<Self> {
        Self::new(bits, true, true)
    }

    /// Returns `qmin` as a float for clipping.
    pub fn qmin_f32(&self) -> f32 {
        self.qmin as f32
    }

    /// Returns `qmax` as a float for scaling.
    pub fn qmax_f32(&self) -> f32 {
        self.qmax as f32
    }

    /// Returns true when the range is mirrored around zero.
    pub fn is_symmetric(&self) -> bool {
        self.qmin == -self.qmax
    }
}

// =============================================================================
// Layer Kind
// =============================================================================

/// Kind of layer whose weight is observed.
///
/// Determines which weight dimension enumerates output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// 2D convolution, weight `[out, in, kh, kw]`.
    Conv2d,
    /// Dense layer, weight `[in, out]`.
    Linear,
    /// Tensor-parallel linear split along output features.
    ColumnParallelLinear,
    /// Tensor-parallel linear split along input features.
    RowParallelLinear,
    /// Any other layer; channels are taken from the leading dimension.
    #[default]
    Other,
}

impl LayerKind {
    /// Returns the default channel axis for this layer's weight.
    pub fn quant_axis(&self) -> usize {
        match self {
            LayerKind::Linear
            | LayerKind::ColumnParallelLinear
            | LayerKind::RowParallelLinear => 1,
            LayerKind::Conv2d | LayerKind::Other => 0,
        }
    }
}

// =============================================================================
// Observer Configuration
// =============================================================================

/// Configuration for a channel-wise weight observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverConfig {
    /// Number of bits of the quantized integer.
    #[serde(default = "default_quant_bits")]
    pub quant_bits: u8,

    /// Dimension of the weight that enumerates channels.
    #[serde(default)]
    pub channel_axis: usize,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            quant_bits: default_quant_bits(),
            channel_axis: 0,
        }
    }
}

fn default_quant_bits() -> u8 {
    8
}

impl ObserverConfig {
    /// Creates a configuration with the given bit width and channel axis 0.
    pub fn new(quant_bits: u8) -> Self {
        Self {
            quant_bits,
            ..Self::default()
        }
    }

    /// Creates a configuration whose channel axis follows the layer kind.
    pub fn for_layer(quant_bits: u8, layer: LayerKind) -> Self {
        Self::new(quant_bits).with_channel_axis(layer.quant_axis())
    }

    /// Sets the channel axis.
    pub fn with_channel_axis(mut self, channel_axis: usize) -> Self {
        self.channel_axis = channel_axis;
        self
    }

    /// Checks that the bit width is supported.
    pub fn validate(&self) -> ObserverResult<()> {
        self.quant_range().map(|_| ())
    }

    /// Returns the signed symmetric range for the configured bit width.
    pub fn quant_range(&self) -> ObserverResult<QuantRange> {
        QuantRange::signed_symmetric(self.quant_bits)
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> ObserverResult<Self> {
        let config: ObserverConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to TOML text.
    pub fn to_toml_string(&self) -> ObserverResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> ObserverResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Saves configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ObserverResult<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_symmetric_range() {
        let range = QuantRange::signed_symmetric(8).unwrap();
        assert_eq!(range.qmin, -127);
        assert_eq!(range.qmax, 127);
        assert!(range.is_symmetric());

        let range = QuantRange::signed_symmetric(4).unwrap();
        assert_eq!((range.qmin, range.qmax), (-7, 7));
    }

    #[test]
    fn test_other_ranges() {
        let signed = QuantRange::new(8, true, false).unwrap();
        assert_eq!((signed.qmin, signed.qmax), (-128, 127));
        assert!(!signed.is_symmetric());

        let unsigned = QuantRange::new(8, false, true).unwrap();
        assert_eq!((unsigned.qmin, unsigned.qmax), (0, 255));
    }

    #[test]
    fn test_invalid_bit_width() {
        assert!(matches!(
            QuantRange::signed_symmetric(1),
            Err(ObserverError::InvalidBitWidth(1))
        ));
        assert!(matches!(
            QuantRange::signed_symmetric(17),
            Err(ObserverError::InvalidBitWidth(17))
        ));
        assert!(ObserverConfig::new(0).validate().is_err());
    }

    #[test]
    fn test_layer_quant_axis() {
        assert_eq!(LayerKind::Conv2d.quant_axis(), 0);
        assert_eq!(LayerKind::Linear.quant_axis(), 1);
        assert_eq!(LayerKind::RowParallelLinear.quant_axis(), 1);
        assert_eq!(LayerKind::Other.quant_axis(), 0);

        let config = ObserverConfig::for_layer(4, LayerKind::Linear);
        assert_eq!(config.quant_bits, 4);
        assert_eq!(config.channel_axis, 1);
    }

    #[test]
    fn test_default_config() {
        let config = ObserverConfig::default();
        assert_eq!(config.quant_bits, 8);
        assert_eq!(config.channel_axis, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let config = ObserverConfig::from_toml_str("channel_axis = 1\n").unwrap();
        assert_eq!(config.quant_bits, 8);
        assert_eq!(config.channel_axis, 1);

        let err = ObserverConfig::from_toml_str("quant_bits = 1\n").unwrap_err();
        assert!(matches!(err, ObserverError::InvalidBitWidth(1)));
    }

    #[test]
    fn test_config_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("observer.toml");

        let config = ObserverConfig::new(4).with_channel_axis(2);
        config.save(&path).unwrap();

        let loaded = ObserverConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ObserverConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ObserverError::Io(_)));
    }
}
