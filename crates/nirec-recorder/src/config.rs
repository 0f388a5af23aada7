//! Recorder configuration, validation, and error types.

use std::error::Error;
use std::fmt;

/// Bytes reserved on top of the largest frame for the record header,
/// fields and the node-added record's name slot.
const RECORD_SLACK: usize = 4096;

// ── ConfigError ────────────────────────────────────────────────────

/// Invalid [`RecorderConfig`].
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// A frame dimension is zero.
    ZeroDimension {
        /// Name of the offending field.
        field: &'static str,
    },
    /// Compression expansion must be finite and at least 1.0.
    InvalidExpansion {
        /// The rejected value.
        value: f64,
    },
    /// The device node needs a name.
    EmptyDeviceName,
    /// The worst-case record does not fit in memory.
    BufferTooLarge,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroDimension { field } => write!(f, "{field} must be nonzero"),
            Self::InvalidExpansion { value } => {
                write!(f, "compression expansion {value} must be finite and >= 1.0")
            }
            Self::EmptyDeviceName => write!(f, "device name must not be empty"),
            Self::BufferTooLarge => write!(f, "worst-case record size overflows usize"),
        }
    }
}

impl Error for ConfigError {}

// ── RecorderConfig ─────────────────────────────────────────────────

/// Configuration for [`FileRecorder`](crate::FileRecorder).
///
/// The frame limits size the writer's record buffer: a frame whose
/// encoded size exceeds it is dropped with an error log.
#[derive(Clone, Debug)]
pub struct RecorderConfig {
    /// Largest frame width in pixels. Default: 1920.
    pub max_width: u32,
    /// Largest frame height in pixels. Default: 1080.
    pub max_height: u32,
    /// Largest pixel size in bytes. Default: 4.
    pub max_bytes_per_pixel: u32,
    /// Worst-case ratio of encoded to raw frame size. Default: 1.2.
    pub compression_expansion: f64,
    /// Name recorded for the device node. Default: `"Device"`.
    pub device_name: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            max_bytes_per_pixel: 4,
            compression_expansion: 1.2,
            device_name: "Device".into(),
        }
    }
}

impl RecorderConfig {
    /// Validate all fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("max_width", self.max_width),
            ("max_height", self.max_height),
            ("max_bytes_per_pixel", self.max_bytes_per_pixel),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDimension { field });
            }
        }
        if !self.compression_expansion.is_finite() || self.compression_expansion < 1.0 {
            return Err(ConfigError::InvalidExpansion {
                value: self.compression_expansion,
            });
        }
        if self.device_name.is_empty() {
            return Err(ConfigError::EmptyDeviceName);
        }
        self.checked_buffer_size().ok_or(ConfigError::BufferTooLarge)?;
        Ok(())
    }

    fn checked_buffer_size(&self) -> Option<usize> {
        let raw = (self.max_width as usize)
            .checked_mul(self.max_height as usize)?
            .checked_mul(self.max_bytes_per_pixel as usize)?;
        let expanded = (raw as f64 * self.compression_expansion).ceil();
        if expanded >= usize::MAX as f64 {
            return None;
        }
        (expanded as usize).checked_add(RECORD_SLACK)
    }

    /// Capacity of the writer's record buffer.
    ///
    /// Only meaningful for a config that passed [`validate`](Self::validate).
    pub fn record_buffer_size(&self) -> usize {
        self.checked_buffer_size().unwrap_or(RECORD_SLACK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = RecorderConfig::default();
        config.validate().unwrap();
        let raw = 1920 * 1080 * 4;
        assert!(config.record_buffer_size() >= raw);
        assert!(config.record_buffer_size() <= raw * 2);
    }

    #[test]
    fn zero_dimension_rejected() {
        let config = RecorderConfig {
            max_height: 0,
            ..RecorderConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDimension {
                field: "max_height"
            })
        );
    }

    #[test]
    fn expansion_below_one_rejected() {
        for value in [0.5, f64::NAN, f64::INFINITY] {
            let config = RecorderConfig {
                compression_expansion: value,
                ..RecorderConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidExpansion { .. })
            ));
        }
    }

    #[test]
    fn empty_device_name_rejected() {
        let config = RecorderConfig {
            device_name: String::new(),
            ..RecorderConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyDeviceName));
    }
}
