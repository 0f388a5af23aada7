//! Playback configuration and validation.

use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Invalid [`PlaybackConfig`] or speed.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// Speed must be finite and non-negative.
    InvalidSpeed {
        /// The rejected value.
        value: f64,
    },
    /// The shutdown timeout must be nonzero.
    ZeroShutdownTimeout,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSpeed { value } => {
                write!(f, "playback speed {value} must be finite and >= 0")
            }
            Self::ZeroShutdownTimeout => write!(f, "shutdown_timeout_ms must be nonzero"),
        }
    }
}

impl Error for ConfigError {}

/// Configuration for [`PlaybackEngine`](crate::PlaybackEngine).
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Playback rate relative to recorded time. `0.0` delivers frames
    /// as fast as they can be read. Default: 1.0.
    pub speed: f64,
    /// Rewind at end of file instead of stopping. Default: false.
    pub repeat: bool,
    /// How long [`shutdown`](crate::PlaybackEngine::shutdown) waits for
    /// the read thread before detaching it. Default: 1000.
    pub shutdown_timeout_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            repeat: false,
            shutdown_timeout_ms: 1000,
        }
    }
}

impl PlaybackConfig {
    /// Validate all fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_speed(self.speed)?;
        if self.shutdown_timeout_ms == 0 {
            return Err(ConfigError::ZeroShutdownTimeout);
        }
        Ok(())
    }

    /// The shutdown timeout as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

pub(crate) fn validate_speed(speed: f64) -> Result<(), ConfigError> {
    if speed.is_finite() && speed >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidSpeed { value: speed })
    }
}
