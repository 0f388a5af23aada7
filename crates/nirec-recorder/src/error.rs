//! Error types for the recorder.

use std::fmt;
use std::io;

use nirec_core::{CodecError, NodeId};
use nirec_format::FormatError;

use crate::config::ConfigError;
use crate::state::RecorderState;

/// Errors returned by [`FileRecorder`](crate::FileRecorder).
///
/// Parameter and state errors are returned synchronously. Failures on
/// the writer thread are logged there and never reach the caller.
#[derive(Debug)]
pub enum RecorderError {
    /// The operation is not allowed in the current state.
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// State the recorder was in.
        state: RecorderState,
    },
    /// Frames were submitted before [`start`](crate::FileRecorder::start).
    NotStarted,
    /// No attached stream has this handle.
    UnknownStream(NodeId),
    /// The operation needs a frame-producing stream, not the device.
    NotAStream(NodeId),
    /// An empty frame was submitted.
    EmptyFrame,
    /// An empty property value was submitted.
    EmptyProperty,
    /// A frame or property value does not fit the record buffer.
    TooLarge {
        /// Node the data was submitted for.
        node: NodeId,
        /// Bytes submitted.
        size: usize,
        /// Largest size the node accepts.
        limit: usize,
    },
    /// The configuration is invalid.
    Config(ConfigError),
    /// An I/O error occurred.
    Io(io::Error),
    /// A record could not be encoded.
    Format(FormatError),
    /// A frame could not be compressed.
    Codec(CodecError),
    /// The writer thread could not be spawned.
    ThreadSpawnFailed {
        /// OS error text.
        reason: String,
    },
    /// The writer thread panicked before finishing the container.
    WriterPanicked,
    /// The writer thread is gone.
    ShutDown,
}

impl fmt::Display for RecorderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState { operation, state } => {
                write!(f, "cannot {operation} while the recorder is {state}")
            }
            Self::NotStarted => write!(f, "recording has not been started"),
            Self::UnknownStream(node) => write!(f, "no attached stream with node id {node}"),
            Self::NotAStream(node) => write!(f, "node {node} does not produce frames"),
            Self::EmptyFrame => write!(f, "frame is empty"),
            Self::EmptyProperty => write!(f, "property value is empty"),
            Self::TooLarge { node, size, limit } => write!(
                f,
                "{size} bytes submitted for node {node}, at most {limit} fit a record"
            ),
            Self::Config(e) => write!(f, "invalid recorder config: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Format(e) => write!(f, "record encoding failed: {e}"),
            Self::Codec(e) => write!(f, "frame compression failed: {e}"),
            Self::ThreadSpawnFailed { reason } => {
                write!(f, "failed to spawn writer thread: {reason}")
            }
            Self::WriterPanicked => write!(f, "writer thread panicked"),
            Self::ShutDown => write!(f, "writer thread has shut down"),
        }
    }
}

impl std::error::Error for RecorderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Format(e) => Some(e),
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RecorderError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<FormatError> for RecorderError {
    fn from(e: FormatError) -> Self {
        Self::Format(e)
    }
}

impl From<CodecError> for RecorderError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

impl From<ConfigError> for RecorderError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
