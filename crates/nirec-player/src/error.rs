//! Error types for the player.

use std::fmt;
use std::io;

use nirec_core::{CodecError, CodecId, NodeId};
use nirec_format::FormatError;

use crate::config::ConfigError;
use crate::player::PlayerState;

/// Errors returned by [`Player`](crate::Player) and
/// [`PlaybackEngine`](crate::PlaybackEngine).
#[derive(Debug)]
pub enum PlayerError {
    /// The container is malformed.
    Format(FormatError),
    /// The input stream failed.
    Io(io::Error),
    /// No node with this id has been announced.
    UnknownNode(NodeId),
    /// There is no frame to seek to: in the given node, or in any node
    /// when `None`.
    NoFrames(Option<NodeId>),
    /// The codec factory cannot decode a node's frames.
    UnsupportedCodec {
        /// The node.
        node: NodeId,
        /// Its codec.
        codec: CodecId,
    },
    /// A frame could not be decoded.
    Codec(CodecError),
    /// The operation is not allowed in the current state.
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// State the player was in.
        state: PlayerState,
    },
    /// The read thread is gone.
    ShutDown,
    /// The configuration is invalid.
    Config(ConfigError),
}

impl fmt::Display for PlayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(e) => write!(f, "malformed container: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::UnknownNode(node) => write!(f, "unknown node {node}"),
            Self::NoFrames(Some(node)) => write!(f, "node {node} has no frames"),
            Self::NoFrames(None) => write!(f, "container has no frames"),
            Self::UnsupportedCodec { node, codec } => {
                write!(f, "no decoder for codec {codec} of node {node}")
            }
            Self::Codec(e) => write!(f, "frame decoding failed: {e}"),
            Self::InvalidState { operation, state } => {
                write!(f, "cannot {operation} while the player is {state:?}")
            }
            Self::ShutDown => write!(f, "playback thread has shut down"),
            Self::Config(e) => write!(f, "invalid playback config: {e}"),
        }
    }
}

impl std::error::Error for PlayerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Format(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Codec(e) => Some(e),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FormatError> for PlayerError {
    fn from(e: FormatError) -> Self {
        Self::Format(e)
    }
}

impl From<io::Error> for PlayerError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<CodecError> for PlayerError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

impl From<ConfigError> for PlayerError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
