//! Errors raised by collaborator implementations.

use std::error::Error;
use std::fmt;

use crate::id::CodecId;

/// Errors from a [`FrameCodec`](crate::FrameCodec).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodecError {
    /// The encoded input is not valid for this codec.
    CorruptInput {
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// The codec cannot handle the given frame shape.
    Unsupported {
        /// The codec that rejected the frame.
        codec: CodecId,
    },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CorruptInput { detail } => write!(f, "corrupt codec input: {detail}"),
            Self::Unsupported { codec } => write!(f, "codec {codec} cannot handle this frame"),
        }
    }
}

impl Error for CodecError {}
