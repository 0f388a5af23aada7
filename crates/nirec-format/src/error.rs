//! Error types for record encoding and decoding.

use std::fmt;
use std::io;

use nirec_core::Version;

/// Errors that can occur while building, writing or parsing records.
#[derive(Debug)]
pub enum FormatError {
    /// An I/O error occurred while reading a container.
    Io(io::Error),
    /// The record buffer cannot hold the requested bytes. Nothing was
    /// written.
    Capacity {
        /// Bytes the operation would have needed.
        needed: usize,
        /// Bytes still free in the buffer.
        available: usize,
    },
    /// A record was built out of order (e.g. a field after the payload).
    Sequence(&'static str),
    /// The container does not start with `b"NI10"`.
    InvalidMagic,
    /// A record header does not start with the record magic.
    BadRecordMagic {
        /// The value found in place of the magic.
        found: u32,
    },
    /// The container version is outside the readable range.
    UnsupportedVersion {
        /// The version found in the header.
        found: Version,
    },
    /// A record type tag is not recognized.
    UnknownRecordType {
        /// The unrecognized tag.
        tag: u32,
    },
    /// The input ended in the middle of a record or header.
    Truncated {
        /// What was being read when the input ended.
        detail: String,
    },
    /// A record is structurally invalid.
    Malformed {
        /// Human-readable description of what went wrong.
        detail: String,
    },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Capacity { needed, available } => write!(
                f,
                "record buffer too small: need {needed} bytes, {available} available"
            ),
            Self::Sequence(what) => write!(f, "record built out of order: {what}"),
            Self::InvalidMagic => write!(f, "invalid container identity (expected b\"NI10\")"),
            Self::BadRecordMagic { found } => {
                write!(f, "bad record magic {found:#010x}")
            }
            Self::UnsupportedVersion { found } => {
                write!(f, "unsupported container version {found}")
            }
            Self::UnknownRecordType { tag } => write!(f, "unknown record type {tag:#x}"),
            Self::Truncated { detail } => write!(f, "truncated input: {detail}"),
            Self::Malformed { detail } => write!(f, "malformed record: {detail}"),
        }
    }
}

impl std::error::Error for FormatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FormatError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl FormatError {
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        Self::Malformed {
            detail: detail.into(),
        }
    }
}
