//! Recorder lifecycle state, shared between the API and the writer thread.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a [`FileRecorder`](crate::FileRecorder).
///
/// `Uninitialized → Initializing → Recording → Terminating → Closed`.
/// The API moves to `Initializing` and `Terminating`; the writer thread
/// moves to `Recording` once the container header is written and to
/// `Closed` once the container is finalized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecorderState {
    /// No container open.
    Uninitialized,
    /// Writer thread started, header not yet written.
    Initializing,
    /// Header written; records are being appended.
    Recording,
    /// Close requested; the writer is draining its queue.
    Terminating,
    /// Container finalized.
    Closed,
}

impl RecorderState {
    fn to_raw(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Initializing => 1,
            Self::Recording => 2,
            Self::Terminating => 3,
            Self::Closed => 4,
        }
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Uninitialized,
            1 => Self::Initializing,
            2 => Self::Recording,
            3 => Self::Terminating,
            _ => Self::Closed,
        }
    }

    /// Whether producer calls may enqueue messages.
    pub fn accepts_messages(self) -> bool {
        matches!(self, Self::Initializing | Self::Recording)
    }
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Recording => "recording",
            Self::Terminating => "terminating",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Atomic cell holding a [`RecorderState`].
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: RecorderState) -> Self {
        Self(AtomicU8::new(state.to_raw()))
    }

    pub fn get(&self) -> RecorderState {
        RecorderState::from_raw(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: RecorderState) {
        self.0.store(state.to_raw(), Ordering::Release);
    }

    /// Move from `from` to `to`; returns the state actually found.
    pub fn transition(&self, from: RecorderState, to: RecorderState) -> RecorderState {
        match self.0.compare_exchange(
            from.to_raw(),
            to.to_raw(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(raw) | Err(raw) => RecorderState::from_raw(raw),
        }
    }
}
