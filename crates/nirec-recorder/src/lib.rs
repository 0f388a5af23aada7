//! Threaded file recorder for nirec recording containers.
//!
//! [`FileRecorder`] accepts node announcements, frames and property
//! updates from any number of producer threads and hands owned copies
//! to a single writer thread through a three-level priority queue. The
//! writer assembles records, writes them in all-or-nothing groups
//! ([`Transaction`]) and links every property and frame record to its
//! predecessor through undo positions so the player can seek backwards.
//!
//! On close the writer removes every node, writes each stream's seek
//! table, rewrites its node-added record with the final frame count,
//! writes the end record, patches the container header and truncates
//! the file at the end record.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
mod message;
pub mod recorder;
mod registry;
pub mod retime;
pub mod sink;
pub mod state;
mod writer;

pub use config::{ConfigError, RecorderConfig};
pub use error::RecorderError;
pub use nirec_core::RecordSink;
pub use recorder::{FileRecorder, StreamHandle};
pub use retime::Retimer;
pub use sink::{FileSink, RecordFile, Transaction};
pub use state::RecorderState;
