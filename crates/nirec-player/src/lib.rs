//! Seekable playback of nirec recording containers.
//!
//! [`Player`] reads a container synchronously and replays it through a
//! [`NodeNotifications`](nirec_core::NodeNotifications) sink: node
//! announcements, property changes and decoded frames, in file order.
//! [`PlaybackEngine`] runs a player on its own thread and paces frames
//! by their recorded timestamps.
//!
//! # Seeking
//!
//! Every stream has a frame index, taken from its seek table or built
//! by scanning record headers when the table is missing or unusable.
//! A seek restores each property to the value it had at the target
//! frame, walking undo chains backwards or replaying records forwards,
//! so the state observed after a seek matches what straight playback
//! to that frame would have produced.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod node;
pub mod player;

pub use config::{ConfigError, PlaybackConfig};
pub use engine::{PlaybackEngine, ShutdownReport};
pub use error::PlayerError;
pub use input::{FileInputStream, ReaderInputStream};
pub use node::{DataIndex, PlayerNodeInfo, PropertyPosition};
pub use player::{PendingFrame, Player, PlayerState};
