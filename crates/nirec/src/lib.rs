//! nirec: recording and seekable playback of depth-camera sessions.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all nirec sub-crates. For most users, adding `nirec` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use nirec::prelude::*;
//!
//! // A live depth stream with one property.
//! struct Camera;
//! impl RecordableStream for Camera {
//!     fn node_type(&self) -> NodeType { NodeType::Depth }
//!     fn name(&self) -> String { "Depth".into() }
//!     fn properties(&self) -> Vec<(PropertyId, PropertyValue)> {
//!         vec![(PropertyId::GAIN, PropertyValue::Int(3))]
//!     }
//! }
//!
//! // Collects the ids of delivered frames.
//! #[derive(Default)]
//! struct Frames(Mutex<Vec<u32>>);
//! impl NodeNotifications for Frames {
//!     fn on_node_added(&self, _: NodeId, _: &str, _: NodeType, _: CodecId, _: u32) {}
//!     fn on_node_removed(&self, _: NodeId) {}
//!     fn on_int_property_changed(&self, _: NodeId, _: &str, _: u64) {}
//!     fn on_real_property_changed(&self, _: NodeId, _: &str, _: f64) {}
//!     fn on_string_property_changed(&self, _: NodeId, _: &str, _: &str) {}
//!     fn on_general_property_changed(&self, _: NodeId, _: &str, _: &[u8]) {}
//!     fn on_node_state_ready(&self, _: NodeId) {}
//!     fn on_new_data(&self, _: NodeId, _: u64, frame_id: u32, _: &[u8]) {
//!         self.0.lock().unwrap().push(frame_id);
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let path = std::env::temp_dir().join(format!("nirec-doc-{}.oni", std::process::id()));
//!
//! let mut recorder = FileRecorder::new(RecorderConfig::default())?;
//! recorder.initialize(&path)?;
//! let depth = recorder.attach(&Camera, false)?;
//! recorder.start()?;
//! for i in 0..3u64 {
//!     recorder.record(depth, i * 33_333, &[0u8; 64])?;
//! }
//! recorder.close()?;
//!
//! let frames = Arc::new(Frames::default());
//! let mut player = Player::open(
//!     Box::new(FileInputStream::new(&path)),
//!     frames.clone(),
//!     Arc::new(DefaultCodecFactory),
//! )?;
//! while player.read_next()? {}
//! player.seek_to_frame(depth.node(), 2)?;
//! player.read_next()?;
//! assert_eq!(*frames.0.lock().unwrap(), vec![1, 2, 3, 2]);
//! # std::fs::remove_file(&path)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `nirec-core` | IDs, properties, versions, collaborator traits |
//! | [`format`] | `nirec-format` | Record layout, assembler, decoder, sequential reader |
//! | [`recorder`] | `nirec-recorder` | Threaded file recorder |
//! | [`player`] | `nirec-player` | Synchronous player and threaded playback engine |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`nirec-core`).
///
/// Contains node and codec ids, property names and values, format
/// versions, and the collaborator traits ([`types::FrameCodec`],
/// [`types::InputStream`], [`types::NodeNotifications`]).
pub use nirec_core as types;

/// Container record format (`nirec-format`).
///
/// [`format::RecordAssembler`] builds records,
/// [`format::ContainerReader`] walks a container sequentially.
pub use nirec_format as format;

/// Threaded file recorder (`nirec-recorder`).
pub use nirec_recorder as recorder;

/// Playback (`nirec-player`).
///
/// [`player::Player`] for synchronous reading and seeking,
/// [`player::PlaybackEngine`] for paced playback on a background thread.
pub use nirec_player as player;

/// Common imports for typical nirec usage.
///
/// ```rust
/// use nirec::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use nirec_core::{
        CodecFactory, CodecId, DefaultCodecFactory, FrameCodec, InputStream, NodeId,
        NodeNotifications, NodeType, PropertyId, PropertyValue, RecordSink, RecordableStream,
        Version,
    };

    // Recording
    pub use nirec_recorder::{
        FileRecorder, RecorderConfig, RecorderError, RecorderState, StreamHandle,
    };

    // Playback
    pub use nirec_player::{
        FileInputStream, PlaybackConfig, PlaybackEngine, Player, PlayerError, PlayerState,
    };
}
