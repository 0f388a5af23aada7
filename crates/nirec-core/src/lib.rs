//! Core types and traits for the nirec recording container.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the identifiers shared by the recorder and the player (node ids,
//! codec ids, node types, property ids, file-format versions) and the
//! collaborator traits the engines consume without implementing:
//! frame codecs, codec factories, input streams, record sinks,
//! notification sinks and recordable streams.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod codecs;
pub mod error;
pub mod id;
pub mod property;
pub mod traits;
pub mod version;

pub use codecs::{DefaultCodecFactory, UncompressedCodec};
pub use error::CodecError;
pub use id::{CodecId, NodeId, NodeType};
pub use property::{PropertyId, PropertyValue};
pub use traits::{
    CodecFactory, FrameCodec, InputStream, NodeNotifications, RecordSink, RecordableStream,
    SeekOrigin,
};
pub use version::Version;
