//! Binary record format for nirec recording containers.
//!
//! A container is a fixed header followed by an append-only log of
//! self-delimiting records. This crate encodes and decodes both, with
//! no I/O of its own beyond the generic [`ContainerReader`].
//!
//! # Architecture
//!
//! - [`RecordBuffer`] builds one record at a time in a fixed-capacity buffer
//! - [`RecordAssembler`] exposes one operation per record kind on top of it
//! - [`Record::decode`] and [`decode_record`] turn bytes back into typed records
//! - [`ContainerReader`] walks a container from any `Read` source
//!
//! # Format
//!
//! ```text
//! [IDENTITY "NI10"] [VERSION u8 u8 u16 u32] [MAX_TIMESTAMP u64] [MAX_NODE_ID u32]
//! [Record 1] [Record 2] ... [End record]
//! ```
//!
//! Each record is a 28-byte header (magic, type tag, node id, fields
//! size, payload size, undo position), then its fields, then an
//! optional payload. All integers are little-endian with no padding.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod assembler;
pub mod codec;
pub mod error;
pub mod reader;
pub mod types;

pub use assembler::RecordAssembler;
pub use codec::{
    decode_container_header, decode_record, read_record_body, read_record_header,
    truncate_to_slot, FieldCursor, FieldValue, RecordBuffer,
};
pub use error::FormatError;
pub use reader::{ContainerReader, RecordEntry, RecordIter};
pub use types::{
    ContainerHeader, NodeAdded, NodeAddedVersion, Record, RecordHeader, RecordType,
    SeekTableEntry,
};

/// Identity bytes at the start of every container.
pub const MAGIC: [u8; 4] = *b"NI10";

/// Magic value at the start of every record: the bytes `"NIR\0"` as a
/// little-endian `u32`.
pub const RECORD_MAGIC: u32 = u32::from_le_bytes(*b"NIR\0");

/// Size in bytes of the container header.
pub const CONTAINER_HEADER_SIZE: usize = 24;

/// Size in bytes of the fixed record header.
///
/// A record's `fields_size` counts these bytes too, so it is never
/// smaller than this.
pub const RECORD_HEADER_SIZE: usize = 28;

/// Fixed size of the character slot used by every string field.
pub const STRING_CAPACITY: usize = 80;

/// Size in bytes of one encoded string field (length prefix plus slot).
pub const STRING_FIELD_SIZE: usize = 4 + STRING_CAPACITY;

/// Largest legal `fields_size`: the header plus the current node-added
/// field set (name, type, codec, frame count, two timestamps and the
/// seek-table offset).
pub const MAX_FIELDS_SIZE: usize = RECORD_HEADER_SIZE + STRING_FIELD_SIZE + 3 * 4 + 3 * 8;

/// `fields_size` of a new-data record: header, timestamp and frame id.
/// Everything else in the record is the encoded frame.
pub const NEW_DATA_FIELDS_SIZE: usize = RECORD_HEADER_SIZE + 8 + 4;

/// `fields_size` of every property record: header, name and data size.
pub const PROPERTY_FIELDS_SIZE: usize = RECORD_HEADER_SIZE + STRING_FIELD_SIZE + 4;

/// Size in bytes of one encoded seek-table entry.
pub const SEEK_TABLE_ENTRY_SIZE: usize = 20;
