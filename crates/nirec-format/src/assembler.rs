//! Record assembler: one operation per record kind.
//!
//! Each operation sequences `begin`/`emit_*`/`finish` on the shared
//! [`RecordBuffer`] and returns the completed record bytes, borrowed
//! until the next operation.

use nirec_core::{NodeId, PropertyValue};

use crate::codec::RecordBuffer;
use crate::error::FormatError;
use crate::types::{NodeAdded, NodeAddedVersion, RecordType, SeekTableEntry};
use crate::{RECORD_HEADER_SIZE, SEEK_TABLE_ENTRY_SIZE};

/// Builds encoded records in a reusable worst-case-sized buffer.
pub struct RecordAssembler {
    buffer: RecordBuffer,
}

impl RecordAssembler {
    /// Create an assembler whose records may be up to `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RecordBuffer::new(capacity),
        }
    }

    /// Maximum record size.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Node-added record in the current shape.
    pub fn node_added(&mut self, node: NodeId, added: &NodeAdded) -> Result<&[u8], FormatError> {
        let b = &mut self.buffer;
        b.begin(RecordType::NodeAdded, node, 0)?;
        b.emit_string(&added.name)?;
        b.emit_field(added.node_type.to_raw())?;
        b.emit_field(added.codec.0)?;
        b.emit_field(added.frame_count)?;
        b.emit_field(added.min_timestamp)?;
        b.emit_field(added.max_timestamp)?;
        b.emit_field(added.seek_table_position)?;
        b.finish()
    }

    /// Node-added record in whichever shape `version` carries.
    ///
    /// Only the recorder's own tests and fixtures write the older
    /// shapes; live recordings always use [`node_added`](Self::node_added).
    pub fn node_added_versioned(
        &mut self,
        node: NodeId,
        version: &NodeAddedVersion,
    ) -> Result<&[u8], FormatError> {
        let (name, node_type, codec) = match version {
            NodeAddedVersion::Current(added) => return self.node_added(node, added),
            NodeAddedVersion::V1004 {
                name,
                node_type,
                codec,
            }
            | NodeAddedVersion::V1005 {
                name,
                node_type,
                codec,
                ..
            } => (name, node_type, codec),
        };
        let b = &mut self.buffer;
        b.begin(version.record_type(), node, 0)?;
        b.emit_string(name)?;
        b.emit_field(node_type.to_raw())?;
        b.emit_field(codec.0)?;
        if let NodeAddedVersion::V1005 {
            frame_count,
            min_timestamp,
            max_timestamp,
            ..
        } = version
        {
            b.emit_field(*frame_count)?;
            b.emit_field(*min_timestamp)?;
            b.emit_field(*max_timestamp)?;
        }
        b.finish()
    }

    /// Node-state-ready record.
    pub fn node_state_ready(&mut self, node: NodeId) -> Result<&[u8], FormatError> {
        self.buffer.begin(RecordType::NodeStateReady, node, 0)?;
        self.buffer.finish()
    }

    /// Node-removed record; its undo position is the node-added record.
    pub fn node_removed(
        &mut self,
        node: NodeId,
        node_added_position: u64,
    ) -> Result<&[u8], FormatError> {
        self.buffer
            .begin(RecordType::NodeRemoved, node, node_added_position)?;
        self.buffer.finish()
    }

    /// Node-data-begin record.
    pub fn node_data_begin(
        &mut self,
        node: NodeId,
        frame_count: u32,
        max_timestamp: u64,
    ) -> Result<&[u8], FormatError> {
        let b = &mut self.buffer;
        b.begin(RecordType::NodeDataBegin, node, 0)?;
        b.emit_field(frame_count)?;
        b.emit_field(max_timestamp)?;
        b.finish()
    }

    /// New-data record carrying one encoded frame.
    pub fn new_data(
        &mut self,
        node: NodeId,
        timestamp: u64,
        frame_id: u32,
        data: &[u8],
        undo_position: u64,
    ) -> Result<&[u8], FormatError> {
        let b = &mut self.buffer;
        b.begin(RecordType::NewData, node, undo_position)?;
        b.emit_field(timestamp)?;
        b.emit_field(frame_id)?;
        b.emit_payload(data)?;
        b.finish()
    }

    fn property_record(
        &mut self,
        record_type: RecordType,
        node: NodeId,
        name: &str,
        payload: &[u8],
        undo_position: u64,
    ) -> Result<&[u8], FormatError> {
        // The size field is 32-bit on the wire whatever the payload.
        let data_size = u32::try_from(payload.len()).map_err(|_| FormatError::Capacity {
            needed: payload.len(),
            available: u32::MAX as usize,
        })?;
        let b = &mut self.buffer;
        b.begin(record_type, node, undo_position)?;
        b.emit_string(name)?;
        b.emit_field(data_size)?;
        b.emit_payload(payload)?;
        b.finish()
    }

    /// Integer property record.
    pub fn int_property(
        &mut self,
        node: NodeId,
        name: &str,
        value: u64,
        undo_position: u64,
    ) -> Result<&[u8], FormatError> {
        self.property_record(
            RecordType::IntProperty,
            node,
            name,
            &value.to_le_bytes(),
            undo_position,
        )
    }

    /// Real property record.
    pub fn real_property(
        &mut self,
        node: NodeId,
        name: &str,
        value: f64,
        undo_position: u64,
    ) -> Result<&[u8], FormatError> {
        self.property_record(
            RecordType::RealProperty,
            node,
            name,
            &value.to_le_bytes(),
            undo_position,
        )
    }

    /// String property record. The payload is the text plus a NUL.
    pub fn string_property(
        &mut self,
        node: NodeId,
        name: &str,
        value: &str,
        undo_position: u64,
    ) -> Result<&[u8], FormatError> {
        let mut payload = Vec::with_capacity(value.len() + 1);
        payload.extend_from_slice(value.as_bytes());
        payload.push(0);
        self.property_record(
            RecordType::StringProperty,
            node,
            name,
            &payload,
            undo_position,
        )
    }

    /// General (opaque bytes) property record.
    pub fn general_property(
        &mut self,
        node: NodeId,
        name: &str,
        data: &[u8],
        undo_position: u64,
    ) -> Result<&[u8], FormatError> {
        self.property_record(
            RecordType::GeneralProperty,
            node,
            name,
            data,
            undo_position,
        )
    }

    /// Property record of the kind matching `value`.
    pub fn property(
        &mut self,
        node: NodeId,
        name: &str,
        value: &PropertyValue,
        undo_position: u64,
    ) -> Result<&[u8], FormatError> {
        match value {
            PropertyValue::Int(v) => self.int_property(node, name, *v, undo_position),
            PropertyValue::Real(v) => self.real_property(node, name, *v, undo_position),
            PropertyValue::String(v) => self.string_property(node, name, v, undo_position),
            PropertyValue::General(v) => self.general_property(node, name, v, undo_position),
        }
    }

    /// Seek-table record: a zero entry followed by `entries`.
    ///
    /// Fails with [`FormatError::Capacity`] before anything is written
    /// if the whole table does not fit.
    pub fn seek_table(
        &mut self,
        node: NodeId,
        entries: &[SeekTableEntry],
    ) -> Result<&[u8], FormatError> {
        let needed = RECORD_HEADER_SIZE + (entries.len() + 1) * SEEK_TABLE_ENTRY_SIZE;
        let available = self.buffer.capacity();
        if needed > available {
            return Err(FormatError::Capacity { needed, available });
        }
        let b = &mut self.buffer;
        b.begin(RecordType::SeekTable, node, 0)?;
        b.emit_payload(&SeekTableEntry::ZERO.encode())?;
        for entry in entries {
            b.emit_payload(&entry.encode())?;
        }
        b.finish()
    }

    /// End-of-container record.
    pub fn end(&mut self) -> Result<&[u8], FormatError> {
        self.buffer.begin(RecordType::End, NodeId(0), 0)?;
        self.buffer.finish()
    }
}
