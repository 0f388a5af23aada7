//! Container and record types.

use nirec_core::{CodecId, NodeId, NodeType, PropertyValue, Version};

use crate::error::FormatError;
use crate::{
    CONTAINER_HEADER_SIZE, MAGIC, MAX_FIELDS_SIZE, RECORD_HEADER_SIZE, RECORD_MAGIC,
    SEEK_TABLE_ENTRY_SIZE,
};

fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(b)
}

fn u64_at(bytes: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(b)
}

// ── Container header ────────────────────────────────────────────

/// The fixed header at offset 0 of every container.
///
/// Written with placeholder values when recording starts and patched
/// in place when the container is closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Format version the container was written with.
    pub version: Version,
    /// Largest frame timestamp in the container.
    pub max_timestamp: u64,
    /// Highest node id ever allocated.
    pub max_node_id: u32,
}

impl ContainerHeader {
    /// Header for a fresh container at the current version.
    pub fn new() -> Self {
        Self {
            version: Version::CURRENT,
            max_timestamp: 0,
            max_node_id: 0,
        }
    }

    /// Encode to the on-disk layout.
    pub fn encode(&self) -> [u8; CONTAINER_HEADER_SIZE] {
        let mut out = [0u8; CONTAINER_HEADER_SIZE];
        out[0..4].copy_from_slice(&MAGIC);
        out[4] = self.version.major;
        out[5] = self.version.minor;
        out[6..8].copy_from_slice(&self.version.maintenance.to_le_bytes());
        out[8..12].copy_from_slice(&self.version.build.to_le_bytes());
        out[12..20].copy_from_slice(&self.max_timestamp.to_le_bytes());
        out[20..24].copy_from_slice(&self.max_node_id.to_le_bytes());
        out
    }

    /// Decode and validate a header.
    ///
    /// Rejects a wrong identity and any version outside
    /// [`Version::OLDEST_SUPPORTED`]..=[`Version::CURRENT`].
    pub fn decode(bytes: &[u8; CONTAINER_HEADER_SIZE]) -> Result<Self, FormatError> {
        if bytes[0..4] != MAGIC {
            return Err(FormatError::InvalidMagic);
        }
        let version = Version::new(bytes[4], bytes[5], u16_at(bytes, 6), u32_at(bytes, 8));
        if !version.is_supported() {
            return Err(FormatError::UnsupportedVersion { found: version });
        }
        Ok(Self {
            version,
            max_timestamp: u64_at(bytes, 12),
            max_node_id: u32_at(bytes, 20),
        })
    }
}

impl Default for ContainerHeader {
    fn default() -> Self {
        Self::new()
    }
}

// ── Record header ───────────────────────────────────────────────

/// Record kind tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// Node-added as written by format 1.0.0.4.
    NodeAddedV1004,
    /// Integer property change.
    IntProperty,
    /// Real property change.
    RealProperty,
    /// String property change.
    StringProperty,
    /// Opaque property change.
    GeneralProperty,
    /// Node removed.
    NodeRemoved,
    /// Frame data for a node begins.
    NodeDataBegin,
    /// A node's initial properties are complete.
    NodeStateReady,
    /// One frame.
    NewData,
    /// End of the container.
    End,
    /// Node-added as written by format 1.0.0.5.
    NodeAddedV1005,
    /// Node-added, current shape.
    NodeAdded,
    /// A node's seek table.
    SeekTable,
}

impl RecordType {
    /// Wire tag.
    pub fn tag(self) -> u32 {
        match self {
            Self::NodeAddedV1004 => 0x02,
            Self::IntProperty => 0x03,
            Self::RealProperty => 0x04,
            Self::StringProperty => 0x05,
            Self::GeneralProperty => 0x06,
            Self::NodeRemoved => 0x07,
            Self::NodeDataBegin => 0x08,
            Self::NodeStateReady => 0x09,
            Self::NewData => 0x0A,
            Self::End => 0x0B,
            Self::NodeAddedV1005 => 0x0C,
            Self::NodeAdded => 0x0D,
            Self::SeekTable => 0x0E,
        }
    }

    /// Decode a wire tag.
    pub fn from_tag(tag: u32) -> Option<Self> {
        Some(match tag {
            0x02 => Self::NodeAddedV1004,
            0x03 => Self::IntProperty,
            0x04 => Self::RealProperty,
            0x05 => Self::StringProperty,
            0x06 => Self::GeneralProperty,
            0x07 => Self::NodeRemoved,
            0x08 => Self::NodeDataBegin,
            0x09 => Self::NodeStateReady,
            0x0A => Self::NewData,
            0x0B => Self::End,
            0x0C => Self::NodeAddedV1005,
            0x0D => Self::NodeAdded,
            0x0E => Self::SeekTable,
            _ => return None,
        })
    }

    /// Whether this record adds or removes a node.
    pub fn is_topology(self) -> bool {
        matches!(
            self,
            Self::NodeAddedV1004 | Self::NodeAddedV1005 | Self::NodeAdded | Self::NodeRemoved
        )
    }

    /// Whether this record advances the configuration id: property
    /// changes and node additions or removals.
    pub fn changes_configuration(self) -> bool {
        self.is_property() || self.is_topology()
    }

    /// Whether this is one of the property record kinds.
    pub fn is_property(self) -> bool {
        matches!(
            self,
            Self::IntProperty | Self::RealProperty | Self::StringProperty | Self::GeneralProperty
        )
    }
}

/// The fixed 28-byte header in front of every record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    /// Record kind.
    pub record_type: RecordType,
    /// Owning node.
    pub node_id: NodeId,
    /// Header plus field bytes.
    pub fields_size: u32,
    /// Payload bytes after the fields.
    pub payload_size: u32,
    /// Offset of the previous record in this record's chain, or 0.
    pub undo_position: u64,
}

impl RecordHeader {
    /// Byte offset of `fields_size` within an encoded header.
    pub(crate) const FIELDS_SIZE_OFFSET: usize = 12;
    /// Byte offset of `payload_size` within an encoded header.
    pub(crate) const PAYLOAD_SIZE_OFFSET: usize = 16;

    /// Encode to the on-disk layout.
    pub fn encode(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut out = [0u8; RECORD_HEADER_SIZE];
        out[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
        out[4..8].copy_from_slice(&self.record_type.tag().to_le_bytes());
        out[8..12].copy_from_slice(&self.node_id.0.to_le_bytes());
        out[12..16].copy_from_slice(&self.fields_size.to_le_bytes());
        out[16..20].copy_from_slice(&self.payload_size.to_le_bytes());
        out[20..28].copy_from_slice(&self.undo_position.to_le_bytes());
        out
    }

    /// Decode and validate a header.
    pub fn decode(bytes: &[u8; RECORD_HEADER_SIZE]) -> Result<Self, FormatError> {
        let magic = u32_at(bytes, 0);
        if magic != RECORD_MAGIC {
            return Err(FormatError::BadRecordMagic { found: magic });
        }
        let tag = u32_at(bytes, 4);
        let record_type =
            RecordType::from_tag(tag).ok_or(FormatError::UnknownRecordType { tag })?;
        let fields_size = u32_at(bytes, 12);
        if (fields_size as usize) < RECORD_HEADER_SIZE {
            return Err(FormatError::malformed(format!(
                "fields size {fields_size} smaller than the record header"
            )));
        }
        if fields_size as usize > MAX_FIELDS_SIZE {
            return Err(FormatError::malformed(format!(
                "fields size {fields_size} exceeds {MAX_FIELDS_SIZE}"
            )));
        }
        Ok(Self {
            record_type,
            node_id: NodeId(u32_at(bytes, 8)),
            fields_size,
            payload_size: u32_at(bytes, 16),
            undo_position: u64_at(bytes, 20),
        })
    }

    /// Number of field bytes following the header.
    pub fn field_bytes(&self) -> usize {
        (self.fields_size as usize).saturating_sub(RECORD_HEADER_SIZE)
    }

    /// Total encoded size of the record.
    pub fn record_size(&self) -> u64 {
        u64::from(self.fields_size) + u64::from(self.payload_size)
    }
}

// ── Seek table ──────────────────────────────────────────────────

/// One frame's entry in a node's seek table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeekTableEntry {
    /// Output timestamp of the frame.
    pub timestamp: u64,
    /// Global configuration id in effect when the frame was written.
    pub configuration_id: u32,
    /// File offset of the frame's new-data record.
    pub seek_pos: u64,
}

impl SeekTableEntry {
    /// The synthetic entry at index 0.
    pub const ZERO: SeekTableEntry = SeekTableEntry {
        timestamp: 0,
        configuration_id: 0,
        seek_pos: 0,
    };

    /// Encode to the on-disk layout.
    pub fn encode(&self) -> [u8; SEEK_TABLE_ENTRY_SIZE] {
        let mut out = [0u8; SEEK_TABLE_ENTRY_SIZE];
        out[0..8].copy_from_slice(&self.timestamp.to_le_bytes());
        out[8..12].copy_from_slice(&self.configuration_id.to_le_bytes());
        out[12..20].copy_from_slice(&self.seek_pos.to_le_bytes());
        out
    }

    /// Decode one entry from exactly [`SEEK_TABLE_ENTRY_SIZE`] bytes.
    pub fn decode(bytes: &[u8]) -> Self {
        Self {
            timestamp: u64_at(bytes, 0),
            configuration_id: u32_at(bytes, 8),
            seek_pos: u64_at(bytes, 12),
        }
    }
}

// ── Node added ──────────────────────────────────────────────────

/// Canonical in-memory shape of a node-added record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeAdded {
    /// Node name.
    pub name: String,
    /// Node kind.
    pub node_type: NodeType,
    /// Codec of the node's frame data.
    pub codec: CodecId,
    /// Number of frames recorded for the node (0 until detach).
    pub frame_count: u32,
    /// Smallest frame timestamp.
    pub min_timestamp: u64,
    /// Largest frame timestamp.
    pub max_timestamp: u64,
    /// Offset of the node's seek-table record, or 0 if none was written.
    pub seek_table_position: u64,
}

impl NodeAdded {
    /// A freshly attached node: no frames, no seek table yet.
    pub fn new(name: impl Into<String>, node_type: NodeType, codec: CodecId) -> Self {
        Self {
            name: name.into(),
            node_type,
            codec,
            frame_count: 0,
            min_timestamp: 0,
            max_timestamp: 0,
            seek_table_position: 0,
        }
    }
}

/// A node-added record in the shape it was written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeAddedVersion {
    /// Format 1.0.0.4: name, type and codec only.
    V1004 {
        /// Node name.
        name: String,
        /// Node kind.
        node_type: NodeType,
        /// Codec of the node's frame data.
        codec: CodecId,
    },
    /// Format 1.0.0.5: adds frame count and timestamp range.
    V1005 {
        /// Node name.
        name: String,
        /// Node kind.
        node_type: NodeType,
        /// Codec of the node's frame data.
        codec: CodecId,
        /// Number of frames recorded.
        frame_count: u32,
        /// Smallest frame timestamp.
        min_timestamp: u64,
        /// Largest frame timestamp.
        max_timestamp: u64,
    },
    /// Current format: adds the seek-table position.
    Current(NodeAdded),
}

impl NodeAddedVersion {
    /// Record type this shape is written as.
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::V1004 { .. } => RecordType::NodeAddedV1004,
            Self::V1005 { .. } => RecordType::NodeAddedV1005,
            Self::Current(_) => RecordType::NodeAdded,
        }
    }

    /// Convert to the canonical shape. Fields an older version lacks
    /// are zero.
    pub fn upgrade(self) -> NodeAdded {
        match self {
            Self::V1004 {
                name,
                node_type,
                codec,
            } => NodeAdded::new(name, node_type, codec),
            Self::V1005 {
                name,
                node_type,
                codec,
                frame_count,
                min_timestamp,
                max_timestamp,
            } => NodeAdded {
                frame_count,
                min_timestamp,
                max_timestamp,
                ..NodeAdded::new(name, node_type, codec)
            },
            Self::Current(node) => node,
        }
    }
}

// ── Decoded records ─────────────────────────────────────────────

/// A decoded record body. The node id and undo position live in the
/// accompanying [`RecordHeader`].
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    /// A node was added.
    NodeAdded(NodeAddedVersion),
    /// A property changed. The value variant matches the record type.
    Property {
        /// Property name.
        name: String,
        /// New value.
        value: PropertyValue,
    },
    /// The node was removed.
    NodeRemoved,
    /// Frame data for the node begins.
    NodeDataBegin {
        /// Frames recorded, if known when written.
        frame_count: u32,
        /// Largest timestamp, if known when written.
        max_timestamp: u64,
    },
    /// The node's initial properties are complete.
    NodeStateReady,
    /// One encoded frame.
    NewData {
        /// Output timestamp.
        timestamp: u64,
        /// Running frame number, starting at 1.
        frame_id: u32,
        /// Encoded frame bytes.
        data: Vec<u8>,
    },
    /// A seek table, including the zero entry at index 0.
    SeekTable(Vec<SeekTableEntry>),
    /// End of the container.
    End,
}
