//! Per-node playback state and the frame index used for seeking.

use indexmap::IndexMap;
use nirec_core::{CodecId, NodeId, NodeType};
use nirec_format::{NodeAdded, SeekTableEntry};

/// Offsets of the property record currently in effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropertyPosition {
    /// Offset of the record.
    pub position: u64,
    /// Offset of the previous record of the same property, or 0.
    pub undo_position: u64,
}

/// Frame index of one node: a zero entry followed by one entry per
/// frame, so frame `n` is entry `n`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataIndex {
    entries: Vec<SeekTableEntry>,
}

impl DataIndex {
    /// Index from a decoded seek table (zero entry included).
    ///
    /// Returns `None` unless the table has exactly `frame_count + 1`
    /// entries, entry 0 is all zero and offsets strictly increase after
    /// it.
    pub fn from_seek_table(entries: Vec<SeekTableEntry>, frame_count: u32) -> Option<Self> {
        if entries.len() != frame_count as usize + 1 || entries[0] != SeekTableEntry::ZERO {
            return None;
        }
        if !entries[1..].windows(2).all(|w| w[0].seek_pos < w[1].seek_pos) {
            return None;
        }
        Some(Self { entries })
    }

    /// Index from frame entries in file order, without the zero entry.
    pub fn from_frames(frames: Vec<SeekTableEntry>) -> Self {
        let mut entries = Vec::with_capacity(frames.len() + 1);
        entries.push(SeekTableEntry::ZERO);
        entries.extend(frames);
        Self { entries }
    }

    /// Number of frames.
    pub fn frame_count(&self) -> u32 {
        (self.entries.len() - 1) as u32
    }

    /// Entry of frame `frame` (1-based).
    pub fn frame(&self, frame: u32) -> Option<&SeekTableEntry> {
        if frame == 0 {
            return None;
        }
        self.entries.get(frame as usize)
    }

    /// Frame entries, without the zero entry.
    pub fn frames(&self) -> &[SeekTableEntry] {
        &self.entries[1..]
    }

    /// Number of frames recorded before file offset `position`.
    pub fn frames_before(&self, position: u64) -> u32 {
        self.frames().partition_point(|e| e.seek_pos < position) as u32
    }

    /// The last frame with a timestamp at or before `timestamp`.
    pub fn at_or_before(&self, timestamp: u64) -> Option<&SeekTableEntry> {
        let n = self.frames().partition_point(|e| e.timestamp <= timestamp);
        n.checked_sub(1).map(|i| &self.frames()[i])
    }
}

/// Player-side state of one announced node.
#[derive(Clone, Debug)]
pub struct PlayerNodeInfo {
    /// Node id.
    pub node_id: NodeId,
    /// Node name.
    pub name: String,
    /// Node kind.
    pub node_type: NodeType,
    /// Codec of the node's frames.
    pub codec: CodecId,
    /// Frames recorded, as far as is known.
    pub frame_count: u32,
    /// Frame id of the last frame read, or 0.
    pub current_frame: u32,
    /// Node-state-ready has been seen.
    pub state_ready: bool,
    /// Node-removed has been seen.
    pub removed: bool,
    /// Offset of the node-removed record, or 0.
    pub removed_position: u64,
    /// Offset of the node-added record.
    pub node_added_position: u64,
    /// Offset of the seek-table record, or 0.
    pub seek_table_position: u64,
    /// Smallest frame timestamp.
    pub min_timestamp: u64,
    /// Largest frame timestamp.
    pub max_timestamp: u64,
    /// Property name → record in effect, in announcement order.
    pub properties: IndexMap<String, PropertyPosition>,
    pub(crate) index: Option<DataIndex>,
}

impl PlayerNodeInfo {
    pub(crate) fn new(node_id: NodeId, added: NodeAdded, node_added_position: u64) -> Self {
        Self {
            node_id,
            name: added.name,
            node_type: added.node_type,
            codec: added.codec,
            frame_count: added.frame_count,
            current_frame: 0,
            state_ready: false,
            removed: false,
            removed_position: 0,
            node_added_position,
            seek_table_position: added.seek_table_position,
            min_timestamp: added.min_timestamp,
            max_timestamp: added.max_timestamp,
            properties: IndexMap::new(),
            index: None,
        }
    }

    /// The frame index, once loaded or built.
    pub fn index(&self) -> Option<&DataIndex> {
        self.index.as_ref()
    }
}
