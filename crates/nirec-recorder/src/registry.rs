//! Per-node bookkeeping shared by the API and the writer thread.
//!
//! The API thread inserts entries on attach and flags them on detach;
//! the writer thread owns every position and timing update. The lock is
//! taken through closure accessors so it is never held across I/O.

use std::sync::{Mutex, MutexGuard};

use indexmap::IndexMap;
use nirec_core::{CodecId, NodeId, NodeType};
use nirec_format::{NodeAdded, SeekTableEntry};

use crate::retime::Retimer;

/// Recorder-side state of one attached node.
#[derive(Clone, Debug)]
pub struct AttachedStreamInfo {
    /// Node id.
    pub node_id: NodeId,
    /// Node kind.
    pub node_type: NodeType,
    /// Node name.
    pub name: String,
    /// Codec the node's frames are written with.
    pub codec: CodecId,
    /// Largest raw frame whose compressed form still fits a record.
    pub max_frame_size: usize,
    /// Frame id of the last written frame (0 before the first).
    pub frame_id: u32,
    /// Output timestamp generator.
    pub timing: Retimer,
    /// Offset of the node-added record.
    pub node_added_position: u64,
    /// Offset of the last new-data record (0 before the first).
    pub last_new_data_position: u64,
    /// Property name → offset of its last record, in announcement order.
    pub property_positions: IndexMap<String, u64>,
    /// One entry per written frame, without the zero entry.
    pub seek_table: Vec<SeekTableEntry>,
    /// Smallest output timestamp written.
    pub min_timestamp: u64,
    /// Largest output timestamp written.
    pub max_timestamp: u64,
    /// Node-state-ready and node-data-begin have been written.
    pub data_begun: bool,
    /// Detach was requested; further frames are rejected.
    pub detached: bool,
}

impl AttachedStreamInfo {
    /// Bookkeeping for a node about to be announced.
    pub fn new(node_id: NodeId, node_type: NodeType, name: String, codec: CodecId) -> Self {
        Self {
            node_id,
            node_type,
            name,
            codec,
            max_frame_size: 0,
            frame_id: 0,
            timing: Retimer::new(),
            node_added_position: 0,
            last_new_data_position: 0,
            property_positions: IndexMap::new(),
            seek_table: Vec::new(),
            min_timestamp: 0,
            max_timestamp: 0,
            data_begun: false,
            detached: false,
        }
    }

    /// Frame id the next written frame gets.
    pub fn next_frame_id(&self) -> u32 {
        self.frame_id.wrapping_add(1)
    }

    /// Apply a committed new-data record.
    pub fn frame_written(
        &mut self,
        input_timestamp: u64,
        output_timestamp: u64,
        position: u64,
        configuration_id: u32,
    ) {
        self.frame_id = self.next_frame_id();
        self.timing.advance(input_timestamp, output_timestamp);
        self.last_new_data_position = position;
        if self.seek_table.is_empty() {
            self.min_timestamp = output_timestamp;
        }
        self.max_timestamp = self.max_timestamp.max(output_timestamp);
        self.seek_table.push(SeekTableEntry {
            timestamp: output_timestamp,
            configuration_id,
            seek_pos: position,
        });
    }

    /// The node-added record as rewritten on detach.
    pub fn final_node_added(&self, seek_table_position: u64) -> NodeAdded {
        NodeAdded {
            frame_count: self.seek_table.len() as u32,
            min_timestamp: self.min_timestamp,
            max_timestamp: self.max_timestamp,
            seek_table_position,
            ..NodeAdded::new(self.name.clone(), self.node_type, self.codec)
        }
    }
}

/// All attached nodes, device included, in attach order.
#[derive(Default)]
pub(crate) struct StreamRegistry {
    nodes: Mutex<IndexMap<NodeId, AttachedStreamInfo>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<NodeId, AttachedStreamInfo>> {
        self.nodes.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, info: AttachedStreamInfo) {
        self.lock().insert(info.node_id, info);
    }

    pub fn remove(&self, node: NodeId) -> Option<AttachedStreamInfo> {
        self.lock().shift_remove(&node)
    }

    #[cfg(test)]
    pub fn contains(&self, node: NodeId) -> bool {
        self.lock().contains_key(&node)
    }

    /// Run `f` on a node's entry, if present.
    pub fn with<T>(&self, node: NodeId, f: impl FnOnce(&AttachedStreamInfo) -> T) -> Option<T> {
        self.lock().get(&node).map(f)
    }

    /// Run `f` on a node's entry mutably, if present.
    pub fn with_mut<T>(
        &self,
        node: NodeId,
        f: impl FnOnce(&mut AttachedStreamInfo) -> T,
    ) -> Option<T> {
        self.lock().get_mut(&node).map(f)
    }

    /// Run `f` on every entry.
    pub fn for_each_mut(&self, mut f: impl FnMut(&mut AttachedStreamInfo)) {
        for info in self.lock().values_mut() {
            f(info);
        }
    }

    /// Node ids in attach order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.lock().keys().copied().collect()
    }
}
