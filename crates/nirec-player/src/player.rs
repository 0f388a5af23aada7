//! [`Player`]: synchronous container playback with seeking.
//!
//! The player reads records front to back, turning each into node
//! notifications. Seeking uses each node's frame index (its seek table,
//! or an index built by one header scan) and restores every property
//! to the value it had at the target frame:
//!
//! - same configuration id: no property changed in between, so the
//!   read position simply jumps;
//! - target behind: each property whose current record is at or after
//!   the target walks its undo chain back to the last record before the
//!   target and that record is re-announced;
//! - target ahead: the records in between are processed with frame
//!   delivery suppressed.

use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::Arc;

use indexmap::IndexMap;
use nirec_core::{
    CodecFactory, CodecId, FrameCodec, InputStream, NodeId, NodeNotifications, PropertyValue,
    SeekOrigin,
};
use nirec_format::{
    decode_container_header, read_record_body, read_record_header, ContainerHeader, FormatError,
    NodeAdded, Record, RecordHeader, RecordType, SeekTableEntry, CONTAINER_HEADER_SIZE,
};
use smallvec::SmallVec;
use tracing::{debug, info, trace, warn};

use crate::error::PlayerError;
use crate::input::StreamReader;
use crate::node::{DataIndex, PlayerNodeInfo, PropertyPosition};

/// Lifecycle of a [`Player`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerState {
    /// Not open, or closed.
    Closed,
    /// Reading the header and node announcements.
    Opening,
    /// Frames can be read.
    Ready,
    /// A seek is in progress.
    Seeking,
    /// The end record, or the end of the input, was reached.
    Eof,
}

/// A frame read from the container but not yet decoded.
#[derive(Clone, Debug)]
pub struct PendingFrame {
    /// Node the frame belongs to.
    pub node: NodeId,
    /// Recorded timestamp.
    pub timestamp: u64,
    /// Frame number within the node, starting at 1.
    pub frame_id: u32,
    data: Vec<u8>,
}

impl PendingFrame {
    /// The encoded frame bytes.
    pub fn encoded(&self) -> &[u8] {
        &self.data
    }
}

enum Step {
    Continue,
    Frame(PendingFrame),
    End,
}

/// Plays a container back through a [`NodeNotifications`] sink.
pub struct Player {
    input: Box<dyn InputStream>,
    notifications: Arc<dyn NodeNotifications>,
    codec_factory: Arc<dyn CodecFactory>,
    header: ContainerHeader,
    state: PlayerState,
    nodes: IndexMap<NodeId, PlayerNodeInfo>,
    codecs: HashMap<NodeId, Box<dyn FrameCodec>>,
    /// Offset of the next record.
    position: u64,
    /// Property, node-added and node-removed records processed so far,
    /// as of `position`.
    configuration_id: u32,
    repeat: bool,
    decoded: Vec<u8>,
}

impl Player {
    /// Open a container and announce every node, property and
    /// state-ready record that precedes the first frame.
    pub fn open(
        mut input: Box<dyn InputStream>,
        notifications: Arc<dyn NodeNotifications>,
        codec_factory: Arc<dyn CodecFactory>,
    ) -> Result<Self, PlayerError> {
        input.open()?;
        let header = decode_container_header(&mut StreamReader::new(input.as_mut()))?;
        debug!(
            version = %header.version,
            max_timestamp = header.max_timestamp,
            max_node_id = header.max_node_id,
            "container opened"
        );
        let mut player = Self {
            input,
            notifications,
            codec_factory,
            header,
            state: PlayerState::Opening,
            nodes: IndexMap::new(),
            codecs: HashMap::new(),
            position: CONTAINER_HEADER_SIZE as u64,
            configuration_id: 0,
            repeat: false,
            decoded: Vec::new(),
        };
        player.read_announcements()?;
        Ok(player)
    }

    fn read_announcements(&mut self) -> Result<(), PlayerError> {
        loop {
            let position = self.position;
            let Some((header, record)) = self.read_record()? else {
                self.reach_eof();
                return Ok(());
            };
            if header.record_type == RecordType::NewData {
                self.seek_input(position)?;
                self.state = PlayerState::Ready;
                return Ok(());
            }
            if let Step::End = self.dispatch(position, &header, record)? {
                self.reach_eof();
                return Ok(());
            }
        }
    }

    // ── Queries ────────────────────────────────────────────────────

    /// The container header.
    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// Every announced node, in announcement order.
    pub fn nodes(&self) -> impl Iterator<Item = &PlayerNodeInfo> {
        self.nodes.values()
    }

    /// One announced node.
    pub fn node(&self, node: NodeId) -> Option<&PlayerNodeInfo> {
        self.nodes.get(&node)
    }

    /// Frame id of the last frame read from `node`, or 0.
    pub fn tell_frame(&self, node: NodeId) -> Result<u32, PlayerError> {
        self.nodes
            .get(&node)
            .map(|info| info.current_frame)
            .ok_or(PlayerError::UnknownNode(node))
    }

    /// Number of frames recorded for `node`.
    pub fn frame_count(&self, node: NodeId) -> Result<u32, PlayerError> {
        self.nodes
            .get(&node)
            .map(|info| info.frame_count)
            .ok_or(PlayerError::UnknownNode(node))
    }

    /// Number of property, node-added and node-removed records before
    /// the read position.
    pub fn configuration_id(&self) -> u32 {
        self.configuration_id
    }

    /// In repeat mode node-removed records are not announced, since
    /// playback will rewind past them.
    pub fn set_repeat(&mut self, repeat: bool) {
        self.repeat = repeat;
    }

    /// Whether repeat mode is on.
    pub fn repeat(&self) -> bool {
        self.repeat
    }

    // ── Reading ────────────────────────────────────────────────────

    /// Read up to and including the next frame, announcing every
    /// record on the way. `None` at end of file.
    pub fn next_frame(&mut self) -> Result<Option<PendingFrame>, PlayerError> {
        match self.state {
            PlayerState::Ready => {}
            PlayerState::Eof => return Ok(None),
            state => {
                return Err(PlayerError::InvalidState {
                    operation: "read",
                    state,
                })
            }
        }
        loop {
            let position = self.position;
            let Some((header, record)) = self.read_record()? else {
                self.reach_eof();
                return Ok(None);
            };
            match self.dispatch(position, &header, record)? {
                Step::Continue => {}
                Step::Frame(frame) => return Ok(Some(frame)),
                Step::End => {
                    self.reach_eof();
                    return Ok(None);
                }
            }
        }
    }

    /// Decode `frame` and announce it.
    pub fn deliver(&mut self, frame: &PendingFrame) -> Result<(), PlayerError> {
        let Some(codec) = self.codecs.get_mut(&frame.node) else {
            let codec = self
                .nodes
                .get(&frame.node)
                .map_or(CodecId::NULL, |info| info.codec);
            return Err(PlayerError::UnsupportedCodec {
                node: frame.node,
                codec,
            });
        };
        codec.decompress(&frame.data, &mut self.decoded)?;
        self.notifications.on_new_data(
            frame.node,
            frame.timestamp,
            frame.frame_id,
            &self.decoded,
        );
        Ok(())
    }

    /// Read and deliver the next frame. Returns `false` at end of file.
    pub fn read_next(&mut self) -> Result<bool, PlayerError> {
        match self.next_frame()? {
            Some(frame) => {
                self.deliver(&frame)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn reach_eof(&mut self) {
        if self.state != PlayerState::Eof {
            info!(position = self.position, "end of container");
        }
        self.state = PlayerState::Eof;
    }

    /// Read the record at the read position. A record cut short by the
    /// end of the input counts as end of file.
    fn read_record(&mut self) -> Result<Option<(RecordHeader, Record)>, PlayerError> {
        let mut reader = StreamReader::new(self.input.as_mut());
        let header = match read_record_header(&mut reader) {
            Ok(Some(header)) => header,
            Ok(None) => return Ok(None),
            Err(FormatError::Truncated { detail }) => {
                warn!(position = self.position, %detail, "truncated record at end of container");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let record = match read_record_body(&mut reader, &header) {
            Ok(record) => record,
            Err(FormatError::Truncated { detail }) => {
                warn!(position = self.position, %detail, "truncated record at end of container");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        self.position += header.record_size();
        Ok(Some((header, record)))
    }

    fn seek_input(&mut self, position: u64) -> Result<(), PlayerError> {
        let offset = i64::try_from(position).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("offset {position} out of range"),
            )
        })?;
        self.input.seek64(SeekOrigin::Start, offset)?;
        self.position = position;
        Ok(())
    }

    /// Header of the record at `position`. Leaves the read position
    /// undefined; callers seek afterwards.
    fn header_at(&mut self, position: u64) -> Result<RecordHeader, PlayerError> {
        self.seek_input(position)?;
        let mut reader = StreamReader::new(self.input.as_mut());
        read_record_header(&mut reader)?.ok_or_else(|| {
            PlayerError::Format(FormatError::Truncated {
                detail: format!("no record at offset {position}"),
            })
        })
    }

    // ── Dispatch ───────────────────────────────────────────────────

    fn dispatch(
        &mut self,
        position: u64,
        header: &RecordHeader,
        record: Record,
    ) -> Result<Step, PlayerError> {
        let node = header.node_id;
        trace!(position, kind = ?header.record_type, node = %node, "record");
        if header.record_type.is_topology() {
            self.configuration_id = self.configuration_id.wrapping_add(1);
        }
        match record {
            Record::NodeAdded(version) => self.node_added(node, position, version.upgrade())?,
            Record::Property { name, value } => {
                self.property_changed(node, position, header.undo_position, name, value)
            }
            Record::NodeDataBegin {
                frame_count,
                max_timestamp,
            } => {
                // Older node-added shapes carry no counts; data-begin may.
                if let Some(info) = self.nodes.get_mut(&node) {
                    if info.frame_count == 0 {
                        info.frame_count = frame_count;
                    }
                    if info.max_timestamp == 0 {
                        info.max_timestamp = max_timestamp;
                    }
                }
            }
            Record::NodeStateReady => {
                if let Some(info) = self.nodes.get_mut(&node) {
                    info.state_ready = true;
                    self.notifications.on_node_state_ready(node);
                }
            }
            Record::NewData {
                timestamp,
                frame_id,
                data,
            } => {
                let Some(info) = self.nodes.get_mut(&node) else {
                    warn!(node = %node, position, "frame for unannounced node");
                    return Ok(Step::Continue);
                };
                info.current_frame = frame_id;
                return Ok(Step::Frame(PendingFrame {
                    node,
                    timestamp,
                    frame_id,
                    data,
                }));
            }
            Record::NodeRemoved => self.node_removed(node, position),
            Record::SeekTable(_) => {}
            Record::End => return Ok(Step::End),
        }
        Ok(Step::Continue)
    }

    fn node_added(
        &mut self,
        node: NodeId,
        position: u64,
        added: NodeAdded,
    ) -> Result<(), PlayerError> {
        if self.nodes.contains_key(&node) {
            trace!(node = %node, "node already announced");
            return Ok(());
        }
        if added.codec != CodecId::NULL {
            let codec = self.codec_factory.create(added.codec).ok_or(
                PlayerError::UnsupportedCodec {
                    node,
                    codec: added.codec,
                },
            )?;
            self.codecs.insert(node, codec);
        }
        let mut info = PlayerNodeInfo::new(node, added, position);
        if info.seek_table_position != 0 {
            info.index = self.load_seek_table(node, info.seek_table_position, info.frame_count)?;
        }
        self.notifications.on_node_added(
            node,
            &info.name,
            info.node_type,
            info.codec,
            info.frame_count,
        );
        debug!(
            node = %node,
            name = %info.name,
            codec = %info.codec,
            frames = info.frame_count,
            indexed = info.index.is_some(),
            "node added"
        );
        self.nodes.insert(node, info);
        Ok(())
    }

    fn load_seek_table(
        &mut self,
        node: NodeId,
        at: u64,
        frame_count: u32,
    ) -> Result<Option<DataIndex>, PlayerError> {
        let resume = self.position;
        self.seek_input(at)?;
        let read = self.read_record();
        self.seek_input(resume)?;
        let index = match read {
            Ok(Some((header, Record::SeekTable(entries)))) if header.node_id == node => {
                DataIndex::from_seek_table(entries, frame_count)
            }
            Ok(_) => None,
            Err(PlayerError::Io(e)) => return Err(PlayerError::Io(e)),
            Err(e) => {
                debug!(node = %node, error = %e, "seek table unreadable");
                None
            }
        };
        if index.is_none() {
            warn!(node = %node, position = at, "seek table unusable, frames will be indexed by scan");
        }
        Ok(index)
    }

    fn property_changed(
        &mut self,
        node: NodeId,
        position: u64,
        undo_position: u64,
        name: String,
        value: PropertyValue,
    ) {
        self.configuration_id = self.configuration_id.wrapping_add(1);
        let Some(info) = self.nodes.get_mut(&node) else {
            warn!(node = %node, property = %name, "property for unannounced node");
            return;
        };
        info.properties.insert(
            name.clone(),
            PropertyPosition {
                position,
                undo_position,
            },
        );
        notify_property(self.notifications.as_ref(), node, &name, &value);
    }

    fn node_removed(&mut self, node: NodeId, position: u64) {
        if self.repeat {
            trace!(node = %node, "repeat mode, node removal not announced");
            return;
        }
        if let Some(info) = self.nodes.get_mut(&node) {
            info.removed = true;
            info.removed_position = position;
            self.notifications.on_node_removed(node);
        }
    }

    // ── Seeking ────────────────────────────────────────────────────

    fn check_seekable(&self, operation: &'static str) -> Result<(), PlayerError> {
        match self.state {
            PlayerState::Ready | PlayerState::Eof => Ok(()),
            state => Err(PlayerError::InvalidState { operation, state }),
        }
    }

    /// Position playback so the next frame read is frame `frame` of
    /// `node`. `frame` is clamped to the recorded range.
    pub fn seek_to_frame(&mut self, node: NodeId, frame: u32) -> Result<(), PlayerError> {
        self.check_seekable("seek")?;
        self.ensure_indices()?;
        let info = self.nodes.get(&node).ok_or(PlayerError::UnknownNode(node))?;
        let index = info.index.as_ref().ok_or(PlayerError::NoFrames(Some(node)))?;
        let count = index.frame_count();
        if count == 0 {
            return Err(PlayerError::NoFrames(Some(node)));
        }
        let frame = frame.clamp(1, count);
        let target = *index
            .frame(frame)
            .ok_or(PlayerError::NoFrames(Some(node)))?;
        debug!(node = %node, frame, position = target.seek_pos, "seek to frame");
        self.seek_to_entry(target)
    }

    /// Position playback at the latest frame recorded at or before
    /// `timestamp`, across all nodes. Before every frame, playback is
    /// positioned at the first frame.
    pub fn seek_to_timestamp(&mut self, timestamp: u64) -> Result<(), PlayerError> {
        self.check_seekable("seek")?;
        self.ensure_indices()?;
        let mut best: Option<SeekTableEntry> = None;
        for index in self.nodes.values().filter_map(PlayerNodeInfo::index) {
            let Some(entry) = index.at_or_before(timestamp) else {
                continue;
            };
            let better = best.map_or(true, |b| {
                entry.timestamp > b.timestamp
                    || (entry.timestamp == b.timestamp && entry.seek_pos < b.seek_pos)
            });
            if better {
                best = Some(*entry);
            }
        }
        let target = match best {
            Some(entry) => entry,
            None => self.earliest_frame().ok_or(PlayerError::NoFrames(None))?,
        };
        debug!(timestamp, position = target.seek_pos, "seek to timestamp");
        self.seek_to_entry(target)
    }

    /// Position playback at the first frame of the container.
    pub fn rewind(&mut self) -> Result<(), PlayerError> {
        self.check_seekable("rewind")?;
        self.ensure_indices()?;
        let target = self.earliest_frame().ok_or(PlayerError::NoFrames(None))?;
        debug!(position = target.seek_pos, "rewind");
        self.seek_to_entry(target)
    }

    fn earliest_frame(&self) -> Option<SeekTableEntry> {
        self.nodes
            .values()
            .filter_map(|info| info.index.as_ref()?.frame(1).copied())
            .min_by_key(|entry| entry.seek_pos)
    }

    fn seek_to_entry(&mut self, target: SeekTableEntry) -> Result<(), PlayerError> {
        let previous = self.state;
        let from = self.position;
        self.state = PlayerState::Seeking;
        match self.move_to(target) {
            Ok(()) => {
                self.state = PlayerState::Ready;
                Ok(())
            }
            Err(e) => {
                if let Err(restore) = self.seek_input(from) {
                    warn!(error = %restore, "could not restore read position after failed seek");
                }
                self.state = previous;
                Err(e)
            }
        }
    }

    fn move_to(&mut self, target: SeekTableEntry) -> Result<(), PlayerError> {
        if target.configuration_id == self.configuration_id {
            trace!(position = target.seek_pos, "configuration unchanged, jumping");
        } else if target.seek_pos < self.position {
            self.replay_properties_before(target.seek_pos)?;
        } else {
            self.skip_forward_to(target.seek_pos)?;
        }
        self.seek_input(target.seek_pos)?;
        self.configuration_id = target.configuration_id;
        for info in self.nodes.values_mut() {
            if let Some(index) = &info.index {
                info.current_frame = index.frames_before(target.seek_pos);
            }
        }
        Ok(())
    }

    fn skip_forward_to(&mut self, target: u64) -> Result<(), PlayerError> {
        while self.position < target {
            let position = self.position;
            let Some((header, record)) = self.read_record()? else {
                break;
            };
            if let Step::End = self.dispatch(position, &header, record)? {
                break;
            }
        }
        Ok(())
    }

    /// Re-announce, for every property changed at or after `target`,
    /// the last value it had before `target`.
    ///
    /// Nodes removed at or after `target` are announced again first,
    /// followed by every property value they had at `target` and their
    /// state-ready.
    fn replay_properties_before(&mut self, target: u64) -> Result<(), PlayerError> {
        let revived = self.revive_nodes_removed_after(target);

        let mut stale: SmallVec<[(NodeId, String, u64); 8]> = SmallVec::new();
        for info in self.nodes.values() {
            let whole = revived.contains(&info.node_id);
            for (name, current) in &info.properties {
                if current.position >= target {
                    stale.push((info.node_id, name.clone(), current.undo_position));
                } else if whole {
                    stale.push((info.node_id, name.clone(), current.position));
                }
            }
        }

        for (node, name, mut position) in stale {
            while position >= target {
                let header = self.header_at(position)?;
                if header.undo_position >= position {
                    return Err(FormatError::Malformed {
                        detail: format!(
                            "undo position {} of record at {position} does not point backwards",
                            header.undo_position
                        ),
                    }
                    .into());
                }
                position = header.undo_position;
            }
            if position == 0 {
                debug!(node = %node, property = %name, "no value before seek target");
                continue;
            }
            self.seek_input(position)?;
            let Some((header, Record::Property { value, .. })) = self.read_record()? else {
                return Err(FormatError::Malformed {
                    detail: format!("undo chain of {name:?} leads to a non-property record"),
                }
                .into());
            };
            if let Some(info) = self.nodes.get_mut(&node) {
                info.properties.insert(
                    name.clone(),
                    PropertyPosition {
                        position,
                        undo_position: header.undo_position,
                    },
                );
            }
            notify_property(self.notifications.as_ref(), node, &name, &value);
        }

        for node in revived {
            if self.nodes.get(&node).is_some_and(|info| info.state_ready) {
                self.notifications.on_node_state_ready(node);
            }
        }
        Ok(())
    }

    /// Undo node-removed records at or after `target`: clear the flag
    /// and announce the node again. Returns the revived nodes.
    fn revive_nodes_removed_after(&mut self, target: u64) -> SmallVec<[NodeId; 4]> {
        let mut revived = SmallVec::new();
        for info in self.nodes.values_mut() {
            if !info.removed || info.removed_position < target {
                continue;
            }
            info.removed = false;
            info.removed_position = 0;
            debug!(node = %info.node_id, "node removal undone by seek");
            self.notifications.on_node_added(
                info.node_id,
                &info.name,
                info.node_type,
                info.codec,
                info.frame_count,
            );
            revived.push(info.node_id);
        }
        revived
    }

    /// Give every announced stream without a usable seek table an
    /// index built by scanning record headers.
    fn ensure_indices(&mut self) -> Result<(), PlayerError> {
        let missing = self
            .nodes
            .values()
            .any(|info| info.node_type.is_stream() && info.index.is_none());
        if !missing {
            return Ok(());
        }
        let resume = self.position;
        let scanned = self.scan_frames();
        self.seek_input(resume)?;
        let mut frames = scanned?;
        for info in self.nodes.values_mut() {
            if info.node_type.is_stream() && info.index.is_none() {
                let index = DataIndex::from_frames(frames.remove(&info.node_id).unwrap_or_default());
                info.frame_count = index.frame_count();
                info.index = Some(index);
            }
        }
        Ok(())
    }

    /// One pass over the record headers, collecting each frame's
    /// timestamp, offset and the configuration id in effect before it.
    fn scan_frames(&mut self) -> Result<HashMap<NodeId, Vec<SeekTableEntry>>, PlayerError> {
        self.input.seek64(SeekOrigin::End, 0)?;
        let end = self.input.tell64()?;

        let mut frames: HashMap<NodeId, Vec<SeekTableEntry>> = HashMap::new();
        let mut configuration_id = 0u32;
        let mut position = CONTAINER_HEADER_SIZE as u64;
        let mut records = 0usize;
        loop {
            self.seek_input(position)?;
            let mut reader = StreamReader::new(self.input.as_mut());
            let header = match read_record_header(&mut reader) {
                Ok(Some(header)) => header,
                Ok(None) | Err(FormatError::Truncated { .. }) => break,
                Err(e) => return Err(e.into()),
            };
            let next = position + header.record_size();
            if next > end {
                break;
            }
            match header.record_type {
                RecordType::End => break,
                RecordType::NewData => {
                    let mut timestamp = [0u8; 8];
                    reader.read_exact(&mut timestamp)?;
                    frames
                        .entry(header.node_id)
                        .or_default()
                        .push(SeekTableEntry {
                            timestamp: u64::from_le_bytes(timestamp),
                            configuration_id,
                            seek_pos: position,
                        });
                }
                kind if kind.changes_configuration() => {
                    configuration_id = configuration_id.wrapping_add(1);
                }
                _ => {}
            }
            records += 1;
            position = next;
        }
        debug!(records, nodes = frames.len(), "frame index built by scan");
        Ok(frames)
    }

    /// Release the input. Further reads and seeks fail.
    pub fn close(&mut self) -> Result<(), PlayerError> {
        self.state = PlayerState::Closed;
        self.input.close()?;
        Ok(())
    }
}

fn notify_property(
    notifications: &dyn NodeNotifications,
    node: NodeId,
    name: &str,
    value: &PropertyValue,
) {
    match value {
        PropertyValue::Int(v) => notifications.on_int_property_changed(node, name, *v),
        PropertyValue::Real(v) => notifications.on_real_property_changed(node, name, *v),
        PropertyValue::String(v) => notifications.on_string_property_changed(node, name, v),
        PropertyValue::General(v) => notifications.on_general_property_changed(node, name, v),
    }
}
