//! The writer thread: sole owner of the record assembler and the file.
//!
//! Messages arrive through the priority queue in [`crate::message`].
//! Every message becomes one or more record groups written through a
//! [`Transaction`]; registry bookkeeping is staged and applied only
//! after the group commits. Failures are logged here and never reach
//! the API thread.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use nirec_core::{CodecId, FrameCodec, NodeId, NodeType, PropertyValue};
use nirec_format::{ContainerHeader, NodeAdded, RecordAssembler};
use tracing::{debug, error, info, trace, warn};

use crate::error::RecorderError;
use crate::message::{AttachRequest, Message, MessageReceiver};
use crate::registry::StreamRegistry;
use crate::sink::{RecordFile, Transaction};
use crate::state::{RecorderState, StateCell};

type WriteResult = Result<(), RecorderError>;

/// State moved into the writer thread.
pub(crate) struct WriterThread {
    file: RecordFile,
    assembler: RecordAssembler,
    registry: Arc<StreamRegistry>,
    state: Arc<StateCell>,
    rx: MessageReceiver,
    codecs: HashMap<NodeId, Box<dyn FrameCodec>>,
    scratch: Vec<u8>,
    device_name: String,
    header_written: bool,
    started: bool,
    /// Property, node-added and node-removed records committed so far.
    configuration_id: u32,
    max_timestamp: u64,
    max_node_id: u32,
}

impl WriterThread {
    pub fn new(
        file: RecordFile,
        record_buffer_size: usize,
        device_name: String,
        registry: Arc<StreamRegistry>,
        state: Arc<StateCell>,
        rx: MessageReceiver,
    ) -> Self {
        Self {
            file,
            assembler: RecordAssembler::new(record_buffer_size),
            registry,
            state,
            rx,
            codecs: HashMap::new(),
            scratch: Vec::new(),
            device_name,
            header_written: false,
            started: false,
            configuration_id: 0,
            max_timestamp: 0,
            max_node_id: 0,
        }
    }

    /// Process messages until `Terminate`, or until every sender is
    /// gone, then finalize the container.
    pub fn run(mut self) {
        debug!("writer thread started");
        loop {
            let Some(message) = self.rx.recv() else {
                warn!("message queue closed without terminate, finalizing container");
                self.terminate();
                break;
            };
            trace!(kind = message.kind(), "writer message");
            if let Message::Terminate = message {
                self.terminate();
                break;
            }
            self.handle(message);
        }
        self.state.set(RecorderState::Closed);
        info!(
            max_timestamp = self.max_timestamp,
            max_node_id = self.max_node_id,
            "recording closed"
        );
    }

    fn handle(&mut self, message: Message) {
        if !self.header_written && !matches!(message, Message::Initialize { .. }) {
            warn!(
                kind = message.kind(),
                "container header not written, dropping message"
            );
            return;
        }
        match message {
            Message::Initialize { device_properties } => {
                if let Err(e) = self.initialize(&device_properties) {
                    error!(error = %e, "failed to write container header");
                }
            }
            Message::Attach(request) => {
                let node = request.node;
                if let Err(e) = self.attach(request) {
                    error!(node = %node, error = %e, "failed to announce node");
                    self.registry.remove(node);
                }
            }
            Message::Start => self.start(),
            Message::Resume => self.registry.for_each_mut(|info| info.timing.resync()),
            Message::Record {
                node,
                timestamp,
                data,
            } => {
                if let Err(e) = self.record(node, timestamp, &data) {
                    error!(node = %node, timestamp, error = %e, "dropping frame");
                }
            }
            Message::Property { node, name, value } => {
                if let Err(e) = self.property(node, &name, &value) {
                    error!(node = %node, property = %name, error = %e, "dropping property update");
                }
            }
            Message::Detach { node } => {
                if let Err(e) = self.detach(node) {
                    error!(node = %node, error = %e, "failed to finalize node");
                }
            }
            Message::Terminate => self.terminate(),
        }
    }

    // ── Record groups ──────────────────────────────────────────────

    fn initialize(&mut self, device_properties: &[(String, PropertyValue)]) -> WriteResult {
        let node = NodeId::DEVICE;
        let added = NodeAdded::new(self.device_name.clone(), NodeType::Device, CodecId::NULL);
        let mut staged = IndexMap::new();

        let mut tx = Transaction::begin(&mut self.file);
        tx.write(&ContainerHeader::new().encode())?;
        let node_added_position = tx.write(self.assembler.node_added(node, &added)?)?;
        write_properties(
            &mut tx,
            &mut self.assembler,
            node,
            device_properties,
            &mut staged,
        )?;
        tx.commit();

        self.header_written = true;
        self.apply_announcement(node, node_added_position, staged, false);
        self.state
            .transition(RecorderState::Initializing, RecorderState::Recording);
        info!(device = %self.device_name, "recording initialized");
        Ok(())
    }

    fn attach(&mut self, request: AttachRequest) -> WriteResult {
        let AttachRequest {
            node,
            node_type,
            name,
            codec,
            properties,
        } = request;
        let added = NodeAdded::new(name, node_type, codec.codec_id());
        let begin = self.started;
        let mut staged = IndexMap::new();

        let mut tx = Transaction::begin(&mut self.file);
        let node_added_position = tx.write(self.assembler.node_added(node, &added)?)?;
        write_properties(&mut tx, &mut self.assembler, node, &properties, &mut staged)?;
        if begin {
            tx.write(self.assembler.node_state_ready(node)?)?;
            tx.write(self.assembler.node_data_begin(node, 0, 0)?)?;
        }
        tx.commit();

        self.apply_announcement(node, node_added_position, staged, begin);
        self.codecs.insert(node, codec);
        debug!(
            node = %node,
            name = %added.name,
            codec = %added.codec,
            position = node_added_position,
            "node announced"
        );
        Ok(())
    }

    fn apply_announcement(
        &mut self,
        node: NodeId,
        node_added_position: u64,
        staged: IndexMap<String, u64>,
        data_begun: bool,
    ) {
        // The node-added record plus its property burst.
        let changes = staged.len() as u32 + 1;
        self.registry.with_mut(node, |info| {
            info.node_added_position = node_added_position;
            info.property_positions = staged;
            info.data_begun = data_begun;
        });
        self.configuration_id = self.configuration_id.wrapping_add(changes);
        self.max_node_id = self.max_node_id.max(node.0);
    }

    fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;

        let mut tx = Transaction::begin(&mut self.file);
        for node in self.registry.node_ids() {
            let pending = self
                .registry
                .with(node, |info| (!info.data_begun).then_some(info.node_type))
                .flatten();
            let Some(node_type) = pending else {
                continue;
            };
            let written = begin_data(&mut tx, &mut self.assembler, node, node_type);
            match written {
                Ok(()) => {
                    tx.reuse();
                    self.registry.with_mut(node, |info| info.data_begun = true);
                }
                Err(e) => {
                    warn!(node = %node, error = %e, "failed to begin node data, rolling back");
                    if let Err(e) = tx.rollback() {
                        error!(node = %node, error = %e, "rollback failed");
                    }
                }
            }
        }
        tx.commit();
        info!("recording started");
    }

    fn record(&mut self, node: NodeId, timestamp: u64, data: &[u8]) -> WriteResult {
        let frame = self
            .registry
            .with(node, |info| {
                info.data_begun.then(|| {
                    (
                        info.last_new_data_position,
                        info.timing.next(timestamp),
                        info.next_frame_id(),
                    )
                })
            })
            .flatten();
        let Some((undo, output_timestamp, frame_id)) = frame else {
            debug!(node = %node, "node not recording, dropping frame");
            return Ok(());
        };
        let Some(codec) = self.codecs.get_mut(&node) else {
            return Err(RecorderError::UnknownStream(node));
        };
        codec.compress(data, &mut self.scratch)?;

        let mut tx = Transaction::begin(&mut self.file);
        let position = tx.write(self.assembler.new_data(
            node,
            output_timestamp,
            frame_id,
            &self.scratch,
            undo,
        )?)?;
        tx.commit();

        let configuration_id = self.configuration_id;
        self.registry.with_mut(node, |info| {
            info.frame_written(timestamp, output_timestamp, position, configuration_id)
        });
        self.max_timestamp = self.max_timestamp.max(output_timestamp);
        trace!(node = %node, frame_id, timestamp = output_timestamp, position, "frame written");
        Ok(())
    }

    fn property(&mut self, node: NodeId, name: &str, value: &PropertyValue) -> WriteResult {
        let Some(undo) = self.registry.with(node, |info| {
            info.property_positions.get(name).copied().unwrap_or(0)
        }) else {
            return Err(RecorderError::UnknownStream(node));
        };

        let mut tx = Transaction::begin(&mut self.file);
        let position = tx.write(self.assembler.property(node, name, value, undo)?)?;
        tx.commit();

        self.registry.with_mut(node, |info| {
            info.property_positions.insert(name.to_owned(), position);
        });
        self.configuration_id = self.configuration_id.wrapping_add(1);
        debug!(node = %node, property = name, position, undo, "property written");
        Ok(())
    }

    /// Remove a node: node-removed, then for streams the seek table and
    /// the in-place rewrite of node-added with the final frame count.
    fn detach(&mut self, node: NodeId) -> WriteResult {
        let Some(info) = self.registry.remove(node) else {
            return Ok(());
        };
        self.codecs.remove(&node);

        let mut tx = Transaction::begin(&mut self.file);
        tx.write(
            self.assembler
                .node_removed(node, info.node_added_position)?,
        )?;
        tx.reuse();
        // Node-removed stays even if the rest of the group rolls back.
        self.configuration_id = self.configuration_id.wrapping_add(1);
        if !info.node_type.is_stream() {
            tx.commit();
            return Ok(());
        }

        let seek_table_position = match self.assembler.seek_table(node, &info.seek_table) {
            Ok(bytes) => tx.write(bytes)?,
            Err(e) => {
                warn!(node = %node, error = %e, "seek table not written");
                0
            }
        };
        let added = info.final_node_added(seek_table_position);
        tx.rewrite_at(
            info.node_added_position,
            self.assembler.node_added(node, &added)?,
        )?;
        tx.commit();
        debug!(
            node = %node,
            frames = added.frame_count,
            seek_table_position,
            "node removed"
        );
        Ok(())
    }

    /// Finalize the container. Each step runs even if an earlier one
    /// failed.
    fn terminate(&mut self) {
        if !self.header_written {
            if let Err(e) = self.file.flush() {
                error!(error = %e, "flush failed");
            }
            return;
        }
        let mut nodes = self.registry.node_ids();
        // Streams first, in attach order, then the device.
        nodes.sort_by_key(|node| *node == NodeId::DEVICE);
        for node in nodes {
            if let Err(e) = self.detach(node) {
                error!(node = %node, error = %e, "failed to finalize node");
            }
        }

        if let Err(e) = self.write_end() {
            error!(error = %e, "failed to write end record");
        }
        let header = ContainerHeader {
            max_timestamp: self.max_timestamp,
            max_node_id: self.max_node_id,
            ..ContainerHeader::new()
        };
        if let Err(e) = self.file.rewrite_at(0, &header.encode()) {
            error!(error = %e, "failed to patch container header");
        }
        if let Err(e) = self.file.truncate_here() {
            error!(error = %e, "failed to truncate container");
        }
        if let Err(e) = self.file.flush() {
            error!(error = %e, "flush failed");
        }
    }

    fn write_end(&mut self) -> WriteResult {
        let mut tx = Transaction::begin(&mut self.file);
        tx.write(self.assembler.end()?)?;
        tx.commit();
        Ok(())
    }
}

/// Append one property record per value, chaining each to the last
/// record of the same name in `positions` and recording the new offset
/// there.
fn write_properties(
    tx: &mut Transaction<'_>,
    assembler: &mut RecordAssembler,
    node: NodeId,
    properties: &[(String, PropertyValue)],
    positions: &mut IndexMap<String, u64>,
) -> WriteResult {
    for (name, value) in properties {
        let undo = positions.get(name).copied().unwrap_or(0);
        let position = tx.write(assembler.property(node, name, value, undo)?)?;
        positions.insert(name.clone(), position);
    }
    Ok(())
}

/// Node-state-ready, plus node-data-begin for frame-producing nodes.
fn begin_data(
    tx: &mut Transaction<'_>,
    assembler: &mut RecordAssembler,
    node: NodeId,
    node_type: NodeType,
) -> WriteResult {
    tx.write(assembler.node_state_ready(node)?)?;
    if node_type.is_stream() {
        tx.write(assembler.node_data_begin(node, 0, 0)?)?;
    }
    Ok(())
}
