//! [`FileRecorder`]: the producer-facing API.
//!
//! Every call validates its arguments, copies what it needs into an
//! owned message and returns; the writer thread does all encoding and
//! I/O. Calls take `&self` so producers on several threads can share
//! one recorder.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use nirec_core::{
    CodecFactory, CodecId, DefaultCodecFactory, FrameCodec, NodeId, NodeType, PropertyId,
    PropertyValue, RecordSink, RecordableStream, UncompressedCodec,
};
use nirec_format::{NEW_DATA_FIELDS_SIZE, PROPERTY_FIELDS_SIZE};
use tracing::{debug, error, trace};

use crate::config::RecorderConfig;
use crate::error::RecorderError;
use crate::message::{queue, AttachRequest, Message, MessageSender};
use crate::registry::{AttachedStreamInfo, StreamRegistry};
use crate::sink::{FileSink, RecordFile};
use crate::state::{RecorderState, StateCell};
use crate::writer::WriterThread;

/// Handle to an attached node, returned by
/// [`attach`](FileRecorder::attach) and [`device`](FileRecorder::device).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    node: NodeId,
}

impl StreamHandle {
    /// Node id the stream is recorded under.
    pub fn node(self) -> NodeId {
        self.node
    }
}

/// Records live streams into a container.
///
/// # Lifecycle
///
/// [`initialize`](Self::initialize) opens the container and starts the
/// writer thread. Streams are [`attach`](Self::attach)ed, then
/// [`start`](Self::start) begins frame data. [`close`](Self::close)
/// finalizes the container and joins the writer; dropping the recorder
/// closes it too.
pub struct FileRecorder {
    config: RecorderConfig,
    codec_factory: Arc<dyn CodecFactory>,
    device_properties: Vec<(String, PropertyValue)>,
    state: Arc<StateCell>,
    registry: Arc<StreamRegistry>,
    next_node: AtomicU32,
    started: AtomicBool,
    paused: AtomicBool,
    tx: Option<MessageSender>,
    writer: Option<JoinHandle<()>>,
}

impl FileRecorder {
    /// Create a recorder using the built-in codecs.
    pub fn new(config: RecorderConfig) -> Result<Self, RecorderError> {
        Self::with_codec_factory(config, Arc::new(DefaultCodecFactory))
    }

    /// Create a recorder that takes frame codecs from `codec_factory`.
    pub fn with_codec_factory(
        config: RecorderConfig,
        codec_factory: Arc<dyn CodecFactory>,
    ) -> Result<Self, RecorderError> {
        config.validate()?;
        Ok(Self {
            config,
            codec_factory,
            device_properties: Vec::new(),
            state: Arc::new(StateCell::new(RecorderState::Uninitialized)),
            registry: Arc::new(StreamRegistry::new()),
            next_node: AtomicU32::new(NodeId::FIRST_STREAM.0),
            started: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            tx: None,
            writer: None,
        })
    }

    /// Record the device's name and current properties with the device
    /// node. Must be called before initialization.
    pub fn with_device(mut self, device: &dyn RecordableStream) -> Self {
        let name = device.name();
        if !name.is_empty() {
            self.config.device_name = name;
        }
        self.device_properties = snapshot(device);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RecorderState {
        self.state.get()
    }

    /// Create (or truncate) `path` and start recording into it.
    pub fn initialize(&mut self, path: impl AsRef<Path>) -> Result<(), RecorderError> {
        self.check_uninitialized()?;
        let sink = FileSink::create(path)?;
        self.initialize_with_sink(Box::new(sink))
    }

    /// Start recording into `sink`.
    pub fn initialize_with_sink(&mut self, sink: Box<dyn RecordSink>) -> Result<(), RecorderError> {
        self.check_uninitialized()?;
        let file = RecordFile::new(sink)?;

        self.registry.insert(AttachedStreamInfo::new(
            NodeId::DEVICE,
            NodeType::Device,
            self.config.device_name.clone(),
            CodecId::NULL,
        ));
        let (tx, rx) = queue();
        let writer = WriterThread::new(
            file,
            self.config.record_buffer_size(),
            self.config.device_name.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.state),
            rx,
        );

        self.state.set(RecorderState::Initializing);
        let handle = thread::Builder::new()
            .name("nirec-writer".into())
            .spawn(move || writer.run())
            .map_err(|e| {
                self.state.set(RecorderState::Uninitialized);
                self.registry.remove(NodeId::DEVICE);
                RecorderError::ThreadSpawnFailed {
                    reason: e.to_string(),
                }
            })?;
        self.writer = Some(handle);

        let initialize = Message::Initialize {
            device_properties: self.device_properties.clone(),
        };
        tx.send(initialize).map_err(|_| RecorderError::ShutDown)?;
        self.tx = Some(tx);
        debug!(
            buffer_size = self.config.record_buffer_size(),
            "writer thread spawned"
        );
        Ok(())
    }

    /// Handle of the device node, for device property updates.
    pub fn device(&self) -> StreamHandle {
        StreamHandle {
            node: NodeId::DEVICE,
        }
    }

    /// Announce `stream` as a new node.
    ///
    /// The stream's current properties are recorded with the node. With
    /// `allow_lossy`, colour streams are recorded with a lossy codec
    /// when the codec factory provides one.
    pub fn attach(
        &self,
        stream: &dyn RecordableStream,
        allow_lossy: bool,
    ) -> Result<StreamHandle, RecorderError> {
        self.check_accepting("attach")?;
        let node_type = stream.node_type();
        if !node_type.is_stream() {
            return Err(RecorderError::NotAStream(NodeId::DEVICE));
        }
        let node = NodeId(self.next_node.fetch_add(1, Ordering::Relaxed));
        let name = stream.name();
        let codec = self.choose_codec(node_type, allow_lossy);

        let mut info = AttachedStreamInfo::new(node, node_type, name.clone(), codec.codec_id());
        info.max_frame_size = self.max_frame_size(codec.as_ref());
        self.registry.insert(info);
        let request = AttachRequest {
            node,
            node_type,
            name,
            codec,
            properties: snapshot(stream),
        };
        if let Err(e) = self.send(Message::Attach(request)) {
            self.registry.remove(node);
            return Err(e);
        }
        Ok(StreamHandle { node })
    }

    fn choose_codec(&self, node_type: NodeType, allow_lossy: bool) -> Box<dyn FrameCodec> {
        let preferred = match node_type {
            NodeType::Depth => CodecId::DEPTH_16Z_EMB_TABLES,
            NodeType::Image if allow_lossy => CodecId::JPEG,
            _ => CodecId::UNCOMPRESSED,
        };
        self.codec_factory.create(preferred).unwrap_or_else(|| {
            debug!(codec = %preferred, "codec unavailable, recording uncompressed");
            Box::new(UncompressedCodec)
        })
    }

    /// Largest raw frame `codec` can turn into a record that fits the
    /// buffer. Overhead is taken at the full record size, so smaller
    /// frames never need more.
    fn max_frame_size(&self, codec: &dyn FrameCodec) -> usize {
        let room = self
            .config
            .record_buffer_size()
            .saturating_sub(NEW_DATA_FIELDS_SIZE);
        room.saturating_sub(codec.overhead_size(room))
    }

    /// Begin frame data for every attached stream. Idempotent.
    pub fn start(&self) -> Result<(), RecorderError> {
        self.check_accepting("start")?;
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.send(Message::Start)
    }

    /// Drop submitted frames until [`resume`](Self::resume).
    pub fn pause(&self) -> Result<(), RecorderError> {
        self.check_accepting("pause")?;
        self.paused.store(true, Ordering::Release);
        Ok(())
    }

    /// Accept frames again. The paused interval does not appear in the
    /// recorded timestamps.
    pub fn resume(&self) -> Result<(), RecorderError> {
        self.check_accepting("resume")?;
        if self.paused.swap(false, Ordering::AcqRel) {
            self.send(Message::Resume)?;
        }
        Ok(())
    }

    /// Whether frames are currently being dropped.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Submit one raw frame captured at `timestamp`.
    pub fn record(
        &self,
        handle: StreamHandle,
        timestamp: u64,
        frame: &[u8],
    ) -> Result<(), RecorderError> {
        self.check_accepting("record")?;
        if frame.is_empty() {
            return Err(RecorderError::EmptyFrame);
        }
        let limit = self.check_stream(handle)?;
        if frame.len() > limit {
            return Err(RecorderError::TooLarge {
                node: handle.node,
                size: frame.len(),
                limit,
            });
        }
        if !self.started.load(Ordering::Acquire) {
            return Err(RecorderError::NotStarted);
        }
        if self.paused.load(Ordering::Acquire) {
            trace!(node = %handle.node, timestamp, "paused, dropping frame");
            return Ok(());
        }
        self.send(Message::Record {
            node: handle.node,
            timestamp,
            data: frame.to_vec(),
        })
    }

    /// Submit a new value for an opaque property.
    pub fn record_property(
        &self,
        handle: StreamHandle,
        id: PropertyId,
        data: &[u8],
    ) -> Result<(), RecorderError> {
        self.record_property_value(handle, id, PropertyValue::General(data.to_vec()))
    }

    /// Submit a new value for a property of any kind.
    pub fn record_property_value(
        &self,
        handle: StreamHandle,
        id: PropertyId,
        value: PropertyValue,
    ) -> Result<(), RecorderError> {
        self.check_accepting("record property")?;
        if value.payload_len() == 0 {
            return Err(RecorderError::EmptyProperty);
        }
        let attached = self.registry.with(handle.node, |info| !info.detached);
        if attached != Some(true) {
            return Err(RecorderError::UnknownStream(handle.node));
        }
        let limit = self
            .config
            .record_buffer_size()
            .saturating_sub(PROPERTY_FIELDS_SIZE);
        if value.payload_len() > limit {
            return Err(RecorderError::TooLarge {
                node: handle.node,
                size: value.payload_len(),
                limit,
            });
        }
        self.send(Message::Property {
            node: handle.node,
            name: id.record_name().into_owned(),
            value,
        })
    }

    /// Remove a stream. Frames submitted before this call are still
    /// written.
    pub fn detach(&self, handle: StreamHandle) -> Result<(), RecorderError> {
        self.check_accepting("detach")?;
        if handle.node == NodeId::DEVICE {
            return Err(RecorderError::NotAStream(handle.node));
        }
        let was_detached = self
            .registry
            .with_mut(handle.node, |info| std::mem::replace(&mut info.detached, true));
        if was_detached != Some(false) {
            return Err(RecorderError::UnknownStream(handle.node));
        }
        self.send(Message::Detach { node: handle.node })
    }

    /// Finalize the container and wait for the writer thread.
    ///
    /// Every message submitted before this call is written first.
    /// Calling `close` again is a no-op.
    pub fn close(&mut self) -> Result<(), RecorderError> {
        let Some(handle) = self.writer.take() else {
            return Ok(());
        };
        self.state.set(RecorderState::Terminating);
        if let Some(tx) = self.tx.take() {
            // A gone receiver still finalizes once the senders drop.
            let _ = tx.send(Message::Terminate);
        }
        let joined = handle.join();
        self.state.set(RecorderState::Closed);
        joined.map_err(|_| RecorderError::WriterPanicked)
    }

    // ── Checks ─────────────────────────────────────────────────────

    fn check_uninitialized(&self) -> Result<(), RecorderError> {
        match self.state.get() {
            RecorderState::Uninitialized => Ok(()),
            state => Err(RecorderError::InvalidState {
                operation: "initialize",
                state,
            }),
        }
    }

    fn check_accepting(&self, operation: &'static str) -> Result<(), RecorderError> {
        let state = self.state.get();
        if state.accepts_messages() {
            Ok(())
        } else {
            Err(RecorderError::InvalidState { operation, state })
        }
    }

    /// Frame size limit of an attached, frame-producing stream.
    fn check_stream(&self, handle: StreamHandle) -> Result<usize, RecorderError> {
        if handle.node == NodeId::DEVICE {
            return Err(RecorderError::NotAStream(handle.node));
        }
        self.registry
            .with(handle.node, |info| (!info.detached).then_some(info.max_frame_size))
            .flatten()
            .ok_or(RecorderError::UnknownStream(handle.node))
    }

    fn send(&self, message: Message) -> Result<(), RecorderError> {
        let tx = self.tx.as_ref().ok_or(RecorderError::ShutDown)?;
        tx.send(message).map_err(|_| RecorderError::ShutDown)
    }
}

impl Drop for FileRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(error = %e, "recorder close failed during drop");
        }
    }
}

fn snapshot(stream: &dyn RecordableStream) -> Vec<(String, PropertyValue)> {
    stream
        .properties()
        .into_iter()
        .map(|(id, value)| (id.record_name().into_owned(), value))
        .collect()
}
