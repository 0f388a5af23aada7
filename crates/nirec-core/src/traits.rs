//! Collaborator traits consumed by the recorder and the player.
//!
//! None of these are implemented by the engines themselves: codecs,
//! storage backends, notification sinks and live streams belong to the
//! surrounding SDK. The built-in [`UncompressedCodec`](crate::UncompressedCodec)
//! and [`DefaultCodecFactory`](crate::DefaultCodecFactory) exist so the
//! engines work out of the box.

use std::io;

use crate::error::CodecError;
use crate::id::{CodecId, NodeId, NodeType};
use crate::property::{PropertyId, PropertyValue};

/// Per-stream frame codec.
///
/// A codec instance is owned by exactly one thread (the recorder's
/// writer thread or the player's read thread) and may keep state
/// between frames.
pub trait FrameCodec: Send {
    /// The compression format this codec produces and consumes.
    fn codec_id(&self) -> CodecId;

    /// Worst-case number of bytes compression may add on top of
    /// `raw_len` input bytes.
    fn overhead_size(&self, raw_len: usize) -> usize;

    /// Compress `src`, replacing the contents of `dst`.
    fn compress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<(), CodecError>;

    /// Decompress `src`, replacing the contents of `dst`.
    fn decompress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<(), CodecError>;
}

/// Creates codec instances by id.
pub trait CodecFactory: Send + Sync {
    /// Instantiate a codec, or `None` if this factory does not provide it.
    fn create(&self, codec: CodecId) -> Option<Box<dyn FrameCodec>>;
}

/// Reference point for [`InputStream`] seeks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekOrigin {
    /// Offset from the start of the stream.
    Start,
    /// Offset from the current position.
    Current,
    /// Offset from the end of the stream.
    End,
}

/// Storage-agnostic byte source the player reads containers from.
///
/// The 32-bit `seek`/`tell` variants exist for backends that only
/// address 4 GiB; they are provided in terms of the 64-bit ones.
pub trait InputStream: Send {
    /// Prepare the stream for reading.
    fn open(&mut self) -> io::Result<()>;

    /// Read up to `buf.len()` bytes; `Ok(0)` means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Move the read position.
    fn seek64(&mut self, origin: SeekOrigin, offset: i64) -> io::Result<()>;

    /// Current read position.
    fn tell64(&mut self) -> io::Result<u64>;

    /// Release the underlying resource.
    fn close(&mut self) -> io::Result<()>;

    /// 32-bit variant of [`seek64`](Self::seek64).
    fn seek(&mut self, origin: SeekOrigin, offset: i32) -> io::Result<()> {
        self.seek64(origin, i64::from(offset))
    }

    /// 32-bit variant of [`tell64`](Self::tell64).
    ///
    /// Fails if the position does not fit in a `u32`.
    fn tell(&mut self) -> io::Result<u32> {
        let pos = self.tell64()?;
        u32::try_from(pos).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("stream position {pos} exceeds 32 bits"),
            )
        })
    }
}

/// Byte sink the recorder writes containers to.
///
/// Writes are sequential except for the in-place patches the recorder
/// makes to the container header and to node-added records.
pub trait RecordSink: Send {
    /// Write all of `bytes` at the current position.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Move the write position to `position` bytes from the start.
    fn seek_to(&mut self, position: u64) -> io::Result<()>;

    /// Current write position.
    fn position(&mut self) -> io::Result<u64>;

    /// Cut the sink to exactly `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Push buffered bytes to the underlying storage.
    fn flush(&mut self) -> io::Result<()>;
}

/// Sink for the events the player reconstructs from a container.
///
/// Called from the player's thread. Implementations must not call back
/// into the player.
pub trait NodeNotifications: Send + Sync {
    /// A node was announced.
    fn on_node_added(
        &self,
        node: NodeId,
        name: &str,
        node_type: NodeType,
        codec: CodecId,
        frame_count: u32,
    );

    /// A node was removed.
    fn on_node_removed(&self, node: NodeId);

    /// An integer property has a new current value.
    fn on_int_property_changed(&self, node: NodeId, name: &str, value: u64);

    /// A real property has a new current value.
    fn on_real_property_changed(&self, node: NodeId, name: &str, value: f64);

    /// A string property has a new current value.
    fn on_string_property_changed(&self, node: NodeId, name: &str, value: &str);

    /// An opaque property has a new current value.
    fn on_general_property_changed(&self, node: NodeId, name: &str, data: &[u8]);

    /// All of a node's initial properties have been announced.
    fn on_node_state_ready(&self, node: NodeId);

    /// A decoded frame is due.
    fn on_new_data(&self, node: NodeId, timestamp: u64, frame_id: u32, data: &[u8]);
}

/// A live stream (or the device) as seen by the recorder.
pub trait RecordableStream {
    /// Kind of node this stream records as.
    fn node_type(&self) -> NodeType;

    /// Node name stored in the node-added record.
    fn name(&self) -> String;

    /// Snapshot of every current property value, announced when the
    /// stream is attached.
    fn properties(&self) -> Vec<(PropertyId, PropertyValue)>;
}
