//! Messages from the API to the writer thread, and the three-level
//! priority queue that carries them.
//!
//! Each level is an unbounded crossbeam channel. The receiver drains
//! the highest non-empty level first and preserves FIFO order within a
//! level. Producers never block.

use crossbeam_channel::{unbounded, Receiver, Select, Sender, TryRecvError};
use nirec_core::{FrameCodec, NodeId, NodeType, PropertyValue};

/// Queue level of a [`Message`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Priority {
    /// Node announcements.
    High,
    /// Frames, property updates and lifecycle steps.
    Normal,
    /// Container finalization, after everything else.
    Low,
}

/// A node announcement.
pub struct AttachRequest {
    pub node: NodeId,
    pub node_type: NodeType,
    pub name: String,
    pub codec: Box<dyn FrameCodec>,
    /// Owned snapshot of the stream's properties at attach time.
    pub properties: Vec<(String, PropertyValue)>,
}

/// Work item for the writer thread. Every payload is an owned copy.
pub enum Message {
    /// Write the container header and the device node.
    Initialize {
        device_properties: Vec<(String, PropertyValue)>,
    },
    Attach(AttachRequest),
    Start,
    /// Collapse the pause gap on every stream.
    Resume,
    Record {
        node: NodeId,
        timestamp: u64,
        data: Vec<u8>,
    },
    Property {
        node: NodeId,
        name: String,
        value: PropertyValue,
    },
    Detach {
        node: NodeId,
    },
    Terminate,
}

impl Message {
    pub fn priority(&self) -> Priority {
        match self {
            Self::Initialize { .. } | Self::Attach(_) => Priority::High,
            Self::Terminate => Priority::Low,
            _ => Priority::Normal,
        }
    }

    /// Short name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "initialize",
            Self::Attach(_) => "attach",
            Self::Start => "start",
            Self::Resume => "resume",
            Self::Record { .. } => "record",
            Self::Property { .. } => "property",
            Self::Detach { .. } => "detach",
            Self::Terminate => "terminate",
        }
    }
}

/// Create a connected sender/receiver pair.
pub fn queue() -> (MessageSender, MessageReceiver) {
    let (high_tx, high_rx) = unbounded();
    let (normal_tx, normal_rx) = unbounded();
    let (low_tx, low_rx) = unbounded();
    (
        MessageSender {
            high: high_tx,
            normal: normal_tx,
            low: low_tx,
        },
        MessageReceiver {
            high: high_rx,
            normal: normal_rx,
            low: low_rx,
        },
    )
}

/// Producer half of the queue.
#[derive(Clone)]
pub struct MessageSender {
    high: Sender<Message>,
    normal: Sender<Message>,
    low: Sender<Message>,
}

impl MessageSender {
    /// Enqueue `message` at its priority. Fails only if the receiver is
    /// gone, handing the message back.
    pub fn send(&self, message: Message) -> Result<(), Message> {
        let tx = match message.priority() {
            Priority::High => &self.high,
            Priority::Normal => &self.normal,
            Priority::Low => &self.low,
        };
        tx.send(message).map_err(|e| e.into_inner())
    }
}

/// Consumer half of the queue.
pub struct MessageReceiver {
    high: Receiver<Message>,
    normal: Receiver<Message>,
    low: Receiver<Message>,
}

impl MessageReceiver {
    fn levels(&self) -> [&Receiver<Message>; 3] {
        [&self.high, &self.normal, &self.low]
    }

    /// Oldest message of the highest non-empty level, without blocking.
    ///
    /// `Err(Disconnected)` once every sender is gone and all levels are
    /// drained.
    pub fn try_recv(&self) -> Result<Message, TryRecvError> {
        let mut disconnected = 0;
        for rx in self.levels() {
            match rx.try_recv() {
                Ok(message) => return Ok(message),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => disconnected += 1,
            }
        }
        if disconnected == 3 {
            Err(TryRecvError::Disconnected)
        } else {
            Err(TryRecvError::Empty)
        }
    }

    /// Block until a message is available. `None` once every sender is
    /// gone and all levels are drained.
    pub fn recv(&self) -> Option<Message> {
        loop {
            match self.try_recv() {
                Ok(message) => return Some(message),
                Err(TryRecvError::Disconnected) => return None,
                Err(TryRecvError::Empty) => {}
            }
            let mut select = Select::new();
            for rx in self.levels() {
                select.recv(rx);
            }
            // Readiness only; the next try_recv re-applies priority.
            select.ready();
        }
    }
}
