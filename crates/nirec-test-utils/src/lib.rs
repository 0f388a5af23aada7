//! Test utilities and mock types for nirec development.
//!
//! Provides mock implementations of the collaborator traits
//! ([`RecordableStream`], [`NodeNotifications`], [`RecordSink`],
//! [`InputStream`]) plus fixtures for hand-assembling containers.
//!
//! [`RecordSink`]: nirec_core::RecordSink
//! [`InputStream`]: nirec_core::InputStream

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod buffer;
pub mod fixtures;

pub use buffer::{FailingSink, SharedBuffer};
pub use fixtures::{depth_frame, ContainerBuilder};

use std::sync::{Mutex, MutexGuard};

use nirec_core::{
    CodecId, NodeId, NodeNotifications, NodeType, PropertyId, PropertyValue, RecordableStream,
};

// ── MockStream ──────────────────────────────────────────────────

/// A [`RecordableStream`] with a fixed name, type and property set.
#[derive(Clone, Debug)]
pub struct MockStream {
    pub name: String,
    pub node_type: NodeType,
    pub properties: Vec<(PropertyId, PropertyValue)>,
}

impl MockStream {
    pub fn new(name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            name: name.into(),
            node_type,
            properties: Vec::new(),
        }
    }

    /// A depth stream with no properties.
    pub fn depth() -> Self {
        Self::new("Depth", NodeType::Depth)
    }

    /// A colour stream with no properties.
    pub fn image() -> Self {
        Self::new("Image", NodeType::Image)
    }

    /// Add a property to the attach-time snapshot.
    pub fn with_property(mut self, id: PropertyId, value: PropertyValue) -> Self {
        self.properties.push((id, value));
        self
    }
}

impl RecordableStream for MockStream {
    fn node_type(&self) -> NodeType {
        self.node_type
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn properties(&self) -> Vec<(PropertyId, PropertyValue)> {
        self.properties.clone()
    }
}

// ── MockNotifications ───────────────────────────────────────────

/// One notification received by [`MockNotifications`].
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    NodeAdded {
        node: NodeId,
        name: String,
        node_type: NodeType,
        codec: CodecId,
        frame_count: u32,
    },
    NodeRemoved {
        node: NodeId,
    },
    Property {
        node: NodeId,
        name: String,
        value: PropertyValue,
    },
    StateReady {
        node: NodeId,
    },
    NewData {
        node: NodeId,
        timestamp: u64,
        frame_id: u32,
        data: Vec<u8>,
    },
}

/// Notification sink that stores every event in arrival order.
#[derive(Default)]
pub struct MockNotifications {
    events: Mutex<Vec<Event>>,
}

impl MockNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, event: Event) {
        self.lock().push(event);
    }

    /// Copy of every event so far.
    pub fn events(&self) -> Vec<Event> {
        self.lock().clone()
    }

    /// Remove and return every event so far.
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.lock())
    }

    /// Forget every event so far.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// `(node, timestamp, frame_id)` of every delivered frame.
    pub fn frames(&self) -> Vec<(NodeId, u64, u32)> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                Event::NewData {
                    node,
                    timestamp,
                    frame_id,
                    ..
                } => Some((*node, *timestamp, *frame_id)),
                _ => None,
            })
            .collect()
    }

    /// Every value announced for `(node, name)`, oldest first.
    pub fn property_values(&self, node: NodeId, name: &str) -> Vec<PropertyValue> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                Event::Property {
                    node: n,
                    name: p,
                    value,
                } if *n == node && p == name => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    /// The most recent value announced for `(node, name)`.
    pub fn last_property(&self, node: NodeId, name: &str) -> Option<PropertyValue> {
        self.property_values(node, name).pop()
    }
}

impl NodeNotifications for MockNotifications {
    fn on_node_added(
        &self,
        node: NodeId,
        name: &str,
        node_type: NodeType,
        codec: CodecId,
        frame_count: u32,
    ) {
        self.push(Event::NodeAdded {
            node,
            name: name.to_string(),
            node_type,
            codec,
            frame_count,
        });
    }

    fn on_node_removed(&self, node: NodeId) {
        self.push(Event::NodeRemoved { node });
    }

    fn on_int_property_changed(&self, node: NodeId, name: &str, value: u64) {
        self.push(Event::Property {
            node,
            name: name.to_string(),
            value: PropertyValue::Int(value),
        });
    }

    fn on_real_property_changed(&self, node: NodeId, name: &str, value: f64) {
        self.push(Event::Property {
            node,
            name: name.to_string(),
            value: PropertyValue::Real(value),
        });
    }

    fn on_string_property_changed(&self, node: NodeId, name: &str, value: &str) {
        self.push(Event::Property {
            node,
            name: name.to_string(),
            value: PropertyValue::String(value.to_string()),
        });
    }

    fn on_general_property_changed(&self, node: NodeId, name: &str, data: &[u8]) {
        self.push(Event::Property {
            node,
            name: name.to_string(),
            value: PropertyValue::General(data.to_vec()),
        });
    }

    fn on_node_state_ready(&self, node: NodeId) {
        self.push(Event::StateReady { node });
    }

    fn on_new_data(&self, node: NodeId, timestamp: u64, frame_id: u32, data: &[u8]) {
        self.push(Event::NewData {
            node,
            timestamp,
            frame_id,
            data: data.to_vec(),
        });
    }
}
