//! Graph events
//!
//! Every Graph Store mutation emits events, strictly in the order the
//! mutations were dispatched. Listeners (a renderer, a form, a test) see an
//! edge and its implied field binding in the same event.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::connection::{FieldBinding, RefusalReason};
use crate::types::{EdgeId, NodeId, Position};

/// Trait for receiving graph events
///
/// Abstracts over the consumer (renderer bridge, channel, test collector).
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be delivered (e.g., channel closed)
    fn send(&self, event: GraphEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted by the Graph Store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GraphEvent {
    /// A node was added
    #[serde(rename_all = "camelCase")]
    NodeAdded { node_id: NodeId },

    /// A node and its edges were removed
    #[serde(rename_all = "camelCase")]
    NodeRemoved {
        node_id: NodeId,
        removed_edges: Vec<EdgeId>,
    },

    /// A node was moved (position after clamping)
    #[serde(rename_all = "camelCase")]
    NodeMoved { node_id: NodeId, position: Position },

    /// An edge was created, together with the field it bound
    #[serde(rename_all = "camelCase")]
    EdgeAdded {
        edge_id: EdgeId,
        source: NodeId,
        target: NodeId,
        binding: Option<FieldBinding>,
    },

    /// An edge was removed, with the fields it unbound
    #[serde(rename_all = "camelCase")]
    EdgeRemoved {
        edge_id: EdgeId,
        cleared_fields: Vec<String>,
    },

    /// A connection attempt was refused
    #[serde(rename_all = "camelCase")]
    ConnectionRefused {
        source: NodeId,
        target: NodeId,
        reason: RefusalReason,
    },

    /// Form data of a node changed
    #[serde(rename_all = "camelCase")]
    FormDataCommitted { node_id: NodeId, fields: Vec<String> },

    /// The availability map was recomputed
    #[serde(rename_all = "camelCase")]
    AvailabilityRecomputed { kinds: usize, references: usize },

    /// The whole graph was replaced (load, undo, redo)
    GraphReplaced,

    /// The selected node changed
    #[serde(rename_all = "camelCase")]
    SelectionChanged { node_id: Option<NodeId> },
}

impl GraphEvent {
    /// Short name of the change, used for undo history entries
    pub fn label(&self) -> &'static str {
        match self {
            Self::NodeAdded { .. } => "Add node",
            Self::NodeRemoved { .. } => "Remove node",
            Self::NodeMoved { .. } => "Move node",
            Self::EdgeAdded { .. } => "Connect",
            Self::EdgeRemoved { .. } => "Disconnect",
            Self::ConnectionRefused { .. } => "Refused connection",
            Self::FormDataCommitted { .. } => "Edit form",
            Self::AvailabilityRecomputed { .. } => "Recompute",
            Self::GraphReplaced => "Replace graph",
            Self::SelectionChanged { .. } => "Select",
        }
    }
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: GraphEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted in order.
pub struct VecEventSink {
    events: Mutex<Vec<GraphEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<GraphEvent> {
        self.events.lock().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: GraphEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_event_sink() {
        let sink = VecEventSink::new();

        sink.send(GraphEvent::NodeAdded {
            node_id: "n1".to_string(),
        })
        .unwrap();
        sink.send(GraphEvent::GraphReplaced).unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 2);
        match &events[0] {
            GraphEvent::NodeAdded { node_id } => assert_eq!(node_id, "n1"),
            _ => panic!("Expected NodeAdded event"),
        }

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_event_serialization() {
        let event = GraphEvent::FormDataCommitted {
            node_id: "n1".to_string(),
            fields: vec!["name".to_string()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "formDataCommitted");
        assert_eq!(json["nodeId"], "n1");
    }
}
