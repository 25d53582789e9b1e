//! Node-update bus
//!
//! A message channel scoped to one Graph Store. Async work that resolves
//! after the graph was rendered (fetched model lists, for example) publishes
//! a form-data patch for a node through a cloneable [`BusHandle`]. The store
//! applies queued patches on its own mutation path when it drains the bus,
//! then notifies subscribers.
//!
//! Each store owns its own bus, so several editors in one process never see
//! each other's updates.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::types::{FormData, NodeId};

/// A patch merged into one node's form data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    pub node_id: NodeId,
    pub patch: FormData,
}

/// Identifier returned by [`NodeUpdateBus::subscribe`]
pub type SubscriptionId = u64;

type Handler = Box<dyn FnMut(&NodeUpdate) + Send>;

/// Cloneable publishing side of the bus
#[derive(Debug, Clone)]
pub struct BusHandle {
    sender: UnboundedSender<NodeUpdate>,
}

impl BusHandle {
    /// Queue a patch for a node
    ///
    /// Returns false if the owning store has been dropped.
    pub fn publish(&self, node_id: impl Into<NodeId>, patch: FormData) -> bool {
        self.sender
            .send(NodeUpdate {
                node_id: node_id.into(),
                patch,
            })
            .is_ok()
    }
}

/// Receiving side of the bus plus its subscribers
pub struct NodeUpdateBus {
    sender: UnboundedSender<NodeUpdate>,
    receiver: UnboundedReceiver<NodeUpdate>,
    subscribers: Vec<(SubscriptionId, Handler)>,
    next_id: SubscriptionId,
}

impl NodeUpdateBus {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver,
            subscribers: Vec::new(),
            next_id: 1,
        }
    }

    /// A handle async tasks can publish through
    pub fn handle(&self) -> BusHandle {
        BusHandle {
            sender: self.sender.clone(),
        }
    }

    /// Publish directly from the owning side
    pub fn publish(&self, node_id: impl Into<NodeId>, patch: FormData) {
        // The receiver lives in `self`, so the send cannot fail.
        let _ = self.sender.send(NodeUpdate {
            node_id: node_id.into(),
            patch,
        });
    }

    /// Register a listener called for every applied update
    pub fn subscribe(
        &mut self,
        handler: impl FnMut(&NodeUpdate) + Send + 'static,
    ) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.push((id, Box::new(handler)));
        id
    }

    /// Remove a listener; returns false if it was not registered
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Take every queued update, in publish order
    pub(crate) fn take_pending(&mut self) -> Vec<NodeUpdate> {
        let mut pending = Vec::new();
        while let Ok(update) = self.receiver.try_recv() {
            pending.push(update);
        }
        pending
    }

    /// Notify subscribers of an applied update
    pub(crate) fn notify(&mut self, update: &NodeUpdate) {
        for (_, handler) in self.subscribers.iter_mut() {
            handler(update);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for NodeUpdateBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NodeUpdateBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeUpdateBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn patch(key: &str, value: serde_json::Value) -> FormData {
        let mut map = FormData::new();
        map.insert(key.to_string(), value);
        map
    }

    #[test]
    fn test_pending_updates_keep_publish_order() {
        let mut bus = NodeUpdateBus::new();
        let handle = bus.handle();
        assert!(handle.publish("a", patch("x", json!(1))));
        bus.publish("b", patch("x", json!(2)));

        let pending = bus.take_pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].node_id, "a");
        assert_eq!(pending[1].node_id, "b");
        assert!(bus.take_pending().is_empty());
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let mut bus = NodeUpdateBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let id = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let update = NodeUpdate {
            node_id: "a".to_string(),
            patch: FormData::new(),
        };
        bus.notify(&update);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.notify(&update);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handle_after_bus_dropped() {
        let bus = NodeUpdateBus::new();
        let handle = bus.handle();
        drop(bus);
        assert!(!handle.publish("a", FormData::new()));
    }

    #[test]
    fn test_separate_buses_are_isolated() {
        let mut first = NodeUpdateBus::new();
        let mut second = NodeUpdateBus::new();
        first.handle().publish("a", FormData::new());
        assert_eq!(first.take_pending().len(), 1);
        assert!(second.take_pending().is_empty());
    }
}
