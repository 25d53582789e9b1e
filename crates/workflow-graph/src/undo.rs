//! Undo/redo history for the Graph Store
//!
//! Each committed mutation records a [`Snapshot`]: the nodes and edges plus
//! the field bindings their edges wrote. Snapshots are kept zstd-compressed
//! alongside a short label naming the change that produced them, so a host
//! can show "Undo Connect" without decompressing anything.
//!
//! Derived state (the availability map) is never stored; the store
//! recomputes it after restoring.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::connection::FieldBinding;
use crate::error::{GraphError, Result};
use crate::types::{EdgeId, GraphData};

const COMPRESSION_LEVEL: i32 = 3;

/// Restorable state of a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub graph: GraphData,
    /// The field each edge bound when it was connected
    #[serde(default)]
    pub bindings: BTreeMap<EdgeId, FieldBinding>,
}

struct Frame {
    label: &'static str,
    compressed: Vec<u8>,
}

impl Frame {
    fn encode(label: &'static str, snapshot: &Snapshot) -> Result<Self> {
        let json = serde_json::to_vec(snapshot)?;
        let compressed = zstd::encode_all(&json[..], COMPRESSION_LEVEL)
            .map_err(|e| GraphError::Compression(e.to_string()))?;
        Ok(Self { label, compressed })
    }

    fn decode(&self) -> Result<Snapshot> {
        let json = zstd::decode_all(&self.compressed[..])
            .map_err(|e| GraphError::Compression(e.to_string()))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

/// Linear history: reverted changes are discarded by the next commit
pub struct UndoStack {
    /// Older states, oldest first
    past: VecDeque<Frame>,
    /// The state the graph is in now
    present: Option<Frame>,
    /// Undone states, most recently undone last
    future: Vec<Frame>,
    /// Maximum number of states kept, `present` included
    limit: usize,
}

impl UndoStack {
    pub fn new(limit: usize) -> Self {
        Self {
            past: VecDeque::new(),
            present: None,
            future: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Record the state reached by the change named `label`
    pub fn record(&mut self, label: &'static str, snapshot: &Snapshot) -> Result<()> {
        let frame = Frame::encode(label, snapshot)?;
        if let Some(previous) = self.present.replace(frame) {
            self.past.push_back(previous);
        }
        self.future.clear();
        while self.past.len() + 1 > self.limit {
            self.past.pop_front();
        }
        Ok(())
    }

    /// Step back to the previous state
    ///
    /// Returns `None` at the oldest retained state.
    pub fn undo(&mut self) -> Option<Result<Snapshot>> {
        let previous = self.past.pop_back()?;
        let snapshot = previous.decode();
        if let Some(current) = self.present.replace(previous) {
            self.future.push(current);
        }
        Some(snapshot)
    }

    /// Re-apply the most recently undone change
    pub fn redo(&mut self) -> Option<Result<Snapshot>> {
        let next = self.future.pop()?;
        let snapshot = next.decode();
        if let Some(current) = self.present.replace(next) {
            self.past.push_back(current);
        }
        Some(snapshot)
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Name of the change [`UndoStack::undo`] would revert
    pub fn undo_label(&self) -> Option<&'static str> {
        if self.past.is_empty() {
            return None;
        }
        self.present.as_ref().map(|frame| frame.label)
    }

    /// Name of the change [`UndoStack::redo`] would re-apply
    pub fn redo_label(&self) -> Option<&'static str> {
        self.future.last().map(|frame| frame.label)
    }

    /// Number of retained states
    pub fn len(&self) -> usize {
        self.past.len() + self.future.len() + usize::from(self.present.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.present.is_none()
    }

    /// Forget all history; `snapshot` becomes the only state
    pub fn reset(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.past.clear();
        self.future.clear();
        self.present = None;
        self.record("Load", snapshot)
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(100)
    }
}

impl std::fmt::Debug for UndoStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoStack")
            .field("past", &self.past.len())
            .field("future", &self.future.len())
            .field("limit", &self.limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Edge;

    fn connected(target_field: &str) -> Snapshot {
        let edge_id = format!("edge-det-{}", target_field);
        let mut bindings = BTreeMap::new();
        bindings.insert(
            edge_id.clone(),
            FieldBinding {
                target_field: target_field.to_string(),
                reference_value: "$steps.det.predictions".to_string(),
            },
        );
        Snapshot {
            graph: GraphData {
                nodes: Vec::new(),
                edges: vec![Edge {
                    id: edge_id,
                    source: "det".to_string(),
                    target: "trk".to_string(),
                }],
            },
            bindings,
        }
    }

    fn empty() -> Snapshot {
        Snapshot {
            graph: GraphData::default(),
            bindings: BTreeMap::new(),
        }
    }

    #[test]
    fn test_bindings_survive_undo_and_redo() {
        let mut history = UndoStack::new(10);
        history.reset(&empty()).unwrap();
        history.record("Connect", &connected("detections")).unwrap();
        assert_eq!(history.undo_label(), Some("Connect"));

        let before = history.undo().unwrap().unwrap();
        assert!(before.bindings.is_empty());
        assert_eq!(history.undo_label(), None);
        assert_eq!(history.redo_label(), Some("Connect"));

        let after = history.redo().unwrap().unwrap();
        assert_eq!(
            after.bindings["edge-det-detections"].reference_value,
            "$steps.det.predictions"
        );
        assert!(history.redo().is_none());
    }

    #[test]
    fn test_commit_after_undo_discards_redo() {
        let mut history = UndoStack::new(10);
        history.reset(&empty()).unwrap();
        history.record("Connect", &connected("detections")).unwrap();
        history.undo();
        history.record("Connect", &connected("image")).unwrap();

        assert!(!history.can_redo());
        assert_eq!(history.len(), 2);
        let restored = history.undo().unwrap().unwrap();
        assert_eq!(restored, empty());
    }

    #[test]
    fn test_limit_counts_current_state() {
        let mut history = UndoStack::new(3);
        history.reset(&empty()).unwrap();
        for field in ["a", "b", "c", "d"] {
            history.record("Connect", &connected(field)).unwrap();
        }
        assert_eq!(history.len(), 3);

        history.undo();
        let oldest = history.undo().unwrap().unwrap();
        assert!(oldest.bindings.contains_key("edge-det-b"));
        assert!(!history.can_undo());
    }

    #[test]
    fn test_reset_drops_history() {
        let mut history = UndoStack::new(10);
        history.record("Connect", &connected("a")).unwrap();
        history.record("Connect", &connected("b")).unwrap();
        history.reset(&empty()).unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }
}
