//! Graph Store
//!
//! The single source of truth for one editor instance. All graph mutation
//! goes through the operations defined here; each one runs synchronously,
//! recomputes the availability map before returning, pushes an undo
//! snapshot and emits its events in dispatch order.
//!
//! Connection refusals are returned as [`ConnectionDecision::Refused`] and
//! emitted as [`GraphEvent::ConnectionRefused`]; only malformed requests
//! (unknown ids, deleting a built-in node) are errors.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::bus::{BusHandle, NodeUpdate, NodeUpdateBus, SubscriptionId};
use crate::catalog::BlockDescription;
use crate::connection::{can_connect, ConnectionDecision, FieldBinding, RefusalReason};
use crate::error::{GraphError, Result};
use crate::events::{EventSink, GraphEvent, NullEventSink};
use crate::kinds::KindCompatibilityIndex;
use crate::resolver::{recompute, step_prefix, KindAvailabilityMap, INPUTS_PREFIX};
use crate::types::{
    Bounds, BuiltInKind, Edge, EdgeId, FormData, GraphData, GraphPayload, Node, NodeId, NodeKind,
    Position,
};
use crate::undo::{Snapshot, UndoStack};
use crate::validation::{validate_graph, ValidationIssue};

/// Default canvas position of a freshly created Input node
const INPUT_POSITION: Position = Position { x: 0.0, y: 0.0 };

/// Default canvas position of a freshly created Output node
const OUTPUT_POSITION: Position = Position { x: 600.0, y: 0.0 };

/// Form fields that are never cleared when an edge is removed
const PROTECTED_FIELDS: &[&str] = &["name", "type"];

/// Input-node form key holding fetched model options
const MODELS_FIELD: &str = "models";

/// Mutable workflow graph with derived availability state
pub struct GraphStore {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    /// The field each edge wrote when it was connected
    bindings: BTreeMap<EdgeId, FieldBinding>,
    index: Arc<KindCompatibilityIndex>,
    availability: KindAvailabilityMap,
    events: Arc<dyn EventSink>,
    bus: NodeUpdateBus,
    history: UndoStack,
    /// Region built-in nodes are clamped to
    bounds: Option<Bounds>,
    selected: Option<NodeId>,
    /// Fingerprint of the payload last loaded or saved
    saved_fingerprint: Option<String>,
}

impl GraphStore {
    /// Create an empty graph holding only the Input and Output nodes
    pub fn new(index: Arc<KindCompatibilityIndex>) -> Self {
        let nodes = vec![
            Node::built_in(BuiltInKind::Input, INPUT_POSITION),
            Node::built_in(BuiltInKind::Output, OUTPUT_POSITION),
        ];
        Self::assemble(nodes, Vec::new(), index)
    }

    /// Create a store from a persisted payload
    ///
    /// A missing Input or Output node is recreated. Edges pointing at unknown
    /// nodes are dropped. Duplicated built-ins, duplicated node ids and custom
    /// nodes claiming a reserved identifier are rejected.
    pub fn from_payload(payload: GraphPayload, index: Arc<KindCompatibilityIndex>) -> Result<Self> {
        let (nodes, edges) = sanitize_payload(payload)?;
        Ok(Self::assemble(nodes, edges, index))
    }

    fn assemble(nodes: Vec<Node>, edges: Vec<Edge>, index: Arc<KindCompatibilityIndex>) -> Self {
        let mut store = Self {
            availability: recompute(&nodes),
            bindings: infer_bindings(&nodes, &edges),
            nodes,
            edges,
            index,
            events: Arc::new(NullEventSink),
            bus: NodeUpdateBus::new(),
            history: UndoStack::default(),
            bounds: None,
            selected: None,
            saved_fingerprint: None,
        };
        store.reset_history();
        store.saved_fingerprint = store.fingerprint();
        store
    }

    /// Replace the event sink
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Replace the undo history with one keeping at most `limit` snapshots
    pub fn with_undo_limit(mut self, limit: usize) -> Self {
        self.history = UndoStack::new(limit);
        self.reset_history();
        self
    }

    /// Constrain built-in nodes to `bounds`, clamping them immediately
    pub fn set_bounds(&mut self, bounds: Bounds) {
        self.bounds = Some(bounds);
        let mut moved = Vec::new();
        for node in self.nodes.iter_mut().filter(|n| n.built_in_kind().is_some()) {
            let clamped = bounds.clamp(node.position);
            if clamped != node.position {
                node.position = clamped;
                moved.push(GraphEvent::NodeMoved {
                    node_id: node.id.clone(),
                    position: clamped,
                });
            }
        }
        for event in moved {
            self.emit(event);
        }
    }

    /// Replace the whole graph with a loaded payload
    ///
    /// History is reset and the payload becomes the saved baseline.
    pub fn load(&mut self, payload: GraphPayload) -> Result<()> {
        let (nodes, edges) = sanitize_payload(payload)?;
        self.bindings = infer_bindings(&nodes, &edges);
        self.nodes = nodes;
        self.edges = edges;
        self.selected = None;
        self.clamp_built_ins();
        self.availability = recompute(&self.nodes);
        self.reset_history();
        self.saved_fingerprint = self.fingerprint();

        log::info!(
            "Loaded graph with {} nodes and {} edges",
            self.nodes.len(),
            self.edges.len()
        );
        self.emit(GraphEvent::GraphReplaced);
        self.emit_recomputed();
        Ok(())
    }

    // =========================================================================
    // Read access
    // =========================================================================

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    /// Find the node of a built-in kind
    pub fn built_in(&self, kind: BuiltInKind) -> Option<&Node> {
        self.nodes.iter().find(|n| n.built_in_kind() == Some(kind))
    }

    pub fn edge(&self, edge_id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == edge_id)
    }

    /// The current Kind Availability Map
    pub fn availability(&self) -> &KindAvailabilityMap {
        &self.availability
    }

    pub fn index(&self) -> &KindCompatibilityIndex {
        &self.index
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    /// Export the persisted shape
    ///
    /// Fetched model options on the Input node are session state and are
    /// not exported.
    pub fn payload(&self) -> GraphPayload {
        let nodes = self
            .nodes
            .iter()
            .map(|node| {
                let mut node = node.clone();
                if node.is_input() {
                    node.data.form_data.remove(MODELS_FIELD);
                }
                node
            })
            .collect();
        GraphPayload::new(nodes, self.edges.clone())
    }

    /// Validation issues of the current graph
    pub fn validate(&self) -> Vec<ValidationIssue> {
        validate_graph(&self.nodes, &self.edges, &self.availability)
    }

    /// Whether the graph differs from the last loaded or saved payload
    pub fn is_dirty(&self) -> bool {
        match (&self.saved_fingerprint, self.fingerprint()) {
            (Some(saved), Some(current)) => *saved != current,
            _ => true,
        }
    }

    /// Record that `fingerprint` was persisted remotely
    pub fn mark_saved(&mut self, fingerprint: String) {
        self.saved_fingerprint = Some(fingerprint);
    }

    fn fingerprint(&self) -> Option<String> {
        match self.payload().fingerprint() {
            Ok(fingerprint) => Some(fingerprint),
            Err(e) => {
                log::warn!("Failed to fingerprint graph: {}", e);
                None
            }
        }
    }

    // =========================================================================
    // Node operations
    // =========================================================================

    /// Add a custom node
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if node.node_type == NodeKind::BuiltInNode {
            return Err(GraphError::invalid(format!(
                "Node '{}' is a built-in node; a graph has exactly one Input and one Output",
                node.id
            )));
        }
        if BuiltInKind::from_manifest(node.manifest()).is_some() {
            return Err(GraphError::ReservedIdentifier(node.manifest().to_string()));
        }
        if self.node(&node.id).is_some() {
            return Err(GraphError::DuplicateNode(node.id));
        }

        let node_id = node.id.clone();
        self.nodes.push(node);
        self.commit(vec![GraphEvent::NodeAdded { node_id }]);
        Ok(())
    }

    /// Add a node for a catalog block, returning its generated id
    pub fn add_block(&mut self, block: &BlockDescription, position: Position) -> Result<NodeId> {
        let node_id = uuid::Uuid::new_v4().to_string();
        self.add_node(Node::from_block(node_id.clone(), block, position))?;
        Ok(node_id)
    }

    /// Remove a custom node and every edge touching it
    ///
    /// Fields bound through the removed outgoing edges are cleared on their
    /// targets. Returns the removed edge ids.
    pub fn remove_node(&mut self, node_id: &str) -> Result<Vec<EdgeId>> {
        let node = self
            .node(node_id)
            .ok_or_else(|| GraphError::NodeNotFound(node_id.to_string()))?;
        if node.built_in_kind().is_some() {
            return Err(GraphError::BuiltInNodeNotDeletable(node_id.to_string()));
        }

        let touching: Vec<Edge> = self
            .edges
            .iter()
            .filter(|e| e.source == node_id || e.target == node_id)
            .cloned()
            .collect();

        let mut events = Vec::new();
        for edge in &touching {
            let cleared_fields = if edge.source == node_id {
                self.unbind(&edge.id, &edge.target)
            } else {
                self.bindings.remove(&edge.id);
                Vec::new()
            };
            events.push(GraphEvent::EdgeRemoved {
                edge_id: edge.id.clone(),
                cleared_fields,
            });
        }

        self.edges
            .retain(|e| e.source != node_id && e.target != node_id);
        self.nodes.retain(|n| n.id != node_id);

        let removed_edges: Vec<EdgeId> = touching.into_iter().map(|e| e.id).collect();
        events.push(GraphEvent::NodeRemoved {
            node_id: node_id.to_string(),
            removed_edges: removed_edges.clone(),
        });
        if self.selected.as_deref() == Some(node_id) {
            self.selected = None;
            events.push(GraphEvent::SelectionChanged { node_id: None });
        }

        self.commit(events);
        Ok(removed_edges)
    }

    /// Move a node; built-in nodes are clamped to the configured bounds
    ///
    /// Returns the position actually applied.
    pub fn move_node(&mut self, node_id: &str, position: Position) -> Result<Position> {
        let bounds = self.bounds;
        let node = self.node_mut(node_id)?;
        let position = match (node.built_in_kind(), bounds) {
            (Some(_), Some(bounds)) => bounds.clamp(position),
            _ => position,
        };
        node.position = position;

        self.commit(vec![GraphEvent::NodeMoved {
            node_id: node_id.to_string(),
            position,
        }]);
        Ok(position)
    }

    /// Select a node, or clear the selection with `None`
    ///
    /// Selection is not a graph mutation: nothing is recomputed or recorded.
    pub fn select_node(&mut self, node_id: Option<&str>) -> Result<()> {
        if let Some(id) = node_id {
            if self.node(id).is_none() {
                return Err(GraphError::NodeNotFound(id.to_string()));
            }
        }
        let selected = node_id.map(str::to_string);
        if selected != self.selected {
            self.selected = selected.clone();
            self.emit(GraphEvent::SelectionChanged { node_id: selected });
        }
        Ok(())
    }

    // =========================================================================
    // Edge operations
    // =========================================================================

    /// Decide whether `source -> target` could be connected, without mutating
    pub fn check_connection(&self, source_id: &str, target_id: &str) -> Result<ConnectionDecision> {
        let source = self
            .node(source_id)
            .ok_or_else(|| GraphError::NodeNotFound(source_id.to_string()))?;
        let target = self
            .node(target_id)
            .ok_or_else(|| GraphError::NodeNotFound(target_id.to_string()))?;

        if self
            .edges
            .iter()
            .any(|e| e.source == source_id && e.target == target_id)
        {
            return Ok(ConnectionDecision::Refused(RefusalReason::AlreadyConnected));
        }

        Ok(can_connect(source, target, &self.index, &self.availability))
    }

    /// Connect two nodes
    ///
    /// On success the edge and its field binding are applied together and
    /// reported in a single [`GraphEvent::EdgeAdded`].
    pub fn connect(&mut self, source_id: &str, target_id: &str) -> Result<ConnectionDecision> {
        let decision = self.check_connection(source_id, target_id)?;

        let binding = match &decision {
            ConnectionDecision::Refused(reason) => {
                log::debug!(
                    "Connection '{}' -> '{}' refused: {}",
                    source_id,
                    target_id,
                    reason
                );
                self.emit(GraphEvent::ConnectionRefused {
                    source: source_id.to_string(),
                    target: target_id.to_string(),
                    reason: reason.clone(),
                });
                return Ok(decision);
            }
            ConnectionDecision::Allowed { binding } => binding.clone(),
        };

        if let Some(binding) = &binding {
            self.node_mut(target_id)?.data.form_data.insert(
                binding.target_field.clone(),
                serde_json::Value::String(binding.reference_value.clone()),
            );
        }

        let edge_id = self.next_edge_id(source_id, target_id);
        self.edges.push(Edge {
            id: edge_id.clone(),
            source: source_id.to_string(),
            target: target_id.to_string(),
        });
        if let Some(binding) = &binding {
            self.bindings.insert(edge_id.clone(), binding.clone());
        }

        self.commit(vec![GraphEvent::EdgeAdded {
            edge_id,
            source: source_id.to_string(),
            target: target_id.to_string(),
            binding,
        }]);
        Ok(decision)
    }

    /// Remove an edge and clear the binding it wrote on its target
    ///
    /// The bound field is cleared only while it still holds the reference
    /// the edge wrote. Returns the cleared field names.
    pub fn remove_edge(&mut self, edge_id: &str) -> Result<Vec<String>> {
        let edge = self
            .edge(edge_id)
            .cloned()
            .ok_or_else(|| GraphError::EdgeNotFound(edge_id.to_string()))?;

        self.edges.retain(|e| e.id != edge_id);
        let cleared_fields = self.unbind(&edge.id, &edge.target);

        self.commit(vec![GraphEvent::EdgeRemoved {
            edge_id: edge.id,
            cleared_fields: cleared_fields.clone(),
        }]);
        Ok(cleared_fields)
    }

    fn next_edge_id(&self, source_id: &str, target_id: &str) -> EdgeId {
        let id = format!("edge-{}-{}", source_id, target_id);
        if self.edge(&id).is_none() {
            id
        } else {
            format!("edge-{}", uuid::Uuid::new_v4())
        }
    }

    /// Forget the binding of `edge_id` and null its field on the target
    fn unbind(&mut self, edge_id: &str, target_id: &str) -> Vec<String> {
        let Some(binding) = self.bindings.remove(edge_id) else {
            return Vec::new();
        };
        let Some(target) = self.nodes.iter_mut().find(|n| n.id == target_id) else {
            return Vec::new();
        };
        if PROTECTED_FIELDS.contains(&binding.target_field.as_str()) {
            return Vec::new();
        }

        match target.data.form_data.get_mut(&binding.target_field) {
            Some(value) if value.as_str() == Some(binding.reference_value.as_str()) => {
                *value = serde_json::Value::Null;
                vec![binding.target_field]
            }
            _ => Vec::new(),
        }
    }

    // =========================================================================
    // Form data operations
    // =========================================================================

    /// Commit one form field
    pub fn set_form_field(
        &mut self,
        node_id: &str,
        field: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        self.node_mut(node_id)?
            .data
            .form_data
            .insert(field.to_string(), value);
        self.commit(vec![GraphEvent::FormDataCommitted {
            node_id: node_id.to_string(),
            fields: vec![field.to_string()],
        }]);
        Ok(())
    }

    /// Replace a node's whole form data
    pub fn set_form_data(&mut self, node_id: &str, form_data: FormData) -> Result<()> {
        let fields = form_data.keys().cloned().collect();
        self.node_mut(node_id)?.data.form_data = form_data;
        self.commit(vec![GraphEvent::FormDataCommitted {
            node_id: node_id.to_string(),
            fields,
        }]);
        Ok(())
    }

    /// Merge a patch into a node's form data
    pub fn merge_form_data(&mut self, node_id: &str, patch: FormData) -> Result<()> {
        let fields = merge_into(self.node_mut(node_id)?, patch);
        self.commit(vec![GraphEvent::FormDataCommitted {
            node_id: node_id.to_string(),
            fields,
        }]);
        Ok(())
    }

    // =========================================================================
    // Node-update bus
    // =========================================================================

    /// A cloneable handle async tasks publish node patches through
    pub fn bus_handle(&self) -> BusHandle {
        self.bus.handle()
    }

    /// Register a listener for applied bus updates
    pub fn subscribe(
        &mut self,
        handler: impl FnMut(&NodeUpdate) + Send + 'static,
    ) -> SubscriptionId {
        self.bus.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Apply every queued bus update, in publish order
    ///
    /// Updates addressed to unknown nodes are dropped. Returns the number of
    /// updates applied.
    pub fn drain_updates(&mut self) -> Result<usize> {
        let pending = self.bus.take_pending();
        if pending.is_empty() {
            return Ok(0);
        }

        let mut events = Vec::new();
        let mut applied = Vec::new();
        for update in pending {
            let Some(node) = self.nodes.iter_mut().find(|n| n.id == update.node_id) else {
                log::warn!("Dropping update for unknown node '{}'", update.node_id);
                continue;
            };
            let fields = merge_into(node, update.patch.clone());
            events.push(GraphEvent::FormDataCommitted {
                node_id: update.node_id.clone(),
                fields,
            });
            applied.push(update);
        }

        if !applied.is_empty() {
            self.commit(events);
            for update in &applied {
                self.bus.notify(update);
            }
        }
        Ok(applied.len())
    }

    // =========================================================================
    // Undo / redo
    // =========================================================================

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Restore the previous snapshot; returns false if there is none
    pub fn undo(&mut self) -> Result<bool> {
        match self.history.undo() {
            Some(snapshot) => {
                self.restore(snapshot?);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Re-apply the next snapshot; returns false if there is none
    pub fn redo(&mut self) -> Result<bool> {
        match self.history.redo() {
            Some(snapshot) => {
                self.restore(snapshot?);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Name of the change [`GraphStore::undo`] would revert
    pub fn undo_label(&self) -> Option<&'static str> {
        self.history.undo_label()
    }

    /// Name of the change [`GraphStore::redo`] would re-apply
    pub fn redo_label(&self) -> Option<&'static str> {
        self.history.redo_label()
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.nodes = snapshot.graph.nodes;
        self.edges = snapshot.graph.edges;
        self.bindings = snapshot.bindings;
        if let Some(selected) = &self.selected {
            if !self.nodes.iter().any(|n| &n.id == selected) {
                self.selected = None;
            }
        }
        self.availability = recompute(&self.nodes);
        self.emit(GraphEvent::GraphReplaced);
        self.emit_recomputed();
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn node_mut(&mut self, node_id: &str) -> Result<&mut Node> {
        self.nodes
            .iter_mut()
            .find(|n| n.id == node_id)
            .ok_or_else(|| GraphError::NodeNotFound(node_id.to_string()))
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            graph: GraphData {
                nodes: self.nodes.clone(),
                edges: self.edges.clone(),
            },
            bindings: self.bindings.clone(),
        }
    }

    /// Finish a mutation: recompute, emit in order, record a snapshot
    ///
    /// The mutation has already been applied, so a snapshot failure only
    /// costs the undo entry.
    fn commit(&mut self, events: Vec<GraphEvent>) {
        let label = events.first().map(GraphEvent::label).unwrap_or("Edit");
        self.availability = recompute(&self.nodes);
        for event in events {
            self.emit(event);
        }
        self.emit_recomputed();

        let snapshot = self.snapshot();
        if let Err(e) = self.history.record(label, &snapshot) {
            log::warn!("Failed to record undo snapshot for '{}': {}", label, e);
        }
    }

    fn reset_history(&mut self) {
        let snapshot = self.snapshot();
        if let Err(e) = self.history.reset(&snapshot) {
            log::warn!("Failed to record initial undo snapshot: {}", e);
        }
    }

    fn clamp_built_ins(&mut self) {
        let Some(bounds) = self.bounds else {
            return;
        };
        for node in self.nodes.iter_mut().filter(|n| n.built_in_kind().is_some()) {
            node.position = bounds.clamp(node.position);
        }
    }

    fn emit_recomputed(&self) {
        let references = self.availability.values().map(Vec::len).sum();
        log::debug!(
            "Recomputed availability: {} kinds, {} references",
            self.availability.len(),
            references
        );
        self.emit(GraphEvent::AvailabilityRecomputed {
            kinds: self.availability.len(),
            references,
        });
    }

    fn emit(&self, event: GraphEvent) {
        if let Err(e) = self.events.send(event) {
            log::warn!("Failed to deliver graph event: {}", e);
        }
    }
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("selected", &self.selected)
            .field("history", &self.history)
            .finish()
    }
}

/// References an edge from a given source could have written
enum BoundReference {
    /// Input image sources (`$inputs.<source>`)
    Inputs(HashSet<String>),
    /// Any output of a named step
    StepPrefix(String),
    Nothing,
}

impl BoundReference {
    fn of(source: &Node) -> Self {
        if source.is_input() {
            return Self::Inputs(
                source
                    .sources()
                    .into_iter()
                    .filter(|s| !s.name.is_empty())
                    .map(|s| format!("{}{}", INPUTS_PREFIX, s.name))
                    .collect(),
            );
        }
        match source.step_name() {
            Some(name) if source.built_in_kind().is_none() => Self::StepPrefix(step_prefix(name)),
            _ => Self::Nothing,
        }
    }

    fn matches(&self, value: &str) -> bool {
        match self {
            Self::Inputs(references) => references.contains(value),
            Self::StepPrefix(prefix) => value.starts_with(prefix.as_str()),
            Self::Nothing => false,
        }
    }
}

/// Recover edge bindings for a graph that was loaded rather than connected
///
/// Each edge is paired with the first unprotected target field holding a
/// reference its source produces.
fn infer_bindings(nodes: &[Node], edges: &[Edge]) -> BTreeMap<EdgeId, FieldBinding> {
    let mut bindings = BTreeMap::new();
    for edge in edges {
        let source = nodes.iter().find(|n| n.id == edge.source);
        let target = nodes.iter().find(|n| n.id == edge.target);
        let (Some(source), Some(target)) = (source, target) else {
            continue;
        };

        let matcher = BoundReference::of(source);
        let found = target.data.form_data.iter().find_map(|(field, value)| {
            let reference = value.as_str()?;
            (!PROTECTED_FIELDS.contains(&field.as_str()) && matcher.matches(reference)).then(
                || FieldBinding {
                    target_field: field.clone(),
                    reference_value: reference.to_string(),
                },
            )
        });
        if let Some(binding) = found {
            bindings.insert(edge.id.clone(), binding);
        }
    }
    bindings
}

fn merge_into(node: &mut Node, patch: FormData) -> Vec<String> {
    let fields = patch.keys().cloned().collect();
    node.data.form_data.extend(patch);
    fields
}

/// Check a payload's structure and repair missing built-in nodes
fn sanitize_payload(payload: GraphPayload) -> Result<(Vec<Node>, Vec<Edge>)> {
    let GraphData { mut nodes, edges } = payload.data;

    let mut ids = HashSet::new();
    let mut has_input = false;
    let mut has_output = false;
    for node in &nodes {
        if !ids.insert(node.id.clone()) {
            return Err(GraphError::DuplicateNode(node.id.clone()));
        }
        match (node.node_type, node.built_in_kind()) {
            (NodeKind::CustomNode, _) => {
                if BuiltInKind::from_manifest(node.manifest()).is_some() {
                    return Err(GraphError::ReservedIdentifier(node.manifest().to_string()));
                }
            }
            (NodeKind::BuiltInNode, Some(BuiltInKind::Input)) if !has_input => has_input = true,
            (NodeKind::BuiltInNode, Some(BuiltInKind::Output)) if !has_output => has_output = true,
            (NodeKind::BuiltInNode, Some(kind)) => {
                return Err(GraphError::invalid(format!(
                    "More than one {} node",
                    kind.label()
                )));
            }
            (NodeKind::BuiltInNode, None) => {
                return Err(GraphError::invalid(format!(
                    "Built-in node '{}' has unknown manifest '{}'",
                    node.id,
                    node.manifest()
                )));
            }
        }
    }

    for (present, kind, position) in [
        (has_input, BuiltInKind::Input, INPUT_POSITION),
        (has_output, BuiltInKind::Output, OUTPUT_POSITION),
    ] {
        if present {
            continue;
        }
        let mut node = Node::built_in(kind, position);
        if ids.contains(&node.id) {
            node.id = format!("{}-{}", node.id, uuid::Uuid::new_v4());
        }
        log::warn!("Graph payload has no {} node; recreating it", kind.label());
        ids.insert(node.id.clone());
        nodes.push(node);
    }

    let edge_count = edges.len();
    let edges: Vec<Edge> = edges
        .into_iter()
        .filter(|e| ids.contains(&e.source) && ids.contains(&e.target))
        .collect();
    if edges.len() < edge_count {
        log::warn!(
            "Dropped {} edges referencing unknown nodes",
            edge_count - edges.len()
        );
    }

    Ok((nodes, edges))
}
