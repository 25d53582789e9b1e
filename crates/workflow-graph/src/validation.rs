//! Graph validation
//!
//! Reports incomplete configuration for the graph renderer: missing required
//! fields, unnamed steps whose outputs cannot be referenced yet, duplicated
//! step names, dangling references, edges to unknown nodes and cycles.
//! Validation never blocks editing; it returns every issue found.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::catalog::SKIP_FIELDS;
use crate::resolver::{is_available, is_reference, KindAvailabilityMap};
use crate::types::{Edge, Node, NodeId};

/// One validation finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ValidationIssue {
    /// Required fields without a value
    MissingRequiredFields { node_id: NodeId, fields: Vec<String> },
    /// A step declares outputs but has no name, so nothing can reference them
    UnnamedStep { node_id: NodeId },
    /// Several steps share a name; their references collide
    DuplicateStepName { name: String, node_ids: Vec<NodeId> },
    /// A form field references something the graph does not provide
    DanglingReference {
        node_id: NodeId,
        field: String,
        reference: String,
    },
    /// An edge references a non-existent node
    UnknownEdgeNode { edge_id: String, node_id: NodeId },
    /// The edges form at least one cycle
    CycleDetected { node_ids: Vec<NodeId> },
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequiredFields { node_id, fields } => {
                write!(f, "Node '{}' is missing required fields: {}", node_id, fields.join(", "))
            }
            Self::UnnamedStep { node_id } => {
                write!(f, "Node '{}' has outputs but no name", node_id)
            }
            Self::DuplicateStepName { name, node_ids } => {
                write!(f, "Step name '{}' is used by {}", name, node_ids.join(", "))
            }
            Self::DanglingReference {
                node_id,
                field,
                reference,
            } => write!(
                f,
                "Field '{}' on node '{}' references unavailable '{}'",
                field, node_id, reference
            ),
            Self::UnknownEdgeNode { edge_id, node_id } => {
                write!(f, "Edge '{}' references unknown node '{}'", edge_id, node_id)
            }
            Self::CycleDetected { node_ids } => {
                write!(f, "Cycle detected through: {}", node_ids.join(", "))
            }
        }
    }
}

/// Whether a form value counts as "not provided"
pub fn is_empty_value(value: Option<&serde_json::Value>) -> bool {
    match value {
        None | Some(serde_json::Value::Null) => true,
        Some(serde_json::Value::String(s)) => s.is_empty(),
        Some(serde_json::Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

/// Required, non-skip-listed fields of a node whose value is empty
pub fn missing_required_fields(node: &Node) -> Vec<String> {
    node.data
        .block_schema
        .required_fields()
        .into_iter()
        .filter(|field| !SKIP_FIELDS.contains(field))
        .filter(|field| is_empty_value(node.data.form_data.get(*field)))
        .map(|field| field.to_string())
        .collect()
}

/// Validate a graph, returning every issue found
pub fn validate_graph(
    nodes: &[Node],
    edges: &[Edge],
    availability: &KindAvailabilityMap,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    validate_nodes(nodes, availability, &mut issues);
    validate_step_names(nodes, &mut issues);
    validate_edge_references(nodes, edges, &mut issues);
    detect_cycles(nodes, edges, &mut issues);

    issues
}

fn validate_nodes(
    nodes: &[Node],
    availability: &KindAvailabilityMap,
    issues: &mut Vec<ValidationIssue>,
) {
    for node in nodes {
        let missing = missing_required_fields(node);
        if !missing.is_empty() {
            issues.push(ValidationIssue::MissingRequiredFields {
                node_id: node.id.clone(),
                fields: missing,
            });
        }

        if node.built_in_kind().is_none()
            && !node.outputs().is_empty()
            && node.step_name().is_none()
        {
            issues.push(ValidationIssue::UnnamedStep {
                node_id: node.id.clone(),
            });
        }

        for (field, value) in &node.data.form_data {
            for reference in references_in(value) {
                if !is_available(availability, reference) {
                    issues.push(ValidationIssue::DanglingReference {
                        node_id: node.id.clone(),
                        field: field.clone(),
                        reference: reference.to_string(),
                    });
                }
            }
        }
    }
}

/// Reference strings inside a form value (strings, list items, Output selectors)
fn references_in(value: &serde_json::Value) -> Vec<&str> {
    match value {
        serde_json::Value::String(s) if is_reference(s) => vec![s.as_str()],
        serde_json::Value::Array(items) => items.iter().flat_map(references_in).collect(),
        serde_json::Value::Object(map) => map
            .get("selector")
            .and_then(|s| s.as_str())
            .filter(|s| is_reference(s))
            .into_iter()
            .collect(),
        _ => Vec::new(),
    }
}

fn validate_step_names(nodes: &[Node], issues: &mut Vec<ValidationIssue>) {
    let mut by_name: BTreeMap<&str, Vec<NodeId>> = BTreeMap::new();
    for node in nodes.iter().filter(|n| n.built_in_kind().is_none()) {
        if let Some(name) = node.step_name() {
            by_name.entry(name).or_default().push(node.id.clone());
        }
    }
    for (name, node_ids) in by_name {
        if node_ids.len() > 1 {
            issues.push(ValidationIssue::DuplicateStepName {
                name: name.to_string(),
                node_ids,
            });
        }
    }
}

fn validate_edge_references(nodes: &[Node], edges: &[Edge], issues: &mut Vec<ValidationIssue>) {
    let node_ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

    for edge in edges {
        for endpoint in [&edge.source, &edge.target] {
            if !node_ids.contains(endpoint.as_str()) {
                issues.push(ValidationIssue::UnknownEdgeNode {
                    edge_id: edge.id.clone(),
                    node_id: endpoint.clone(),
                });
            }
        }
    }
}

/// Detect cycles using Kahn's algorithm (topological sort)
///
/// Nodes left unvisited are on, or downstream of, a cycle.
fn detect_cycles(nodes: &[Node], edges: &[Edge], issues: &mut Vec<ValidationIssue>) {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in nodes {
        in_degree.insert(&node.id, 0);
        adjacency.insert(&node.id, Vec::new());
    }
    for edge in edges {
        if !in_degree.contains_key(edge.source.as_str()) {
            continue;
        }
        if let Some(degree) = in_degree.get_mut(edge.target.as_str()) {
            *degree += 1;
            if let Some(adj) = adjacency.get_mut(edge.source.as_str()) {
                adj.push(&edge.target);
            }
        }
    }

    let mut queue: VecDeque<&str> = nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();

    let mut visited: HashSet<&str> = HashSet::new();
    while let Some(node_id) = queue.pop_front() {
        visited.insert(node_id);
        if let Some(neighbors) = adjacency.get(node_id) {
            for &neighbor in neighbors {
                if let Some(degree) = in_degree.get_mut(neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(neighbor);
                    }
                }
            }
        }
    }

    if visited.len() < nodes.len() {
        let node_ids = nodes
            .iter()
            .filter(|n| !visited.contains(n.id.as_str()))
            .map(|n| n.id.clone())
            .collect();
        issues.push(ValidationIssue::CycleDetected { node_ids });
    }
}
