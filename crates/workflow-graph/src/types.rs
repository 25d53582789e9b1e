//! Core types for workflow graphs
//!
//! These types mirror the persisted graph shape: nodes carrying their block
//! description and form data, and edges between node ids.

use serde::{Deserialize, Serialize};

use crate::catalog::{BlockDescription, BlockSchema, OutputDefinition};

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for an edge
pub type EdgeId = String;

/// Form data of a node
pub type FormData = serde_json::Map<String, serde_json::Value>;

/// Manifest identifier of the Input node
pub const INPUT_MANIFEST: &str = "input";

/// Manifest identifier of the Output node
pub const OUTPUT_MANIFEST: &str = "output";

/// The two fixed boundary nodes of every graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltInKind {
    Input,
    Output,
}

impl BuiltInKind {
    /// Map a reserved manifest identifier to its built-in kind
    pub fn from_manifest(manifest_type_identifier: &str) -> Option<Self> {
        match manifest_type_identifier {
            INPUT_MANIFEST => Some(Self::Input),
            OUTPUT_MANIFEST => Some(Self::Output),
            _ => None,
        }
    }

    pub fn manifest(&self) -> &'static str {
        match self {
            Self::Input => INPUT_MANIFEST,
            Self::Output => OUTPUT_MANIFEST,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Input => "Input",
            Self::Output => "Output",
        }
    }

    /// Stable node id used for freshly created built-in nodes
    pub fn default_node_id(&self) -> &'static str {
        match self {
            Self::Input => "input_node",
            Self::Output => "output_node",
        }
    }
}

/// Rendering type of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    CustomNode,
    BuiltInNode,
}

/// Position on the canvas
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned region built-in nodes are kept inside
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Region of the viewport extended by `margin` on every side
    pub fn around_viewport(x: f64, y: f64, width: f64, height: f64, margin: f64) -> Self {
        Self {
            min_x: x - margin,
            min_y: y - margin,
            max_x: x + width + margin,
            max_y: y + height + margin,
        }
    }

    pub fn clamp(&self, position: Position) -> Position {
        Position {
            x: position.x.clamp(self.min_x, self.max_x.max(self.min_x)),
            y: position.y.clamp(self.min_y, self.max_y.max(self.min_y)),
        }
    }
}

/// Node payload: the block description copy plus editable form data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    #[serde(rename = "manifest_type_identifier")]
    pub manifest_type_identifier: String,
    #[serde(rename = "human_friendly_block_name", default)]
    pub human_friendly_block_name: String,
    #[serde(rename = "block_schema", default)]
    pub block_schema: BlockSchema,
    #[serde(default)]
    pub form_data: FormData,
    #[serde(
        rename = "outputs_manifest",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub outputs_manifest: Option<Vec<OutputDefinition>>,
}

/// A node instance in a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeKind,
    #[serde(default)]
    pub position: Position,
    pub data: NodeData,
}

impl Node {
    /// Create a custom node from a catalog description
    pub fn from_block(id: impl Into<String>, block: &BlockDescription, position: Position) -> Self {
        Self {
            id: id.into(),
            node_type: NodeKind::CustomNode,
            position,
            data: NodeData {
                manifest_type_identifier: block.manifest_type_identifier.clone(),
                human_friendly_block_name: block.human_friendly_block_name.clone(),
                block_schema: block.block_schema.clone(),
                form_data: block.initial_form_data(),
                outputs_manifest: Some(block.outputs_manifest.clone()),
            },
        }
    }

    /// Create a built-in node with empty sources/params
    pub fn built_in(kind: BuiltInKind, position: Position) -> Self {
        let mut form_data = FormData::new();
        if kind == BuiltInKind::Input {
            form_data.insert("sources".to_string(), serde_json::Value::Array(Vec::new()));
        }
        form_data.insert("params".to_string(), serde_json::Value::Array(Vec::new()));
        Self {
            id: kind.default_node_id().to_string(),
            node_type: NodeKind::BuiltInNode,
            position,
            data: NodeData {
                manifest_type_identifier: kind.manifest().to_string(),
                human_friendly_block_name: kind.label().to_string(),
                block_schema: BlockSchema::default(),
                form_data,
                outputs_manifest: None,
            },
        }
    }

    /// Built-in classification; custom nodes are never built-in
    pub fn built_in_kind(&self) -> Option<BuiltInKind> {
        match self.node_type {
            NodeKind::BuiltInNode => {
                BuiltInKind::from_manifest(&self.data.manifest_type_identifier)
            }
            NodeKind::CustomNode => None,
        }
    }

    pub fn is_input(&self) -> bool {
        self.built_in_kind() == Some(BuiltInKind::Input)
    }

    pub fn is_output(&self) -> bool {
        self.built_in_kind() == Some(BuiltInKind::Output)
    }

    pub fn manifest(&self) -> &str {
        &self.data.manifest_type_identifier
    }

    /// The step name (`formData.name`), if set to a non-empty string
    pub fn step_name(&self) -> Option<&str> {
        self.data
            .form_data
            .get("name")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Declared outputs (empty for nodes without a manifest)
    pub fn outputs(&self) -> &[OutputDefinition] {
        self.data.outputs_manifest.as_deref().unwrap_or(&[])
    }

    /// Input sources from `formData.sources`, skipping malformed entries
    pub fn sources(&self) -> Vec<Source> {
        list_field(&self.data.form_data, "sources")
    }

    /// Params from `formData.params`, skipping malformed entries
    pub fn params(&self) -> Vec<Param> {
        list_field(&self.data.form_data, "params")
    }

    /// Fetched models merged into `formData.models`
    pub fn models(&self) -> Vec<ModelOption> {
        list_field(&self.data.form_data, "models")
    }
}

fn list_field<T: serde::de::DeserializeOwned>(form: &FormData, key: &str) -> Vec<T> {
    form.get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// An image source declared on the Input node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    #[serde(flatten)]
    pub extra: FormData,
}

impl Source {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra: FormData::new(),
        }
    }
}

/// A parameter of the Input node, or an output binding of the Output node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    /// Kind name for Input params
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub param_type: Option<String>,
    /// Bound reference for Output params
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: FormData,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: None,
            selector: None,
            default_value: None,
            extra: FormData::new(),
        }
    }

    pub fn with_type(mut self, kind: impl Into<String>) -> Self {
        self.param_type = Some(kind.into());
        self
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }
}

/// A model identifier offered by the model-listing endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOption {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub task_type: String,
}

/// An edge connecting two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
}

/// Nodes and edges as persisted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Load/save payload of the graph persistence endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphPayload {
    pub data: GraphData,
}

impl GraphPayload {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            data: GraphData { nodes, edges },
        }
    }

    /// Content fingerprint (blake3 over the JSON encoding)
    pub fn fingerprint(&self) -> crate::Result<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}
