//! Block catalog and block description types
//!
//! A block description is the self-description of one processing block type:
//! its manifest identifier, its JSON-Schema-like property schema and the
//! kinds its outputs carry. The catalog is fetched once per editing session
//! (the `describe` payload) and is read-only afterwards.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::BuiltInKind;

/// Name of a semantic data type (e.g. "image", "object_detection_prediction")
pub type KindName = String;

/// Kind name that matches every other kind
pub const WILDCARD_KIND: &str = "*";

/// Properties that never get an editor and never count as missing
pub const SKIP_FIELDS: &[&str] = &["type"];

/// A semantic data type tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kind {
    pub name: KindName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs: Option<String>,
}

impl Kind {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            docs: None,
        }
    }
}

/// The connection role a kind-tagged option plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompatibleElement {
    /// Accepts workflow inputs and step outputs alike
    AnyData,
    /// Accepts step outputs only
    StepOutput,
    /// Accepts workflow parameters (`$inputs.*`) only
    WorkflowParameter,
    /// A role this editor does not know; never matches
    #[serde(other)]
    Unknown,
}

impl CompatibleElement {
    /// Whether a property declaring `self` accepts a candidate produced with `produced`
    pub fn accepts(&self, produced: CompatibleElement) -> bool {
        match self {
            Self::AnyData => produced != Self::Unknown,
            Self::StepOutput => produced == Self::StepOutput,
            Self::WorkflowParameter => matches!(produced, Self::AnyData | Self::WorkflowParameter),
            Self::Unknown => false,
        }
    }
}

/// A resolved reference candidate or a compatibility index entry
///
/// In the availability map `property_name` is the reference string
/// (`$inputs.cam1`, `$steps.det_1.predictions`); in the compatibility index it
/// is the property of `manifest_type_identifier` that accepts the kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub manifest_type_identifier: String,
    #[serde(default)]
    pub property_name: String,
    #[serde(default)]
    pub property_description: String,
    pub compatible_element: CompatibleElement,
    #[serde(default)]
    pub is_list_element: bool,
    #[serde(default)]
    pub is_dict_element: bool,
}

/// Declared JSON type of a literal schema or option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Null,
    #[serde(other)]
    Unknown,
}

impl LiteralType {
    /// The empty value a field resets to when switched to literal mode
    pub fn empty_value(&self) -> serde_json::Value {
        match self {
            Self::String | Self::Unknown => serde_json::Value::String(String::new()),
            Self::Number | Self::Integer => serde_json::Value::from(0),
            Self::Boolean => serde_json::Value::Bool(false),
            Self::Array => serde_json::Value::Array(Vec::new()),
            Self::Object => serde_json::Value::Object(serde_json::Map::new()),
            Self::Null => serde_json::Value::Null,
        }
    }

    /// Whether this type can back a literal editor
    pub fn is_editable(&self) -> bool {
        !matches!(self, Self::Null)
    }
}

/// A kind-tagged union member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindOption {
    pub kind: Vec<Kind>,
    #[serde(alias = "selected_element", default = "default_role")]
    pub compatible_element: CompatibleElement,
}

fn default_role() -> CompatibleElement {
    CompatibleElement::AnyData
}

/// A literal union member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteralOption {
    #[serde(rename = "type")]
    pub literal_type: LiteralType,
}

/// One member of an `anyOf` union
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaOption {
    Kind(KindOption),
    Literal(LiteralOption),
    /// Anything else (nested `$ref`, enum-only members...)
    Other(serde_json::Value),
}

/// JSON-Schema-like description of one block property
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub literal_type: Option<LiteralType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(rename = "anyOf", default, skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<SchemaOption>,
    /// Kind tags carried directly on the property (no `anyOf`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kind: Vec<Kind>,
    #[serde(
        alias = "selected_element",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub compatible_element: Option<CompatibleElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Structural shape of a property, resolved once from its schema
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyShape {
    /// Plain literal value of the given type
    Literal(LiteralType),
    /// Kind-tagged union, possibly with a literal branch
    Union {
        kind_options: Vec<KindOption>,
        literal: Option<LiteralType>,
        /// True when every `anyOf` member is kind-tagged
        all_kinds: bool,
    },
}

impl PropertySchema {
    /// Literal-typed schema
    pub fn literal(literal_type: LiteralType) -> Self {
        Self {
            literal_type: Some(literal_type),
            ..Default::default()
        }
    }

    /// Union schema from its members
    pub fn union(options: Vec<SchemaOption>) -> Self {
        Self {
            any_of: options,
            ..Default::default()
        }
    }

    /// Set a default value
    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Classify this schema into a literal or a kind-tagged union
    pub fn shape(&self) -> PropertyShape {
        if !self.kind.is_empty() {
            return PropertyShape::Union {
                kind_options: vec![KindOption {
                    kind: self.kind.clone(),
                    compatible_element: self
                        .compatible_element
                        .unwrap_or(CompatibleElement::AnyData),
                }],
                literal: None,
                all_kinds: true,
            };
        }

        let kind_options: Vec<KindOption> = self
            .any_of
            .iter()
            .filter_map(|o| match o {
                SchemaOption::Kind(k) => Some(k.clone()),
                _ => None,
            })
            .collect();

        if kind_options.is_empty() {
            let literal = self
                .literal_type
                .or_else(|| first_literal(&self.any_of))
                .unwrap_or(LiteralType::String);
            return PropertyShape::Literal(literal);
        }

        let all_kinds = self
            .any_of
            .iter()
            .all(|o| matches!(o, SchemaOption::Kind(_)));

        PropertyShape::Union {
            kind_options,
            literal: first_literal(&self.any_of),
            all_kinds,
        }
    }

    /// All kind names declared by kind-tagged options
    pub fn declared_kinds(&self) -> Vec<KindName> {
        match self.shape() {
            PropertyShape::Literal(_) => Vec::new(),
            PropertyShape::Union { kind_options, .. } => kind_options
                .iter()
                .flat_map(|o| o.kind.iter().map(|k| k.name.clone()))
                .collect(),
        }
    }

    /// Whether a kind-tagged option accepts `kind` in the given role
    pub fn accepts_kind(&self, kind: &str, role: CompatibleElement) -> bool {
        match self.shape() {
            PropertyShape::Literal(_) => false,
            PropertyShape::Union { kind_options, .. } => kind_options.iter().any(|o| {
                o.compatible_element.accepts(role)
                    && o.kind
                        .iter()
                        .any(|k| k.name == kind || k.name == WILDCARD_KIND)
            }),
        }
    }
}

fn first_literal(options: &[SchemaOption]) -> Option<LiteralType> {
    options.iter().find_map(|o| match o {
        SchemaOption::Literal(l) if l.literal_type.is_editable() => Some(l.literal_type),
        _ => None,
    })
}

/// Required-properties declaration: a list, or `true` for "all required"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Required {
    All(bool),
    Fields(Vec<String>),
}

impl Default for Required {
    fn default() -> Self {
        Self::Fields(Vec::new())
    }
}

/// Property schema of a block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockSchema {
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Required,
    #[serde(default)]
    pub block_type: String,
}

impl BlockSchema {
    /// Whether `property` is marked required
    pub fn is_required(&self, property: &str) -> bool {
        match &self.required {
            Required::All(all) => *all,
            Required::Fields(fields) => fields.iter().any(|f| f == property),
        }
    }

    /// Names of all required properties, skip-listed fields excluded
    pub fn required_fields(&self) -> Vec<&str> {
        match &self.required {
            Required::All(true) => self.properties.keys().map(|k| k.as_str()).collect(),
            Required::All(false) => Vec::new(),
            Required::Fields(fields) => fields.iter().map(|f| f.as_str()).collect(),
        }
        .into_iter()
        .filter(|f| !SKIP_FIELDS.contains(f))
        .collect()
    }
}

/// One declared output of a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDefinition {
    pub name: String,
    #[serde(default)]
    pub kind: Vec<Kind>,
}

impl OutputDefinition {
    pub fn new(name: impl Into<String>, kinds: &[&str]) -> Self {
        Self {
            name: name.into(),
            kind: kinds.iter().map(|k| Kind::new(*k)).collect(),
        }
    }
}

/// Self-description of one processing block type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDescription {
    pub manifest_type_identifier: String,
    pub human_friendly_block_name: String,
    #[serde(default)]
    pub block_schema: BlockSchema,
    #[serde(default)]
    pub outputs_manifest: Vec<OutputDefinition>,
}

impl BlockDescription {
    /// Initial form data for a fresh node of this block type
    ///
    /// `type` is the manifest identifier and every property default is
    /// copied in. `name` is left unset.
    pub fn initial_form_data(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut form = serde_json::Map::new();
        form.insert(
            "type".to_string(),
            serde_json::Value::String(self.manifest_type_identifier.clone()),
        );
        for (name, schema) in &self.block_schema.properties {
            if name == "name" || SKIP_FIELDS.contains(&name.as_str()) {
                continue;
            }
            if let Some(default) = &schema.default {
                form.insert(name.clone(), default.clone());
            }
        }
        form
    }
}

/// The `describe` payload of the catalog endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDescription {
    #[serde(default)]
    pub blocks: Vec<BlockDescription>,
    #[serde(default)]
    pub kinds_connections: BTreeMap<KindName, Vec<PropertyDefinition>>,
}

/// Read-only catalog of block descriptions keyed by manifest identifier
#[derive(Debug, Clone, Default)]
pub struct BlockCatalog {
    blocks: HashMap<String, Arc<BlockDescription>>,
    order: Vec<String>,
}

impl BlockCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from block descriptions
    ///
    /// Blocks claiming a reserved built-in identifier are skipped. A later
    /// duplicate replaces an earlier one.
    pub fn from_blocks(blocks: impl IntoIterator<Item = BlockDescription>) -> Self {
        let mut catalog = Self::new();
        for block in blocks {
            catalog.insert(block);
        }
        catalog
    }

    /// Insert one block description, returning false if it was skipped
    pub fn insert(&mut self, block: BlockDescription) -> bool {
        let id = block.manifest_type_identifier.clone();
        if BuiltInKind::from_manifest(&id).is_some() {
            log::warn!("Skipping catalog block with reserved identifier '{}'", id);
            return false;
        }
        if self.blocks.insert(id.clone(), Arc::new(block)).is_none() {
            self.order.push(id);
        } else {
            log::debug!("Catalog block '{}' redefined", id);
        }
        true
    }

    /// Look up a description by manifest identifier
    pub fn get(&self, manifest_type_identifier: &str) -> Option<Arc<BlockDescription>> {
        self.blocks.get(manifest_type_identifier).cloned()
    }

    /// Whether a manifest identifier is in the catalog
    pub fn contains(&self, manifest_type_identifier: &str) -> bool {
        self.blocks.contains_key(manifest_type_identifier)
    }

    /// All descriptions in insertion order
    pub fn blocks(&self) -> Vec<Arc<BlockDescription>> {
        self.order
            .iter()
            .filter_map(|id| self.blocks.get(id).cloned())
            .collect()
    }

    /// Descriptions grouped by `block_schema.block_type`
    pub fn by_block_type(&self) -> BTreeMap<String, Vec<Arc<BlockDescription>>> {
        let mut grouped: BTreeMap<String, Vec<Arc<BlockDescription>>> = BTreeMap::new();
        for block in self.blocks() {
            grouped
                .entry(block.block_schema.block_type.clone())
                .or_default()
                .push(block);
        }
        grouped
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
