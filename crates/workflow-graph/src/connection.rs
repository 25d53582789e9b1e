//! Connection validation
//!
//! Decides whether an edge between two nodes may be created and, if so,
//! which target field gets bound to which reference string. Refusal is a
//! normal outcome and is returned as a value.

use serde::{Deserialize, Serialize};

use crate::catalog::{CompatibleElement, PropertyDefinition, PropertyShape};
use crate::kinds::KindCompatibilityIndex;
use crate::resolver::{step_prefix, KindAvailabilityMap, IMAGE_KIND};
use crate::types::{Node, INPUT_MANIFEST};

/// The form field an allowed edge populates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldBinding {
    pub target_field: String,
    pub reference_value: String,
}

/// Why a connection was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RefusalReason {
    /// Source and target are the same node
    SelfLoop,
    /// The Input node has no inputs
    InputAsTarget,
    /// The Output node has no outputs
    OutputAsSource,
    /// Input cannot feed Output directly
    InputToOutput,
    /// An edge between these nodes already exists
    AlreadyConnected,
    /// No kind carried by the source is accepted by the target
    NoCompatibleKind { source_manifest: String, target_manifest: String },
}

impl std::fmt::Display for RefusalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelfLoop => write!(f, "A node cannot connect to itself"),
            Self::InputAsTarget => write!(f, "The Input node cannot be a connection target"),
            Self::OutputAsSource => write!(f, "The Output node cannot be a connection source"),
            Self::InputToOutput => write!(f, "Input cannot connect directly to Output"),
            Self::AlreadyConnected => write!(f, "These nodes are already connected"),
            Self::NoCompatibleKind {
                source_manifest,
                target_manifest,
            } => write!(
                f,
                "'{}' produces no kind that '{}' accepts",
                source_manifest, target_manifest
            ),
        }
    }
}

/// Outcome of [`can_connect`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ConnectionDecision {
    Allowed { binding: Option<FieldBinding> },
    Refused(RefusalReason),
}

impl ConnectionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    pub fn binding(&self) -> Option<&FieldBinding> {
        match self {
            Self::Allowed { binding } => binding.as_ref(),
            Self::Refused(_) => None,
        }
    }

    fn allowed(target_field: Option<String>, reference: Option<&PropertyDefinition>) -> Self {
        let binding = match (target_field, reference) {
            (Some(target_field), Some(reference)) if !target_field.is_empty() => Some(FieldBinding {
                target_field,
                reference_value: reference.property_name.clone(),
            }),
            _ => None,
        };
        Self::Allowed { binding }
    }
}

/// Decide whether `source -> target` may be connected
///
/// Total for any pair of nodes. Rules, in order: structural refusals,
/// Input-sourced edges (kind `image`, role `any_data`), Output-sinked edges
/// (always allowed), then step-to-step edges matched on the source's
/// declared output kinds with role `step_output`.
pub fn can_connect(
    source: &Node,
    target: &Node,
    index: &KindCompatibilityIndex,
    availability: &KindAvailabilityMap,
) -> ConnectionDecision {
    if source.id == target.id {
        return ConnectionDecision::Refused(RefusalReason::SelfLoop);
    }
    if target.is_input() {
        return ConnectionDecision::Refused(RefusalReason::InputAsTarget);
    }
    if source.is_output() {
        return ConnectionDecision::Refused(RefusalReason::OutputAsSource);
    }

    if source.is_input() {
        if target.is_output() {
            return ConnectionDecision::Refused(RefusalReason::InputToOutput);
        }
        return connect_from_input(target, index, availability);
    }

    if target.is_output() {
        return ConnectionDecision::Allowed { binding: None };
    }

    connect_steps(source, target, index, availability)
}

fn connect_from_input(
    target: &Node,
    index: &KindCompatibilityIndex,
    availability: &KindAvailabilityMap,
) -> ConnectionDecision {
    let role = CompatibleElement::AnyData;
    let Some(entry) = index.find(IMAGE_KIND, target.manifest(), role) else {
        return ConnectionDecision::Refused(RefusalReason::NoCompatibleKind {
            source_manifest: INPUT_MANIFEST.to_string(),
            target_manifest: target.manifest().to_string(),
        });
    };

    let reference = availability.get(IMAGE_KIND).and_then(|defs| {
        defs.iter().find(|d| {
            d.manifest_type_identifier == INPUT_MANIFEST && d.compatible_element == role
        })
    });

    ConnectionDecision::allowed(target_field(entry, target, IMAGE_KIND, role), reference)
}

/// Only the target side is looked up in the index; the source's declared
/// outputs stand in for a source-side `step_output` entry.
fn connect_steps(
    source: &Node,
    target: &Node,
    index: &KindCompatibilityIndex,
    availability: &KindAvailabilityMap,
) -> ConnectionDecision {
    let role = CompatibleElement::StepOutput;
    let prefix = source.step_name().map(step_prefix);

    let mut seen: Vec<&str> = Vec::new();
    for output in source.outputs() {
        for kind in &output.kind {
            if seen.contains(&kind.name.as_str()) {
                continue;
            }
            seen.push(&kind.name);

            let Some(entry) = index.find(&kind.name, target.manifest(), role) else {
                continue;
            };

            let reference = prefix.as_deref().and_then(|prefix| {
                availability
                    .get(&kind.name)
                    .and_then(|defs| defs.iter().find(|d| d.property_name.contains(prefix)))
            });

            return ConnectionDecision::allowed(
                target_field(entry, target, &kind.name, role),
                reference,
            );
        }
    }

    ConnectionDecision::Refused(RefusalReason::NoCompatibleKind {
        source_manifest: source.manifest().to_string(),
        target_manifest: target.manifest().to_string(),
    })
}

/// Target property for an index entry, falling back to the target schema
fn target_field(
    entry: &PropertyDefinition,
    target: &Node,
    kind: &str,
    role: CompatibleElement,
) -> Option<String> {
    if !entry.property_name.is_empty() {
        return Some(entry.property_name.clone());
    }
    target
        .data
        .block_schema
        .properties
        .iter()
        .find(|(_, schema)| {
            matches!(schema.shape(), PropertyShape::Union { .. }) && schema.accepts_kind(kind, role)
        })
        .map(|(name, _)| name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        BlockDescription, BlockSchema, Kind, KindOption, OutputDefinition, PropertySchema,
        SchemaOption,
    };
    use crate::resolver::recompute;
    use crate::types::{BuiltInKind, Position};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn entry(manifest: &str, property: &str, role: CompatibleElement) -> PropertyDefinition {
        PropertyDefinition {
            manifest_type_identifier: manifest.to_string(),
            property_name: property.to_string(),
            property_description: String::new(),
            compatible_element: role,
            is_list_element: false,
            is_dict_element: false,
        }
    }

    fn block(manifest: &str, outputs: Vec<OutputDefinition>) -> BlockDescription {
        BlockDescription {
            manifest_type_identifier: manifest.to_string(),
            human_friendly_block_name: manifest.to_string(),
            block_schema: BlockSchema::default(),
            outputs_manifest: outputs,
        }
    }

    fn detector_block() -> BlockDescription {
        block(
            "Detector",
            vec![OutputDefinition::new("predictions", &["detections"])],
        )
    }

    fn named(mut node: Node, name: &str) -> Node {
        node.data.form_data.insert("name".to_string(), json!(name));
        node
    }

    fn index() -> KindCompatibilityIndex {
        let mut table = BTreeMap::new();
        table.insert(
            "image".to_string(),
            vec![entry("Detector", "image", CompatibleElement::AnyData)],
        );
        table.insert(
            "detections".to_string(),
            vec![entry("Tracker", "detections", CompatibleElement::StepOutput)],
        );
        KindCompatibilityIndex::new(table)
    }

    fn input_with_camera() -> Node {
        let mut input = Node::built_in(BuiltInKind::Input, Position::default());
        input.data.form_data.insert("sources".to_string(), json!([{"name": "cam1"}]));
        input
    }

    #[test]
    fn test_input_to_block_binds_source() {
        let input = input_with_camera();
        let detector = Node::from_block("d", &block("Detector", vec![]), Position::default());
        let avail = recompute(&[input.clone(), detector.clone()]);

        let decision = can_connect(&input, &detector, &index(), &avail);
        assert_eq!(
            decision,
            ConnectionDecision::Allowed {
                binding: Some(FieldBinding {
                    target_field: "image".to_string(),
                    reference_value: "$inputs.cam1".to_string(),
                })
            }
        );
    }

    #[test]
    fn test_input_without_sources_allows_without_binding() {
        let input = Node::built_in(BuiltInKind::Input, Position::default());
        let detector = Node::from_block("d", &block("Detector", vec![]), Position::default());
        let decision = can_connect(&input, &detector, &index(), &KindAvailabilityMap::new());
        assert!(decision.is_allowed());
        assert!(decision.binding().is_none());
    }

    #[test]
    fn test_input_to_incompatible_block_refused() {
        let input = input_with_camera();
        let tracker = Node::from_block("t", &block("Tracker", vec![]), Position::default());
        let avail = recompute(&[input.clone()]);
        assert!(!can_connect(&input, &tracker, &index(), &avail).is_allowed());
    }

    #[test]
    fn test_step_chaining_binds_step_output() {
        let a = named(
            Node::from_block("a", &detector_block(), Position::default()),
            "det_1",
        );
        let b = Node::from_block("b", &block("Tracker", vec![]), Position::default());
        let avail = recompute(&[a.clone(), b.clone()]);

        let decision = can_connect(&a, &b, &index(), &avail);
        let binding = decision.binding().expect("binding");
        assert_eq!(binding.target_field, "detections");
        assert_eq!(binding.reference_value, "$steps.det_1.predictions");
    }

    #[test]
    fn test_unnamed_step_allowed_without_binding() {
        let a = Node::from_block("a", &detector_block(), Position::default());
        let b = Node::from_block("b", &block("Tracker", vec![]), Position::default());
        let avail = recompute(&[a.clone(), b.clone()]);
        let decision = can_connect(&a, &b, &index(), &avail);
        assert!(decision.is_allowed());
        assert!(decision.binding().is_none());
    }

    #[test]
    fn test_output_accepts_any_step_but_not_input() {
        let output = Node::built_in(BuiltInKind::Output, Position::default());
        let input = input_with_camera();
        let step = Node::from_block("s", &block("Anything", vec![]), Position::default());
        let avail = recompute(&[input.clone()]);

        assert_eq!(
            can_connect(&step, &output, &index(), &avail),
            ConnectionDecision::Allowed { binding: None }
        );
        assert_eq!(
            can_connect(&input, &output, &index(), &avail),
            ConnectionDecision::Refused(RefusalReason::InputToOutput)
        );
    }

    #[test]
    fn test_structural_refusals() {
        let input = input_with_camera();
        let output = Node::built_in(BuiltInKind::Output, Position::default());
        let step = Node::from_block("s", &block("Detector", vec![]), Position::default());
        let avail = KindAvailabilityMap::new();

        assert_eq!(
            can_connect(&step, &step, &index(), &avail),
            ConnectionDecision::Refused(RefusalReason::SelfLoop)
        );
        assert_eq!(
            can_connect(&step, &input, &index(), &avail),
            ConnectionDecision::Refused(RefusalReason::InputAsTarget)
        );
        assert_eq!(
            can_connect(&output, &step, &index(), &avail),
            ConnectionDecision::Refused(RefusalReason::OutputAsSource)
        );
    }

    #[test]
    fn test_missing_property_name_falls_back_to_schema() {
        let mut table = BTreeMap::new();
        table.insert("image".to_string(), vec![entry("Crop", "", CompatibleElement::AnyData)]);
        let index = KindCompatibilityIndex::new(table);

        let mut crop = block("Crop", vec![]);
        crop.block_schema.properties.insert(
            "frame".to_string(),
            PropertySchema::union(vec![SchemaOption::Kind(KindOption {
                kind: vec![Kind::new("image")],
                compatible_element: CompatibleElement::AnyData,
            })]),
        );
        let target = Node::from_block("c", &crop, Position::default());
        let input = input_with_camera();
        let avail = recompute(&[input.clone()]);

        let decision = can_connect(&input, &target, &index, &avail);
        assert_eq!(decision.binding().map(|b| b.target_field.as_str()), Some("frame"));
    }
}
