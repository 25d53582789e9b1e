//! Candidate lists for reference editors
//!
//! Candidates are drawn from the current Kind Availability Map, filtered by
//! the property's declared kinds and roles, deduplicated, and stripped of the
//! editing node's own outputs.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use workflow_graph::{
    BuiltInKind, GraphStore, KindAvailabilityMap, ModelOption, Node, PropertyDefinition,
    WILDCARD_KIND,
};

use crate::editor::{PropertyEditorKind, ReferenceScope, ReferenceSpec};

/// Prefix of legacy output references a node may not use on itself
const OUTPUT_PREFIX: &str = "$output.";

/// Where a candidate comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CandidateSource {
    /// An availability entry under `kind`
    Reference { kind: String, manifest_type_identifier: String },
    /// A fetched model identifier (a literal choice)
    Model,
}

/// One selectable value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub value: String,
    pub label: String,
    #[serde(flatten)]
    pub source: CandidateSource,
}

impl Candidate {
    fn reference(kind: &str, definition: &PropertyDefinition) -> Self {
        let label = if definition.property_description.is_empty() {
            definition.property_name.clone()
        } else {
            format!(
                "{} ({})",
                definition.property_name, definition.property_description
            )
        };
        Self {
            value: definition.property_name.clone(),
            label,
            source: CandidateSource::Reference {
                kind: kind.to_string(),
                manifest_type_identifier: definition.manifest_type_identifier.clone(),
            },
        }
    }

    fn model(model: &ModelOption) -> Self {
        let label = match (model.name.is_empty(), model.version.is_empty()) {
            (true, _) => model.id.clone(),
            (false, true) => model.name.clone(),
            (false, false) => format!("{} v{}", model.name, model.version),
        };
        Self {
            value: model.id.clone(),
            label,
            source: CandidateSource::Model,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.source, CandidateSource::Reference { .. })
    }
}

/// Graph state a form reads while editing one node
#[derive(Debug, Clone)]
pub struct FormContext<'a> {
    pub availability: &'a KindAvailabilityMap,
    /// Step name of the node being edited
    pub node_name: Option<String>,
    /// Models fetched into the Input node
    pub models: Vec<ModelOption>,
}

impl<'a> FormContext<'a> {
    pub fn new(availability: &'a KindAvailabilityMap) -> Self {
        Self {
            availability,
            node_name: None,
            models: Vec::new(),
        }
    }

    /// Context for editing `node` inside `store`
    pub fn for_node(store: &'a GraphStore, node: &Node) -> Self {
        Self {
            availability: store.availability(),
            node_name: node.step_name().map(str::to_string),
            models: store
                .built_in(BuiltInKind::Input)
                .map(|input| input.models())
                .unwrap_or_default(),
        }
    }

    pub fn with_node_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = Some(name.into());
        self
    }

    pub fn with_models(mut self, models: Vec<ModelOption>) -> Self {
        self.models = models;
        self
    }
}

/// Whether `reference` points at an output of the node named `node_name`
pub fn is_self_reference(reference: &str, node_name: Option<&str>) -> bool {
    let Some(name) = node_name.filter(|n| !n.is_empty()) else {
        return false;
    };
    reference.starts_with(&workflow_graph::step_prefix(name))
        || reference.starts_with(&format!("{}{}.", OUTPUT_PREFIX, name))
}

/// Reference candidates allowed by `spec`
pub fn reference_candidates(spec: &ReferenceSpec, ctx: &FormContext<'_>) -> Vec<Candidate> {
    let mut found: Vec<(&str, &PropertyDefinition)> = Vec::new();

    match &spec.scope {
        ReferenceScope::AnyKind => {
            for (kind, definitions) in ctx.availability {
                found.extend(definitions.iter().map(|d| (kind.as_str(), d)));
            }
        }
        ReferenceScope::Declared(options) => {
            for option in options {
                for kind in &option.kind {
                    let accepts = |d: &&PropertyDefinition| {
                        option.compatible_element.accepts(d.compatible_element)
                    };
                    if kind.name == WILDCARD_KIND {
                        for (name, definitions) in ctx.availability {
                            found.extend(
                                definitions
                                    .iter()
                                    .filter(accepts)
                                    .map(|d| (name.as_str(), d)),
                            );
                        }
                    } else if let Some(definitions) = ctx.availability.get(&kind.name) {
                        found.extend(
                            definitions
                                .iter()
                                .filter(accepts)
                                .map(|d| (kind.name.as_str(), d)),
                        );
                    }
                }
            }
        }
    }

    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|(_, d)| !is_self_reference(&d.property_name, ctx.node_name.as_deref()))
        .filter(|(_, d)| seen.insert(d.property_name.clone()))
        .map(|(kind, d)| Candidate::reference(kind, d))
        .collect()
}

/// Literal choices among fetched models, deduplicated by id
pub fn model_candidates(models: &[ModelOption]) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    models
        .iter()
        .filter(|m| !m.id.is_empty() && seen.insert(m.id.clone()))
        .map(Candidate::model)
        .collect()
}

/// Every choice an editor offers: references, plus models for model pickers
pub fn candidates_for(editor: &PropertyEditorKind, ctx: &FormContext<'_>) -> Vec<Candidate> {
    match editor {
        PropertyEditorKind::Literal(_) => Vec::new(),
        PropertyEditorKind::Reference(spec) => reference_candidates(spec, ctx),
        PropertyEditorKind::ModelPicker(spec) => {
            let mut all = reference_candidates(spec, ctx);
            all.extend(model_candidates(&ctx.models));
            all
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflow_graph::{
        recompute, BlockDescription, CompatibleElement, Kind, KindOption, OutputDefinition,
        Position,
    };
    use serde_json::json;

    fn step(id: &str, name: &str, kind: &str) -> Node {
        let block = BlockDescription {
            manifest_type_identifier: "Detector".to_string(),
            human_friendly_block_name: "Detector".to_string(),
            block_schema: Default::default(),
            outputs_manifest: vec![OutputDefinition::new("predictions", &[kind])],
        };
        let mut node = Node::from_block(id, &block, Position::default());
        node.data.form_data.insert("name".to_string(), json!(name));
        node
    }

    fn input(sources: &[&str]) -> Node {
        let mut node = Node::built_in(BuiltInKind::Input, Position::default());
        let sources: Vec<_> = sources.iter().map(|s| json!({"name": s})).collect();
        node.data.form_data.insert("sources".to_string(), json!(sources));
        node
    }

    fn declared(kind: &str, role: CompatibleElement) -> ReferenceSpec {
        ReferenceSpec {
            scope: ReferenceScope::Declared(vec![KindOption {
                kind: vec![Kind::new(kind)],
                compatible_element: role,
            }]),
            literal: None,
            reference_only: true,
        }
    }

    fn values(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.value.as_str()).collect()
    }

    #[test]
    fn test_own_outputs_are_excluded() {
        let nodes = vec![
            step("a", "detector_1", "predictions"),
            step("b", "detector_2", "predictions"),
        ];
        let availability = recompute(&nodes);
        let ctx = FormContext::new(&availability).with_node_name("detector_1");

        let candidates =
            reference_candidates(&declared("predictions", CompatibleElement::StepOutput), &ctx);
        assert_eq!(values(&candidates), vec!["$steps.detector_2.predictions"]);
    }

    #[test]
    fn test_legacy_output_prefix_is_self_reference() {
        assert!(is_self_reference("$output.det.x", Some("det")));
        assert!(is_self_reference("$steps.det.x", Some("det")));
        assert!(!is_self_reference("$steps.detector.x", Some("det")));
        assert!(!is_self_reference("$steps.det.x", None));
    }

    #[test]
    fn test_roles_filter_candidates() {
        let nodes = vec![input(&["cam1"]), step("a", "det", "image")];
        let availability = recompute(&nodes);
        let ctx = FormContext::new(&availability);

        let any = reference_candidates(&declared("image", CompatibleElement::AnyData), &ctx);
        assert_eq!(values(&any), vec!["$inputs.cam1", "$steps.det.predictions"]);

        let steps_only =
            reference_candidates(&declared("image", CompatibleElement::StepOutput), &ctx);
        assert_eq!(values(&steps_only), vec!["$steps.det.predictions"]);

        let params_only =
            reference_candidates(&declared("image", CompatibleElement::WorkflowParameter), &ctx);
        assert_eq!(values(&params_only), vec!["$inputs.cam1"]);
    }

    #[test]
    fn test_any_kind_scope_and_dedup() {
        let mut a = step("a", "det", "image");
        a.data.outputs_manifest = Some(vec![OutputDefinition::new(
            "predictions",
            &["image", "detections"],
        )]);
        let nodes = vec![input(&["cam1", "cam1"]), a];
        let availability = recompute(&nodes);
        let ctx = FormContext::new(&availability);

        let candidates = reference_candidates(&ReferenceSpec::any_kind(), &ctx);
        assert_eq!(values(&candidates), vec!["$steps.det.predictions", "$inputs.cam1"]);
    }

    #[test]
    fn test_model_picker_adds_models() {
        let availability = KindAvailabilityMap::new();
        let models = vec![
            ModelOption {
                id: "coco/3".to_string(),
                name: "coco".to_string(),
                version: "3".to_string(),
                task_type: "object-detection".to_string(),
            },
            ModelOption {
                id: "coco/3".to_string(),
                name: String::new(),
                version: String::new(),
                task_type: String::new(),
            },
        ];
        let ctx = FormContext::new(&availability).with_models(models);
        let editor = PropertyEditorKind::ModelPicker(declared(
            "roboflow_model_id",
            CompatibleElement::AnyData,
        ));

        let candidates = candidates_for(&editor, &ctx);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].label, "coco v3");
        assert!(!candidates[0].is_reference());
    }
}
