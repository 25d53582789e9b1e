//! Available-reference resolver
//!
//! Computes, for every kind name, the reference strings the current graph
//! makes available: `$inputs.<name>` for Input sources and params, and
//! `$steps.<step>.<output>` for every named step's declared outputs.
//!
//! # Precondition
//!
//! A step contributes references only once `formData.name` is a non-empty
//! string. Unnamed steps with declared outputs are reported separately by
//! [`validate_graph`](crate::validation::validate_graph).
//!
//! The map is always recomputed from scratch; graphs are small enough that
//! incremental patching buys nothing.

use std::collections::BTreeMap;

use crate::catalog::{CompatibleElement, KindName, PropertyDefinition};
use crate::types::{Node, INPUT_MANIFEST};

/// Available references per kind name
pub type KindAvailabilityMap = BTreeMap<KindName, Vec<PropertyDefinition>>;

/// Kind used for Input sources
pub const IMAGE_KIND: &str = "image";

/// Kind used for Input params without a declared type
pub const DEFAULT_PARAM_KIND: &str = "string";

/// Prefix of workflow input references
pub const INPUTS_PREFIX: &str = "$inputs.";

/// Prefix of step output references
pub const STEPS_PREFIX: &str = "$steps.";

/// `$steps.<step>.` prefix shared by every output of a step
pub fn step_prefix(step_name: &str) -> String {
    format!("{}{}.", STEPS_PREFIX, step_name)
}

/// Recompute the availability map for a node set
///
/// Pure; iterating in node order keeps the per-kind lists deterministic.
pub fn recompute(nodes: &[Node]) -> KindAvailabilityMap {
    let mut map = KindAvailabilityMap::new();

    for node in nodes {
        if node.is_input() {
            collect_input_references(node, &mut map);
        } else if node.is_output() {
            continue;
        } else {
            collect_step_references(node, &mut map);
        }
    }

    map
}

fn collect_input_references(node: &Node, map: &mut KindAvailabilityMap) {
    for source in node.sources() {
        if source.name.is_empty() {
            continue;
        }
        push(
            map,
            IMAGE_KIND,
            input_definition(&source.name, format!("Input image '{}'", source.name)),
        );
    }

    for param in node.params() {
        if param.name.is_empty() {
            continue;
        }
        let kind = param
            .param_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_PARAM_KIND);
        push(
            map,
            kind,
            input_definition(&param.name, format!("Input parameter '{}'", param.name)),
        );
    }
}

fn input_definition(name: &str, description: String) -> PropertyDefinition {
    PropertyDefinition {
        manifest_type_identifier: INPUT_MANIFEST.to_string(),
        property_name: format!("{}{}", INPUTS_PREFIX, name),
        property_description: description,
        compatible_element: CompatibleElement::AnyData,
        is_list_element: false,
        is_dict_element: false,
    }
}

fn collect_step_references(node: &Node, map: &mut KindAvailabilityMap) {
    let Some(step_name) = node.step_name() else {
        return;
    };

    for output in node.outputs() {
        for kind in &output.kind {
            push(
                map,
                &kind.name,
                PropertyDefinition {
                    manifest_type_identifier: node.manifest().to_string(),
                    property_name: format!("{}{}", step_prefix(step_name), output.name),
                    property_description: kind
                        .description
                        .clone()
                        .unwrap_or_else(|| output.name.clone()),
                    compatible_element: CompatibleElement::StepOutput,
                    is_list_element: false,
                    is_dict_element: false,
                },
            );
        }
    }
}

fn push(map: &mut KindAvailabilityMap, kind: &str, definition: PropertyDefinition) {
    map.entry(kind.to_string()).or_default().push(definition);
}

/// Whether `reference` is present under any kind
pub fn is_available(map: &KindAvailabilityMap, reference: &str) -> bool {
    map.values()
        .flatten()
        .any(|definition| definition.property_name == reference)
}

/// Whether a form value looks like a reference (`$inputs.*` / `$steps.*`)
pub fn is_reference(value: &str) -> bool {
    value.starts_with(INPUTS_PREFIX) || value.starts_with(STEPS_PREFIX)
}
