//! Node forms
//!
//! [`NodeForm`] builds one [`FieldEditor`] per property of a custom node.
//! The Input and Output nodes have no block schema; [`InputForm`] and
//! [`OutputForm`] edit their `sources` and `params` lists instead.

use std::collections::HashSet;

use workflow_graph::{BuiltInKind, Node, NodeId, Param, Source, SKIP_FIELDS};

use crate::candidates::{reference_candidates, Candidate, FormContext};
use crate::editor::{PropertyEditorKind, ReferenceSpec};
use crate::error::{FormError, Result};
use crate::field::{FieldCommit, FieldEditor};

const NAME_FIELD: &str = "name";
const SOURCES_FIELD: &str = "sources";
const PARAMS_FIELD: &str = "params";

/// Editors for every property of a custom node
#[derive(Debug, Clone)]
pub struct NodeForm {
    node_id: NodeId,
    fields: Vec<FieldEditor>,
}

impl NodeForm {
    /// Build the form from a node's schema and current form data
    ///
    /// `name` comes first, then the remaining properties in schema order.
    /// Skip-listed properties get no editor.
    pub fn for_node(node: &Node) -> Self {
        let schema = &node.data.block_schema;
        let mut names: Vec<&String> = schema
            .properties
            .keys()
            .filter(|name| !SKIP_FIELDS.contains(&name.as_str()))
            .collect();
        names.sort_by_key(|name| name.as_str() != NAME_FIELD);

        let fields = names
            .into_iter()
            .filter_map(|name| {
                let property = schema.properties.get(name)?;
                Some(FieldEditor::new(
                    node.id.clone(),
                    name.clone(),
                    PropertyEditorKind::resolve(name, property),
                    node.data.form_data.get(name),
                    schema.is_required(name),
                ))
            })
            .collect();

        Self {
            node_id: node.id.clone(),
            fields,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn fields(&self) -> &[FieldEditor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldEditor> {
        self.fields.iter().find(|f| f.field() == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Result<&mut FieldEditor> {
        self.fields
            .iter_mut()
            .find(|f| f.field() == name)
            .ok_or_else(|| FormError::UnknownField(name.to_string()))
    }

    /// Refresh every editor from the node's current form data
    pub fn sync(&mut self, node: &Node) {
        for field in &mut self.fields {
            field.sync(node.data.form_data.get(field.field()));
        }
    }
}

fn expect_built_in(node: &Node, kind: BuiltInKind) -> Result<()> {
    if node.built_in_kind() == Some(kind) {
        Ok(())
    } else {
        Err(FormError::WrongNode {
            node_id: node.id.clone(),
            expected: kind.label(),
        })
    }
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(FormError::EmptyName);
    }
    Ok(name.to_string())
}

fn list_commit<T: serde::Serialize>(node: &Node, field: &str, items: &[T]) -> Result<FieldCommit> {
    Ok(FieldCommit {
        node_id: node.id.clone(),
        field: field.to_string(),
        value: serde_json::to_value(items)?,
    })
}

/// Editor of the Input node's sources and params
///
/// Source and param names share the `$inputs.` namespace and must be unique
/// across both lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputForm;

impl InputForm {
    fn taken(node: &Node) -> HashSet<String> {
        node.sources()
            .into_iter()
            .map(|s| s.name)
            .chain(node.params().into_iter().map(|p| p.name))
            .collect()
    }

    fn check_unique(node: &Node, name: &str) -> Result<()> {
        if Self::taken(node).contains(name) {
            return Err(FormError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    /// Add an image source
    pub fn add_source(node: &Node, name: &str) -> Result<FieldCommit> {
        expect_built_in(node, BuiltInKind::Input)?;
        let name = validate_name(name)?;
        Self::check_unique(node, &name)?;

        let mut sources = node.sources();
        sources.push(Source::new(name));
        list_commit(node, SOURCES_FIELD, &sources)
    }

    pub fn remove_source(node: &Node, name: &str) -> Result<FieldCommit> {
        expect_built_in(node, BuiltInKind::Input)?;
        let mut sources = node.sources();
        let before = sources.len();
        sources.retain(|s| s.name != name);
        if sources.len() == before {
            return Err(FormError::EntryNotFound(name.to_string()));
        }
        list_commit(node, SOURCES_FIELD, &sources)
    }

    /// Add a workflow parameter; an unset type means `string`
    pub fn add_param(node: &Node, param: Param) -> Result<FieldCommit> {
        expect_built_in(node, BuiltInKind::Input)?;
        let name = validate_name(&param.name)?;
        Self::check_unique(node, &name)?;

        let mut params = node.params();
        params.push(Param { name, ..param });
        list_commit(node, PARAMS_FIELD, &params)
    }

    pub fn remove_param(node: &Node, name: &str) -> Result<FieldCommit> {
        expect_built_in(node, BuiltInKind::Input)?;
        remove_param(node, name)
    }
}

fn remove_param(node: &Node, name: &str) -> Result<FieldCommit> {
    let mut params = node.params();
    let before = params.len();
    params.retain(|p| p.name != name);
    if params.len() == before {
        return Err(FormError::EntryNotFound(name.to_string()));
    }
    list_commit(node, PARAMS_FIELD, &params)
}

/// Editor of the Output node's params and their bound references
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputForm;

impl OutputForm {
    /// Editor used for every Output param selector
    pub fn selector_editor() -> PropertyEditorKind {
        PropertyEditorKind::output_param()
    }

    /// Candidates for a selector: every available reference, any kind
    pub fn candidates(ctx: &FormContext<'_>) -> Vec<Candidate> {
        reference_candidates(&ReferenceSpec::any_kind(), ctx)
    }

    /// Add an unbound output param
    pub fn add_param(node: &Node, name: &str) -> Result<FieldCommit> {
        expect_built_in(node, BuiltInKind::Output)?;
        let name = validate_name(name)?;
        let mut params = node.params();
        if params.iter().any(|p| p.name == name) {
            return Err(FormError::DuplicateName(name));
        }
        params.push(Param::new(name));
        list_commit(node, PARAMS_FIELD, &params)
    }

    pub fn remove_param(node: &Node, name: &str) -> Result<FieldCommit> {
        expect_built_in(node, BuiltInKind::Output)?;
        remove_param(node, name)
    }

    /// Bind an output param to a reference
    pub fn bind_param(node: &Node, name: &str, selector: &str) -> Result<FieldCommit> {
        expect_built_in(node, BuiltInKind::Output)?;
        let mut params = node.params();
        let param = params
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| FormError::EntryNotFound(name.to_string()))?;
        param.selector = Some(selector.to_string());
        list_commit(node, PARAMS_FIELD, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldMode;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use workflow_graph::{
        BlockDescription, BlockSchema, CompatibleElement, GraphStore, Kind, KindCompatibilityIndex,
        KindOption, LiteralType, OutputDefinition, Position, PropertySchema, Required, SchemaOption,
    };

    fn detector() -> BlockDescription {
        let mut properties = BTreeMap::new();
        properties.insert("type".to_string(), PropertySchema::literal(LiteralType::String));
        properties.insert(
            "confidence".to_string(),
            PropertySchema::literal(LiteralType::Number).with_default(json!(0.4)),
        );
        properties.insert("name".to_string(), PropertySchema::literal(LiteralType::String));
        properties.insert(
            "image".to_string(),
            PropertySchema::union(vec![SchemaOption::Kind(KindOption {
                kind: vec![Kind::new("image")],
                compatible_element: CompatibleElement::AnyData,
            })]),
        );
        properties.insert(
            "predictions".to_string(),
            PropertySchema::union(vec![SchemaOption::Kind(KindOption {
                kind: vec![Kind::new("object_detection_prediction")],
                compatible_element: CompatibleElement::StepOutput,
            })]),
        );
        BlockDescription {
            manifest_type_identifier: "Detector".to_string(),
            human_friendly_block_name: "Detector".to_string(),
            block_schema: BlockSchema {
                properties,
                required: Required::Fields(vec!["name".to_string(), "image".to_string()]),
                block_type: "model".to_string(),
            },
            outputs_manifest: vec![OutputDefinition::new(
                "predictions",
                &["object_detection_prediction"],
            )],
        }
    }

    #[test]
    fn test_form_layout() {
        let node = Node::from_block("d", &detector(), Position::default());
        let form = NodeForm::for_node(&node);
        let names: Vec<&str> = form.fields().iter().map(|f| f.field()).collect();
        assert_eq!(names, vec!["name", "confidence", "image", "predictions"]);
        assert!(form.field("name").unwrap().is_required());
        assert!(!form.field("confidence").unwrap().is_required());
        assert!(form.field("type").is_none());
        assert_eq!(form.field("confidence").unwrap().value(), &json!(0.4));
    }

    #[test]
    fn test_self_outputs_never_offered() {
        let mut store = GraphStore::new(Arc::new(KindCompatibilityIndex::default()));
        let id = store.add_block(&detector(), Position::default()).unwrap();
        let other = store.add_block(&detector(), Position::default()).unwrap();
        store.set_form_field(&id, "name", json!("detector_1")).unwrap();
        store.set_form_field(&other, "name", json!("detector_2")).unwrap();

        let node = store.node(&id).unwrap();
        let ctx = FormContext::for_node(&store, node);
        let form = NodeForm::for_node(node);
        let values: Vec<String> = form
            .field("predictions")
            .unwrap()
            .reference_choices(&ctx)
            .into_iter()
            .map(|c| c.value)
            .collect();
        assert_eq!(values, vec!["$steps.detector_2.predictions".to_string()]);
    }

    #[test]
    fn test_commit_goes_through_store() {
        let mut store = GraphStore::new(Arc::new(KindCompatibilityIndex::default()));
        let input_id = store.built_in(BuiltInKind::Input).unwrap().id.clone();
        let commit = InputForm::add_source(store.node(&input_id).unwrap(), "cam1").unwrap();
        commit.apply(&mut store).unwrap();

        let id = store.add_block(&detector(), Position::default()).unwrap();
        let node = store.node(&id).unwrap();
        let ctx = FormContext::for_node(&store, node);
        let mut form = NodeForm::for_node(node);
        let field = form.field_mut("image").unwrap();
        assert_eq!(field.mode(), FieldMode::Reference);
        let choice = field.reference_choices(&ctx).remove(0);
        let commit = field.select(&choice);
        commit.apply(&mut store).unwrap();

        assert_eq!(store.node(&id).unwrap().data.form_data["image"], "$inputs.cam1");
    }

    #[test]
    fn test_input_names_are_unique_and_non_empty() {
        let mut input = Node::built_in(BuiltInKind::Input, Position::default());
        let commit = InputForm::add_source(&input, "cam1").unwrap();
        input.data.form_data.insert(commit.field, commit.value);

        assert!(matches!(InputForm::add_source(&input, " "), Err(FormError::EmptyName)));
        assert!(matches!(
            InputForm::add_param(&input, Param::new("cam1")),
            Err(FormError::DuplicateName(_))
        ));

        let commit =
            InputForm::add_param(&input, Param::new("threshold").with_type("float")).unwrap();
        assert_eq!(commit.value, json!([{"name": "threshold", "type": "float"}]));

        let commit = InputForm::remove_source(&input, "cam1").unwrap();
        assert_eq!(commit.value, json!([]));
        assert!(InputForm::remove_source(&input, "cam9").is_err());
    }

    #[test]
    fn test_output_params() {
        let mut output = Node::built_in(BuiltInKind::Output, Position::default());
        let commit = OutputForm::add_param(&output, "boxes").unwrap();
        output.data.form_data.insert(commit.field, commit.value);

        let commit = OutputForm::bind_param(&output, "boxes", "$steps.det.predictions").unwrap();
        assert_eq!(
            commit.value,
            json!([{"name": "boxes", "selector": "$steps.det.predictions"}])
        );
        assert!(OutputForm::bind_param(&output, "missing", "$steps.det.x").is_err());

        let input = Node::built_in(BuiltInKind::Input, Position::default());
        assert!(matches!(
            OutputForm::add_param(&input, "x"),
            Err(FormError::WrongNode { .. })
        ));
    }
}
