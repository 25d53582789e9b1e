//! Per-field editor state
//!
//! A field on a kind-tagged union property is in one of two modes:
//!
//! - **Reference**: a closed choice over the filtered candidate list;
//!   selecting a candidate commits immediately.
//! - **Literal**: a typed editor whose edits are staged locally and only
//!   committed on blur.
//!
//! Switching Literal -> Reference requires at least one candidate; switching
//! Reference -> Literal is always allowed and commits the literal type's
//! empty value. Commits are returned as [`FieldCommit`] values for the
//! caller to apply to the Graph Store.

use serde::{Deserialize, Serialize};
use workflow_graph::{GraphStore, LiteralType, NodeId};

use crate::candidates::{
    candidates_for, model_candidates, reference_candidates, Candidate, FormContext,
};
use crate::editor::PropertyEditorKind;

/// Edit mode of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldMode {
    Literal,
    Reference,
}

/// A value ready to be written into a node's form data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldCommit {
    pub node_id: NodeId,
    pub field: String,
    pub value: serde_json::Value,
}

impl FieldCommit {
    /// Write the value through the store's mutation path
    pub fn apply(self, store: &mut GraphStore) -> workflow_graph::Result<()> {
        store.set_form_field(&self.node_id, &self.field, self.value)
    }
}

/// Editor state of one form field
#[derive(Debug, Clone)]
pub struct FieldEditor {
    node_id: NodeId,
    field: String,
    editor: PropertyEditorKind,
    mode: FieldMode,
    required: bool,
    /// Last committed value
    value: serde_json::Value,
    /// Uncommitted literal text
    draft: Option<String>,
    /// Parse error of the current draft
    error: Option<String>,
}

impl FieldEditor {
    /// Create the editor and pick its initial mode
    ///
    /// Unions start in Reference mode when every member is kind-tagged, or
    /// when the current value is a string containing `$`.
    pub fn new(
        node_id: impl Into<NodeId>,
        field: impl Into<String>,
        editor: PropertyEditorKind,
        value: Option<&serde_json::Value>,
        required: bool,
    ) -> Self {
        let value = value.cloned().unwrap_or(serde_json::Value::Null);
        let mode = initial_mode(&editor, &value);
        Self {
            node_id: node_id.into(),
            field: field.into(),
            editor,
            mode,
            required,
            value,
            draft: None,
            error: None,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn editor(&self) -> &PropertyEditorKind {
        &self.editor
    }

    pub fn mode(&self) -> FieldMode {
        self.mode
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn draft(&self) -> Option<&str> {
        self.draft.as_deref()
    }

    /// Field-local error text for malformed literal input
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Text shown by the editor: the draft, or the committed value
    pub fn display_text(&self) -> String {
        if let Some(draft) = &self.draft {
            return draft.clone();
        }
        match &self.value {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Reference choices for Reference mode
    pub fn reference_choices(&self, ctx: &FormContext<'_>) -> Vec<Candidate> {
        match self.editor.reference_spec() {
            Some(spec) => reference_candidates(spec, ctx),
            None => Vec::new(),
        }
    }

    /// Literal choices among fetched models (model pickers only)
    pub fn model_choices(&self, ctx: &FormContext<'_>) -> Vec<Candidate> {
        match self.editor {
            PropertyEditorKind::ModelPicker(_) => model_candidates(&ctx.models),
            _ => Vec::new(),
        }
    }

    /// Every choice the current editor offers
    pub fn choices(&self, ctx: &FormContext<'_>) -> Vec<Candidate> {
        candidates_for(&self.editor, ctx)
    }

    /// Whether Literal -> Reference is currently permitted
    pub fn can_switch_to_reference(&self, ctx: &FormContext<'_>) -> bool {
        self.mode == FieldMode::Reference || !self.reference_choices(ctx).is_empty()
    }

    /// Enter Reference mode; returns false if no candidate exists
    ///
    /// The committed value is left as is and any staged literal is dropped.
    pub fn switch_to_reference(&mut self, ctx: &FormContext<'_>) -> bool {
        if !self.can_switch_to_reference(ctx) {
            return false;
        }
        self.mode = FieldMode::Reference;
        self.draft = None;
        self.error = None;
        true
    }

    /// Enter Literal mode, committing the literal type's empty value
    ///
    /// Returns None when the field is already in Literal mode.
    pub fn switch_to_literal(&mut self) -> Option<FieldCommit> {
        if self.mode == FieldMode::Literal {
            return None;
        }
        self.mode = FieldMode::Literal;
        self.draft = None;
        self.error = None;
        Some(self.commit(self.editor.literal_type().empty_value()))
    }

    /// Choose a candidate, committing immediately
    ///
    /// Reference candidates put the field in Reference mode; model choices are
    /// literal values.
    pub fn select(&mut self, candidate: &Candidate) -> FieldCommit {
        self.mode = if candidate.is_reference() {
            FieldMode::Reference
        } else {
            FieldMode::Literal
        };
        self.draft = None;
        self.error = None;
        self.commit(serde_json::Value::String(candidate.value.clone()))
    }

    /// Stage literal text without committing
    ///
    /// Malformed text is kept and flagged. Ignored in Reference mode.
    pub fn stage(&mut self, text: impl Into<String>) {
        if self.mode != FieldMode::Literal {
            return;
        }
        let text = text.into();
        self.error = parse_literal(self.editor.literal_type(), &text).err();
        self.draft = Some(text);
    }

    /// Commit the staged literal on focus loss
    ///
    /// A malformed draft falls back to committing the raw string. Returns
    /// None when nothing was staged.
    pub fn blur(&mut self) -> Option<FieldCommit> {
        let draft = self.draft.take()?;
        let value = match parse_literal(self.editor.literal_type(), &draft) {
            Ok(value) => value,
            Err(e) => {
                log::debug!(
                    "Committing malformed literal for '{}' as text: {}",
                    self.field,
                    e
                );
                serde_json::Value::String(draft)
            }
        };
        self.error = None;
        Some(self.commit(value))
    }

    /// Refresh the committed value after an external change
    ///
    /// A pending draft is kept; a reference value forces Reference mode.
    pub fn sync(&mut self, value: Option<&serde_json::Value>) {
        self.value = value.cloned().unwrap_or(serde_json::Value::Null);
        if self.draft.is_none()
            && self.editor.supports_reference()
            && looks_like_reference(&self.value)
        {
            self.mode = FieldMode::Reference;
        }
    }

    fn commit(&mut self, value: serde_json::Value) -> FieldCommit {
        self.value = value.clone();
        FieldCommit {
            node_id: self.node_id.clone(),
            field: self.field.clone(),
            value,
        }
    }
}

fn initial_mode(editor: &PropertyEditorKind, value: &serde_json::Value) -> FieldMode {
    match editor.reference_spec() {
        None => FieldMode::Literal,
        Some(spec) if !spec.offers_references() => FieldMode::Literal,
        Some(_) if looks_like_reference(value) => FieldMode::Reference,
        Some(spec) if spec.reference_only => FieldMode::Reference,
        Some(_) => FieldMode::Literal,
    }
}

fn looks_like_reference(value: &serde_json::Value) -> bool {
    value.as_str().is_some_and(|s| s.contains('$'))
}

/// Parse literal editor text into a value of `literal_type`
pub fn parse_literal(literal_type: LiteralType, text: &str) -> Result<serde_json::Value, String> {
    match literal_type {
        LiteralType::String | LiteralType::Unknown => {
            Ok(serde_json::Value::String(text.to_string()))
        }
        LiteralType::Number => {
            let number: f64 = text
                .trim()
                .parse()
                .map_err(|_| format!("'{}' is not a number", text))?;
            serde_json::Number::from_f64(number)
                .map(serde_json::Value::Number)
                .ok_or_else(|| format!("'{}' is not a finite number", text))
        }
        LiteralType::Integer => text
            .trim()
            .parse::<i64>()
            .map(serde_json::Value::from)
            .map_err(|_| format!("'{}' is not an integer", text)),
        LiteralType::Boolean => match text.trim() {
            "true" => Ok(serde_json::Value::Bool(true)),
            "false" => Ok(serde_json::Value::Bool(false)),
            _ => Err(format!("'{}' is not true or false", text)),
        },
        LiteralType::Array => match serde_json::from_str(text) {
            Ok(serde_json::Value::Array(items)) => Ok(serde_json::Value::Array(items)),
            Ok(_) => Err("Expected a JSON array".to_string()),
            Err(e) => Err(format!("Invalid JSON: {}", e)),
        },
        LiteralType::Object => match serde_json::from_str(text) {
            Ok(serde_json::Value::Object(map)) => Ok(serde_json::Value::Object(map)),
            Ok(_) => Err("Expected a JSON object".to_string()),
            Err(e) => Err(format!("Invalid JSON: {}", e)),
        },
        LiteralType::Null => match text.trim() {
            "" | "null" => Ok(serde_json::Value::Null),
            _ => Err("Expected null".to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::{ReferenceScope, ReferenceSpec};
    use serde_json::json;
    use workflow_graph::{
        recompute, BuiltInKind, CompatibleElement, Kind, KindAvailabilityMap, KindOption, Node,
        Position,
    };

    fn image_union(reference_only: bool) -> PropertyEditorKind {
        PropertyEditorKind::Reference(ReferenceSpec {
            scope: ReferenceScope::Declared(vec![KindOption {
                kind: vec![Kind::new("image")],
                compatible_element: CompatibleElement::AnyData,
            }]),
            literal: if reference_only { None } else { Some(LiteralType::String) },
            reference_only,
        })
    }

    fn availability_with_camera() -> KindAvailabilityMap {
        let mut input = Node::built_in(BuiltInKind::Input, Position::default());
        input
            .data
            .form_data
            .insert("sources".to_string(), json!([{"name": "cam1"}]));
        recompute(&[input])
    }

    #[test]
    fn test_initial_modes() {
        let literal =
            FieldEditor::new("n", "image", image_union(false), Some(&json!("hello")), false);
        assert_eq!(literal.mode(), FieldMode::Literal);

        let forced = FieldEditor::new(
            "n",
            "image",
            image_union(false),
            Some(&json!("$inputs.cam1")),
            false,
        );
        assert_eq!(forced.mode(), FieldMode::Reference);

        let kinds_only = FieldEditor::new("n", "image", image_union(true), None, false);
        assert_eq!(kinds_only.mode(), FieldMode::Reference);

        let plain = FieldEditor::new(
            "n",
            "x",
            PropertyEditorKind::Literal(LiteralType::String),
            Some(&json!("$")),
            false,
        );
        assert_eq!(plain.mode(), FieldMode::Literal);
    }

    #[test]
    fn test_mode_switch_round_trip_resets_value() {
        let availability = availability_with_camera();
        let ctx = FormContext::new(&availability);
        let mut field =
            FieldEditor::new("n", "image", image_union(false), Some(&json!("hello")), false);

        assert!(field.switch_to_reference(&ctx));
        assert_eq!(field.value(), &json!("hello"));

        let commit = field.switch_to_literal().unwrap();
        assert_eq!(commit.value, json!(""));
        assert_eq!(field.value(), &json!(""));
        assert_eq!(field.mode(), FieldMode::Literal);
    }

    #[test]
    fn test_reference_requires_candidates() {
        let availability = KindAvailabilityMap::new();
        let ctx = FormContext::new(&availability);
        let mut field = FieldEditor::new("n", "image", image_union(false), None, false);
        assert!(!field.switch_to_reference(&ctx));
        assert_eq!(field.mode(), FieldMode::Literal);
    }

    #[test]
    fn test_selecting_commits_immediately() {
        let availability = availability_with_camera();
        let ctx = FormContext::new(&availability);
        let mut field = FieldEditor::new("n", "image", image_union(true), None, false);

        let choices = field.reference_choices(&ctx);
        let commit = field.select(&choices[0]);
        assert_eq!(commit.field, "image");
        assert_eq!(commit.value, json!("$inputs.cam1"));
    }

    #[test]
    fn test_literal_edits_commit_on_blur_only() {
        let mut field = FieldEditor::new(
            "n",
            "confidence",
            PropertyEditorKind::Literal(LiteralType::Number),
            Some(&json!(0.4)),
            false,
        );
        field.stage("0.");
        field.stage("0.5");
        assert_eq!(field.value(), &json!(0.4));
        assert_eq!(field.display_text(), "0.5");

        let commit = field.blur().unwrap();
        assert_eq!(commit.value, json!(0.5));
        assert!(field.blur().is_none());
    }

    #[test]
    fn test_malformed_literal_falls_back_to_string() {
        let mut field = FieldEditor::new(
            "n",
            "classes",
            PropertyEditorKind::Literal(LiteralType::Array),
            None,
            true,
        );
        field.stage("[\"car\",");
        assert!(field.error().is_some());
        assert_eq!(field.display_text(), "[\"car\",");

        let commit = field.blur().unwrap();
        assert_eq!(commit.value, json!("[\"car\","));
        assert!(field.error().is_none());
        assert!(field.is_required());
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(parse_literal(LiteralType::Integer, " 7 ").unwrap(), json!(7));
        assert!(parse_literal(LiteralType::Integer, "7.5").is_err());
        assert_eq!(parse_literal(LiteralType::Boolean, "true").unwrap(), json!(true));
        assert_eq!(parse_literal(LiteralType::Object, "{\"a\":1}").unwrap(), json!({"a": 1}));
        assert!(parse_literal(LiteralType::Object, "[1]").is_err());
        assert!(parse_literal(LiteralType::Number, "abc").is_err());
    }

    #[test]
    fn test_sync_forces_reference_for_bound_value() {
        let mut field = FieldEditor::new("n", "image", image_union(false), None, false);
        field.sync(Some(&json!("$inputs.cam1")));
        assert_eq!(field.mode(), FieldMode::Reference);
    }

    #[test]
    fn test_literal_model_id_offers_fetched_models() {
        let schema = workflow_graph::PropertySchema::literal(LiteralType::String);
        let editor = PropertyEditorKind::resolve("model_id", &schema);
        let availability = availability_with_camera();
        let models = vec![workflow_graph::ModelOption {
            id: "coco/3".to_string(),
            name: "coco".to_string(),
            version: "3".to_string(),
            task_type: "object-detection".to_string(),
        }];
        let ctx = FormContext::new(&availability).with_models(models);

        let mut field = FieldEditor::new("n", "model_id", editor, Some(&json!("$x")), false);
        assert_eq!(field.mode(), FieldMode::Literal);
        assert!(!field.switch_to_reference(&ctx));

        let choices = field.choices(&ctx);
        assert_eq!(choices.len(), 1);
        let commit = field.select(&choices[0]);
        assert_eq!(commit.value, json!("coco/3"));
        assert_eq!(field.mode(), FieldMode::Literal);
    }
}
