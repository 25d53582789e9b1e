//! Property editor dispatch
//!
//! Each block property is classified once into a closed
//! [`PropertyEditorKind`]; renderers match on it exhaustively instead of
//! re-inspecting the schema.

use workflow_graph::{KindOption, LiteralType, PropertySchema, PropertyShape};

/// Which references a reference editor may offer
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceScope {
    /// Only references of the declared kinds, role-compatible
    Declared(Vec<KindOption>),
    /// References of every kind (Output params)
    AnyKind,
}

/// Reference-capable editor configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSpec {
    pub scope: ReferenceScope,
    /// Type of the literal branch, if the union has one
    pub literal: Option<LiteralType>,
    /// True when every union member is kind-tagged
    pub reference_only: bool,
}

impl ReferenceSpec {
    /// Reference editor over every kind, without a literal branch
    pub fn any_kind() -> Self {
        Self {
            scope: ReferenceScope::AnyKind,
            literal: None,
            reference_only: true,
        }
    }

    /// Whether any reference can ever be offered
    pub fn offers_references(&self) -> bool {
        !matches!(&self.scope, ReferenceScope::Declared(kinds) if kinds.is_empty())
    }

    /// Literal type used in literal mode; a string when the union has none
    pub fn literal_type(&self) -> LiteralType {
        self.literal.unwrap_or(LiteralType::String)
    }
}

/// Editor strategy of one property
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyEditorKind {
    /// Typed literal input
    Literal(LiteralType),
    /// Reference/literal toggle over a kind-tagged union
    Reference(ReferenceSpec),
    /// Choice among fetched models, plus a reference toggle when the schema
    /// is a kind-tagged union
    ModelPicker(ReferenceSpec),
}

/// Field-name fragment that marks a model identifier
const MODEL_ID_FRAGMENT: &str = "model_id";

impl PropertyEditorKind {
    /// Classify a property by its name and schema
    pub fn resolve(name: &str, schema: &PropertySchema) -> Self {
        let is_model_id = name.contains(MODEL_ID_FRAGMENT);
        match schema.shape() {
            PropertyShape::Literal(literal_type) if is_model_id => {
                Self::ModelPicker(ReferenceSpec {
                    scope: ReferenceScope::Declared(Vec::new()),
                    literal: Some(literal_type),
                    reference_only: false,
                })
            }
            PropertyShape::Literal(literal_type) => Self::Literal(literal_type),
            PropertyShape::Union {
                kind_options,
                literal,
                all_kinds,
            } => {
                let spec = ReferenceSpec {
                    scope: ReferenceScope::Declared(kind_options),
                    literal,
                    reference_only: all_kinds,
                };
                if is_model_id {
                    Self::ModelPicker(spec)
                } else {
                    Self::Reference(spec)
                }
            }
        }
    }

    /// Editor of an Output node param selector
    pub fn output_param() -> Self {
        Self::Reference(ReferenceSpec::any_kind())
    }

    pub fn reference_spec(&self) -> Option<&ReferenceSpec> {
        match self {
            Self::Literal(_) => None,
            Self::Reference(spec) | Self::ModelPicker(spec) => Some(spec),
        }
    }

    /// Whether the field can toggle into reference mode at all
    pub fn supports_reference(&self) -> bool {
        self.reference_spec().is_some_and(ReferenceSpec::offers_references)
    }

    /// Type edited in literal mode
    pub fn literal_type(&self) -> LiteralType {
        match self {
            Self::Literal(literal_type) => *literal_type,
            Self::Reference(spec) | Self::ModelPicker(spec) => spec.literal_type(),
        }
    }
}
