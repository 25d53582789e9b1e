//! Workflow Forms - schema-driven configuration forms for workflow nodes
//!
//! Every block property resolves once into a [`PropertyEditorKind`]. Fields on
//! kind-tagged unions toggle between a Reference mode (a closed choice over
//! the Kind Availability Map) and a Literal mode (typed input committed on
//! blur). Edits surface as [`FieldCommit`] values applied through the
//! [`GraphStore`](workflow_graph::GraphStore) mutation path.

pub mod candidates;
pub mod editor;
pub mod error;
pub mod field;
pub mod form;

pub use candidates::{
    candidates_for, is_self_reference, model_candidates, reference_candidates, Candidate,
    CandidateSource, FormContext,
};
pub use editor::{PropertyEditorKind, ReferenceScope, ReferenceSpec};
pub use error::{FormError, Result};
pub use field::{parse_literal, FieldCommit, FieldEditor, FieldMode};
pub use form::{InputForm, NodeForm, OutputForm};
