//! Error types for node forms

use thiserror::Error;

/// Result type alias using FormError
pub type Result<T> = std::result::Result<T, FormError>;

/// Errors raised by form operations
///
/// Refused mode switches and malformed literal text are not errors; they are
/// reported through [`FieldEditor`](crate::field::FieldEditor) state.
#[derive(Debug, Error)]
pub enum FormError {
    /// The form has no field with this name
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// The operation expects a specific built-in node
    #[error("Node '{node_id}' is not the {expected} node")]
    WrongNode { node_id: String, expected: &'static str },

    /// Source and param names must be non-empty
    #[error("Name must not be empty")]
    EmptyName,

    /// Source and param names share the `$inputs.` namespace
    #[error("Name '{0}' is already used")]
    DuplicateName(String),

    /// No entry with this name exists
    #[error("No entry named '{0}'")]
    EntryNotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Graph store error while applying a commit
    #[error(transparent)]
    Graph(#[from] workflow_graph::GraphError),
}
