//! Error types for the workflow graph

use thiserror::Error;

/// Result type alias using GraphError
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised by Graph Store operations on malformed input.
///
/// Connection refusals are not errors; see
/// [`ConnectionDecision`](crate::connection::ConnectionDecision).
#[derive(Debug, Error)]
pub enum GraphError {
    /// No node with this id exists
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// No edge with this id exists
    #[error("Edge not found: {0}")]
    EdgeNotFound(String),

    /// Built-in Input/Output nodes cannot be removed
    #[error("Built-in node '{0}' cannot be deleted")]
    BuiltInNodeNotDeletable(String),

    /// A custom node tried to use a reserved manifest identifier
    #[error("Manifest identifier '{0}' is reserved for built-in nodes")]
    ReservedIdentifier(String),

    /// A node with this id already exists
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    /// A payload does not describe a structurally valid graph
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),
}

impl GraphError {
    /// Create an invalid graph error with a message
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidGraph(msg.into())
    }
}
