//! Error types for the editor service

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias using ServiceError
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors raised at the remote boundary and by the editor session
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote API answered with a non-success status
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    /// The client deadline elapsed; the remote outcome is unknown
    #[error("{operation} timed out after {}s; the outcome is unknown", .after.as_secs())]
    Timeout { operation: &'static str, after: Duration },

    /// A response body did not have the expected shape
    #[error("Failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A save is pending; graph mutations are refused until it completes
    #[error("A save is in progress")]
    Busy,

    /// The block catalog must be fetched before a graph is opened
    #[error("The block catalog has not been loaded")]
    NoCatalog,

    /// No graph has been opened in the session yet
    #[error("No workflow is open")]
    NoWorkflow,

    #[error(transparent)]
    Graph(#[from] workflow_graph::GraphError),

    #[error(transparent)]
    Form(#[from] workflow_forms::FormError),
}

impl ServiceError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
