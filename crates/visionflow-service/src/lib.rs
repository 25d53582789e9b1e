//! VisionFlow Service - the editor's remote boundary
//!
//! Connects a [`workflow_graph::GraphStore`] to the workflow REST API:
//!
//! - [`WorkflowApi`]: catalog fetch, graph load/save and model listing
//! - [`HttpWorkflowApi`]: the reqwest implementation
//! - [`EditorSession`]: one open graph with save sequencing and user notices
//! - [`ServiceConfig`]: endpoint, credentials, timeouts and editor limits

pub mod api;
pub mod config;
pub mod error;
pub mod session;

pub use api::{HttpWorkflowApi, WorkflowApi};
pub use config::{ConfigError, ServiceConfig, ViewportConfig};
pub use error::{Result, ServiceError};
pub use session::{
    EditorSession, ModelFetch, Notice, NoticeLevel, SaveCompletion, SaveOutcome, SaveRequest,
};
