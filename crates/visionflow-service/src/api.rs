//! Remote workflow API
//!
//! The editor consumes three remote collaborators: the block catalog
//! (`describe`), graph persistence and model listing. [`WorkflowApi`] is the
//! seam; [`HttpWorkflowApi`] talks to the REST endpoints over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use workflow_graph::{CatalogDescription, GraphPayload, ModelOption};

use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};

/// Remote operations the editor depends on
#[async_trait]
pub trait WorkflowApi: Send + Sync {
    /// Fetch the block catalog and kind connections
    async fn describe(&self) -> Result<CatalogDescription>;

    /// Load a persisted graph
    async fn load_workflow(&self, workflow_id: &str) -> Result<GraphPayload>;

    /// Persist a graph; saving the same payload twice is a no-op remotely
    async fn save_workflow(&self, workflow_id: &str, payload: &GraphPayload) -> Result<()>;

    /// Models selectable in `model_id` fields
    async fn list_models(&self) -> Result<Vec<ModelOption>>;
}

/// Model listing responses come bare or wrapped
#[derive(Deserialize)]
#[serde(untagged)]
enum ModelList {
    Wrapped { models: Vec<ModelOption> },
    Bare(Vec<ModelOption>),
}

impl ModelList {
    fn into_models(self) -> Vec<ModelOption> {
        match self {
            Self::Wrapped { models } | Self::Bare(models) => models,
        }
    }
}

/// [`WorkflowApi`] over HTTP
pub struct HttpWorkflowApi {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    workspace: Option<String>,
    request_timeout: Duration,
}

impl HttpWorkflowApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            workspace: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            workspace: config.workspace.clone(),
            request_timeout: config.request_timeout(),
            ..Self::new(config.api_url.clone())
        }
    }

    fn workflow_url(&self, workflow_id: &str) -> String {
        match &self.workspace {
            Some(workspace) => format!("{}/{}/workflows/{}", self.base_url, workspace, workflow_id),
            None => format!("{}/workflows/{}", self.base_url, workflow_id),
        }
    }

    fn models_url(&self) -> String {
        match &self.workspace {
            Some(workspace) => format!("{}/{}/models", self.base_url, workspace),
            None => format!("{}/models", self.base_url),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.query(&[("api_key", key.as_str())]),
            None => request,
        }
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        let request = self.authorize(request);
        let request = match timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::Timeout {
                    operation,
                    after: timeout.unwrap_or_default(),
                }
            } else {
                ServiceError::Http(e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            log::error!("{} failed with {}: {}", operation, status, body);
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = self
            .send(operation, request, Some(self.request_timeout))
            .await?;
        let bytes = response.bytes().await.map_err(ServiceError::Http)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl WorkflowApi for HttpWorkflowApi {
    async fn describe(&self) -> Result<CatalogDescription> {
        let url = format!("{}/workflows/blocks/describe", self.base_url);
        let request = self.http_client.post(&url).json(&serde_json::json!({}));
        self.fetch("Catalog fetch", request).await
    }

    async fn load_workflow(&self, workflow_id: &str) -> Result<GraphPayload> {
        let request = self.http_client.get(self.workflow_url(workflow_id));
        self.fetch("Workflow load", request).await
    }

    async fn save_workflow(&self, workflow_id: &str, payload: &GraphPayload) -> Result<()> {
        // The session applies the save deadline around this call.
        let request = self
            .http_client
            .post(self.workflow_url(workflow_id))
            .json(payload);
        self.send("Workflow save", request, None).await?;
        Ok(())
    }

    async fn list_models(&self) -> Result<Vec<ModelOption>> {
        let request = self.http_client.get(self.models_url());
        let list: ModelList = self.fetch("Model listing", request).await?;
        Ok(list.into_models())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let api = HttpWorkflowApi::new("http://localhost:9001/");
        assert_eq!(api.workflow_url("w1"), "http://localhost:9001/workflows/w1");

        let config = ServiceConfig {
            workspace: Some("acme".to_string()),
            ..Default::default()
        };
        let api = HttpWorkflowApi::from_config(&config);
        assert_eq!(api.workflow_url("w1"), "http://localhost:9001/acme/workflows/w1");
        assert_eq!(api.models_url(), "http://localhost:9001/acme/models");
    }

    #[test]
    fn test_model_list_shapes() {
        let wrapped: ModelList =
            serde_json::from_str(r#"{"models": [{"id": "coco/3"}]}"#).unwrap();
        assert_eq!(wrapped.into_models()[0].id, "coco/3");

        let bare: ModelList =
            serde_json::from_str(r#"[{"id": "coco/3", "name": "coco"}]"#).unwrap();
        assert_eq!(bare.into_models()[0].name, "coco");
    }
}
