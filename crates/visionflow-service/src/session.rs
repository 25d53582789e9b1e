//! Editor session
//!
//! Owns one [`GraphStore`] plus everything that crosses the network: the
//! catalog fetch, graph load/save and model listing. Remote calls run outside
//! the store and re-enter on its single mutation path: saves through
//! [`EditorSession::finish_save`], fetched models through the store's
//! node-update bus.
//!
//! While a save is pending, graph mutations are refused with
//! [`ServiceError::Busy`]; selection stays available. A save that exceeds the
//! client deadline is reported as an unknown outcome and never retried
//! automatically.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use workflow_forms::{FieldCommit, NodeForm};
use workflow_graph::{
    BlockCatalog, BuiltInKind, EventSink, FormData, GraphError, GraphPayload, GraphStore,
    KindCompatibilityIndex, Node, NullEventSink,
};

use crate::api::WorkflowApi;
use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};

/// Severity of a user notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A transient notification for the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// How a save ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved,
    /// The remote store rejected the save; the local graph is unchanged
    Failed { message: String },
    /// The deadline elapsed; the remote may or may not have the graph
    Unknown,
}

/// A save detached from the session so it can run without borrowing it
pub struct SaveRequest {
    api: Arc<dyn WorkflowApi>,
    workflow_id: String,
    payload: GraphPayload,
    fingerprint: String,
    timeout: Duration,
}

impl SaveRequest {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn payload(&self) -> &GraphPayload {
        &self.payload
    }

    /// Perform the save under the client deadline
    pub async fn run(self) -> SaveCompletion {
        let result = match tokio::time::timeout(
            self.timeout,
            self.api.save_workflow(&self.workflow_id, &self.payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout {
                operation: "Workflow save",
                after: self.timeout,
            }),
        };
        SaveCompletion {
            fingerprint: self.fingerprint,
            result,
        }
    }
}

/// Result of a [`SaveRequest`], handed back to [`EditorSession::finish_save`]
#[derive(Debug)]
pub struct SaveCompletion {
    fingerprint: String,
    result: Result<()>,
}

/// A model listing detached from the session
pub struct ModelFetch {
    api: Arc<dyn WorkflowApi>,
    bus: workflow_graph::BusHandle,
    input_node: String,
    timeout: Duration,
}

impl ModelFetch {
    /// Fetch models and publish them to the Input node
    ///
    /// Returns the number of models published.
    pub async fn run(self) -> Result<usize> {
        let models = match tokio::time::timeout(self.timeout, self.api.list_models()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ServiceError::Timeout {
                    operation: "Model listing",
                    after: self.timeout,
                })
            }
        };

        let count = models.len();
        let mut patch = FormData::new();
        patch.insert("models".to_string(), serde_json::to_value(models)?);
        if !self.bus.publish(self.input_node, patch) {
            log::debug!("Editor closed before models arrived");
        }
        Ok(count)
    }
}

/// One editing session against a remote API
pub struct EditorSession {
    api: Arc<dyn WorkflowApi>,
    config: ServiceConfig,
    catalog: BlockCatalog,
    index: Arc<KindCompatibilityIndex>,
    catalog_loaded: bool,
    events: Arc<dyn EventSink>,
    workflow_id: Option<String>,
    store: Option<GraphStore>,
    save_pending: bool,
    save_timeout: Duration,
    notices: Vec<Notice>,
}

impl EditorSession {
    pub fn new(api: Arc<dyn WorkflowApi>, config: ServiceConfig) -> Self {
        Self {
            api,
            save_timeout: config.save_timeout(),
            config,
            catalog: BlockCatalog::new(),
            index: Arc::new(KindCompatibilityIndex::default()),
            catalog_loaded: false,
            events: Arc::new(NullEventSink),
            workflow_id: None,
            store: None,
            save_pending: false,
            notices: Vec::new(),
        }
    }

    /// Event sink handed to every store the session opens
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Override the save deadline from the configuration
    pub fn with_save_timeout(mut self, timeout: Duration) -> Self {
        self.save_timeout = timeout;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn catalog(&self) -> &BlockCatalog {
        &self.catalog
    }

    pub fn index(&self) -> &Arc<KindCompatibilityIndex> {
        &self.index
    }

    pub fn workflow_id(&self) -> Option<&str> {
        self.workflow_id.as_deref()
    }

    pub fn store(&self) -> Option<&GraphStore> {
        self.store.as_ref()
    }

    pub fn is_saving(&self) -> bool {
        self.save_pending
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// Remove and return all notices
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        self.notices.push(Notice::new(level, message));
    }

    fn report(&mut self, error: &ServiceError) {
        log::error!("{}", error);
        self.notify(NoticeLevel::Error, error.to_string());
    }

    // =========================================================================
    // Catalog and loading
    // =========================================================================

    /// Fetch the block catalog and kind connections
    ///
    /// Must succeed before a graph is opened. An already open graph keeps
    /// the index it was opened with; reopen it to pick up a new catalog.
    pub async fn fetch_catalog(&mut self) -> Result<()> {
        let timeout = self.config.request_timeout();
        let description = match tokio::time::timeout(timeout, self.api.describe()).await {
            Ok(Ok(description)) => description,
            Ok(Err(e)) => {
                self.report(&e);
                return Err(e);
            }
            Err(_) => {
                let e = ServiceError::Timeout {
                    operation: "Catalog fetch",
                    after: timeout,
                };
                self.report(&e);
                return Err(e);
            }
        };

        self.index = Arc::new(KindCompatibilityIndex::new(description.kinds_connections));
        self.catalog = BlockCatalog::from_blocks(description.blocks);
        self.catalog_loaded = true;
        log::info!(
            "Catalog loaded: {} blocks, {} kinds",
            self.catalog.len(),
            self.index.len()
        );
        Ok(())
    }

    /// Load a workflow from the remote store, replacing the open graph
    pub async fn open(&mut self, workflow_id: &str) -> Result<()> {
        self.check_replaceable()?;

        let timeout = self.config.request_timeout();
        let loaded = tokio::time::timeout(timeout, self.api.load_workflow(workflow_id)).await;
        let payload = match loaded {
            Ok(Ok(payload)) => payload,
            Ok(Err(e)) => {
                self.report(&e);
                return Err(e);
            }
            Err(_) => {
                let e = ServiceError::Timeout {
                    operation: "Workflow load",
                    after: timeout,
                };
                self.report(&e);
                return Err(e);
            }
        };

        let store = match GraphStore::from_payload(payload, self.index.clone()) {
            Ok(store) => store,
            Err(e) => {
                let e = ServiceError::Graph(e);
                self.report(&e);
                return Err(e);
            }
        };
        self.install(workflow_id, store);
        log::info!("Opened workflow '{}'", workflow_id);
        Ok(())
    }

    /// Start a new, empty workflow
    pub fn create(&mut self, workflow_id: &str) -> Result<()> {
        self.check_replaceable()?;
        let store = GraphStore::new(self.index.clone());
        self.install(workflow_id, store);
        Ok(())
    }

    /// Adopt a graph obtained elsewhere (such as a local file) as `workflow_id`
    ///
    /// The graph starts dirty relative to the remote store.
    pub fn import(&mut self, workflow_id: &str, payload: GraphPayload) -> Result<()> {
        self.check_replaceable()?;
        let store = GraphStore::from_payload(payload, self.index.clone())?;
        self.install(workflow_id, store);
        if let Some(store) = self.store.as_mut() {
            store.mark_saved(String::new());
        }
        Ok(())
    }

    fn check_replaceable(&self) -> Result<()> {
        if self.save_pending {
            return Err(ServiceError::Busy);
        }
        if !self.catalog_loaded {
            return Err(ServiceError::NoCatalog);
        }
        Ok(())
    }

    fn install(&mut self, workflow_id: &str, store: GraphStore) {
        let mut store = store
            .with_event_sink(self.events.clone())
            .with_undo_limit(self.config.undo_limit);
        store.set_bounds(self.config.viewport.bounds());
        self.store = Some(store);
        self.workflow_id = Some(workflow_id.to_string());
    }

    // =========================================================================
    // Editing
    // =========================================================================

    /// Run a mutation against the open graph
    ///
    /// Refused with [`ServiceError::Busy`] while a save is pending.
    pub fn edit<T>(
        &mut self,
        mutate: impl FnOnce(&mut GraphStore) -> workflow_graph::Result<T>,
    ) -> Result<T> {
        if self.save_pending {
            return Err(ServiceError::Busy);
        }
        let store = self.store.as_mut().ok_or(ServiceError::NoWorkflow)?;
        Ok(mutate(store)?)
    }

    /// Select a node; allowed while a save is pending
    pub fn select_node(&mut self, node_id: Option<&str>) -> Result<()> {
        let store = self.store.as_mut().ok_or(ServiceError::NoWorkflow)?;
        Ok(store.select_node(node_id)?)
    }

    /// Form editors for one node of the open graph
    pub fn node_form(&self, node_id: &str) -> Result<NodeForm> {
        let store = self.store.as_ref().ok_or(ServiceError::NoWorkflow)?;
        let node = store
            .node(node_id)
            .ok_or_else(|| GraphError::NodeNotFound(node_id.to_string()))?;
        Ok(NodeForm::for_node(node))
    }

    /// Write a committed form value into the open graph
    ///
    /// Refused with [`ServiceError::Busy`] while a save is pending.
    pub fn apply(&mut self, commit: FieldCommit) -> Result<()> {
        self.edit(|store| commit.apply(store))
    }

    /// Build a commit from the current state of `node_id` and apply it
    ///
    /// Used with the Input and Output node editors, which validate against
    /// the node before producing a commit.
    pub fn edit_form(
        &mut self,
        node_id: &str,
        build: impl FnOnce(&Node) -> workflow_forms::Result<FieldCommit>,
    ) -> Result<()> {
        if self.save_pending {
            return Err(ServiceError::Busy);
        }
        let store = self.store.as_ref().ok_or(ServiceError::NoWorkflow)?;
        let node = store
            .node(node_id)
            .ok_or_else(|| GraphError::NodeNotFound(node_id.to_string()))?;
        let commit = build(node)?;
        self.apply(commit)
    }

    /// Apply queued node-update bus patches
    ///
    /// Patches stay queued while a save is pending.
    pub fn drain_updates(&mut self) -> Result<usize> {
        self.edit(|store| store.drain_updates())
    }

    // =========================================================================
    // Saving
    // =========================================================================

    /// Snapshot the graph for saving and mark the session busy
    pub fn begin_save(&mut self) -> Result<SaveRequest> {
        if self.save_pending {
            return Err(ServiceError::Busy);
        }
        let workflow_id = self.workflow_id.clone().ok_or(ServiceError::NoWorkflow)?;
        let store = self.store.as_ref().ok_or(ServiceError::NoWorkflow)?;

        let payload = store.payload();
        let fingerprint = payload.fingerprint()?;
        self.save_pending = true;

        Ok(SaveRequest {
            api: self.api.clone(),
            workflow_id,
            payload,
            fingerprint,
            timeout: self.save_timeout,
        })
    }

    /// Record the end of a save and notify the user
    ///
    /// The local graph is never modified; a successful save only moves the
    /// saved baseline.
    pub fn finish_save(&mut self, completion: SaveCompletion) -> SaveOutcome {
        self.save_pending = false;

        match completion.result {
            Ok(()) => {
                if let Some(store) = self.store.as_mut() {
                    store.mark_saved(completion.fingerprint);
                }
                log::info!(
                    "Saved workflow '{}'",
                    self.workflow_id.as_deref().unwrap_or_default()
                );
                self.notify(NoticeLevel::Info, "Workflow saved");
                SaveOutcome::Saved
            }
            Err(e) if e.is_timeout() => {
                log::warn!("{}", e);
                self.notify(
                    NoticeLevel::Warning,
                    "Saving timed out. The workflow may or may not have been saved; \
                     save again to be sure.",
                );
                SaveOutcome::Unknown
            }
            Err(e) => {
                self.report(&e);
                SaveOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    /// Save the open graph and wait for the outcome
    pub async fn save(&mut self) -> Result<SaveOutcome> {
        let request = self.begin_save()?;
        let completion = request.run().await;
        Ok(self.finish_save(completion))
    }

    // =========================================================================
    // Models
    // =========================================================================

    /// Prepare a model listing that publishes into the Input node
    pub fn fetch_models(&self) -> Result<ModelFetch> {
        let store = self.store.as_ref().ok_or(ServiceError::NoWorkflow)?;
        let input = store
            .built_in(BuiltInKind::Input)
            .ok_or(ServiceError::NoWorkflow)?;
        Ok(ModelFetch {
            api: self.api.clone(),
            bus: store.bus_handle(),
            input_node: input.id.clone(),
            timeout: self.config.request_timeout(),
        })
    }

    /// Fetch models and merge them into the Input node
    pub async fn refresh_models(&mut self) -> Result<usize> {
        let fetch = self.fetch_models()?;
        if let Err(e) = fetch.run().await {
            self.report(&e);
            return Err(e);
        }
        self.drain_updates()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use workflow_forms::InputForm;
    use workflow_graph::{
        BlockDescription, BlockSchema, CatalogDescription, ModelOption, Position,
    };

    #[derive(Default)]
    struct FakeApi {
        graph: Mutex<Option<GraphPayload>>,
        saved: Mutex<Vec<GraphPayload>>,
        save_delay: Option<Duration>,
        fail_save: bool,
    }

    #[async_trait::async_trait]
    impl WorkflowApi for FakeApi {
        async fn describe(&self) -> Result<CatalogDescription> {
            Ok(CatalogDescription {
                blocks: vec![tracker()],
                kinds_connections: Default::default(),
            })
        }

        async fn load_workflow(&self, workflow_id: &str) -> Result<GraphPayload> {
            self.graph
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| ServiceError::Status {
                    status: 404,
                    body: format!("no workflow {}", workflow_id),
                })
        }

        async fn save_workflow(&self, _workflow_id: &str, payload: &GraphPayload) -> Result<()> {
            if let Some(delay) = self.save_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_save {
                return Err(ServiceError::Status {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            self.saved.lock().unwrap().push(payload.clone());
            Ok(())
        }

        async fn list_models(&self) -> Result<Vec<ModelOption>> {
            Ok(vec![ModelOption {
                id: "coco/3".to_string(),
                name: "coco".to_string(),
                version: "3".to_string(),
                task_type: "object-detection".to_string(),
            }])
        }
    }

    fn tracker() -> BlockDescription {
        BlockDescription {
            manifest_type_identifier: "Tracker".to_string(),
            human_friendly_block_name: "Tracker".to_string(),
            block_schema: BlockSchema::default(),
            outputs_manifest: vec![],
        }
    }

    async fn session_with(api: FakeApi) -> EditorSession {
        let mut session = EditorSession::new(Arc::new(api), ServiceConfig::default());
        session.fetch_catalog().await.unwrap();
        session.create("w1").unwrap();
        session
    }

    fn add_tracker(session: &mut EditorSession) -> Result<String> {
        let block = session.catalog().get("Tracker").unwrap();
        session.edit(|store| store.add_block(&block, Position::default()))
    }

    #[tokio::test]
    async fn test_save_marks_clean() {
        let api = Arc::new(FakeApi::default());
        let mut session = EditorSession::new(api.clone(), ServiceConfig::default());
        session.fetch_catalog().await.unwrap();
        session.create("w1").unwrap();
        add_tracker(&mut session).unwrap();
        assert!(session.store().unwrap().is_dirty());

        assert_eq!(session.save().await.unwrap(), SaveOutcome::Saved);
        assert!(!session.store().unwrap().is_dirty());
        assert_eq!(api.saved.lock().unwrap().len(), 1);
        assert_eq!(session.notices().last().unwrap().level, NoticeLevel::Info);
    }

    #[tokio::test]
    async fn test_mutations_are_busy_during_save() {
        let mut session = session_with(FakeApi::default()).await;
        let input = session
            .store()
            .unwrap()
            .built_in(BuiltInKind::Input)
            .unwrap()
            .id
            .clone();

        let request = session.begin_save().unwrap();
        assert!(session.is_saving());
        assert!(matches!(add_tracker(&mut session), Err(ServiceError::Busy)));
        assert!(matches!(session.begin_save(), Err(ServiceError::Busy)));
        session.select_node(Some(&input)).unwrap();

        let completion = request.run().await;
        assert_eq!(session.finish_save(completion), SaveOutcome::Saved);
        assert!(add_tracker(&mut session).is_ok());
    }

    #[tokio::test]
    async fn test_timeout_is_unknown_outcome() {
        let api = FakeApi {
            save_delay: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let mut session = session_with(api)
            .await
            .with_save_timeout(Duration::from_millis(20));
        add_tracker(&mut session).unwrap();

        assert_eq!(session.save().await.unwrap(), SaveOutcome::Unknown);
        assert!(!session.is_saving());
        assert!(session.store().unwrap().is_dirty());
        assert_eq!(session.notices().last().unwrap().level, NoticeLevel::Warning);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_graph() {
        let api = FakeApi {
            fail_save: true,
            ..Default::default()
        };
        let mut session = session_with(api).await;
        add_tracker(&mut session).unwrap();
        let before = session.store().unwrap().payload();

        let outcome = session.save().await.unwrap();
        assert!(matches!(outcome, SaveOutcome::Failed { .. }));
        assert_eq!(session.store().unwrap().payload(), before);
        assert!(session.store().unwrap().is_dirty());
        assert_eq!(session.notices().last().unwrap().level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_models_arrive_through_bus() {
        let mut session = session_with(FakeApi::default()).await;
        assert_eq!(session.refresh_models().await.unwrap(), 1);

        let input = session
            .store()
            .unwrap()
            .built_in(BuiltInKind::Input)
            .unwrap();
        assert_eq!(input.models()[0].id, "coco/3");
    }

    #[tokio::test]
    async fn test_import_starts_dirty_and_refuses_during_save() {
        let mut session = session_with(FakeApi::default()).await;
        let payload = session.store().unwrap().payload();

        let request = session.begin_save().unwrap();
        assert!(matches!(
            session.import("w2", payload.clone()),
            Err(ServiceError::Busy)
        ));
        assert!(matches!(session.create("w3"), Err(ServiceError::Busy)));
        let completion = request.run().await;
        session.finish_save(completion);

        session.import("w2", payload).unwrap();
        assert_eq!(session.workflow_id(), Some("w2"));
        assert!(session.store().unwrap().is_dirty());
    }

    #[tokio::test]
    async fn test_open_loads_graph_and_reports_failures() {
        let mut session =
            EditorSession::new(Arc::new(FakeApi::default()), ServiceConfig::default());
        session.fetch_catalog().await.unwrap();
        assert!(session.open("missing").await.is_err());
        assert_eq!(session.take_notices().len(), 1);

        let stored = GraphStore::new(Arc::new(KindCompatibilityIndex::default())).payload();
        let api = FakeApi {
            graph: Mutex::new(Some(stored)),
            ..Default::default()
        };
        let mut session = EditorSession::new(Arc::new(api), ServiceConfig::default());
        session.fetch_catalog().await.unwrap();
        session.open("w1").await.unwrap();
        assert_eq!(session.workflow_id(), Some("w1"));
        assert_eq!(session.store().unwrap().nodes().len(), 2);
        assert!(matches!(
            session.edit(|store| store.set_form_field("input_node", "params", json!([]))),
            Ok(())
        ));
    }

    #[tokio::test]
    async fn test_graphs_need_a_catalog() {
        let stored = GraphStore::new(Arc::new(KindCompatibilityIndex::default())).payload();
        let api = FakeApi {
            graph: Mutex::new(Some(stored.clone())),
            ..Default::default()
        };
        let mut session = EditorSession::new(Arc::new(api), ServiceConfig::default());

        assert!(matches!(session.create("w1"), Err(ServiceError::NoCatalog)));
        assert!(matches!(
            session.import("w1", stored),
            Err(ServiceError::NoCatalog)
        ));
        assert!(matches!(
            session.open("w1").await,
            Err(ServiceError::NoCatalog)
        ));
        assert!(session.store().is_none());

        session.fetch_catalog().await.unwrap();
        session.open("w1").await.unwrap();
    }

    #[tokio::test]
    async fn test_form_edits_go_through_the_session() {
        let mut session = session_with(FakeApi::default()).await;
        let input = session
            .store()
            .unwrap()
            .built_in(BuiltInKind::Input)
            .unwrap()
            .id
            .clone();

        session
            .edit_form(&input, |node| InputForm::add_source(node, "cam1"))
            .unwrap();
        assert!(session.store().unwrap().availability().contains_key("image"));
        assert!(matches!(
            session.edit_form(&input, |node| InputForm::add_source(node, "cam1")),
            Err(ServiceError::Form(_))
        ));

        let tracker = add_tracker(&mut session).unwrap();
        let form = session.node_form(&tracker).unwrap();
        assert_eq!(form.node_id(), tracker);

        let commit = FieldCommit {
            node_id: tracker.clone(),
            field: "name".to_string(),
            value: json!("trk"),
        };
        let request = session.begin_save().unwrap();
        assert!(matches!(
            session.apply(commit.clone()),
            Err(ServiceError::Busy)
        ));
        let completion = request.run().await;
        session.finish_save(completion);

        session.apply(commit).unwrap();
        let node = session.store().unwrap().node(&tracker).unwrap();
        assert_eq!(node.step_name(), Some("trk"));
    }
}
