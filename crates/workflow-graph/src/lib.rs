//! Workflow Graph - the graph editor core of the VisionFlow dashboard
//!
//! This crate maintains a directed graph of typed processing blocks and
//! decides which connections between them are semantically valid:
//!
//! - Block catalog and Kind Compatibility Index loaded from the `describe` payload
//! - Graph Store with two fixed built-in nodes (Input and Output)
//! - Available-reference resolution (`$inputs.*`, `$steps.<name>.*`)
//! - Connection validation with atomic field binding
//! - Graph validation (missing required fields, unnamed steps, cycles)
//! - A per-store node-update bus for asynchronously resolved data
//! - Compressed snapshot-based undo/redo
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use workflow_graph::{BlockCatalog, CatalogDescription, GraphStore, KindCompatibilityIndex};
//!
//! let description: CatalogDescription = serde_json::from_str(&describe_json)?;
//! let index = Arc::new(KindCompatibilityIndex::new(description.kinds_connections));
//! let catalog = BlockCatalog::from_blocks(description.blocks);
//!
//! let mut store = GraphStore::new(index);
//! let block = catalog.get("ObjectDetectionModel").unwrap();
//! let detector = store.add_block(&block, Default::default())?;
//! ```

pub mod bus;
pub mod catalog;
pub mod connection;
pub mod error;
pub mod events;
pub mod kinds;
pub mod resolver;
pub mod store;
pub mod types;
pub mod undo;
pub mod validation;

pub use bus::{BusHandle, NodeUpdate, NodeUpdateBus, SubscriptionId};
pub use catalog::{
    BlockCatalog, BlockDescription, BlockSchema, CatalogDescription, CompatibleElement, Kind,
    KindName, KindOption, LiteralOption, LiteralType, OutputDefinition, PropertyDefinition,
    PropertySchema, PropertyShape, Required, SchemaOption, SKIP_FIELDS, WILDCARD_KIND,
};
pub use connection::{can_connect, ConnectionDecision, FieldBinding, RefusalReason};
pub use error::{GraphError, Result};
pub use events::{EventError, EventSink, GraphEvent, NullEventSink, VecEventSink};
pub use kinds::KindCompatibilityIndex;
pub use resolver::{
    is_available, is_reference, recompute, step_prefix, KindAvailabilityMap, INPUTS_PREFIX,
    STEPS_PREFIX,
};
pub use store::GraphStore;
pub use types::{
    Bounds, BuiltInKind, Edge, EdgeId, FormData, GraphData, GraphPayload, ModelOption, Node,
    NodeData, NodeId, NodeKind, Param, Position, Source, INPUT_MANIFEST, OUTPUT_MANIFEST,
};
pub use undo::{Snapshot, UndoStack};
pub use validation::{missing_required_fields, validate_graph, ValidationIssue};
