//! # Loom
//!
//! An embedded knowledge-graph database. Chats, messages, summaries,
//! entities and attachments live in one redb file together with their
//! relationships, embeddings and every index over them. A converged query
//! filters exactly, traverses relationships and ranks by similarity in one
//! call, while the Weaver enriches the graph in the background.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        HOST APPLICATION                      │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ synchronous calls
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Loom (facade)                                               │
//! │  - records foreground activity                               │
//! │  - turns panics into LoomError::Internal                     │
//! └───────────────┬──────────────────────────────┬───────────────┘
//!                 │                              │ wait / stats
//!                 ▼                              ▼
//! ┌───────────────────────────────┐  events  ┌─────────────────────┐
//! │  loom-core                    │ ───────▶ │  loom-weaver        │
//! │  storage, indexes, query      │ ◀─────── │  scheduler, modules │
//! └───────────────────────────────┘  writes  └─────────────────────┘
//! ```
//!
//! ```no_run
//! use loom::{Chat, ConvergedQuery, LoomConfig, Loom, Message, Node, StructuralFilter};
//! use loom::ml::mock::KeywordMl;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), loom::LoomError> {
//! let db = Loom::open_with("loom.redb", LoomConfig::default(), Arc::new(KeywordMl::new()))?;
//! db.insert_node(Node::from(Chat::new("c1", "Trip planning")))?;
//! db.insert_node(Node::from(Message::new("m1", "c1", "alice", "Alice met Bob in Paris")))?;
//!
//! let hits = db.query(&ConvergedQuery::new().filter(StructuralFilter::equals("chat_id", "c1")))?;
//! assert_eq!(hits.len(), 1);
//! db.shutdown()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// MODULES
// =============================================================================

pub mod config;
pub mod error;
pub mod telemetry;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use config::{LogFormat, LoggingConfig, LoomConfig};
pub use error::{LoomError, LoomResult};
pub use loom_core::{
    Attachment, Chat, ConfigError, ConsistencyReport, ConvergedQuery, Direction, Edge, EdgeId,
    Embedding, EmbeddingId, Entity, FieldValue, FilterOperator, GraphFilter, IndexError, Message,
    Node, NodeId, NodeKind, Path, QueryError, QueryHit, Snapshot, StorageError, Store, StoreConfig,
    StructuralFilter, Summary, VectorStats, primitives,
};
pub use loom_weaver::{
    ActivityLevel, ActivityMonitor, ExtractedEntity, MlCapability, SchedulerConfig, WeaverConfig,
    WeaverStats, ml,
};

use loom_core::{NullSink, QueryEngine};
use loom_weaver::{Weaver, channel};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;
use tracing::{error, info};

/// The database handle. `Send + Sync`; share it behind an `Arc`.
pub struct Loom {
    store: Arc<Store>,
    weaver: RwLock<Option<Weaver>>,
    activity: Arc<ActivityMonitor>,
    config: LoomConfig,
}

impl std::fmt::Debug for Loom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loom")
            .field("path", &self.store.path())
            .field("enrichment", &self.weaver().is_some())
            .finish_non_exhaustive()
    }
}

impl Loom {
    /// Open `path` with default settings and no enrichment.
    ///
    /// Without an ML capability there is nothing for the Weaver to run, so
    /// only storage and query are available.
    pub fn open(path: impl AsRef<std::path::Path>) -> LoomResult<Self> {
        guarded("open", || Self::start(path.as_ref(), LoomConfig::default(), None))
    }

    /// Open `path` and start the Weaver with `ml`, unless
    /// `config.weaver.enabled` is false.
    pub fn open_with(
        path: impl AsRef<std::path::Path>,
        config: LoomConfig,
        ml: Arc<dyn MlCapability>,
    ) -> LoomResult<Self> {
        guarded("open", || Self::start(path.as_ref(), config, Some(ml)))
    }

    fn start(
        path: &std::path::Path,
        config: LoomConfig,
        ml: Option<Arc<dyn MlCapability>>,
    ) -> LoomResult<Self> {
        config.validate()?;
        let activity = Arc::new(ActivityMonitor::new(config.weaver.scheduler.clone()));

        let (store, weaver) = match ml.filter(|_| config.weaver.enabled) {
            Some(ml) => {
                let (sender, receiver) = channel(config.weaver.queue_capacity);
                let store = Arc::new(Store::open_with(path, config.store.clone(), Arc::new(sender))?);
                let weaver = Weaver::start(
                    Arc::clone(&store),
                    ml,
                    receiver,
                    Arc::clone(&activity),
                    config.weaver.clone(),
                )?;
                (store, Some(weaver))
            }
            None => {
                let store = Store::open_with(path, config.store.clone(), Arc::new(NullSink))?;
                (Arc::new(store), None)
            }
        };
        info!(path = %path.display(), enrichment = weaver.is_some(), "Loom opened");

        Ok(Self {
            store,
            weaver: RwLock::new(weaver),
            activity,
            config,
        })
    }

    fn weaver(&self) -> RwLockReadGuard<'_, Option<Weaver>> {
        self.weaver.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one foreground operation.
    fn call<T>(&self, operation: &'static str, f: impl FnOnce(&Store) -> LoomResult<T>) -> LoomResult<T> {
        self.activity.record_request();
        guarded(operation, || f(&self.store))
    }

    pub fn config(&self) -> &LoomConfig {
        &self.config
    }

    /// The underlying store, for batches and snapshots.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Foreground activity as seen by the scheduler.
    pub fn activity(&self) -> &Arc<ActivityMonitor> {
        &self.activity
    }

    // -------------------------------------------------------------------------
    // Records
    // -------------------------------------------------------------------------

    /// Upsert `node`, returning the previous version.
    pub fn insert_node(&self, node: Node) -> LoomResult<Option<Node>> {
        self.call("insert_node", |store| Ok(store.insert_node(node)?))
    }

    pub fn get_node(&self, id: &NodeId) -> LoomResult<Option<Node>> {
        self.call("get_node", |store| Ok(store.get_node(id)?))
    }

    /// Delete `id` and every edge touching it.
    pub fn delete_node(&self, id: &NodeId) -> LoomResult<Option<Node>> {
        self.call("delete_node", |store| Ok(store.delete_node(id)?))
    }

    /// Upsert `edge`. Both endpoints must exist.
    pub fn insert_edge(&self, edge: Edge) -> LoomResult<Option<Edge>> {
        self.call("insert_edge", |store| Ok(store.insert_edge(edge)?))
    }

    pub fn get_edge(&self, id: &EdgeId) -> LoomResult<Option<Edge>> {
        self.call("get_edge", |store| Ok(store.get_edge(id)?))
    }

    pub fn delete_edge(&self, id: &EdgeId) -> LoomResult<Option<Edge>> {
        self.call("delete_edge", |store| Ok(store.delete_edge(id)?))
    }

    // -------------------------------------------------------------------------
    // Query
    // -------------------------------------------------------------------------

    pub fn query(&self, query: &ConvergedQuery) -> LoomResult<Vec<QueryHit>> {
        self.call("query", |store| Ok(QueryEngine::new(store).query(query)?))
    }

    /// Fewest-hop path along outbound edges.
    pub fn find_shortest_path(&self, start: &NodeId, end: &NodeId) -> LoomResult<Option<Path>> {
        self.call("find_shortest_path", |store| {
            Ok(QueryEngine::new(store).shortest_path(start, end, Direction::Outbound)?)
        })
    }

    // -------------------------------------------------------------------------
    // Maintenance
    // -------------------------------------------------------------------------

    /// Rebuild every index from canonical records.
    pub fn reindex(&self) -> LoomResult<()> {
        self.call("reindex", |store| Ok(store.reindex()?))
    }

    pub fn check_consistency(&self) -> LoomResult<ConsistencyReport> {
        self.call("check_consistency", |store| Ok(store.check_consistency()?))
    }

    /// Rebuild the vector graph without tombstones. Returns the points dropped.
    pub fn compact_vectors(&self) -> LoomResult<usize> {
        self.call("compact_vectors", |store| Ok(store.compact_vectors()?))
    }

    // -------------------------------------------------------------------------
    // Enrichment
    // -------------------------------------------------------------------------

    /// Block until the Weaver has nothing pending, or `timeout` passes.
    ///
    /// Returns `true` when idle, and always without a Weaver.
    pub fn wait_for_enrichment(&self, timeout: Duration) -> LoomResult<bool> {
        guarded("wait_for_enrichment", || {
            Ok(self.weaver().as_ref().is_none_or(|w| w.wait_idle(timeout)))
        })
    }

    /// `None` when enrichment is off or already shut down.
    pub fn weaver_stats(&self) -> LoomResult<Option<WeaverStats>> {
        guarded("weaver_stats", || Ok(self.weaver().as_ref().map(Weaver::stats)))
    }

    /// Re-queue enrichment for records whose events were dropped.
    pub fn backfill(&self) -> LoomResult<usize> {
        guarded("backfill", || match self.weaver().as_ref() {
            Some(weaver) => Ok(weaver.backfill()?),
            None => Ok(0),
        })
    }

    /// Stop the Weaver within `weaver.shutdown_timeout_ms`. Storage and
    /// query keep working afterwards. Returns `false` if workers had to be
    /// abandoned.
    pub fn shutdown(&self) -> LoomResult<bool> {
        guarded("shutdown", || {
            let taken = self
                .weaver
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            let Some(mut weaver) = taken else {
                return Ok(true);
            };
            let stopped = weaver.shutdown(self.config.weaver.shutdown_timeout());
            info!(stopped, "Loom enrichment stopped");
            Ok(stopped)
        })
    }
}

/// Run `f`, converting a panic into [`LoomError::Internal`].
fn guarded<T>(operation: &'static str, f: impl FnOnce() -> LoomResult<T>) -> LoomResult<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        error!(operation, %message, "Operation panicked");
        Err(LoomError::Internal { operation, message })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
