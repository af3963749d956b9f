//! # loom-core
//!
//! The synchronous engine of the Loom knowledge-graph database.
//!
//! One redb file holds nodes, edges and embeddings together with three
//! derived index families:
//! - a structural index per indexed field (equality and range lookups)
//! - a symmetric graph adjacency index (O(degree) traversal)
//! - an HNSW vector index (approximate nearest neighbours)
//!
//! Every write updates all index families inside its own transaction. The
//! converged query pipeline filters exactly first and ranks semantically
//! second.
//!
//! ## Architectural Constraints
//!
//! - No async runtime: every call runs on the caller's thread
//! - Change events go to an injected [`EventSink`] after commit
//! - Indexes are disposable and can be rebuilt with [`Store::reindex`]

// =============================================================================
// MODULES
// =============================================================================

pub mod config;
pub mod events;
pub mod index;
pub mod primitives;
pub mod query;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use config::{ConfigError, HnswConfig, QueryConfig, StoreConfig};
pub use events::{ChangeEvent, ChangeSource, EventSink, NullSink};
pub use index::{ConsistencyReport, DistanceMetric, FilterOperator, HnswIndex};
pub use query::{
    ConvergedQuery, GraphFilter, Path, QueryEngine, QueryHit, SemanticQuery, StructuralFilter,
};
pub use storage::{Snapshot, Store, VectorStats, WriteBatch};
pub use types::{
    Attachment, Chat, Direction, Edge, EdgeId, Embedding, EmbeddingId, Entity, FieldKind,
    FieldValue, IndexError, IndexedField, Message, Metadata, Node, NodeId, NodeKind, QueryError,
    StorageError, Summary, Timestamp, now_millis,
};
