//! # redb-backed Store
//!
//! Durable, transactional CRUD for nodes, edges and embeddings, with every
//! index family maintained inside the writing transaction.
//!
//! redb provides:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! The HNSW graph lives in memory behind a reader-writer lock. A committing
//! writer takes the write lock only while it applies and commits its own
//! vector changes.

mod batch;
pub(crate) mod tables;

pub use batch::WriteBatch;

use crate::config::StoreConfig;
use crate::events::{ChangeSource, EventSink, NullSink};
use crate::index::{self, ConsistencyReport, FilterOperator, HnswIndex, adjacency, structural};
use crate::primitives::FORMAT_VERSION;
use crate::types::{
    Direction, Edge, EdgeId, Embedding, EmbeddingId, FieldValue, IndexError, IndexedField, Node,
    NodeId, StorageError,
};
use redb::{Database, ReadTransaction, ReadableDatabase, ReadableTable, ReadableTableMetadata};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard};
use tables::{
    ADJ_IN, ADJ_OUT, EDGES, EMBEDDINGS, META_FORMAT_VERSION, METADATA, NODES, get_meta, get_record,
};
use tracing::{debug, info, warn};

/// Size of the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VectorStats {
    pub live: usize,
    pub tombstones: usize,
    pub dimension: Option<usize>,
}

/// The knowledge-graph store.
///
/// `Store` is `Send + Sync`; share it behind an `Arc`.
pub struct Store {
    db: Database,
    vectors: RwLock<HnswIndex>,
    sink: Arc<dyn EventSink>,
    config: StoreConfig,
    path: PathBuf,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open or create a store at `path` with default configuration and no
    /// event sink.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open_with(path, StoreConfig::default(), Arc::new(NullSink))
    }

    /// Open or create a store, delivering change events to `sink`.
    pub fn open_with(
        path: impl AsRef<Path>,
        config: StoreConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, StorageError> {
        config
            .validate()
            .map_err(|e| StorageError::InvalidConfig(e.to_string()))?;
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path)?;

        // Initialize tables and stamp the format version
        {
            let txn = db.begin_write()?;
            tables::create_all(&txn)?;
            {
                let mut meta = txn.open_table(METADATA)?;
                match get_meta(&meta, META_FORMAT_VERSION)? {
                    Some(version) if version > FORMAT_VERSION => {
                        return Err(StorageError::UnsupportedFormat(version));
                    }
                    Some(_) => {}
                    None => {
                        meta.insert(META_FORMAT_VERSION, FORMAT_VERSION)?;
                    }
                }
            }
            txn.commit()?;
        }

        let vectors = {
            let txn = db.begin_read()?;
            HnswIndex::load(&txn, config.hnsw.clone())?
        };
        info!(
            path = %path.display(),
            vectors = vectors.len(),
            tombstones = vectors.tombstones(),
            "Opened store"
        );

        Ok(Self {
            db,
            vectors: RwLock::new(vectors),
            sink,
            config,
            path,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A consistent read view of the canonical records and their indexes.
    pub fn snapshot(&self) -> Result<Snapshot, StorageError> {
        Ok(Snapshot {
            txn: self.db.begin_read()?,
        })
    }

    /// Shared access to the vector graph.
    pub fn vectors(&self) -> Result<RwLockReadGuard<'_, HnswIndex>, IndexError> {
        self.vectors.read().map_err(|_| IndexError::LockPoisoned)
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Run `f` inside one atomic write transaction.
    ///
    /// If `f` fails nothing is written. Change events are delivered after the
    /// commit succeeds.
    pub fn write<T>(
        &self,
        f: impl FnOnce(&mut WriteBatch<'_>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        self.write_as(ChangeSource::Host, f)
    }

    /// [`Store::write`] with an explicit change source.
    pub fn write_as<T>(
        &self,
        source: ChangeSource,
        f: impl FnOnce(&mut WriteBatch<'_>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut batch = WriteBatch::new(self, self.db.begin_write()?, source);
        let value = match f(&mut batch) {
            Ok(value) => value,
            Err(e) => {
                batch.abort();
                return Err(e);
            }
        };
        let events = batch.commit()?;
        for event in events {
            debug!(%event, "Emitting change event");
            self.sink.emit(event);
        }
        self.maybe_compact_vectors();
        Ok(value)
    }

    /// Upsert a node, returning the node it replaced.
    pub fn insert_node(&self, node: Node) -> Result<Option<Node>, StorageError> {
        self.write(|batch| batch.put_node(node))
    }

    /// Delete a node with its incident edges and owned embedding.
    pub fn delete_node(&self, id: &NodeId) -> Result<Option<Node>, StorageError> {
        self.write(|batch| batch.delete_node(id))
    }

    /// Upsert an edge. Both endpoints must exist.
    pub fn insert_edge(&self, edge: Edge) -> Result<Option<Edge>, StorageError> {
        self.write(|batch| batch.put_edge(edge))
    }

    pub fn delete_edge(&self, id: &EdgeId) -> Result<Option<Edge>, StorageError> {
        self.write(|batch| batch.delete_edge(id))
    }

    /// Upsert an embedding and its vector index entry.
    pub fn insert_embedding(&self, embedding: Embedding) -> Result<Option<Embedding>, StorageError> {
        self.write(|batch| batch.put_embedding(embedding))
    }

    pub fn delete_embedding(&self, id: &EmbeddingId) -> Result<Option<Embedding>, StorageError> {
        self.write(|batch| batch.delete_embedding(id))
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub fn get_node(&self, id: &NodeId) -> Result<Option<Node>, StorageError> {
        self.snapshot()?.get_node(id)
    }

    pub fn get_edge(&self, id: &EdgeId) -> Result<Option<Edge>, StorageError> {
        self.snapshot()?.get_edge(id)
    }

    pub fn get_embedding(&self, id: &EmbeddingId) -> Result<Option<Embedding>, StorageError> {
        self.snapshot()?.get_embedding(id)
    }

    /// Edges incident to `node` in `direction`, optionally of one type.
    pub fn edges_of(
        &self,
        node: &NodeId,
        direction: Direction,
        edge_type: Option<&str>,
    ) -> Result<Vec<Edge>, StorageError> {
        self.snapshot()?.edges_of(node, direction, edge_type)
    }

    /// Every node, in id order.
    pub fn scan_nodes(&self) -> Result<Vec<Node>, StorageError> {
        self.snapshot()?.nodes()
    }

    pub fn vector_stats(&self) -> Result<VectorStats, IndexError> {
        let vectors = self.vectors()?;
        Ok(VectorStats {
            live: vectors.len(),
            tombstones: vectors.tombstones(),
            dimension: vectors.dimension(),
        })
    }

    /// Approximate nearest stored embeddings to `vector` with their similarity.
    ///
    /// Only embeddings accepted by `accept` are returned.
    pub fn nearest_embeddings(
        &self,
        vector: &[f32],
        k: usize,
        accept: &dyn Fn(&EmbeddingId) -> bool,
    ) -> Result<Vec<(EmbeddingId, f32)>, IndexError> {
        let vectors = self.vectors()?;
        if let Some(expected) = vectors.dimension() {
            if expected != vector.len() {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }
        let metric = vectors.config().metric;
        let ef = vectors.config().ef_search.max(k);
        Ok(vectors
            .search(vector, k, ef, accept)
            .into_iter()
            .map(|(label, distance)| (label, metric.similarity(distance)))
            .collect())
    }

    // =========================================================================
    // MAINTENANCE
    // =========================================================================

    /// Rebuild every index family from canonical records in one transaction.
    pub fn reindex(&self) -> Result<(), StorageError> {
        let txn = self.db.begin_write()?;
        let fresh = index::rebuild(&txn, &self.config.hnsw)?;
        let mut vectors = self.vectors.write().map_err(|_| IndexError::LockPoisoned)?;
        txn.commit()?;
        *vectors = fresh;
        Ok(())
    }

    /// Compare every index family with canonical records.
    pub fn check_consistency(&self) -> Result<ConsistencyReport, StorageError> {
        // Lock first: no vector commit can land between the two views.
        let vectors = self.vectors()?;
        let txn = self.db.begin_read()?;
        index::check(&txn, &vectors)
    }

    /// Rebuild the vector graph without its tombstones. Returns how many were dropped.
    pub fn compact_vectors(&self) -> Result<usize, StorageError> {
        let txn = self.db.begin_write()?;
        let mut vectors = self.vectors.write().map_err(|_| IndexError::LockPoisoned)?;
        let dropped = vectors.tombstones();
        if dropped == 0 {
            txn.abort()?;
            return Ok(0);
        }
        let fresh = vectors.rebuilt()?;
        fresh.persist_all(&txn)?;
        txn.commit()?;
        *vectors = fresh;
        info!(dropped, live = vectors.len(), "Compacted vector index");
        Ok(dropped)
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<bool, StorageError> {
        Ok(self.db.compact()?)
    }

    fn maybe_compact_vectors(&self) {
        if !self.config.hnsw.auto_compact {
            return;
        }
        let due = self.vectors().map(|v| v.needs_compaction()).unwrap_or(false);
        if due {
            if let Err(e) = self.compact_vectors() {
                warn!(error = %e, "Automatic vector compaction failed");
            }
        }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// A read transaction over the store.
pub struct Snapshot {
    txn: ReadTransaction,
}

impl Snapshot {
    pub fn get_node(&self, id: &NodeId) -> Result<Option<Node>, StorageError> {
        get_record(&self.txn.open_table(NODES)?, id.as_str())
    }

    pub fn get_edge(&self, id: &EdgeId) -> Result<Option<Edge>, StorageError> {
        get_record(&self.txn.open_table(EDGES)?, id.as_str())
    }

    pub fn get_embedding(&self, id: &EmbeddingId) -> Result<Option<Embedding>, StorageError> {
        get_record(&self.txn.open_table(EMBEDDINGS)?, id.as_str())
    }

    pub fn contains_node(&self, id: &NodeId) -> Result<bool, StorageError> {
        Ok(self.txn.open_table(NODES)?.get(id.as_str())?.is_some())
    }

    /// Node ids whose `field` satisfies `op value`, via the structural index.
    pub fn lookup(
        &self,
        field: IndexedField,
        op: FilterOperator,
        value: &FieldValue,
    ) -> Result<BTreeSet<NodeId>, StorageError> {
        let table = self.txn.open_multimap_table(tables::structural(field))?;
        structural::lookup(&table, op, value)
    }

    /// The node owning `embedding`, via the structural index.
    pub fn node_for_embedding(&self, embedding: &EmbeddingId) -> Result<Option<NodeId>, StorageError> {
        Ok(self
            .lookup(
                IndexedField::EmbeddingId,
                FilterOperator::Equals,
                &FieldValue::from(embedding.as_str()),
            )?
            .into_iter()
            .next())
    }

    pub fn edges_of(
        &self,
        node: &NodeId,
        direction: Direction,
        edge_type: Option<&str>,
    ) -> Result<Vec<Edge>, StorageError> {
        adjacency::incident_edges(
            &self.txn.open_multimap_table(ADJ_OUT)?,
            &self.txn.open_multimap_table(ADJ_IN)?,
            &self.txn.open_table(EDGES)?,
            node,
            direction,
            edge_type,
        )
    }

    /// Every node id, in order.
    pub fn node_ids(&self) -> Result<BTreeSet<NodeId>, StorageError> {
        let mut ids = BTreeSet::new();
        for entry in self.txn.open_table(NODES)?.iter()? {
            let (key, _) = entry?;
            ids.insert(NodeId::from(key.value()));
        }
        Ok(ids)
    }

    /// Every node, in id order.
    pub fn nodes(&self) -> Result<Vec<Node>, StorageError> {
        let table = self.txn.open_table(NODES)?;
        let mut nodes = Vec::with_capacity(table.len()? as usize);
        for entry in table.iter()? {
            let (_, value) = entry?;
            nodes.push(tables::decode(value.value())?);
        }
        Ok(nodes)
    }

    pub fn node_count(&self) -> Result<u64, StorageError> {
        Ok(self.txn.open_table(NODES)?.len()?)
    }

    pub fn edge_count(&self) -> Result<u64, StorageError> {
        Ok(self.txn.open_table(EDGES)?.len()?)
    }

    pub fn embedding_count(&self) -> Result<u64, StorageError> {
        Ok(self.txn.open_table(EMBEDDINGS)?.len()?)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::RecordingSink;
    use crate::events::ChangeEvent;
    use crate::types::{Chat, Entity, Message, NodeKind};
    use tempfile::tempdir;

    fn open(path: &Path) -> Store {
        Store::open(path).expect("open")
    }

    #[test]
    fn node_round_trip_survives_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let node = Node::from(Message::new("m1", "c1", "alice", "hello").with_timestamp(7));

        {
            let store = open(&db_path);
            assert_eq!(store.insert_node(node.clone()).expect("insert"), None);
            assert_eq!(store.get_node(&NodeId::from("m1")).expect("get"), Some(node.clone()));
        }

        let store = open(&db_path);
        assert_eq!(store.get_node(&NodeId::from("m1")).expect("get"), Some(node));
    }

    #[test]
    fn insert_is_upsert_returning_prior() {
        let temp = tempdir().expect("temp dir");
        let store = open(&temp.path().join("test.redb"));
        let first = Node::from(Chat::new("c1", "First"));
        let second = Node::from(Chat::new("c1", "Second"));

        store.insert_node(first.clone()).expect("insert");
        let prior = store.insert_node(second).expect("upsert");
        assert_eq!(prior, Some(first));

        let snapshot = store.snapshot().expect("snapshot");
        let titled = |t: &str| {
            snapshot
                .lookup(IndexedField::Title, FilterOperator::Equals, &FieldValue::from(t))
                .expect("lookup")
        };
        assert!(titled("First").is_empty());
        assert_eq!(titled("Second").len(), 1);
    }

    #[test]
    fn delete_missing_is_none() {
        let temp = tempdir().expect("temp dir");
        let store = open(&temp.path().join("test.redb"));
        assert_eq!(store.delete_node(&NodeId::from("ghost")).expect("delete"), None);
        assert_eq!(store.delete_edge(&EdgeId::from("ghost")).expect("delete"), None);
        assert_eq!(
            store.delete_embedding(&EmbeddingId::from("ghost")).expect("delete"),
            None
        );
    }

    #[test]
    fn edge_requires_both_endpoints() {
        let temp = tempdir().expect("temp dir");
        let store = open(&temp.path().join("test.redb"));
        store.insert_node(Node::from(Chat::new("c1", "t"))).expect("insert");

        let result = store.insert_edge(Edge::new("e1", "c1", "missing", "LINK"));
        assert!(matches!(result, Err(StorageError::DanglingEdge(id)) if id.as_str() == "missing"));
        assert_eq!(store.get_edge(&EdgeId::from("e1")).expect("get"), None);
    }

    #[test]
    fn failed_batch_writes_nothing() {
        let temp = tempdir().expect("temp dir");
        let store = open(&temp.path().join("test.redb"));

        let result = store.write(|batch| {
            batch.put_node(Node::from(Chat::new("c1", "t")))?;
            batch.put_edge(Edge::new("e1", "c1", "nowhere", "LINK"))
        });
        assert!(result.is_err());
        assert_eq!(store.get_node(&NodeId::from("c1")).expect("get"), None);
        assert!(store.check_consistency().expect("check").is_consistent());
    }

    #[test]
    fn delete_node_cascades() {
        let temp = tempdir().expect("temp dir");
        let store = open(&temp.path().join("test.redb"));
        store
            .write(|batch| {
                let mut paris = Node::from(Entity::new("paris", "Paris", "LOCATION"));
                paris.set_embedding_id(Some(EmbeddingId::from("emb:paris")));
                batch.put_embedding(Embedding::new("emb:paris", vec![1.0, 0.0], "test"))?;
                batch.put_node(paris)?;
                batch.put_node(Node::from(Message::new("m1", "c1", "a", "Paris")))?;
                batch.put_edge(Edge::new("e1", "m1", "paris", "MENTIONS"))?;
                Ok(())
            })
            .expect("write");

        let removed = store.delete_node(&NodeId::from("paris")).expect("delete");
        assert!(removed.is_some());
        assert_eq!(store.get_edge(&EdgeId::from("e1")).expect("get"), None);
        assert_eq!(
            store.get_embedding(&EmbeddingId::from("emb:paris")).expect("get"),
            None
        );
        assert!(store
            .edges_of(&NodeId::from("m1"), Direction::Both, None)
            .expect("edges")
            .is_empty());
        assert_eq!(store.vector_stats().expect("stats").live, 0);
        assert!(store.check_consistency().expect("check").is_consistent());
    }

    #[test]
    fn embeddings_have_one_owner() {
        let temp = tempdir().expect("temp dir");
        let store = open(&temp.path().join("test.redb"));
        store
            .insert_embedding(Embedding::new("shared", vec![1.0, 0.0], "m"))
            .expect("insert");

        let mut a = Node::from(Chat::new("a", "t"));
        a.set_embedding_id(Some(EmbeddingId::from("shared")));
        store.insert_node(a.clone()).expect("attach");
        // Re-putting the owner with the same embedding is fine.
        store.insert_node(a).expect("upsert owner");

        let mut b = Node::from(Chat::new("b", "t"));
        b.set_embedding_id(Some(EmbeddingId::from("shared")));
        let result = store.insert_node(b);
        assert!(matches!(
            result,
            Err(StorageError::EmbeddingOwned { embedding, owner })
                if embedding.as_str() == "shared" && owner.as_str() == "a"
        ));
        assert_eq!(store.get_node(&NodeId::from("b")).expect("get"), None);

        let mut c = Node::from(Chat::new("c", "t"));
        c.set_embedding_id(Some(EmbeddingId::from("ghost")));
        let result = store.insert_node(c);
        assert!(matches!(result, Err(StorageError::MissingEmbedding(id)) if id.as_str() == "ghost"));

        let result = store.delete_embedding(&EmbeddingId::from("shared"));
        assert!(matches!(result, Err(StorageError::EmbeddingOwned { .. })));

        store.delete_node(&NodeId::from("a")).expect("delete");
        assert_eq!(store.get_embedding(&EmbeddingId::from("shared")).expect("get"), None);
        assert!(store.check_consistency().expect("check").is_consistent());
    }

    #[test]
    fn replaced_embedding_is_deleted() {
        let temp = tempdir().expect("temp dir");
        let store = open(&temp.path().join("test.redb"));
        store
            .write(|batch| {
                batch.put_embedding(Embedding::new("v1", vec![1.0, 0.0], "m"))?;
                batch.put_embedding(Embedding::new("v2", vec![0.0, 1.0], "m"))?;
                let mut node = Node::from(Message::new("m1", "c1", "a", "x"));
                node.set_embedding_id(Some(EmbeddingId::from("v1")));
                batch.put_node(node)?;
                Ok(())
            })
            .expect("write");

        let mut swapped = store.get_node(&NodeId::from("m1")).expect("get").expect("m1");
        swapped.set_embedding_id(Some(EmbeddingId::from("v2")));
        store.insert_node(swapped).expect("swap");
        assert_eq!(store.get_embedding(&EmbeddingId::from("v1")).expect("get"), None);

        store
            .insert_node(Node::from(Message::new("m1", "c1", "a", "edited")))
            .expect("clear");
        assert_eq!(store.get_embedding(&EmbeddingId::from("v2")).expect("get"), None);
        assert_eq!(store.vector_stats().expect("stats").live, 0);
        assert!(store.check_consistency().expect("check").is_consistent());
    }

    #[test]
    fn events_follow_commits() {
        let temp = tempdir().expect("temp dir");
        let sink = Arc::new(RecordingSink::default());
        let store = Store::open_with(
            temp.path().join("test.redb"),
            StoreConfig::default(),
            sink.clone(),
        )
        .expect("open");

        store.insert_node(Node::from(Chat::new("c1", "t"))).expect("insert");
        store
            .insert_node(Node::from(Message::new("m1", "c1", "a", "hi")))
            .expect("insert");
        store
            .insert_node(Node::from(Message::new("m1", "c1", "a", "edited")))
            .expect("update");
        let _ = store.write(|batch| {
            batch.put_node(Node::from(Chat::new("c2", "t")))?;
            Err::<(), _>(StorageError::InvalidRecord("abort".to_string()))
        });

        let events = sink.take();
        assert_eq!(
            events,
            vec![
                ChangeEvent::NodeCreated {
                    id: NodeId::from("c1"),
                    kind: NodeKind::Chat,
                    source: ChangeSource::Host,
                },
                ChangeEvent::NodeCreated {
                    id: NodeId::from("m1"),
                    kind: NodeKind::Message,
                    source: ChangeSource::Host,
                },
                ChangeEvent::ChatUpdated {
                    chat_id: NodeId::from("c1"),
                },
                ChangeEvent::NodeUpdated {
                    id: NodeId::from("m1"),
                    kind: NodeKind::Message,
                    source: ChangeSource::Host,
                },
            ]
        );
    }

    #[test]
    fn embedding_dimension_is_fixed() {
        let temp = tempdir().expect("temp dir");
        let store = open(&temp.path().join("test.redb"));
        store
            .insert_embedding(Embedding::new("a", vec![1.0, 0.0, 0.0], "m"))
            .expect("insert");
        let result = store.insert_embedding(Embedding::new("b", vec![1.0, 0.0], "m"));
        assert!(matches!(
            result,
            Err(StorageError::Index(IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            }))
        ));
        assert_eq!(store.get_embedding(&EmbeddingId::from("b")).expect("get"), None);
    }

    #[test]
    fn vector_index_survives_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        {
            let store = open(&db_path);
            for i in 0..20u8 {
                let v = vec![f32::from(i), 1.0];
                store
                    .insert_embedding(Embedding::new(format!("e{i}"), v, "m"))
                    .expect("insert");
            }
            store.delete_embedding(&EmbeddingId::from("e3")).expect("delete");
        }

        let store = open(&db_path);
        let stats = store.vector_stats().expect("stats");
        assert_eq!(stats.live, 19);
        assert_eq!(stats.tombstones, 1);
        assert_eq!(stats.dimension, Some(2));
        let hits = store
            .nearest_embeddings(&[12.0, 1.0], 1, &|_| true)
            .expect("search");
        assert_eq!(hits[0].0.as_str(), "e12");
        assert!(store.check_consistency().expect("check").is_consistent());
    }

    #[test]
    fn reindex_restores_consistency() {
        let temp = tempdir().expect("temp dir");
        let store = open(&temp.path().join("test.redb"));
        store.insert_node(Node::from(Chat::new("c1", "t"))).expect("insert");
        store
            .insert_node(Node::from(Message::new("m1", "c1", "a", "x")))
            .expect("insert");
        store
            .insert_edge(Edge::new("e1", "m1", "c1", "IN_CHAT"))
            .expect("insert");
        store
            .insert_embedding(Embedding::new("v1", vec![0.5, 0.5], "m"))
            .expect("insert");

        store.reindex().expect("reindex");
        let report = store.check_consistency().expect("check");
        assert!(report.is_consistent(), "{:?}", report.issues);
        assert_eq!(report.nodes, 2);
        assert_eq!(report.edges, 1);
        assert_eq!(report.embeddings, 1);
    }

    #[test]
    fn compact_file() {
        let temp = tempdir().expect("temp dir");
        let mut store = open(&temp.path().join("test.redb"));
        store.insert_node(Node::from(Chat::new("c1", "t"))).expect("insert");
        store.delete_node(&NodeId::from("c1")).expect("delete");
        store.compact().expect("compact");
        assert_eq!(store.snapshot().expect("snapshot").node_count().expect("count"), 0);
    }
}
