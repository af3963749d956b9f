//! Atomic multi-record writes.

use super::Store;
use super::tables::{
    ADJ_IN, ADJ_OUT, EDGES, EMBEDDINGS, NODES, get_record, put_record, take_record,
};
use crate::events::{ChangeEvent, ChangeSource};
use crate::index::hnsw::UndoLog;
use crate::index::{FilterOperator, HnswIndex, adjacency, structural};
use crate::storage::tables;
use crate::types::{
    Direction, Edge, EdgeId, Embedding, EmbeddingId, FieldValue, IndexError, IndexedField, Node,
    NodeId, StorageError,
};
use redb::{ReadableTable, WriteTransaction};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// A buffered change to the vector graph, applied at commit.
#[derive(Debug)]
enum VectorOp {
    Upsert { id: EmbeddingId, vector: Vec<f32> },
    Remove { id: EmbeddingId },
}

/// One open write transaction.
///
/// Reads through the batch see its own uncommitted writes. Canonical records,
/// structural entries and adjacency entries are written immediately; vector
/// graph changes are buffered and applied when the batch commits.
pub struct WriteBatch<'s> {
    store: &'s Store,
    txn: WriteTransaction,
    source: ChangeSource,
    vector_ops: Vec<VectorOp>,
    pending_dimension: Option<usize>,
    events: Vec<ChangeEvent>,
}

impl<'s> WriteBatch<'s> {
    pub(super) fn new(store: &'s Store, txn: WriteTransaction, source: ChangeSource) -> Self {
        Self {
            store,
            txn,
            source,
            vector_ops: Vec::new(),
            pending_dimension: None,
            events: Vec::new(),
        }
    }

    // =========================================================================
    // NODES
    // =========================================================================

    pub fn get_node(&self, id: &NodeId) -> Result<Option<Node>, StorageError> {
        get_record(&self.txn.open_table(NODES)?, id.as_str())
    }

    pub fn contains_node(&self, id: &NodeId) -> Result<bool, StorageError> {
        Ok(self.txn.open_table(NODES)?.get(id.as_str())?.is_some())
    }

    /// Upsert a node and its structural entries. Returns the replaced node.
    ///
    /// A newly attached embedding must exist and belong to no other node. An
    /// embedding the node no longer references is deleted with it.
    pub fn put_node(&mut self, node: Node) -> Result<Option<Node>, StorageError> {
        if node.id().as_str().is_empty() {
            return Err(StorageError::InvalidRecord("node id is empty".to_string()));
        }
        let detached = self
            .get_node(node.id())?
            .and_then(|prior| prior.embedding_id().cloned());
        if let Some(embedding_id) = node.embedding_id() {
            if detached.as_ref() != Some(embedding_id) {
                self.check_attachable(embedding_id, node.id())?;
            }
        }

        let prior: Option<Node> = {
            let mut table = self.txn.open_table(NODES)?;
            put_record(&mut table, node.id().as_str(), &node)?
        };
        structural::update(&self.txn, prior.as_ref(), &node)?;
        if let Some(old) = detached.filter(|old| node.embedding_id() != Some(old)) {
            self.delete_embedding(&old)?;
        }
        debug!(id = %node.id(), kind = %node.kind(), replaced = prior.is_some(), "Put node");

        let id = node.id().clone();
        let kind = node.kind();
        if prior.is_some() {
            self.events.push(ChangeEvent::NodeUpdated {
                id,
                kind,
                source: self.source,
            });
        } else {
            self.events.push(ChangeEvent::NodeCreated {
                id,
                kind,
                source: self.source,
            });
            if let Node::Message(message) = &node {
                self.events.push(ChangeEvent::ChatUpdated {
                    chat_id: message.chat_id.clone(),
                });
            }
        }
        Ok(prior)
    }

    /// Delete a node, its incident edges and the embedding it owns.
    pub fn delete_node(&mut self, id: &NodeId) -> Result<Option<Node>, StorageError> {
        let removed: Option<Node> = {
            let mut table = self.txn.open_table(NODES)?;
            take_record(&mut table, id.as_str())?
        };
        let Some(node) = removed else {
            return Ok(None);
        };
        structural::remove(&self.txn, &node)?;

        for edge in self.edges_of(id, Direction::Both, None)? {
            self.delete_edge(&edge.id)?;
        }
        if let Some(embedding_id) = node.embedding_id() {
            self.delete_embedding(embedding_id)?;
        }

        debug!(%id, "Deleted node");
        self.events.push(ChangeEvent::NodeDeleted { id: id.clone() });
        Ok(Some(node))
    }

    fn check_attachable(&self, embedding: &EmbeddingId, node: &NodeId) -> Result<(), StorageError> {
        if self.txn.open_table(EMBEDDINGS)?.get(embedding.as_str())?.is_none() {
            return Err(StorageError::MissingEmbedding(embedding.clone()));
        }
        let owners = self.lookup(
            IndexedField::EmbeddingId,
            FilterOperator::Equals,
            &FieldValue::from(embedding.as_str()),
        )?;
        match owners.into_iter().find(|owner| owner != node) {
            Some(owner) => Err(StorageError::EmbeddingOwned {
                embedding: embedding.clone(),
                owner,
            }),
            None => Ok(()),
        }
    }

    /// Node ids whose `field` satisfies `op value`, including this batch's writes.
    pub fn lookup(
        &self,
        field: IndexedField,
        op: FilterOperator,
        value: &FieldValue,
    ) -> Result<BTreeSet<NodeId>, StorageError> {
        let table = self.txn.open_multimap_table(tables::structural(field))?;
        structural::lookup(&table, op, value)
    }

    // =========================================================================
    // EDGES
    // =========================================================================

    pub fn get_edge(&self, id: &EdgeId) -> Result<Option<Edge>, StorageError> {
        get_record(&self.txn.open_table(EDGES)?, id.as_str())
    }

    /// Upsert an edge. Fails with `DanglingEdge` unless both endpoints exist
    /// in this transaction.
    pub fn put_edge(&mut self, edge: Edge) -> Result<Option<Edge>, StorageError> {
        if edge.id.as_str().is_empty() {
            return Err(StorageError::InvalidRecord("edge id is empty".to_string()));
        }
        for endpoint in [&edge.from_node, &edge.to_node] {
            if !self.contains_node(endpoint)? {
                return Err(StorageError::DanglingEdge(endpoint.clone()));
            }
        }
        let prior: Option<Edge> = {
            let mut table = self.txn.open_table(EDGES)?;
            put_record(&mut table, edge.id.as_str(), &edge)?
        };
        if let Some(prior) = &prior {
            adjacency::unlink(&self.txn, prior)?;
        }
        adjacency::link(&self.txn, &edge)?;
        debug!(id = %edge.id, edge_type = %edge.edge_type, from = %edge.from_node, to = %edge.to_node, "Put edge");

        if prior.is_none() {
            self.events.push(ChangeEvent::EdgeCreated {
                id: edge.id.clone(),
                edge_type: edge.edge_type.clone(),
            });
        }
        Ok(prior)
    }

    pub fn delete_edge(&mut self, id: &EdgeId) -> Result<Option<Edge>, StorageError> {
        let removed: Option<Edge> = {
            let mut table = self.txn.open_table(EDGES)?;
            take_record(&mut table, id.as_str())?
        };
        if let Some(edge) = &removed {
            adjacency::unlink(&self.txn, edge)?;
            self.events.push(ChangeEvent::EdgeDeleted { id: id.clone() });
        }
        Ok(removed)
    }

    /// Edges incident to `node`, including this batch's writes.
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

    // =========================================================================
    // EMBEDDINGS
    // =========================================================================

    pub fn get_embedding(&self, id: &EmbeddingId) -> Result<Option<Embedding>, StorageError> {
        get_record(&self.txn.open_table(EMBEDDINGS)?, id.as_str())
    }

    /// Upsert an embedding. Its vector enters the vector graph at commit.
    pub fn put_embedding(&mut self, embedding: Embedding) -> Result<Option<Embedding>, StorageError> {
        if embedding.id.as_str().is_empty() {
            return Err(StorageError::InvalidRecord("embedding id is empty".to_string()));
        }
        if embedding.vector.is_empty() {
            return Err(StorageError::InvalidRecord(format!(
                "embedding {} has no components",
                embedding.id
            )));
        }
        if embedding.vector.iter().any(|x| !x.is_finite()) {
            return Err(StorageError::InvalidRecord(format!(
                "embedding {} has non-finite components",
                embedding.id
            )));
        }
        self.check_dimension(embedding.dimension())?;

        let prior: Option<Embedding> = {
            let mut table = self.txn.open_table(EMBEDDINGS)?;
            put_record(&mut table, embedding.id.as_str(), &embedding)?
        };
        debug!(id = %embedding.id, dimension = embedding.dimension(), "Put embedding");
        self.vector_ops.push(VectorOp::Upsert {
            id: embedding.id,
            vector: embedding.vector,
        });
        Ok(prior)
    }

    /// Delete an unowned embedding. Fails with `EmbeddingOwned` while a node
    /// still references it.
    pub fn delete_embedding(&mut self, id: &EmbeddingId) -> Result<Option<Embedding>, StorageError> {
        let owners = self.lookup(
            IndexedField::EmbeddingId,
            FilterOperator::Equals,
            &FieldValue::from(id.as_str()),
        )?;
        if let Some(owner) = owners.into_iter().next() {
            return Err(StorageError::EmbeddingOwned {
                embedding: id.clone(),
                owner,
            });
        }
        let removed: Option<Embedding> = {
            let mut table = self.txn.open_table(EMBEDDINGS)?;
            take_record(&mut table, id.as_str())?
        };
        if removed.is_some() {
            self.vector_ops.push(VectorOp::Remove { id: id.clone() });
        }
        Ok(removed)
    }

    fn check_dimension(&mut self, actual: usize) -> Result<(), StorageError> {
        let expected = match self.pending_dimension {
            Some(d) => Some(d),
            None => self.store.vectors()?.dimension(),
        };
        match expected {
            Some(expected) if expected != actual => {
                Err(IndexError::DimensionMismatch { expected, actual }.into())
            }
            Some(_) => Ok(()),
            None => {
                self.pending_dimension = Some(actual);
                Ok(())
            }
        }
    }

    // =========================================================================
    // COMMIT
    // =========================================================================

    pub(super) fn abort(self) {
        if let Err(e) = self.txn.abort() {
            warn!(error = %e, "Aborting write transaction failed");
        }
    }

    /// Apply buffered vector changes, commit, and hand back the events.
    ///
    /// On failure the vector graph is rolled back and nothing is committed.
    pub(super) fn commit(self) -> Result<Vec<ChangeEvent>, StorageError> {
        let Self {
            store,
            txn,
            vector_ops,
            events,
            ..
        } = self;

        if vector_ops.is_empty() {
            txn.commit()?;
            return Ok(events);
        }

        let mut vectors = store.vectors.write().map_err(|_| IndexError::LockPoisoned)?;
        let mut undo = UndoLog::default();
        if let Err(e) = apply(&mut vectors, &txn, vector_ops, &mut undo) {
            vectors.rollback(undo);
            return Err(e);
        }
        if let Err(e) = txn.commit() {
            vectors.rollback(undo);
            return Err(e.into());
        }
        Ok(events)
    }
}

fn apply(
    vectors: &mut HnswIndex,
    txn: &WriteTransaction,
    ops: Vec<VectorOp>,
    undo: &mut UndoLog,
) -> Result<(), StorageError> {
    for op in ops {
        match op {
            VectorOp::Upsert { id, vector } => vectors.insert(id, vector, undo)?,
            VectorOp::Remove { id } => {
                vectors.remove(&id, undo);
            }
        }
    }
    let dirty = vectors.dirty(undo);
    vectors.persist(txn, &dirty)
}
