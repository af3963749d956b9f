//! # Index Families
//!
//! Derived, disposable state kept beside the canonical records:
//! - `structural`: per-field sorted value -> node ids
//! - `adjacency`: symmetric outgoing/incoming edge sets
//! - `hnsw`: approximate nearest-neighbour graph over embeddings
//!
//! Every family is updated inside the transaction that writes the canonical
//! record. [`rebuild`] recreates all of them from canonical data, and
//! [`check`] reports any disagreement.

pub(crate) mod adjacency;
mod distance;
pub(crate) mod hnsw;
pub(crate) mod structural;

pub use distance::DistanceMetric;
pub use hnsw::HnswIndex;
pub use structural::FilterOperator;

use crate::config::HnswConfig;
use crate::storage::tables::{
    ADJ_IN, ADJ_OUT, EDGES, EMBEDDINGS, NODES, decode, structural as structural_table,
};
use crate::types::{Edge, Embedding, IndexError, IndexedField, Node, StorageError};
use hnsw::UndoLog;
use redb::{ReadTransaction, ReadableMultimapTable, ReadableTable, WriteTransaction};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{error, info};

/// Issues to show per keyspace before summarising.
const MAX_ISSUES_PER_KEYSPACE: usize = 8;

// =============================================================================
// REBUILD
// =============================================================================

/// Drop and recreate every index family from the canonical keyspaces.
///
/// Returns the new vector graph, already persisted in `txn`.
pub(crate) fn rebuild(txn: &WriteTransaction, config: &HnswConfig) -> Result<HnswIndex, StorageError> {
    for field in IndexedField::ALL {
        txn.delete_multimap_table(structural_table(field))?;
        let _ = txn.open_multimap_table(structural_table(field))?;
    }
    txn.delete_multimap_table(ADJ_OUT)?;
    txn.delete_multimap_table(ADJ_IN)?;
    let _ = txn.open_multimap_table(ADJ_OUT)?;
    let _ = txn.open_multimap_table(ADJ_IN)?;

    let nodes: Vec<Node> = read_all(&txn.open_table(NODES)?)?;
    let edges: Vec<Edge> = read_all(&txn.open_table(EDGES)?)?;
    let embeddings: Vec<Embedding> = read_all(&txn.open_table(EMBEDDINGS)?)?;

    for node in &nodes {
        structural::add(txn, node)?;
    }
    for edge in &edges {
        adjacency::link(txn, edge)?;
    }

    let mut vectors = HnswIndex::new(config.clone());
    let mut undo = UndoLog::default();
    for embedding in embeddings {
        vectors.insert(embedding.id, embedding.vector, &mut undo)?;
    }
    vectors.persist_all(txn)?;

    info!(
        nodes = nodes.len(),
        edges = edges.len(),
        vectors = vectors.len(),
        "Rebuilt all indexes"
    );
    Ok(vectors)
}

fn read_all<T, R>(table: &R) -> Result<Vec<T>, StorageError>
where
    T: serde::de::DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let mut out = Vec::with_capacity(table.len()? as usize);
    for entry in table.iter()? {
        let (_, value) = entry?;
        out.push(decode(value.value())?);
    }
    Ok(out)
}

// =============================================================================
// CONSISTENCY CHECK
// =============================================================================

/// Outcome of comparing every index family with canonical data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub nodes: usize,
    pub edges: usize,
    pub embeddings: usize,
    /// Human-readable disagreements. Empty when consistent.
    pub issues: Vec<String>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }

    /// `Err(IndexError::Inconsistent)` listing the issues, if any.
    pub fn into_result(self) -> Result<Self, IndexError> {
        if self.is_consistent() {
            Ok(self)
        } else {
            Err(IndexError::Inconsistent(self.issues.join("; ")))
        }
    }
}

/// Compare the index families visible in `txn` (and the in-memory vector
/// graph) against the canonical records.
pub(crate) fn check(txn: &ReadTransaction, vectors: &HnswIndex) -> Result<ConsistencyReport, StorageError> {
    let nodes: Vec<Node> = read_all(&txn.open_table(NODES)?)?;
    let edges: Vec<Edge> = read_all(&txn.open_table(EDGES)?)?;
    let embeddings: Vec<Embedding> = read_all(&txn.open_table(EMBEDDINGS)?)?;
    let mut report = ConsistencyReport {
        nodes: nodes.len(),
        edges: edges.len(),
        embeddings: embeddings.len(),
        issues: Vec::new(),
    };

    // Structural
    let mut expected: BTreeMap<IndexedField, BTreeSet<(Vec<u8>, String)>> = BTreeMap::new();
    for node in &nodes {
        for (field, value) in node.indexed_fields() {
            expected
                .entry(field)
                .or_default()
                .insert((structural::encode_key(&value), node.id().0.clone()));
        }
    }
    for field in IndexedField::ALL {
        let table = txn.open_multimap_table(structural_table(field))?;
        let actual = structural_pairs(&table)?;
        compare(
            &mut report.issues,
            &format!("idx_{}", field.name()),
            expected.remove(&field).unwrap_or_default(),
            actual,
        );
    }

    // Adjacency
    let node_ids: BTreeSet<&str> = nodes.iter().map(|n| n.id().as_str()).collect();
    let mut expected_out = BTreeSet::new();
    let mut expected_in = BTreeSet::new();
    for edge in &edges {
        for endpoint in [&edge.from_node, &edge.to_node] {
            if !node_ids.contains(endpoint.as_str()) {
                report
                    .issues
                    .push(format!("edge {} references missing node {}", edge.id, endpoint));
            }
        }
        expected_out.insert((edge.from_node.0.clone(), edge.id.0.clone()));
        expected_in.insert((edge.to_node.0.clone(), edge.id.0.clone()));
    }
    let actual_out = adjacency_pairs(&txn.open_multimap_table(ADJ_OUT)?)?;
    let actual_in = adjacency_pairs(&txn.open_multimap_table(ADJ_IN)?)?;
    compare(&mut report.issues, "adj_out", expected_out, actual_out);
    compare(&mut report.issues, "adj_in", expected_in, actual_in);

    // Vectors
    let stored: BTreeSet<String> = embeddings.iter().map(|e| e.id.0.clone()).collect();
    let indexed: BTreeSet<String> = vectors.labels().map(|l| l.0.clone()).collect();
    compare(&mut report.issues, "hnsw", stored.clone(), indexed);
    for node in &nodes {
        if let Some(embedding_id) = node.embedding_id() {
            if !stored.contains(embedding_id.as_str()) {
                report.issues.push(format!(
                    "node {} references missing embedding {}",
                    node.id(),
                    embedding_id
                ));
            }
        }
    }

    if !report.is_consistent() {
        error!(issues = report.issues.len(), "Index inconsistency detected");
    }
    Ok(report)
}

fn structural_pairs<T>(table: &T) -> Result<BTreeSet<(Vec<u8>, String)>, StorageError>
where
    T: ReadableMultimapTable<&'static [u8], &'static str>,
{
    let mut pairs = BTreeSet::new();
    for entry in table.iter()? {
        let (key, values) = entry?;
        for value in values {
            pairs.insert((key.value().to_vec(), value?.value().to_string()));
        }
    }
    Ok(pairs)
}

fn adjacency_pairs<T>(table: &T) -> Result<BTreeSet<(String, String)>, StorageError>
where
    T: ReadableMultimapTable<&'static str, &'static str>,
{
    let mut pairs = BTreeSet::new();
    for entry in table.iter()? {
        let (key, values) = entry?;
        for value in values {
            pairs.insert((key.value().to_string(), value?.value().to_string()));
        }
    }
    Ok(pairs)
}

fn compare<K: Ord + fmt::Debug>(
    issues: &mut Vec<String>,
    keyspace: &str,
    expected: BTreeSet<K>,
    actual: BTreeSet<K>,
) {
    let missing: Vec<&K> = expected.difference(&actual).collect();
    let stale: Vec<&K> = actual.difference(&expected).collect();
    for (kind, entries) in [("missing", missing), ("stale", stale)] {
        for entry in entries.iter().take(MAX_ISSUES_PER_KEYSPACE) {
            issues.push(format!("{keyspace}: {kind} entry {entry:?}"));
        }
        if entries.len() > MAX_ISSUES_PER_KEYSPACE {
            issues.push(format!(
                "{keyspace}: {} more {kind} entries",
                entries.len() - MAX_ISSUES_PER_KEYSPACE
            ));
        }
    }
}
