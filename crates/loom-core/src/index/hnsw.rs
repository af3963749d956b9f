//! # HNSW Vector Index
//!
//! A hierarchical navigable small world graph held in memory and mirrored to
//! two keyspaces: `hnsw_points` (level, links, tombstone flag) and
//! `hnsw_vector_ids` (point id -> embedding id).
//!
//! Live vectors are not stored in the graph keyspaces. They are hydrated from
//! the canonical `embeddings` keyspace on open. A tombstoned point keeps its
//! vector in its record because it still routes searches after the canonical
//! embedding is gone.
//!
//! ## Mutation
//!
//! Insert and remove record before-images into an [`UndoLog`]. The storage
//! layer applies a transaction's vector changes under the write lock,
//! persists the touched points in the same redb transaction, and rolls the
//! in-memory graph back if the commit fails.

use crate::config::HnswConfig;
use crate::primitives::MAX_HNSW_LEVEL;
use crate::storage::tables::{
    EMBEDDINGS, HNSW_POINTS, HNSW_VECTOR_IDS, META_HNSW_ENTRY, META_HNSW_MAX_LEVEL,
    META_VECTOR_DIMENSION, METADATA, NO_ENTRY, decode, encode, get_meta, get_record,
};
use crate::types::{Embedding, EmbeddingId, IndexError, StorageError};
use redb::{ReadTransaction, ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap, HashSet};

// =============================================================================
// POINTS
// =============================================================================

#[derive(Debug, Clone)]
struct Point {
    label: EmbeddingId,
    vector: Vec<f32>,
    level: usize,
    /// Links per layer, `0..=level`.
    neighbors: Vec<Vec<u64>>,
    deleted: bool,
}

/// Persisted form of a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PointRecord {
    level: u8,
    neighbors: Vec<Vec<u64>>,
    deleted: bool,
    vector: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    id: u64,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

// =============================================================================
// UNDO LOG
// =============================================================================

#[derive(Debug, Clone)]
struct BaseState {
    len: usize,
    entry: Option<u64>,
    max_level: usize,
    dimension: Option<usize>,
}

/// Before-images of everything a batch of vector changes touched.
#[derive(Debug, Default)]
pub(crate) struct UndoLog {
    base: Option<BaseState>,
    before: BTreeMap<u64, Point>,
    labels: Vec<(EmbeddingId, Option<u64>)>,
}

impl UndoLog {
    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.base.is_none()
    }

    fn begin(&mut self, index: &HnswIndex) {
        if self.base.is_none() {
            self.base = Some(BaseState {
                len: index.points.len(),
                entry: index.entry,
                max_level: index.max_level,
                dimension: index.dimension,
            });
        }
    }

    fn touch(&mut self, points: &[Point], id: u64) {
        let base_len = self.base.as_ref().map_or(0, |b| b.len);
        if (id as usize) < base_len {
            self.before
                .entry(id)
                .or_insert_with(|| points[id as usize].clone());
        }
    }
}

// =============================================================================
// INDEX
// =============================================================================

/// In-memory HNSW graph.
#[derive(Debug)]
pub struct HnswIndex {
    config: HnswConfig,
    points: Vec<Point>,
    /// Live points only.
    labels: BTreeMap<EmbeddingId, u64>,
    entry: Option<u64>,
    max_level: usize,
    dimension: Option<usize>,
}

impl HnswIndex {
    #[must_use]
    pub fn new(config: HnswConfig) -> Self {
        Self {
            config,
            points: Vec::new(),
            labels: BTreeMap::new(),
            entry: None,
            max_level: 0,
            dimension: None,
        }
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    /// Number of live points.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of tombstoned points still in the graph.
    pub fn tombstones(&self) -> usize {
        self.points.len() - self.labels.len()
    }

    /// Dimension fixed by the first vector ever inserted.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn contains(&self, label: &EmbeddingId) -> bool {
        self.labels.contains_key(label)
    }

    /// The live vector stored under `label`.
    pub fn vector(&self, label: &EmbeddingId) -> Option<&[f32]> {
        self.labels
            .get(label)
            .map(|&id| self.points[id as usize].vector.as_slice())
    }

    /// Live embedding ids in id order.
    pub fn labels(&self) -> impl Iterator<Item = &EmbeddingId> {
        self.labels.keys()
    }

    /// Whether the tombstone share calls for a rebuild.
    pub fn needs_compaction(&self) -> bool {
        let tombstones = self.tombstones();
        tombstones > 0
            && tombstones >= self.config.compaction_min_tombstones
            && tombstones as f32 / self.points.len() as f32 > self.config.compaction_ratio
    }

    pub(crate) fn check_dimension(&self, actual: usize) -> Result<(), IndexError> {
        match self.dimension {
            Some(expected) if expected != actual => {
                Err(IndexError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }

    /// Insert a vector under `label`, tombstoning any live point it replaces.
    pub(crate) fn insert(
        &mut self,
        label: EmbeddingId,
        vector: Vec<f32>,
        undo: &mut UndoLog,
    ) -> Result<(), IndexError> {
        self.check_dimension(vector.len())?;
        undo.begin(self);
        self.remove(&label, undo);

        let id = self.points.len() as u64;
        let level = assign_level(&label, self.config.m);
        let mut neighbors = vec![Vec::new(); level + 1];

        if let Some(entry) = self.entry {
            let mut closest = entry;
            for layer in (level + 1..=self.max_level).rev() {
                closest = self.greedy_closest(&vector, closest, layer);
            }
            let mut entry_points = vec![closest];
            for layer in (0..=level.min(self.max_level)).rev() {
                let found = self.search_layer(
                    &vector,
                    &entry_points,
                    self.config.ef_construction,
                    layer,
                    &|_| true,
                );
                neighbors[layer] = found.iter().take(self.config.m).map(|c| c.id).collect();
                if !found.is_empty() {
                    entry_points = found.iter().map(|c| c.id).collect();
                }
            }
        }

        undo.labels.push((label.clone(), None));
        self.labels.insert(label.clone(), id);
        self.points.push(Point {
            label,
            vector,
            level,
            neighbors: neighbors.clone(),
            deleted: false,
        });
        for (layer, links) in neighbors.iter().enumerate() {
            for &neighbor in links {
                self.link(neighbor, id, layer, undo);
            }
        }

        if self.dimension.is_none() {
            self.dimension = Some(self.points[id as usize].vector.len());
        }
        if self.entry.is_none() || level > self.max_level {
            self.entry = Some(id);
            self.max_level = level;
        }
        Ok(())
    }

    /// Tombstone the live point under `label`. Returns whether one existed.
    pub(crate) fn remove(&mut self, label: &EmbeddingId, undo: &mut UndoLog) -> bool {
        let Some(id) = self.labels.get(label).copied() else {
            return false;
        };
        undo.begin(self);
        undo.labels.push((label.clone(), Some(id)));
        undo.touch(&self.points, id);
        self.labels.remove(label);
        self.points[id as usize].deleted = true;
        true
    }

    /// Restore the state captured by `undo`.
    pub(crate) fn rollback(&mut self, undo: UndoLog) {
        let Some(base) = undo.base else {
            return;
        };
        self.points.truncate(base.len);
        for (id, point) in undo.before {
            self.points[id as usize] = point;
        }
        for (label, prior) in undo.labels.into_iter().rev() {
            match prior {
                Some(id) => {
                    self.labels.insert(label, id);
                }
                None => {
                    self.labels.remove(&label);
                }
            }
        }
        self.entry = base.entry;
        self.max_level = base.max_level;
        self.dimension = base.dimension;
    }

    /// Approximate `k` nearest live points accepted by `accept`, closest first.
    ///
    /// Rejected and tombstoned points still route the search.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        accept: &dyn Fn(&EmbeddingId) -> bool,
    ) -> Vec<(EmbeddingId, f32)> {
        let Some(entry) = self.entry else {
            return Vec::new();
        };
        if k == 0 || self.check_dimension(query.len()).is_err() {
            return Vec::new();
        }
        let mut closest = entry;
        for layer in (1..=self.max_level).rev() {
            closest = self.greedy_closest(query, closest, layer);
        }
        self.search_layer(query, &[closest], ef.max(k), 0, &|p| {
            !p.deleted && accept(&p.label)
        })
        .into_iter()
        .take(k)
        .map(|c| (self.points[c.id as usize].label.clone(), c.distance))
        .collect()
    }

    /// A fresh graph built from the live points only.
    pub(crate) fn rebuilt(&self) -> Result<Self, IndexError> {
        let mut fresh = Self::new(self.config.clone());
        let mut undo = UndoLog::default();
        for point in self.points.iter().filter(|p| !p.deleted) {
            fresh.insert(point.label.clone(), point.vector.clone(), &mut undo)?;
        }
        fresh.dimension = self.dimension;
        Ok(fresh)
    }

    // -------------------------------------------------------------------------
    // Graph internals
    // -------------------------------------------------------------------------

    fn distance(&self, query: &[f32], id: u64) -> f32 {
        self.config
            .metric
            .distance(query, &self.points[id as usize].vector)
    }

    fn links(&self, id: u64, layer: usize) -> &[u64] {
        self.points[id as usize]
            .neighbors
            .get(layer)
            .map_or(&[], Vec::as_slice)
    }

    fn max_links(&self, layer: usize) -> usize {
        if layer == 0 {
            self.config.m * 2
        } else {
            self.config.m
        }
    }

    fn greedy_closest(&self, query: &[f32], start: u64, layer: usize) -> u64 {
        let mut current = start;
        let mut best = self.distance(query, current);
        loop {
            let mut moved = false;
            for &neighbor in self.links(current, layer) {
                let d = self.distance(query, neighbor);
                if d < best {
                    best = d;
                    current = neighbor;
                    moved = true;
                }
            }
            if !moved {
                return current;
            }
        }
    }

    /// Beam search on one layer. Only accepted points enter the result set.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[u64],
        ef: usize,
        layer: usize,
        accept: &dyn Fn(&Point) -> bool,
    ) -> Vec<Candidate> {
        let mut visited: HashSet<u64> = HashSet::new();
        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();

        for &id in entry_points {
            if !visited.insert(id) {
                continue;
            }
            let candidate = Candidate {
                distance: self.distance(query, id),
                id,
            };
            frontier.push(Reverse(candidate));
            if accept(&self.points[id as usize]) {
                results.push(candidate);
            }
        }
        while results.len() > ef {
            results.pop();
        }

        while let Some(Reverse(current)) = frontier.pop() {
            if results.len() >= ef {
                if let Some(worst) = results.peek() {
                    if current.distance > worst.distance {
                        break;
                    }
                }
            }
            for &neighbor in self.links(current.id, layer) {
                if !visited.insert(neighbor) {
                    continue;
                }
                let distance = self.distance(query, neighbor);
                let promising = results.len() < ef
                    || results.peek().is_some_and(|worst| distance < worst.distance);
                if !promising {
                    continue;
                }
                let candidate = Candidate {
                    distance,
                    id: neighbor,
                };
                frontier.push(Reverse(candidate));
                if accept(&self.points[neighbor as usize]) {
                    results.push(candidate);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }
        results.into_sorted_vec()
    }

    /// Add `to` to the links of `from`, pruning to the closest when over capacity.
    fn link(&mut self, from: u64, to: u64, layer: usize, undo: &mut UndoLog) {
        let Some(existing) = self.points[from as usize].neighbors.get(layer) else {
            return;
        };
        if existing.contains(&to) {
            return;
        }
        let mut links = existing.clone();
        links.push(to);
        let cap = self.max_links(layer);
        if links.len() > cap {
            let origin = &self.points[from as usize].vector;
            let mut scored: Vec<Candidate> = links
                .iter()
                .map(|&id| Candidate {
                    distance: self.distance(origin, id),
                    id,
                })
                .collect();
            scored.sort();
            links = scored.into_iter().take(cap).map(|c| c.id).collect();
        }
        undo.touch(&self.points, from);
        self.points[from as usize].neighbors[layer] = links;
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    fn record(&self, id: u64) -> PointRecord {
        let point = &self.points[id as usize];
        PointRecord {
            level: point.level as u8,
            neighbors: point.neighbors.clone(),
            deleted: point.deleted,
            vector: point.deleted.then(|| point.vector.clone()),
        }
    }

    /// Point ids touched since `undo` began, including new points.
    pub(crate) fn dirty(&self, undo: &UndoLog) -> Vec<u64> {
        let Some(base) = &undo.base else {
            return Vec::new();
        };
        let mut ids: Vec<u64> = undo.before.keys().copied().collect();
        ids.extend(base.len as u64..self.points.len() as u64);
        ids
    }

    /// Write the given points and the graph header into `txn`.
    pub(crate) fn persist(&self, txn: &WriteTransaction, ids: &[u64]) -> Result<(), StorageError> {
        {
            let mut points = txn.open_table(HNSW_POINTS)?;
            let mut vector_ids = txn.open_table(HNSW_VECTOR_IDS)?;
            for &id in ids {
                let bytes = encode(&self.record(id))?;
                points.insert(id, bytes.as_slice())?;
                vector_ids.insert(id, self.points[id as usize].label.as_str())?;
            }
        }
        self.persist_header(txn)
    }

    /// Replace the persisted graph with this one.
    pub(crate) fn persist_all(&self, txn: &WriteTransaction) -> Result<(), StorageError> {
        txn.delete_table(HNSW_POINTS)?;
        txn.delete_table(HNSW_VECTOR_IDS)?;
        let ids: Vec<u64> = (0..self.points.len() as u64).collect();
        self.persist(txn, &ids)
    }

    fn persist_header(&self, txn: &WriteTransaction) -> Result<(), StorageError> {
        let mut meta = txn.open_table(METADATA)?;
        meta.insert(META_HNSW_ENTRY, self.entry.unwrap_or(NO_ENTRY))?;
        meta.insert(META_HNSW_MAX_LEVEL, self.max_level as u64)?;
        meta.insert(
            META_VECTOR_DIMENSION,
            self.dimension.map_or(0, |d| d as u64),
        )?;
        Ok(())
    }

    /// Hydrate the graph from its keyspaces and the canonical embeddings.
    pub(crate) fn load(txn: &ReadTransaction, config: HnswConfig) -> Result<Self, StorageError> {
        let meta = txn.open_table(METADATA)?;
        let points_table = txn.open_table(HNSW_POINTS)?;
        let vector_ids = txn.open_table(HNSW_VECTOR_IDS)?;
        let embeddings = txn.open_table(EMBEDDINGS)?;

        let mut index = Self::new(config);
        for entry in points_table.iter()? {
            let (key, value) = entry?;
            let id = key.value();
            if id != index.points.len() as u64 {
                return Err(IndexError::Inconsistent(format!(
                    "vector point ids are not contiguous at {id}"
                ))
                .into());
            }
            let record: PointRecord = decode(value.value())?;
            let label = vector_ids
                .get(id)?
                .map(|v| EmbeddingId::from(v.value()))
                .ok_or_else(|| {
                    IndexError::Inconsistent(format!("vector point {id} has no embedding id"))
                })?;
            let vector = match record.vector {
                Some(vector) => vector,
                None => get_record::<Embedding, _>(&embeddings, label.as_str())?
                    .map(|e| e.vector)
                    .ok_or_else(|| IndexError::MissingVector {
                        point: id,
                        embedding: label.clone(),
                    })?,
            };
            if !record.deleted {
                index.labels.insert(label.clone(), id);
            }
            index.points.push(Point {
                label,
                vector,
                level: record.level as usize,
                neighbors: record.neighbors,
                deleted: record.deleted,
            });
        }

        index.entry = get_meta(&meta, META_HNSW_ENTRY)?.filter(|&e| e != NO_ENTRY);
        index.max_level = get_meta(&meta, META_HNSW_MAX_LEVEL)?.unwrap_or(0) as usize;
        index.dimension = get_meta(&meta, META_VECTOR_DIMENSION)?
            .filter(|&d| d > 0)
            .map(|d| d as usize);
        if let Some(entry) = index.entry {
            if entry as usize >= index.points.len() {
                return Err(IndexError::Inconsistent(format!(
                    "vector entry point {entry} out of range"
                ))
                .into());
            }
        }
        Ok(index)
    }
}

/// Deterministic layer for a label: `floor(-ln(u) / ln(m))` with `u` from its
/// FNV-1a hash, which is stable across builds. The hash is finalized so the
/// high bits depend on every byte.
fn assign_level(label: &EmbeddingId, m: usize) -> usize {
    let bits = fmix64(fnv1a(label.as_str().as_bytes())) >> 11;
    let uniform = (bits as f64 + 1.0) / (1u64 << 53) as f64;
    let level = (-uniform.ln() / (m as f64).ln()).floor();
    (level as usize).min(MAX_HNSW_LEVEL)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}

fn fmix64(mut h: u64) -> u64 {
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^ (h >> 33)
}

// =============================================================================
// TESTS
// =============================================================================
