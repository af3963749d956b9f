//! # Converged Query
//!
//! Stage 1 is exact: structural filters through the structural index and a
//! graph filter through breadth-first search over the adjacency index,
//! intersected. The vector index is never consulted here.
//!
//! Stage 2 ranks the surviving candidates by similarity to the semantic
//! vector, applies the similarity floor and then `offset`/`limit`. Without a
//! semantic facet the candidates are paginated in id order.

mod model;

pub use model::{
    ConvergedQuery, FilterOperator, GraphFilter, Path, QueryHit, SemanticQuery, StructuralFilter,
};

use crate::index::HnswIndex;
use crate::primitives::MAX_TRAVERSAL_DEPTH;
use crate::storage::{Snapshot, Store};
use crate::types::{
    Direction, Edge, EmbeddingId, FieldValue, IndexedField, Node, NodeId, QueryError,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

/// A structural filter resolved against the index vocabulary.
struct ResolvedFilter<'q> {
    field: IndexedField,
    operator: FilterOperator,
    value: &'q FieldValue,
}

/// Executes converged queries and path searches against a [`Store`].
#[derive(Debug, Clone, Copy)]
pub struct QueryEngine<'s> {
    store: &'s Store,
}

impl<'s> QueryEngine<'s> {
    #[must_use]
    pub const fn new(store: &'s Store) -> Self {
        Self { store }
    }

    /// Run a converged query.
    pub fn query(&self, query: &ConvergedQuery) -> Result<Vec<QueryHit>, QueryError> {
        let filters = validate(query)?;
        let snapshot = self.store.snapshot()?;

        // Stage 1: exact candidate generation
        let mut candidates: Option<BTreeSet<NodeId>> = None;
        for filter in &filters {
            let matched = snapshot.lookup(filter.field, filter.operator, filter.value)?;
            candidates = Some(intersect(candidates, matched));
        }
        if let Some(graph) = &query.graph_filter {
            let reachable = reachable(&snapshot, graph)?;
            candidates = Some(intersect(candidates, reachable));
        }
        debug!(
            candidates = candidates.as_ref().map(BTreeSet::len),
            semantic = query.semantic_query.is_some(),
            "Stage 1 complete"
        );

        // Stage 2: semantic ranking or plain pagination
        let Some(semantic) = &query.semantic_query else {
            let ids: Vec<NodeId> = match candidates {
                Some(ids) => ids.into_iter().skip(query.offset).take(query.limit).collect(),
                None => snapshot
                    .node_ids()?
                    .into_iter()
                    .skip(query.offset)
                    .take(query.limit)
                    .collect(),
            };
            let mut hits = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(node) = snapshot.get_node(&id)? {
                    hits.push(QueryHit {
                        node,
                        similarity_score: None,
                    });
                }
            }
            return Ok(hits);
        };

        if matches!(&candidates, Some(ids) if ids.is_empty()) || query.limit == 0 {
            return Ok(Vec::new());
        }

        let vectors = self.store.vectors()?;
        match vectors.dimension() {
            None => return Ok(Vec::new()),
            Some(expected) if expected != semantic.vector.len() => {
                return Err(QueryError::DimensionMismatch {
                    expected,
                    actual: semantic.vector.len(),
                });
            }
            Some(_) => {}
        }

        let needed = query.offset.saturating_add(query.limit);
        let floor = semantic.similarity_threshold.unwrap_or(f32::NEG_INFINITY);
        let mut ranked = match candidates {
            Some(ids) if ids.len() <= self.store.config().query.exact_scan_limit => {
                rank_exact(&snapshot, &vectors, &semantic.vector, ids)?
            }
            Some(ids) => {
                let mut owners = BTreeMap::new();
                for id in ids {
                    if let Some(node) = snapshot.get_node(&id)? {
                        if let Some(embedding_id) = node.embedding_id().cloned() {
                            owners.insert(embedding_id, node);
                        }
                    }
                }
                let oversampling = self.store.config().query.oversampling;
                let hits = search_widening(&vectors, &semantic.vector, needed, oversampling, floor, &|label| {
                    owners.contains_key(label)
                });
                hits.into_iter()
                    .filter_map(|(label, score)| owners.get(&label).map(|n| (n.clone(), score)))
                    .collect()
            }
            None => {
                let oversampling = self.store.config().query.oversampling;
                let hits = search_widening(&vectors, &semantic.vector, needed, oversampling, floor, &|_| true);
                let mut ranked = Vec::with_capacity(hits.len());
                for (label, score) in hits {
                    let Some(owner) = snapshot.node_for_embedding(&label)? else {
                        continue;
                    };
                    if let Some(node) = snapshot.get_node(&owner)? {
                        ranked.push((node, score));
                    }
                }
                ranked
            }
        };
        drop(vectors);

        ranked.retain(|(_, score)| *score >= floor);
        ranked.sort_by(|(a, sa), (b, sb)| sb.total_cmp(sa).then_with(|| a.id().cmp(b.id())));
        Ok(ranked
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|(node, score)| QueryHit {
                node,
                similarity_score: Some(score),
            })
            .collect())
    }

    /// Fewest-hop path from `start` to `end` following edges in `direction`.
    ///
    /// Ties go to the first edge in adjacency order. Returns `None` when
    /// either node is missing or `end` is unreachable.
    pub fn shortest_path(
        &self,
        start: &NodeId,
        end: &NodeId,
        direction: Direction,
    ) -> Result<Option<Path>, QueryError> {
        let snapshot = self.store.snapshot()?;
        let Some(start_node) = snapshot.get_node(start)? else {
            return Ok(None);
        };
        if !snapshot.contains_node(end)? {
            return Ok(None);
        }
        if start == end {
            return Ok(Some(Path {
                nodes: vec![start_node],
                edges: Vec::new(),
            }));
        }

        let mut parents: BTreeMap<NodeId, Edge> = BTreeMap::new();
        let mut visited = BTreeSet::from([start.clone()]);
        let mut queue = VecDeque::from([start.clone()]);

        while let Some(current) = queue.pop_front() {
            for edge in snapshot.edges_of(&current, direction, None)? {
                let Some(next) = edge.other_end(&current).cloned() else {
                    continue;
                };
                if !visited.insert(next.clone()) {
                    continue;
                }
                parents.insert(next.clone(), edge);
                if &next == end {
                    return build_path(&snapshot, start_node, end, &parents).map(Some);
                }
                queue.push_back(next);
            }
        }
        Ok(None)
    }
}

// =============================================================================
// STAGE 1
// =============================================================================

fn validate(query: &ConvergedQuery) -> Result<Vec<ResolvedFilter<'_>>, QueryError> {
    let mut equalities: BTreeMap<IndexedField, &FieldValue> = BTreeMap::new();
    let mut resolved = Vec::with_capacity(query.structural_filters.len());
    for filter in &query.structural_filters {
        let field: IndexedField = filter.field.parse()?;
        if filter.value.kind() != field.kind() {
            return Err(QueryError::TypeMismatch {
                field,
                expected: field.kind(),
            });
        }
        if filter.operator == FilterOperator::Equals {
            if let Some(previous) = equalities.insert(field, &filter.value) {
                if previous != &filter.value {
                    return Err(QueryError::ConflictingFilters(field));
                }
            }
        }
        resolved.push(ResolvedFilter {
            field,
            operator: filter.operator,
            value: &filter.value,
        });
    }

    if let Some(graph) = &query.graph_filter {
        if graph.depth == 0 || graph.depth > MAX_TRAVERSAL_DEPTH {
            return Err(QueryError::InvalidDepth {
                depth: graph.depth,
                max: MAX_TRAVERSAL_DEPTH,
            });
        }
    }

    if let Some(semantic) = &query.semantic_query {
        if semantic.vector.is_empty() {
            return Err(QueryError::EmptyVector);
        }
        if let Some(threshold) = semantic.similarity_threshold {
            if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
                return Err(QueryError::InvalidThreshold(threshold));
            }
        }
    }
    Ok(resolved)
}

fn intersect(current: Option<BTreeSet<NodeId>>, next: BTreeSet<NodeId>) -> BTreeSet<NodeId> {
    match current {
        None => next,
        Some(current) => current.intersection(&next).cloned().collect(),
    }
}

/// Nodes within `1..=depth` hops of the start node. The start node itself is excluded.
fn reachable(snapshot: &Snapshot, graph: &GraphFilter) -> Result<BTreeSet<NodeId>, QueryError> {
    let mut found = BTreeSet::new();
    if !snapshot.contains_node(&graph.start_node_id)? {
        return Ok(found);
    }
    let mut visited = BTreeSet::from([graph.start_node_id.clone()]);
    let mut queue = VecDeque::from([(graph.start_node_id.clone(), 0usize)]);
    while let Some((current, hops)) = queue.pop_front() {
        if hops == graph.depth {
            continue;
        }
        for edge in snapshot.edges_of(&current, graph.direction, graph.edge_type.as_deref())? {
            let Some(next) = edge.other_end(&current) else {
                continue;
            };
            if visited.insert(next.clone()) {
                found.insert(next.clone());
                queue.push_back((next.clone(), hops + 1));
            }
        }
    }
    Ok(found)
}

// =============================================================================
// STAGE 2
// =============================================================================

/// Score every candidate exactly. Nodes without an indexed embedding are skipped.
fn rank_exact(
    snapshot: &Snapshot,
    vectors: &HnswIndex,
    query: &[f32],
    ids: BTreeSet<NodeId>,
) -> Result<Vec<(Node, f32)>, QueryError> {
    let metric = vectors.config().metric;
    let mut ranked = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(node) = snapshot.get_node(&id)? else {
            continue;
        };
        let Some(vector) = node.embedding_id().and_then(|e| vectors.vector(e)) else {
            continue;
        };
        let score = metric.similarity(metric.distance(query, vector));
        ranked.push((node, score));
    }
    Ok(ranked)
}

/// HNSW search widened until `needed` accepted hits are found, the scores
/// fall below `floor`, or the index is exhausted.
fn search_widening(
    vectors: &HnswIndex,
    query: &[f32],
    needed: usize,
    oversampling: usize,
    floor: f32,
    accept: &dyn Fn(&EmbeddingId) -> bool,
) -> Vec<(EmbeddingId, f32)> {
    let metric = vectors.config().metric;
    let total = vectors.len();
    let mut k = needed.min(total).max(1);
    loop {
        let ef = vectors.config().ef_search.max(k.saturating_mul(oversampling));
        let hits: Vec<(EmbeddingId, f32)> = vectors
            .search(query, k, ef, accept)
            .into_iter()
            .map(|(label, distance)| (label, metric.similarity(distance)))
            .collect();
        let exhausted = hits.len() < k || k >= total;
        let below_floor = hits.last().is_some_and(|(_, score)| *score < floor);
        if hits.len() >= needed || exhausted || below_floor {
            return hits;
        }
        k = k.saturating_mul(2).min(total);
    }
}

fn build_path(
    snapshot: &Snapshot,
    start_node: Node,
    end: &NodeId,
    parents: &BTreeMap<NodeId, Edge>,
) -> Result<Path, QueryError> {
    let mut edges = Vec::new();
    let mut cursor = end.clone();
    while let Some(edge) = parents.get(&cursor) {
        let Some(previous) = edge.other_end(&cursor).cloned() else {
            break;
        };
        edges.push(edge.clone());
        cursor = previous;
    }
    edges.reverse();

    let mut nodes = vec![start_node];
    let mut current = nodes[0].id().clone();
    for edge in &edges {
        let Some(next) = edge.other_end(&current).cloned() else {
            break;
        };
        if let Some(node) = snapshot.get_node(&next)? {
            nodes.push(node);
        }
        current = next;
    }
    Ok(Path { nodes, edges })
}
