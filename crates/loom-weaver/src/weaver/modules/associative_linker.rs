//! Connects near-duplicate and closely related content.
//!
//! Candidates come from an approximate nearest-neighbour search around the
//! node's own vector. A link is created only when the other node carries free
//! text, was created within the association window, scores at least the
//! similarity threshold and is not already directly connected.

use crate::config::WeaverConfig;
use crate::error::WeaverResult;
use crate::weaver::context::WeaverContext;
use loom_core::primitives::EDGE_SIMILAR;
use loom_core::{Direction, Edge, EdgeId, Node, NodeId, Store};
use tracing::debug;

/// Candidates fetched per association slot.
const SEARCH_FANOUT: usize = 4;

/// Returns the number of `IS_SEMANTICALLY_SIMILAR_TO` edges created.
pub async fn run(ctx: &WeaverContext, node_id: &NodeId) -> WeaverResult<usize> {
    let id = node_id.clone();
    let config = ctx.config.clone();
    let candidates = ctx
        .blocking(move |store| Ok(find_candidates(store, &id, &config)?))
        .await?;
    if candidates.is_empty() {
        return Ok(0);
    }

    let id = node_id.clone();
    let max = ctx.config.max_associations;
    let created = ctx
        .write(move |batch| {
            if !batch.contains_node(&id)? {
                return Ok(0);
            }
            let mut created = 0;
            for (other, score) in candidates {
                if created == max {
                    break;
                }
                if !batch.contains_node(&other)? {
                    continue;
                }
                let connected = batch
                    .edges_of(&id, Direction::Both, None)?
                    .iter()
                    .any(|e| e.other_end(&id) == Some(&other));
                if connected {
                    continue;
                }
                let edge = Edge::new(similarity_edge_id(&id, &other), id.clone(), other, EDGE_SIMILAR)
                    .with_metadata("similarity_score", f64::from(score));
                batch.put_edge(edge)?;
                created += 1;
            }
            Ok(created)
        })
        .await?;
    if created > 0 {
        debug!(node = %node_id, created, "Created associative links");
    }
    Ok(created)
}

/// The same id whichever end the link is created from.
pub fn similarity_edge_id(a: &NodeId, b: &NodeId) -> EdgeId {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    EdgeId::new(format!("similar:{low}:{high}"))
}

/// Eligible neighbours of `node_id`, best first.
fn find_candidates(
    store: &Store,
    node_id: &NodeId,
    config: &WeaverConfig,
) -> Result<Vec<(NodeId, f32)>, loom_core::StorageError> {
    let Some(node) = store.get_node(node_id)? else {
        return Ok(Vec::new());
    };
    if !node.is_text_bearing() {
        return Ok(Vec::new());
    }
    let Some(embedding_id) = node.embedding_id().cloned() else {
        debug!(node = %node_id, "No embedding yet");
        return Ok(Vec::new());
    };
    let Some(embedding) = store.get_embedding(&embedding_id)? else {
        return Ok(Vec::new());
    };

    let k = config
        .max_associations
        .saturating_add(1)
        .saturating_mul(SEARCH_FANOUT);
    let neighbours = store.nearest_embeddings(&embedding.vector, k, &|label| label != &embedding_id)?;

    let snapshot = store.snapshot()?;
    let window = config.association_window_millis();
    let mut eligible = Vec::new();
    for (label, score) in neighbours {
        if score < config.similarity_threshold {
            continue;
        }
        let Some(owner) = snapshot.node_for_embedding(&label)? else {
            continue;
        };
        if &owner == node_id {
            continue;
        }
        let Some(other) = snapshot.get_node(&owner)? else {
            continue;
        };
        if !within_window(&node, &other, window) {
            continue;
        }
        eligible.push((owner, score));
    }
    Ok(eligible)
}

fn within_window(a: &Node, b: &Node, window: i64) -> bool {
    b.is_text_bearing() && a.created_at().abs_diff(b.created_at()) <= window.unsigned_abs()
}
