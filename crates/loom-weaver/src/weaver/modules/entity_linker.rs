//! Links text to the entities it mentions.

use crate::error::WeaverResult;
use crate::weaver::context::WeaverContext;
use loom_core::primitives::EDGE_MENTIONS;
use loom_core::{
    Direction, Edge, EdgeId, Entity, FieldValue, FilterOperator, IndexedField, Node, NodeId,
    StorageError, WriteBatch,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Returns the number of `MENTIONS` edges created.
pub async fn run(ctx: &WeaverContext, node_id: &NodeId) -> WeaverResult<usize> {
    let id = node_id.clone();
    let Some(node) = ctx.blocking(move |store| Ok(store.get_node(&id)?)).await? else {
        return Ok(0);
    };
    if !node.is_text_bearing() {
        return Ok(0);
    }
    let Some(text) = node.text().map(str::to_owned) else {
        return Ok(0);
    };

    let extracted = ctx.ml.extract_entities(&text).await?;
    // One mention per (label, type); the first span wins.
    let mut mentions: BTreeMap<(String, String), (usize, usize)> = BTreeMap::new();
    for entity in extracted {
        let label = entity.text.trim().to_string();
        if label.is_empty() || entity.entity_type.trim().is_empty() {
            continue;
        }
        mentions
            .entry((label, entity.entity_type.trim().to_string()))
            .or_insert((entity.span.start, entity.span.end));
    }
    if mentions.is_empty() {
        return Ok(0);
    }

    let id = node_id.clone();
    let created = ctx
        .write(move |batch| {
            if !batch.contains_node(&id)? {
                return Ok(0);
            }
            let mut created = 0;
            for ((label, entity_type), (start, end)) in mentions {
                let entity = resolve_or_create(batch, &label, &entity_type)?;
                let already_linked = batch
                    .edges_of(&id, Direction::Outbound, Some(EDGE_MENTIONS))?
                    .iter()
                    .any(|e| e.to_node == entity);
                if already_linked {
                    continue;
                }
                let edge = Edge::new(
                    EdgeId::new(format!("mentions:{id}:{entity}")),
                    id.clone(),
                    entity,
                    EDGE_MENTIONS,
                )
                .with_metadata("span_start", start)
                .with_metadata("span_end", end);
                batch.put_edge(edge)?;
                created += 1;
            }
            Ok(created)
        })
        .await?;
    if created > 0 {
        debug!(node = %node_id, created, "Linked entities");
    }
    Ok(created)
}

/// Deterministic id for a new entity.
pub fn entity_id_for(label: &str, entity_type: &str) -> NodeId {
    NodeId::new(format!(
        "entity:{}:{}",
        entity_type.to_lowercase(),
        label.to_lowercase()
    ))
}

/// The entity with this label and type, created if absent.
fn resolve_or_create(
    batch: &mut WriteBatch<'_>,
    label: &str,
    entity_type: &str,
) -> Result<NodeId, StorageError> {
    let by_label = batch.lookup(IndexedField::Label, FilterOperator::Equals, &FieldValue::from(label))?;
    if !by_label.is_empty() {
        let by_type = batch.lookup(
            IndexedField::EntityType,
            FilterOperator::Equals,
            &FieldValue::from(entity_type),
        )?;
        if let Some(existing) = by_label.intersection(&by_type).next() {
            return Ok(existing.clone());
        }
    }

    let base = entity_id_for(label, entity_type);
    let mut id = base.clone();
    // Case variants share the folded id; never overwrite one.
    let mut suffix = 2;
    while batch.contains_node(&id)? {
        id = NodeId::new(format!("{base}:{suffix}"));
        suffix += 1;
    }
    batch.put_node(Node::from(Entity::new(id.clone(), label, entity_type)))?;
    debug!(%id, label, entity_type, "Created entity");
    Ok(id)
}
