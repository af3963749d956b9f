//! Embeds node text and attaches the embedding to its node.

use crate::error::WeaverResult;
use crate::weaver::context::WeaverContext;
use loom_core::{Embedding, EmbeddingId, NodeId, NodeKind};
use tracing::debug;

/// Deterministic embedding id for `node`.
pub fn embedding_id_for(node: &NodeId) -> EmbeddingId {
    EmbeddingId::new(format!("emb:{node}"))
}

/// Returns the kind of the node if an embedding was written.
///
/// Nodes that already carry an embedding are skipped, so repeated delivery
/// of the same event writes at most one embedding.
pub async fn run(ctx: &WeaverContext, node_id: &NodeId) -> WeaverResult<Option<NodeKind>> {
    let id = node_id.clone();
    let Some(node) = ctx.blocking(move |store| Ok(store.get_node(&id)?)).await? else {
        return Ok(None);
    };
    if node.embedding_id().is_some() {
        debug!(node = %node_id, "Already embedded");
        return Ok(None);
    }
    let Some(text) = node.text().map(str::to_owned) else {
        return Ok(None);
    };

    let vector = ctx.ml.embed(&text).await?;
    let model = ctx.ml.model_name().to_string();
    let embedding_id = embedding_id_for(node_id);
    let id = node_id.clone();

    let written = ctx
        .write(move |batch| {
            // Re-check inside the transaction: another worker may have won.
            let Some(mut node) = batch.get_node(&id)? else {
                return Ok(None);
            };
            if node.embedding_id().is_some() {
                return Ok(None);
            }
            let kind = node.kind();
            batch.put_embedding(Embedding::new(embedding_id.clone(), vector, model))?;
            node.set_embedding_id(Some(embedding_id));
            batch.put_node(node)?;
            Ok(Some(kind))
        })
        .await?;
    if written.is_some() {
        debug!(node = %node_id, "Embedded node");
    }
    Ok(written)
}
