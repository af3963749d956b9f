//! Summarizes the unsummarized tail of a chat.

use crate::error::WeaverResult;
use crate::weaver::context::WeaverContext;
use loom_core::primitives::EDGE_SUMMARIZES;
use loom_core::{
    Direction, Edge, EdgeId, FieldValue, FilterOperator, IndexedField, Message, Node, NodeId,
    StorageError, Store, Summary,
};
use tracing::info;

/// Returns the id of the summary written, if any.
pub async fn run(ctx: &WeaverContext, chat_id: &NodeId) -> WeaverResult<Option<NodeId>> {
    let _turn = ctx.summary_turn(chat_id).await;

    let chat = chat_id.clone();
    let tail = ctx
        .blocking(move |store| Ok(unsummarized(store, &chat)?))
        .await?;
    if tail.len() < ctx.config.summary_threshold {
        return Ok(None);
    }
    let Some(last) = tail.last() else {
        return Ok(None);
    };
    let summary_id = NodeId::new(format!("summary:{chat_id}:{}", last.id));
    let texts: Vec<String> = tail.iter().map(|m| m.text.clone()).collect();
    let message_ids: Vec<NodeId> = tail.iter().map(|m| m.id.clone()).collect();

    let content = ctx.ml.summarize(&texts).await?;

    let chat = chat_id.clone();
    let id = summary_id.clone();
    let count = message_ids.len();
    let written = ctx
        .write(move |batch| {
            if batch.contains_node(&id)? || !batch.contains_node(&chat)? {
                return Ok(false);
            }
            let mut covered = Vec::with_capacity(message_ids.len());
            for message in message_ids {
                if batch.contains_node(&message)? {
                    covered.push(message);
                }
            }
            batch.put_node(Node::from(Summary::new(id.clone(), chat, content, covered.clone())))?;
            for message in covered {
                let edge_id = EdgeId::new(format!("summarizes:{id}:{message}"));
                batch.put_edge(Edge::new(edge_id, id.clone(), message, EDGE_SUMMARIZES))?;
            }
            Ok(true)
        })
        .await?;
    if !written {
        return Ok(None);
    }
    info!(chat = %chat_id, summary = %summary_id, messages = count, "Summarized chat");
    Ok(Some(summary_id))
}

/// Messages of `chat` no summary covers yet, oldest first.
fn unsummarized(store: &Store, chat: &NodeId) -> Result<Vec<Message>, StorageError> {
    let snapshot = store.snapshot()?;
    let in_chat = snapshot.lookup(
        IndexedField::ChatId,
        FilterOperator::Equals,
        &FieldValue::from(chat),
    )?;
    let messages = snapshot.lookup(
        IndexedField::NodeType,
        FilterOperator::Equals,
        &FieldValue::from("message"),
    )?;

    let mut tail = Vec::new();
    for id in in_chat.intersection(&messages) {
        let Some(Node::Message(message)) = snapshot.get_node(id)? else {
            continue;
        };
        let covered = !snapshot
            .edges_of(id, Direction::Inbound, Some(EDGE_SUMMARIZES))?
            .is_empty();
        if !covered {
            tail.push(message);
        }
    }
    tail.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    Ok(tail)
}
