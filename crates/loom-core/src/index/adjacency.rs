//! Graph adjacency index: `adj_out` and `adj_in`, node id -> {edge id}.
//!
//! Both keyspaces are written together so they stay symmetric.

use crate::storage::tables::{ADJ_IN, ADJ_OUT, get_record};
use crate::types::{Direction, Edge, EdgeId, NodeId, StorageError};
use redb::{ReadableMultimapTable, ReadableTable, WriteTransaction};
use std::collections::BTreeSet;

pub(crate) fn link(txn: &WriteTransaction, edge: &Edge) -> Result<(), StorageError> {
    txn.open_multimap_table(ADJ_OUT)?
        .insert(edge.from_node.as_str(), edge.id.as_str())?;
    txn.open_multimap_table(ADJ_IN)?
        .insert(edge.to_node.as_str(), edge.id.as_str())?;
    Ok(())
}

pub(crate) fn unlink(txn: &WriteTransaction, edge: &Edge) -> Result<(), StorageError> {
    txn.open_multimap_table(ADJ_OUT)?
        .remove(edge.from_node.as_str(), edge.id.as_str())?;
    txn.open_multimap_table(ADJ_IN)?
        .remove(edge.to_node.as_str(), edge.id.as_str())?;
    Ok(())
}

/// Edge ids listed under `node`, in id order.
pub(crate) fn edge_ids<T>(table: &T, node: &NodeId) -> Result<Vec<EdgeId>, StorageError>
where
    T: ReadableMultimapTable<&'static str, &'static str>,
{
    let mut ids = Vec::new();
    for id in table.get(node.as_str())? {
        ids.push(EdgeId::from(id?.value()));
    }
    Ok(ids)
}

/// Edges incident to `node`: outgoing first, then incoming, each in id order.
///
/// A self-loop is listed once.
pub(crate) fn incident_edges<O, I, E>(
    outgoing: &O,
    incoming: &I,
    edges: &E,
    node: &NodeId,
    direction: Direction,
    edge_type: Option<&str>,
) -> Result<Vec<Edge>, StorageError>
where
    O: ReadableMultimapTable<&'static str, &'static str>,
    I: ReadableMultimapTable<&'static str, &'static str>,
    E: ReadableTable<&'static str, &'static [u8]>,
{
    let mut ids = Vec::new();
    if matches!(direction, Direction::Outbound | Direction::Both) {
        ids.extend(edge_ids(outgoing, node)?);
    }
    if matches!(direction, Direction::Inbound | Direction::Both) {
        ids.extend(edge_ids(incoming, node)?);
    }

    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.clone()) {
            continue;
        }
        let Some(edge) = get_record::<Edge, _>(edges, id.as_str())? else {
            continue;
        };
        if edge_type.is_none_or(|t| t == edge.edge_type) {
            out.push(edge);
        }
    }
    Ok(out)
}
