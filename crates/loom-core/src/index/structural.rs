//! # Structural Index
//!
//! One multimap keyspace per indexed field: `encoded value -> {node id}`.
//!
//! Keys are order-preserving: a tag byte (`0x01` integer, `0x02` text)
//! followed by the big-endian, sign-flipped integer or the UTF-8 text. Range
//! operators are therefore plain key-range scans.

use crate::storage::tables::structural;
use crate::types::{FieldValue, Node, NodeId, StorageError};
use redb::{MultimapValue, ReadableMultimapTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Bound;

const TAG_INT: u8 = 0x01;
const TAG_TEXT: u8 = 0x02;

/// Comparison applied by a structural filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    Equals,
    /// Nodes carrying the field with any other value.
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Equals => "=",
            Self::NotEquals => "!=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
        })
    }
}

/// Order-preserving key bytes of a field value.
pub(crate) fn encode_key(value: &FieldValue) -> Vec<u8> {
    match value {
        FieldValue::Int(v) => {
            let mut key = Vec::with_capacity(9);
            key.push(TAG_INT);
            key.extend_from_slice(&((*v as u64) ^ (1 << 63)).to_be_bytes());
            key
        }
        FieldValue::Text(v) => {
            let mut key = Vec::with_capacity(v.len() + 1);
            key.push(TAG_TEXT);
            key.extend_from_slice(v.as_bytes());
            key
        }
    }
}

/// Add every entry `node` contributes.
pub(crate) fn add(txn: &WriteTransaction, node: &Node) -> Result<(), StorageError> {
    let id = node.id().as_str();
    for (field, value) in node.indexed_fields() {
        let mut table = txn.open_multimap_table(structural(field))?;
        table.insert(encode_key(&value).as_slice(), id)?;
    }
    Ok(())
}

/// Remove every entry `node` contributes.
pub(crate) fn remove(txn: &WriteTransaction, node: &Node) -> Result<(), StorageError> {
    let id = node.id().as_str();
    for (field, value) in node.indexed_fields() {
        let mut table = txn.open_multimap_table(structural(field))?;
        table.remove(encode_key(&value).as_slice(), id)?;
    }
    Ok(())
}

/// Replace the entries of `prior` with those of `node`.
pub(crate) fn update(
    txn: &WriteTransaction,
    prior: Option<&Node>,
    node: &Node,
) -> Result<(), StorageError> {
    if let Some(prior) = prior {
        remove(txn, prior)?;
    }
    add(txn, node)
}

/// Node ids whose value of the table's field satisfies `op value`.
pub(crate) fn lookup<T>(
    table: &T,
    op: FilterOperator,
    value: &FieldValue,
) -> Result<BTreeSet<NodeId>, StorageError>
where
    T: ReadableMultimapTable<&'static [u8], &'static str>,
{
    let key = encode_key(value);
    let key = key.as_slice();
    let mut out = BTreeSet::new();

    let bounds: (Bound<&[u8]>, Bound<&[u8]>) = match op {
        FilterOperator::Equals => {
            collect(table.get(key)?, &mut out)?;
            return Ok(out);
        }
        FilterOperator::NotEquals => {
            for entry in table.iter()? {
                let (k, ids) = entry?;
                if k.value() != key {
                    collect(ids, &mut out)?;
                }
            }
            return Ok(out);
        }
        FilterOperator::GreaterThan => (Bound::Excluded(key), Bound::Unbounded),
        FilterOperator::GreaterThanOrEqual => (Bound::Included(key), Bound::Unbounded),
        FilterOperator::LessThan => (Bound::Unbounded, Bound::Excluded(key)),
        FilterOperator::LessThanOrEqual => (Bound::Unbounded, Bound::Included(key)),
    };

    let tag = key[0];
    for entry in table.range::<&[u8]>(bounds)? {
        let (k, ids) = entry?;
        if k.value().first() == Some(&tag) {
            collect(ids, &mut out)?;
        }
    }
    Ok(out)
}

fn collect(
    ids: MultimapValue<'_, &'static str>,
    out: &mut BTreeSet<NodeId>,
) -> Result<(), StorageError> {
    for id in ids {
        out.insert(NodeId::from(id?.value()));
    }
    Ok(())
}
