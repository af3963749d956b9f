//! Keyspace definitions and record codec helpers.
//!
//! One redb file holds:
//! - canonical records: `nodes`, `edges`, `embeddings`
//! - one `idx_<field>` multimap per structural field
//! - `adj_out` / `adj_in` adjacency multimaps
//! - `hnsw_points` / `hnsw_vector_ids` for the vector graph
//! - `metadata` counters and format version

use crate::types::{IndexedField, StorageError};
use redb::{MultimapTableDefinition, ReadableTable, Table, TableDefinition, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Table for nodes: NodeId -> postcard `Node`
pub(crate) const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Table for edges: EdgeId -> postcard `Edge`
pub(crate) const EDGES: TableDefinition<&str, &[u8]> = TableDefinition::new("edges");

/// Table for embeddings: EmbeddingId -> postcard `Embedding`
pub(crate) const EMBEDDINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("embeddings");

/// Outgoing adjacency: NodeId -> {EdgeId}
pub(crate) const ADJ_OUT: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("adj_out");

/// Incoming adjacency: NodeId -> {EdgeId}
pub(crate) const ADJ_IN: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("adj_in");

/// HNSW points: point id -> postcard `PointRecord`
pub(crate) const HNSW_POINTS: TableDefinition<u64, &[u8]> = TableDefinition::new("hnsw_points");

/// HNSW point id -> EmbeddingId
pub(crate) const HNSW_VECTOR_IDS: TableDefinition<u64, &str> =
    TableDefinition::new("hnsw_vector_ids");

/// Table for metadata: key string -> value u64
pub(crate) const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

pub(crate) const META_FORMAT_VERSION: &str = "format_version";
pub(crate) const META_HNSW_ENTRY: &str = "hnsw_entry";
pub(crate) const META_HNSW_MAX_LEVEL: &str = "hnsw_max_level";
pub(crate) const META_VECTOR_DIMENSION: &str = "vector_dimension";

/// Sentinel for "no entry point" in `META_HNSW_ENTRY`.
pub(crate) const NO_ENTRY: u64 = u64::MAX;

type StructuralTable = MultimapTableDefinition<'static, &'static [u8], &'static str>;

const IDX_NODE_TYPE: StructuralTable = MultimapTableDefinition::new("idx_node_type");
const IDX_EMBEDDING_ID: StructuralTable = MultimapTableDefinition::new("idx_embedding_id");
const IDX_TITLE: StructuralTable = MultimapTableDefinition::new("idx_title");
const IDX_TOPIC: StructuralTable = MultimapTableDefinition::new("idx_topic");
const IDX_CREATED_AT: StructuralTable = MultimapTableDefinition::new("idx_created_at");
const IDX_CHAT_ID: StructuralTable = MultimapTableDefinition::new("idx_chat_id");
const IDX_SENDER: StructuralTable = MultimapTableDefinition::new("idx_sender");
const IDX_TIMESTAMP: StructuralTable = MultimapTableDefinition::new("idx_timestamp");
const IDX_LABEL: StructuralTable = MultimapTableDefinition::new("idx_label");
const IDX_ENTITY_TYPE: StructuralTable = MultimapTableDefinition::new("idx_entity_type");
const IDX_MESSAGE_ID: StructuralTable = MultimapTableDefinition::new("idx_message_id");
const IDX_MIME_TYPE: StructuralTable = MultimapTableDefinition::new("idx_mime_type");

/// Keyspace of one structural field: encoded value -> {NodeId}
pub(crate) const fn structural(field: IndexedField) -> StructuralTable {
    match field {
        IndexedField::NodeType => IDX_NODE_TYPE,
        IndexedField::EmbeddingId => IDX_EMBEDDING_ID,
        IndexedField::Title => IDX_TITLE,
        IndexedField::Topic => IDX_TOPIC,
        IndexedField::CreatedAt => IDX_CREATED_AT,
        IndexedField::ChatId => IDX_CHAT_ID,
        IndexedField::Sender => IDX_SENDER,
        IndexedField::Timestamp => IDX_TIMESTAMP,
        IndexedField::Label => IDX_LABEL,
        IndexedField::EntityType => IDX_ENTITY_TYPE,
        IndexedField::MessageId => IDX_MESSAGE_ID,
        IndexedField::MimeType => IDX_MIME_TYPE,
    }
}

/// Create every keyspace so read transactions never see a missing table.
pub(crate) fn create_all(txn: &WriteTransaction) -> Result<(), StorageError> {
    let _ = txn.open_table(NODES)?;
    let _ = txn.open_table(EDGES)?;
    let _ = txn.open_table(EMBEDDINGS)?;
    let _ = txn.open_multimap_table(ADJ_OUT)?;
    let _ = txn.open_multimap_table(ADJ_IN)?;
    let _ = txn.open_table(HNSW_POINTS)?;
    let _ = txn.open_table(HNSW_VECTOR_IDS)?;
    let _ = txn.open_table(METADATA)?;
    for field in IndexedField::ALL {
        let _ = txn.open_multimap_table(structural(field))?;
    }
    Ok(())
}

// =============================================================================
// RECORD CODEC
// =============================================================================

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    postcard::to_allocvec(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    postcard::from_bytes(bytes).map_err(|e| StorageError::Deserialization(e.to_string()))
}

/// Read and decode one record.
pub(crate) fn get_record<T, R>(table: &R, key: &str) -> Result<Option<T>, StorageError>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(guard) => decode(guard.value()).map(Some),
        None => Ok(None),
    }
}

/// Encode and write one record, returning the value it replaced.
pub(crate) fn put_record<T>(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    key: &str,
    value: &T,
) -> Result<Option<T>, StorageError>
where
    T: Serialize + DeserializeOwned,
{
    let bytes = encode(value)?;
    let prior = table.insert(key, bytes.as_slice())?;
    match prior {
        Some(guard) => decode(guard.value()).map(Some),
        None => Ok(None),
    }
}

/// Remove one record, returning it.
pub(crate) fn take_record<T: DeserializeOwned>(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let prior = table.remove(key)?;
    match prior {
        Some(guard) => decode(guard.value()).map(Some),
        None => Ok(None),
    }
}

/// Read a metadata counter.
pub(crate) fn get_meta<R>(table: &R, key: &str) -> Result<Option<u64>, StorageError>
where
    R: ReadableTable<&'static str, u64>,
{
    Ok(table.get(key)?.map(|v| v.value()))
}
