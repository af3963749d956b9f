//! Error taxonomy of the core.
//!
//! Not-found is never an error: lookups return `Option`.

use super::{EmbeddingId, FieldKind, IndexedField, NodeId};
use thiserror::Error;

/// Failure of a storage operation. The transaction it belongs to is aborted.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O or database engine error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// A record could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored record could not be decoded.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// An edge endpoint does not exist in the writing transaction.
    #[error("Edge endpoint not found: {0}")]
    DanglingEdge(NodeId),

    /// A node references an embedding that does not exist.
    #[error("Embedding not found: {0}")]
    MissingEmbedding(EmbeddingId),

    /// A node claims an embedding another node already owns.
    #[error("Embedding {embedding} is owned by node {owner}")]
    EmbeddingOwned { embedding: EmbeddingId, owner: NodeId },

    /// The file was written by a newer, incompatible version.
    #[error("Unsupported storage format version {0}")]
    UnsupportedFormat(u64),

    /// The store was opened with an invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A record failed validation before being written.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The vector index rejected the write.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Failure inside an index family.
#[derive(Debug, Error)]
pub enum IndexError {
    /// An index disagrees with canonical data.
    #[error("Index inconsistency: {0}")]
    Inconsistent(String),

    /// A vector does not match the dimension the index was built with.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The persisted HNSW graph references an embedding that is gone.
    #[error("Vector point {point} references missing embedding {embedding}")]
    MissingVector { point: u64, embedding: EmbeddingId },

    /// A thread panicked while holding the vector index lock.
    #[error("Vector index lock poisoned")]
    LockPoisoned,
}

/// A malformed converged query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The filter names a field that is not indexed.
    #[error("Unknown indexed field: {0}")]
    UnknownField(String),

    /// Two equality filters on one field can never both hold.
    #[error("Conflicting equality filters on field {0}")]
    ConflictingFilters(IndexedField),

    /// The filter value has the wrong kind for its field.
    #[error("Field {field} holds {expected:?} values")]
    TypeMismatch { field: IndexedField, expected: FieldKind },

    /// The semantic facet carries no vector.
    #[error("Semantic query vector is empty")]
    EmptyVector,

    /// The semantic vector has a different dimension than the stored vectors.
    #[error("Semantic query dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Graph depth is zero or exceeds the traversal limit.
    #[error("Traversal depth {depth} outside 1..={max}")]
    InvalidDepth { depth: usize, max: usize },

    /// Similarity floor is not a finite number in [-1, 1].
    #[error("Similarity threshold {0} outside [-1, 1]")]
    InvalidThreshold(f32),

    /// Reading the snapshot failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<IndexError> for QueryError {
    fn from(e: IndexError) -> Self {
        Self::Storage(StorageError::Index(e))
    }
}

macro_rules! io_error_from {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for StorageError {
                fn from(e: $source) -> Self {
                    Self::Io(e.to_string())
                }
            }
        )*
    };
}

io_error_from!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
    redb::CompactionError,
);

impl From<postcard::Error> for StorageError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
