//! # Core Type Definitions
//!
//! This module contains the record types stored by Loom:
//! - Identifiers (`NodeId`, `EdgeId`, `EmbeddingId`)
//! - Graph records (`Node`, `Edge`, `Embedding`)
//! - Structural index vocabulary (`IndexedField`, `FieldValue`)
//! - Error types (`StorageError`, `IndexError`, `QueryError`)
//!
//! ## Serialization
//!
//! Records are stored as postcard bytes. Postcard is not self-describing, so
//! the open-ended `metadata` map travels as JSON text inside the record.

mod error;
mod node;

pub use error::{IndexError, QueryError, StorageError};
pub use node::{Attachment, Chat, Entity, Message, Node, NodeKind, Summary};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create an identifier from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Globally unique identifier of a node.
    NodeId
);
string_id!(
    /// Globally unique identifier of an edge.
    EdgeId
);
string_id!(
    /// Identifier of an embedding. Owned by exactly one node.
    EmbeddingId
);

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Current wall-clock time in milliseconds.
///
/// A clock before the epoch reads as 0.
#[must_use]
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}

// =============================================================================
// METADATA
// =============================================================================

/// Open-ended, non-indexed data attached to nodes and edges.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Serde adapter storing `Metadata` as JSON text.
pub(crate) mod metadata_text {
    use super::Metadata;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Metadata, serializer: S) -> Result<S::Ok, S::Error> {
        let text = serde_json::to_string(value).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Metadata, D::Error> {
        let text = String::deserialize(deserializer)?;
        serde_json::from_str(&text).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// EDGE
// =============================================================================

/// A directed, typed relation between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub from_node: NodeId,
    pub to_node: NodeId,
    pub edge_type: String,
    pub created_at: Timestamp,
    #[serde(with = "metadata_text")]
    pub metadata: Metadata,
}

impl Edge {
    /// Create an edge stamped with the current time and empty metadata.
    #[must_use]
    pub fn new(
        id: impl Into<EdgeId>,
        from_node: impl Into<NodeId>,
        to_node: impl Into<NodeId>,
        edge_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            from_node: from_node.into(),
            to_node: to_node.into(),
            edge_type: edge_type.into(),
            created_at: now_millis(),
            metadata: Metadata::new(),
        }
    }

    /// Attach one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The endpoint opposite to `node`, or `None` if `node` is not an endpoint.
    #[must_use]
    pub fn other_end(&self, node: &NodeId) -> Option<&NodeId> {
        if &self.from_node == node {
            Some(&self.to_node)
        } else if &self.to_node == node {
            Some(&self.from_node)
        } else {
            None
        }
    }
}

// =============================================================================
// EMBEDDING
// =============================================================================

/// A dense vector produced by an embedding model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub id: EmbeddingId,
    pub vector: Vec<f32>,
    pub model: String,
}

impl Embedding {
    #[must_use]
    pub fn new(id: impl Into<EmbeddingId>, vector: Vec<f32>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            vector,
            model: model.into(),
        }
    }

    /// Vector dimension.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

// =============================================================================
// TRAVERSAL DIRECTION
// =============================================================================

/// Which incident edges of a node a traversal follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Direction {
    /// Edges leaving the node.
    #[default]
    Outbound,
    /// Edges entering the node.
    Inbound,
    /// Both.
    Both,
}

// =============================================================================
// STRUCTURAL INDEX VOCABULARY
// =============================================================================

/// A value of an indexed field.
///
/// Integer values sort numerically, text values lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldValue {
    Int(i64),
    Text(String),
}

impl FieldValue {
    /// The value kind, used to validate filters against their field.
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::Int(_) => FieldKind::Int,
            Self::Text(_) => FieldKind::Text,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&NodeId> for FieldValue {
    fn from(v: &NodeId) -> Self {
        Self::Text(v.0.clone())
    }
}

/// Kind of value a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Int,
    Text,
}

/// A node field maintained in the structural index.
///
/// Each field owns one keyspace on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndexedField {
    NodeType,
    EmbeddingId,
    Title,
    Topic,
    CreatedAt,
    ChatId,
    Sender,
    Timestamp,
    Label,
    EntityType,
    MessageId,
    MimeType,
}

impl IndexedField {
    /// Every indexed field.
    pub const ALL: [Self; 12] = [
        Self::NodeType,
        Self::EmbeddingId,
        Self::Title,
        Self::Topic,
        Self::CreatedAt,
        Self::ChatId,
        Self::Sender,
        Self::Timestamp,
        Self::Label,
        Self::EntityType,
        Self::MessageId,
        Self::MimeType,
    ];

    /// Field name as used in queries.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NodeType => "node_type",
            Self::EmbeddingId => "embedding_id",
            Self::Title => "title",
            Self::Topic => "topic",
            Self::CreatedAt => "created_at",
            Self::ChatId => "chat_id",
            Self::Sender => "sender",
            Self::Timestamp => "timestamp",
            Self::Label => "label",
            Self::EntityType => "entity_type",
            Self::MessageId => "message_id",
            Self::MimeType => "mime_type",
        }
    }

    #[must_use]
    pub const fn kind(self) -> FieldKind {
        match self {
            Self::CreatedAt | Self::Timestamp => FieldKind::Int,
            _ => FieldKind::Text,
        }
    }
}

impl fmt::Display for IndexedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndexedField {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.name() == s)
            .ok_or_else(|| QueryError::UnknownField(s.to_string()))
    }
}

// =============================================================================
// TESTS
// =============================================================================
