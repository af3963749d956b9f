//! Node variants.

use super::{EmbeddingId, FieldValue, IndexedField, Metadata, NodeId, Timestamp, metadata_text, now_millis};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminant of a [`Node`], stored in the `node_type` index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Chat,
    Message,
    Summary,
    Entity,
    Attachment,
}

impl NodeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Message => "message",
            Self::Summary => "summary",
            Self::Entity => "entity",
            Self::Attachment => "attachment",
        }
    }

    /// Kinds carrying free text worth mining for entities and associations.
    #[must_use]
    pub const fn is_text_bearing(self) -> bool {
        matches!(self, Self::Message | Self::Summary | Self::Attachment)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// VARIANTS
// =============================================================================

/// A conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: NodeId,
    pub title: String,
    pub topic: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub embedding_id: Option<EmbeddingId>,
    #[serde(with = "metadata_text")]
    pub metadata: Metadata,
}

impl Chat {
    #[must_use]
    pub fn new(id: impl Into<NodeId>, title: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: id.into(),
            title: title.into(),
            topic: String::new(),
            created_at: now,
            updated_at: now,
            embedding_id: None,
            metadata: Metadata::new(),
        }
    }

    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }
}

/// A single message inside a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: NodeId,
    pub chat_id: NodeId,
    pub sender: String,
    pub timestamp: Timestamp,
    pub text: String,
    pub attachment_ids: Vec<NodeId>,
    pub embedding_id: Option<EmbeddingId>,
    #[serde(with = "metadata_text")]
    pub metadata: Metadata,
}

impl Message {
    #[must_use]
    pub fn new(
        id: impl Into<NodeId>,
        chat_id: impl Into<NodeId>,
        sender: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            chat_id: chat_id.into(),
            sender: sender.into(),
            timestamp: now_millis(),
            text: text.into(),
            attachment_ids: Vec::new(),
            embedding_id: None,
            metadata: Metadata::new(),
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A generated digest over a run of messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub id: NodeId,
    pub chat_id: NodeId,
    pub created_at: Timestamp,
    pub content: String,
    /// Messages covered by this summary.
    pub message_ids: Vec<NodeId>,
    pub embedding_id: Option<EmbeddingId>,
    #[serde(with = "metadata_text")]
    pub metadata: Metadata,
}

impl Summary {
    #[must_use]
    pub fn new(
        id: impl Into<NodeId>,
        chat_id: impl Into<NodeId>,
        content: impl Into<String>,
        message_ids: Vec<NodeId>,
    ) -> Self {
        Self {
            id: id.into(),
            chat_id: chat_id.into(),
            created_at: now_millis(),
            content: content.into(),
            message_ids,
            embedding_id: None,
            metadata: Metadata::new(),
        }
    }
}

/// A named thing mentioned in text (person, place, organisation, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: NodeId,
    pub label: String,
    pub entity_type: String,
    pub created_at: Timestamp,
    pub embedding_id: Option<EmbeddingId>,
    #[serde(with = "metadata_text")]
    pub metadata: Metadata,
}

impl Entity {
    #[must_use]
    pub fn new(id: impl Into<NodeId>, label: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            entity_type: entity_type.into(),
            created_at: now_millis(),
            embedding_id: None,
            metadata: Metadata::new(),
        }
    }
}

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: NodeId,
    pub message_id: NodeId,
    pub mime_type: String,
    pub filename: String,
    pub created_at: Timestamp,
    pub size_bytes: u64,
    /// Text pulled out of the file by an external extractor, if any.
    pub extracted_text: Option<String>,
    pub embedding_id: Option<EmbeddingId>,
    #[serde(with = "metadata_text")]
    pub metadata: Metadata,
}

impl Attachment {
    #[must_use]
    pub fn new(
        id: impl Into<NodeId>,
        message_id: impl Into<NodeId>,
        mime_type: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            message_id: message_id.into(),
            mime_type: mime_type.into(),
            filename: filename.into(),
            created_at: now_millis(),
            size_bytes: 0,
            extracted_text: None,
            embedding_id: None,
            metadata: Metadata::new(),
        }
    }
}

// =============================================================================
// NODE
// =============================================================================

/// A node of the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Chat(Chat),
    Message(Message),
    Summary(Summary),
    Entity(Entity),
    Attachment(Attachment),
}

macro_rules! each_variant {
    ($node:expr, $inner:ident => $body:expr) => {
        match $node {
            Node::Chat($inner) => $body,
            Node::Message($inner) => $body,
            Node::Summary($inner) => $body,
            Node::Entity($inner) => $body,
            Node::Attachment($inner) => $body,
        }
    };
}

impl Node {
    #[must_use]
    pub fn id(&self) -> &NodeId {
        each_variant!(self, n => &n.id)
    }

    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::Chat(_) => NodeKind::Chat,
            Self::Message(_) => NodeKind::Message,
            Self::Summary(_) => NodeKind::Summary,
            Self::Entity(_) => NodeKind::Entity,
            Self::Attachment(_) => NodeKind::Attachment,
        }
    }

    #[must_use]
    pub fn embedding_id(&self) -> Option<&EmbeddingId> {
        each_variant!(self, n => n.embedding_id.as_ref())
    }

    pub fn set_embedding_id(&mut self, embedding_id: Option<EmbeddingId>) {
        each_variant!(self, n => n.embedding_id = embedding_id);
    }

    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        each_variant!(self, n => &n.metadata)
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        each_variant!(self, n => &mut n.metadata)
    }

    /// Creation time (a message's timestamp).
    #[must_use]
    pub fn created_at(&self) -> Timestamp {
        match self {
            Self::Chat(n) => n.created_at,
            Self::Message(n) => n.timestamp,
            Self::Summary(n) => n.created_at,
            Self::Entity(n) => n.created_at,
            Self::Attachment(n) => n.created_at,
        }
    }

    /// The text an embedding model should see for this node.
    ///
    /// Empty text counts as no text.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        let text = match self {
            Self::Chat(n) => n.title.as_str(),
            Self::Message(n) => n.text.as_str(),
            Self::Summary(n) => n.content.as_str(),
            Self::Entity(n) => n.label.as_str(),
            Self::Attachment(n) => n.extracted_text.as_deref().unwrap_or_default(),
        };
        (!text.trim().is_empty()).then_some(text)
    }

    /// Whether this node carries free text worth mining for entities and associations.
    #[must_use]
    pub const fn is_text_bearing(&self) -> bool {
        self.kind().is_text_bearing()
    }

    /// Every `(field, value)` pair this node contributes to the structural index.
    #[must_use]
    pub fn indexed_fields(&self) -> Vec<(IndexedField, FieldValue)> {
        let mut fields = vec![(IndexedField::NodeType, FieldValue::from(self.kind().as_str()))];
        if let Some(embedding_id) = self.embedding_id() {
            fields.push((IndexedField::EmbeddingId, FieldValue::from(embedding_id.as_str())));
        }
        match self {
            Self::Chat(n) => {
                fields.push((IndexedField::Title, FieldValue::from(n.title.as_str())));
                fields.push((IndexedField::Topic, FieldValue::from(n.topic.as_str())));
                fields.push((IndexedField::CreatedAt, FieldValue::Int(n.created_at)));
            }
            Self::Message(n) => {
                fields.push((IndexedField::ChatId, FieldValue::from(&n.chat_id)));
                fields.push((IndexedField::Sender, FieldValue::from(n.sender.as_str())));
                fields.push((IndexedField::Timestamp, FieldValue::Int(n.timestamp)));
            }
            Self::Summary(n) => {
                fields.push((IndexedField::ChatId, FieldValue::from(&n.chat_id)));
                fields.push((IndexedField::CreatedAt, FieldValue::Int(n.created_at)));
            }
            Self::Entity(n) => {
                fields.push((IndexedField::Label, FieldValue::from(n.label.as_str())));
                fields.push((IndexedField::EntityType, FieldValue::from(n.entity_type.as_str())));
            }
            Self::Attachment(n) => {
                fields.push((IndexedField::MessageId, FieldValue::from(&n.message_id)));
                fields.push((IndexedField::MimeType, FieldValue::from(n.mime_type.as_str())));
                fields.push((IndexedField::CreatedAt, FieldValue::Int(n.created_at)));
            }
        }
        fields
    }

    /// Value of one indexed field, if this node carries it.
    #[must_use]
    pub fn field(&self, field: IndexedField) -> Option<FieldValue> {
        self.indexed_fields()
            .into_iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v)
    }
}

impl From<Chat> for Node {
    fn from(n: Chat) -> Self {
        Self::Chat(n)
    }
}

impl From<Message> for Node {
    fn from(n: Message) -> Self {
        Self::Message(n)
    }
}

impl From<Summary> for Node {
    fn from(n: Summary) -> Self {
        Self::Summary(n)
    }
}

impl From<Entity> for Node {
    fn from(n: Entity) -> Self {
        Self::Entity(n)
    }
}

impl From<Attachment> for Node {
    fn from(n: Attachment) -> Self {
        Self::Attachment(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_fields_are_indexed() {
        let node = Node::from(Message::new("m1", "c1", "alice", "hi").with_timestamp(42));
        let fields = node.indexed_fields();
        assert!(fields.contains(&(IndexedField::NodeType, FieldValue::from("message"))));
        assert!(fields.contains(&(IndexedField::ChatId, FieldValue::from("c1"))));
        assert!(fields.contains(&(IndexedField::Timestamp, FieldValue::Int(42))));
        assert_eq!(node.field(IndexedField::EmbeddingId), None);
    }

    #[test]
    fn embedding_id_is_indexed_once_set() {
        let mut node = Node::from(Entity::new("e1", "Paris", "LOCATION"));
        node.set_embedding_id(Some(EmbeddingId::from("emb:e1")));
        assert_eq!(
            node.field(IndexedField::EmbeddingId),
            Some(FieldValue::from("emb:e1"))
        );
    }

    #[test]
    fn blank_text_is_no_text() {
        let node = Node::from(Message::new("m1", "c1", "alice", "   "));
        assert_eq!(node.text(), None);
        let attachment = Node::from(Attachment::new("a1", "m1", "image/png", "cat.png"));
        assert_eq!(attachment.text(), None);
    }

    #[test]
    fn node_round_trips_through_postcard() {
        let mut message = Message::new("m1", "c1", "bob", "hello");
        message
            .metadata
            .insert("lang".to_string(), serde_json::json!({"code": "en"}));
        let node = Node::from(message);
        let bytes = postcard::to_allocvec(&node).expect("serialize");
        let back: Node = postcard::from_bytes(&bytes).expect("deserialize");
        assert_eq!(back, node);
    }
}
