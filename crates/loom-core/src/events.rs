//! # Change Events
//!
//! Facts about committed writes, handed to an [`EventSink`] after the
//! transaction that produced them commits. Events never leave the process and
//! are not persisted; losing one only delays enrichment.

use crate::types::{EdgeId, NodeId, NodeKind};
use std::fmt;

/// Who performed a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeSource {
    /// A foreground caller.
    Host,
    /// Background enrichment.
    Enrichment,
}

/// A committed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    NodeCreated {
        id: NodeId,
        kind: NodeKind,
        source: ChangeSource,
    },
    NodeUpdated {
        id: NodeId,
        kind: NodeKind,
        source: ChangeSource,
    },
    NodeDeleted {
        id: NodeId,
    },
    EdgeCreated {
        id: EdgeId,
        edge_type: String,
    },
    EdgeDeleted {
        id: EdgeId,
    },
    /// A new message landed in a chat.
    ChatUpdated {
        chat_id: NodeId,
    },
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeCreated { id, kind, .. } => write!(f, "NodeCreated({kind} {id})"),
            Self::NodeUpdated { id, kind, .. } => write!(f, "NodeUpdated({kind} {id})"),
            Self::NodeDeleted { id } => write!(f, "NodeDeleted({id})"),
            Self::EdgeCreated { id, edge_type } => write!(f, "EdgeCreated({edge_type} {id})"),
            Self::EdgeDeleted { id } => write!(f, "EdgeDeleted({id})"),
            Self::ChatUpdated { chat_id } => write!(f, "ChatUpdated({chat_id})"),
        }
    }
}

/// Receiver of change events.
///
/// `emit` is called on the committing thread and must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ChangeEvent);
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ChangeEvent) {}
}
