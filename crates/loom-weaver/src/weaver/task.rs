//! Enrichment tasks and the event-to-task mapping.

use crate::scheduler::{ScheduledTask, TaskPriority};
use loom_core::{ChangeEvent, ChangeSource, NodeId};
use std::fmt;

/// Which enrichment module a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskKind {
    SemanticIndex,
    EntityLink,
    AssociativeLink,
    Summarize,
}

impl TaskKind {
    pub const fn default_priority(self) -> TaskPriority {
        match self {
            Self::SemanticIndex | Self::EntityLink => TaskPriority::Normal,
            Self::AssociativeLink | Self::Summarize => TaskPriority::Low,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SemanticIndex => "semantic_index",
            Self::EntityLink => "entity_link",
            Self::AssociativeLink => "associative_link",
            Self::Summarize => "summarize",
        }
    }
}

/// Coalescing identity: one pending task per module and target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskKey {
    pub kind: TaskKind,
    pub target: NodeId,
}

/// One unit of enrichment work. `target` is a chat for [`TaskKind::Summarize`]
/// and the node to enrich otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub kind: TaskKind,
    pub target: NodeId,
    pub priority: TaskPriority,
}

impl Task {
    pub fn new(kind: TaskKind, target: NodeId) -> Self {
        Self {
            kind,
            target,
            priority: kind.default_priority(),
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Tasks triggered by `event`.
    ///
    /// Updates written by enrichment itself trigger nothing, which keeps the
    /// Weaver from feeding on its own writes.
    pub fn for_event(event: &ChangeEvent) -> Vec<Self> {
        match event {
            ChangeEvent::NodeCreated { id, kind, .. }
            | ChangeEvent::NodeUpdated {
                id,
                kind,
                source: ChangeSource::Host,
            } => {
                let mut tasks = vec![Self::new(TaskKind::SemanticIndex, id.clone())];
                if kind.is_text_bearing() {
                    tasks.push(Self::new(TaskKind::EntityLink, id.clone()));
                    tasks.push(Self::new(TaskKind::AssociativeLink, id.clone()));
                }
                tasks
            }
            ChangeEvent::ChatUpdated { chat_id } => {
                vec![Self::new(TaskKind::Summarize, chat_id.clone())]
            }
            ChangeEvent::NodeUpdated { .. }
            | ChangeEvent::NodeDeleted { .. }
            | ChangeEvent::EdgeCreated { .. }
            | ChangeEvent::EdgeDeleted { .. } => Vec::new(),
        }
    }
}

impl ScheduledTask for Task {
    type Key = TaskKey;

    fn key(&self) -> TaskKey {
        TaskKey {
            kind: self.kind,
            target: self.target.clone(),
        }
    }

    fn priority(&self) -> TaskPriority {
        self.priority
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind.as_str(), self.target)
    }
}
