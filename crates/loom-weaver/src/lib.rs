//! # loom-weaver
//!
//! Background enrichment for the Loom knowledge graph.
//!
//! Committed writes in `loom-core` produce change events. The Weaver turns
//! them into prioritized tasks, holds low-priority work back while the host
//! is busy, and runs four modules against the injected ML capability:
//!
//! - **semantic indexer**: embeds node text and attaches the embedding
//! - **entity linker**: resolves or creates entities and adds `MENTIONS` edges
//! - **associative linker**: links near-duplicate content with
//!   `IS_SEMANTICALLY_SIMILAR_TO` edges
//! - **summarizer**: summarizes the unsummarized tail of a chat
//!
//! ## Wiring
//!
//! Open the channel first, give its sender to the store, then start the
//! Weaver with the receiver:
//!
//! ```no_run
//! use loom_core::{Store, StoreConfig};
//! use loom_weaver::ml::mock::KeywordMl;
//! use loom_weaver::{ActivityMonitor, Weaver, WeaverConfig, channel};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = WeaverConfig::default();
//! let (sender, receiver) = channel(config.queue_capacity);
//! let store = Arc::new(Store::open_with("loom.redb", StoreConfig::default(), Arc::new(sender))?);
//! let activity = Arc::new(ActivityMonitor::new(config.scheduler.clone()));
//! let mut weaver = Weaver::start(store, Arc::new(KeywordMl::new()), receiver, activity, config)?;
//! weaver.shutdown(std::time::Duration::from_secs(5));
//! # Ok(())
//! # }
//! ```

// =============================================================================
// MODULES
// =============================================================================

pub mod config;
pub mod error;
pub mod ml;
pub mod scheduler;
pub mod weaver;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use config::{SchedulerConfig, WeaverConfig};
pub use error::{WeaverError, WeaverResult};
pub use ml::{ExtractedEntity, MlCapability};
pub use scheduler::{
    ActivityLevel, ActivityMonitor, QueueStats, ScheduledTask, Scheduler, TaskPriority, TaskQueue,
};
pub use weaver::{
    EventReceiver, EventSender, Task, TaskKey, TaskKind, Weaver, WeaverContext, WeaverStats,
    channel,
};
