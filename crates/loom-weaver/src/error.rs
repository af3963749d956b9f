//! Enrichment failures.
//!
//! A `WeaverError` never reaches a foreground caller: workers log it with the
//! task that produced it and move on.

use loom_core::{ConfigError, IndexError, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeaverError {
    /// The injected ML capability failed.
    #[error("ML capability failed: {0}")]
    Ml(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Index(#[from] IndexError),

    /// A task panicked or was cancelled.
    #[error("Task join failed: {0}")]
    Join(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to start runtime: {0}")]
    Runtime(String),

    #[error("Weaver is shutting down")]
    ShuttingDown,
}

impl From<tokio::task::JoinError> for WeaverError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Join(e.to_string())
    }
}

pub type WeaverResult<T> = Result<T, WeaverError>;
