//! Errors surfaced to hosts.

use loom_core::{ConfigError, IndexError, QueryError, StorageError};
use loom_weaver::WeaverError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoomError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Weaver(#[from] WeaverError),

    /// An operation panicked. The database stays usable.
    #[error("Internal error in {operation}: {message}")]
    Internal {
        operation: &'static str,
        message: String,
    },
}

pub type LoomResult<T> = Result<T, LoomError>;
