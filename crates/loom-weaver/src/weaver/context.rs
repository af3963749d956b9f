//! Everything an enrichment module needs.

use crate::config::WeaverConfig;
use crate::error::{WeaverError, WeaverResult};
use crate::ml::MlCapability;
use loom_core::{ChangeSource, NodeId, StorageError, Store, WriteBatch};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

type ChatLocks = Mutex<BTreeMap<NodeId, Arc<tokio::sync::Mutex<()>>>>;

/// Shared by every worker.
pub struct WeaverContext {
    pub store: Arc<Store>,
    pub ml: Arc<dyn MlCapability>,
    pub config: WeaverConfig,
    summary_locks: ChatLocks,
}

impl std::fmt::Debug for WeaverContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeaverContext")
            .field("store", &self.store)
            .field("model", &self.ml.model_name())
            .finish_non_exhaustive()
    }
}

impl WeaverContext {
    pub fn new(store: Arc<Store>, ml: Arc<dyn MlCapability>, config: WeaverConfig) -> Self {
        Self {
            store,
            ml,
            config,
            summary_locks: Mutex::new(BTreeMap::new()),
        }
    }

    /// Run blocking store work off the async workers.
    pub async fn blocking<T, F>(&self, f: F) -> WeaverResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> Result<T, WeaverError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store)).await?
    }

    /// One enrichment write transaction, run off the async workers.
    pub async fn write<T, F>(&self, f: F) -> WeaverResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut WriteBatch<'_>) -> Result<T, StorageError> + Send + 'static,
    {
        self.blocking(move |store| Ok(store.write_as(ChangeSource::Enrichment, f)?))
            .await
    }

    /// Wait for exclusive right to summarize `chat`.
    pub(crate) async fn summary_turn(&self, chat: &NodeId) -> SummaryTurn<'_> {
        let lock = {
            let mut locks = self.summary_locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(chat.clone()).or_default())
        };
        let guard = lock.lock_owned().await;
        SummaryTurn {
            locks: &self.summary_locks,
            chat: chat.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn summary_lock_count(&self) -> usize {
        self.summary_locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Held while one chat is summarized. Dropping it forgets the chat's lock
/// unless another summarization is already waiting on it.
pub(crate) struct SummaryTurn<'a> {
    locks: &'a ChatLocks,
    chat: NodeId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SummaryTurn<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(self.guard.take());
        // Clones are only taken under `locks`, so a count of one means no waiters.
        if locks.get(&self.chat).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.chat);
        }
    }
}
