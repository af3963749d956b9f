//! # Weaver Engine
//!
//! ```text
//! Store commit ──emit──▶ EventSender ──bounded──▶ dispatcher
//!                                                    │ Task::for_event
//!                                                    ▼
//!                                  Scheduler (Urgent / Normal / Low lanes)
//!                                                    │ admitted by activity
//!                                                    ▼
//!                                   workers ──▶ modules ──▶ Store::write_as
//! ```
//!
//! The engine owns a dedicated tokio runtime so enrichment never competes
//! with the host's threads. Each task runs in its own spawned future; a
//! failing or panicking task is logged, counted and dropped.

pub mod context;
pub mod modules;
pub mod sink;
pub mod task;

pub use context::WeaverContext;
pub use sink::{EventReceiver, EventSender, EventStats, channel};
pub use task::{Task, TaskKey, TaskKind};

use crate::config::WeaverConfig;
use crate::error::{WeaverError, WeaverResult};
use crate::ml::MlCapability;
use crate::scheduler::{ActivityLevel, ActivityMonitor, QueueStats, Scheduler};
use loom_core::{ChangeEvent, ChangeSource, Node, NodeKind, Store};
use serde::Serialize;
use sink::Counters;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// How often blocking waits re-check their condition.
const WAIT_POLL: Duration = Duration::from_millis(5);

/// Point-in-time view of the Weaver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeaverStats {
    pub events_received: u64,
    pub events_dropped: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    /// Events and tasks not yet finished.
    pub pending: usize,
    pub queued: QueueStats,
    pub activity: ActivityLevel,
}

/// What a finished task asks for next.
enum Outcome {
    Done,
    FollowUp(Task),
}

/// The running enrichment engine.
pub struct Weaver {
    runtime: Option<Runtime>,
    context: Arc<WeaverContext>,
    scheduler: Arc<Scheduler<Task>>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl std::fmt::Debug for Weaver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Weaver")
            .field("running", &self.runtime.is_some())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Weaver {
    /// Start the dispatcher and `config.workers` workers on a new runtime.
    ///
    /// `events` must be the receiving half of the channel whose sender the
    /// store was opened with.
    pub fn start(
        store: Arc<Store>,
        ml: Arc<dyn MlCapability>,
        events: EventReceiver,
        activity: Arc<ActivityMonitor>,
        config: WeaverConfig,
    ) -> WeaverResult<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.workers)
            .thread_name("loom-weaver")
            .enable_time()
            .build()
            .map_err(|e| WeaverError::Runtime(e.to_string()))?;

        let EventReceiver { rx, counters } = events;
        let scheduler = Arc::new(Scheduler::new(&config.scheduler, activity));
        let workers = config.workers;
        let context = Arc::new(WeaverContext::new(store, ml, config));
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        tracker.spawn_on(
            dispatch(
                rx,
                Arc::clone(&scheduler),
                Arc::clone(&counters),
                cancel.clone(),
            ),
            runtime.handle(),
        );
        for worker in 0..workers {
            tracker.spawn_on(
                work(
                    worker,
                    Arc::clone(&context),
                    Arc::clone(&scheduler),
                    Arc::clone(&counters),
                    cancel.clone(),
                ),
                runtime.handle(),
            );
        }
        info!(workers, model = context.ml.model_name(), "Weaver started");

        Ok(Self {
            runtime: Some(runtime),
            context,
            scheduler,
            counters,
            cancel,
            tracker,
        })
    }

    pub fn activity(&self) -> &Arc<ActivityMonitor> {
        self.scheduler.activity()
    }

    /// Queue a task directly, bypassing event dispatch.
    pub fn submit(&self, task: Task) -> bool {
        if self.runtime.is_none() {
            return false;
        }
        submit(&self.scheduler, &self.counters, task)
    }

    /// Recover enrichment lost to dropped events.
    ///
    /// Dispatches `NodeCreated` for every node without an embedding and
    /// `ChatUpdated` for every chat straight to the scheduler, where already
    /// pending work coalesces. Returns the number of tasks queued.
    pub fn backfill(&self) -> WeaverResult<usize> {
        if self.runtime.is_none() {
            return Err(WeaverError::ShuttingDown);
        }
        let mut queued = 0;
        for node in self.context.store.scan_nodes()? {
            let mut events = Vec::with_capacity(2);
            if node.embedding_id().is_none() {
                events.push(ChangeEvent::NodeCreated {
                    id: node.id().clone(),
                    kind: node.kind(),
                    source: ChangeSource::Host,
                });
            }
            if let Node::Chat(chat) = &node {
                events.push(ChangeEvent::ChatUpdated {
                    chat_id: chat.id.clone(),
                });
            }
            for task in events.iter().flat_map(Task::for_event) {
                if submit(&self.scheduler, &self.counters, task) {
                    queued += 1;
                }
            }
        }
        info!(queued, "Backfill queued");
        Ok(queued)
    }

    pub fn stats(&self) -> WeaverStats {
        let events = self.counters.snapshot();
        WeaverStats {
            events_received: events.events_received,
            events_dropped: events.events_dropped,
            tasks_completed: events.tasks_completed,
            tasks_failed: events.tasks_failed,
            pending: events.pending,
            queued: self.scheduler.stats(),
            activity: self.activity().level(),
        }
    }

    /// Block until no event or task is pending, or `timeout` passes.
    ///
    /// Returns `true` if the Weaver went idle. Tasks held back by the current
    /// activity level count as pending. Must not be called from inside an
    /// async runtime.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.counters.pending() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(WAIT_POLL);
        }
    }

    /// Stop intake, abandon queued tasks, let running tasks finish and join
    /// the workers within `timeout`. Returns `true` if everything stopped in time.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        let Some(runtime) = self.runtime.take() else {
            return true;
        };
        let deadline = Instant::now() + timeout;
        let abandoned = self.scheduler.close();
        self.cancel.cancel();
        self.tracker.close();

        while !self.tracker.is_empty() && Instant::now() < deadline {
            std::thread::sleep(WAIT_POLL);
        }
        let joined = self.tracker.is_empty();
        runtime.shutdown_timeout(deadline.saturating_duration_since(Instant::now()));
        self.counters.pending.store(0, Ordering::Release);

        if joined {
            info!(abandoned, "Weaver stopped");
        } else {
            warn!(abandoned, "Weaver workers did not stop in time");
        }
        joined
    }
}

impl Drop for Weaver {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            self.scheduler.close();
            self.cancel.cancel();
            runtime.shutdown_background();
        }
    }
}

// =============================================================================
// DISPATCHER AND WORKERS
// =============================================================================

fn submit(scheduler: &Scheduler<Task>, counters: &Counters, task: Task) -> bool {
    counters.add_pending(1);
    let accepted = scheduler.enqueue(task);
    if !accepted {
        counters.finish_pending();
    }
    accepted
}

async fn dispatch(
    mut rx: mpsc::Receiver<ChangeEvent>,
    scheduler: Arc<Scheduler<Task>>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        for task in Task::for_event(&event) {
            let label = task.to_string();
            if !submit(&scheduler, &counters, task) {
                debug!(%event, task = %label, "Task already pending");
            }
        }
        counters.finish_pending();
    }
    debug!("Dispatcher stopped");
}

async fn work(
    worker: usize,
    context: Arc<WeaverContext>,
    scheduler: Arc<Scheduler<Task>>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
) {
    loop {
        let task = tokio::select! {
            () = cancel.cancelled() => break,
            task = scheduler.next() => match task {
                Some(task) => task,
                None => break,
            },
        };
        let label = task.to_string();
        let started = Instant::now();
        let handle = tokio::spawn(execute(Arc::clone(&context), task));
        let result = handle.await.map_err(WeaverError::from).and_then(|r| r);
        match result {
            Ok(Outcome::Done) => {
                counters.tasks_completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Outcome::FollowUp(next)) => {
                counters.tasks_completed.fetch_add(1, Ordering::Relaxed);
                submit(&scheduler, &counters, next);
            }
            Err(e) => {
                counters.tasks_failed.fetch_add(1, Ordering::Relaxed);
                warn!(worker, task = %label, error = %e, "Enrichment task failed");
            }
        }
        debug!(worker, task = %label, elapsed_ms = started.elapsed().as_millis() as u64, "Task finished");
        counters.finish_pending();
    }
    debug!(worker, "Worker stopped");
}

async fn execute(context: Arc<WeaverContext>, task: Task) -> WeaverResult<Outcome> {
    let ctx = context.as_ref();
    match task.kind {
        TaskKind::SemanticIndex => {
            let embedded = modules::semantic_indexer::run(ctx, &task.target).await?;
            if embedded.is_some_and(NodeKind::is_text_bearing) {
                return Ok(Outcome::FollowUp(Task::new(TaskKind::AssociativeLink, task.target)));
            }
        }
        TaskKind::EntityLink => {
            modules::entity_linker::run(ctx, &task.target).await?;
        }
        TaskKind::AssociativeLink => {
            modules::associative_linker::run(ctx, &task.target).await?;
        }
        TaskKind::Summarize => {
            modules::summarizer::run(ctx, &task.target).await?;
        }
    }
    Ok(Outcome::Done)
}
