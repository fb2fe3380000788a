//! Bounded-concurrency priority scheduler over a live task table.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use forge_diagnostics::ClassifiedError;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backoff::{jittered_delay, next_delay, random_unit};
use crate::config::{SchedulerConfig, TaskOverrides};
use crate::error::{SchedulerError, SchedulerResult};
use crate::task::{AttemptOutcome, QueueStats, RetryTask, TaskStatus};

/// A task's unit of work: resolves `true` when the repair took.
pub type ExecuteFn = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<bool>> + Send + Sync>;

type StatusObserver = Arc<dyn Fn(&RetryTask) + Send + Sync>;
type DrainObserver = Arc<dyn Fn() + Send + Sync>;

struct TaskEntry {
    task: RetryTask,
    execute: ExecuteFn,
    base_delay: Duration,
    seq: u64,
    timer: Option<JoinHandle<()>>,
}

/// An observer notification, queued in the order its change was made.
enum Notice {
    Status(RetryTask),
    Drained,
}

#[derive(Default)]
struct State {
    tasks: HashMap<String, TaskEntry>,
    active: usize,
    next_seq: u64,
    /// Work was seen since the last drained notification.
    had_work: bool,
    outbox: VecDeque<Notice>,
}

impl State {
    fn is_idle(&self) -> bool {
        self.active == 0 && !self.tasks.values().any(|e| e.task.status.is_live())
    }

    /// Highest priority pending task, earliest created first.
    fn next_pending(&self) -> Option<String> {
        self.tasks
            .values()
            .filter(|e| e.task.status == TaskStatus::Pending)
            .max_by(|a, b| {
                a.task
                    .priority
                    .cmp(&b.task.priority)
                    .then_with(|| b.seq.cmp(&a.seq))
            })
            .map(|e| e.task.id.clone())
    }

    /// Queue the drained notice if the queue just went idle.
    fn check_drained(&mut self) {
        if self.had_work && self.is_idle() {
            self.had_work = false;
            self.outbox.push_back(Notice::Drained);
        }
    }
}

struct Inner {
    config: SchedulerConfig,
    state: Mutex<State>,
    status_observers: RwLock<Vec<StatusObserver>>,
    drain_observers: RwLock<Vec<DrainObserver>>,
    /// Held by whichever thread is delivering the outbox.
    delivery: Mutex<()>,
    idle: Notify,
}

/// Priority retry scheduler with exponential backoff.
///
/// Cloning yields another handle to the same queue. Methods that start
/// work (`enqueue`, `retry`) must run inside a Tokio runtime.
#[derive(Clone)]
pub struct RetryScheduler {
    inner: Arc<Inner>,
}

impl Default for RetryScheduler {
    fn default() -> Self {
        Self::with_config_unchecked(SchedulerConfig::default())
    }
}

impl RetryScheduler {
    pub fn new(config: SchedulerConfig) -> SchedulerResult<Self> {
        config.validate()?;
        Ok(Self::with_config_unchecked(config))
    }

    fn with_config_unchecked(config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State::default()),
                status_observers: RwLock::new(Vec::new()),
                drain_observers: RwLock::new(Vec::new()),
                delivery: Mutex::new(()),
                idle: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Register a callback invoked on every status change.
    ///
    /// Observers see the changes of the whole queue in the order they were
    /// made, one call at a time, even when tasks run on several threads.
    pub fn on_status_change<F>(&self, observer: F)
    where
        F: Fn(&RetryTask) + Send + Sync + 'static,
    {
        self.inner.status_observers.write().push(Arc::new(observer));
    }

    /// Register a callback invoked once per transition into idle.
    pub fn on_queue_drained<F>(&self, observer: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.drain_observers.write().push(Arc::new(observer));
    }

    /// Schedule `execute` as a repair for `error`.
    pub fn enqueue<F, Fut>(&self, error: ClassifiedError, execute: F) -> RetryTask
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        self.enqueue_with(error, execute, TaskOverrides::default())
    }

    /// [`enqueue`](Self::enqueue) with per-task overrides.
    pub fn enqueue_with<F, Fut>(
        &self,
        error: ClassifiedError,
        execute: F,
        overrides: TaskOverrides,
    ) -> RetryTask
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        let execute: ExecuteFn = Arc::new(move || execute().boxed());
        let config = &self.inner.config;
        let base_delay = overrides.base_delay.unwrap_or(config.base_delay).min(config.max_delay);

        let task = RetryTask {
            id: Uuid::new_v4().to_string(),
            priority: overrides
                .priority
                .unwrap_or_else(|| config.priority_for(error.kind)),
            max_attempts: overrides.max_attempts.unwrap_or(config.max_attempts).max(1),
            error,
            status: TaskStatus::Pending,
            attempts: 0,
            current_delay: base_delay,
            created_at: Utc::now(),
            last_attempt_at: None,
            next_retry_at: None,
            last_result: None,
        };

        info!(
            task_id = %task.id,
            kind = %task.error.kind,
            priority = task.priority,
            "Enqueued retry task"
        );

        {
            let mut state = self.inner.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.had_work = true;
            state.tasks.insert(
                task.id.clone(),
                TaskEntry {
                    task: task.clone(),
                    execute,
                    base_delay,
                    seq,
                    timer: None,
                },
            );
            state.outbox.push_back(Notice::Status(task.clone()));
        }

        self.flush();
        self.pump();
        task
    }

    /// Cancel a pending or waiting task. Returns whether it was cancelled.
    pub fn cancel(&self, id: &str) -> bool {
        {
            let mut state = self.inner.state.lock();
            let Some(entry) = state.tasks.get_mut(id) else {
                return false;
            };
            if !matches!(entry.task.status, TaskStatus::Pending | TaskStatus::Waiting) {
                debug!(task_id = %id, status = %entry.task.status, "Cancel ignored");
                return false;
            }
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
            entry.task.status = TaskStatus::Cancelled;
            entry.task.next_retry_at = None;
            let snapshot = entry.task.clone();
            state.outbox.push_back(Notice::Status(snapshot));
            state.check_drained();
        }

        info!(task_id = %id, "Cancelled retry task");
        self.flush();
        true
    }

    /// Cancel every pending and waiting task. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let cancelled = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let mut cancelled = 0;
            for entry in state.tasks.values_mut() {
                if matches!(entry.task.status, TaskStatus::Pending | TaskStatus::Waiting) {
                    if let Some(timer) = entry.timer.take() {
                        timer.abort();
                    }
                    entry.task.status = TaskStatus::Cancelled;
                    entry.task.next_retry_at = None;
                    state.outbox.push_back(Notice::Status(entry.task.clone()));
                    cancelled += 1;
                }
            }
            state.check_drained();
            cancelled
        };

        if cancelled > 0 {
            info!("Cancelled {} retry task(s)", cancelled);
        }
        self.flush();
        cancelled
    }

    /// Put a failed or cancelled task back in the queue with fresh attempts.
    pub fn retry(&self, id: &str) -> SchedulerResult<RetryTask> {
        let task = {
            let mut state = self.inner.state.lock();
            let entry = state
                .tasks
                .get_mut(id)
                .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))?;
            if !matches!(entry.task.status, TaskStatus::Failed | TaskStatus::Cancelled) {
                return Err(SchedulerError::InvalidState {
                    id: id.to_string(),
                    status: entry.task.status,
                });
            }
            entry.task.status = TaskStatus::Pending;
            entry.task.attempts = 0;
            entry.task.current_delay = entry.base_delay;
            entry.task.next_retry_at = None;
            let task = entry.task.clone();
            state.had_work = true;
            state.outbox.push_back(Notice::Status(task.clone()));
            task
        };

        info!(task_id = %id, "Manually retrying task");
        self.flush();
        self.pump();
        Ok(task)
    }

    pub fn get_task(&self, id: &str) -> Option<RetryTask> {
        self.inner.state.lock().tasks.get(id).map(|e| e.task.clone())
    }

    /// Tasks in creation order, optionally filtered by status.
    pub fn get_tasks(&self, status: Option<TaskStatus>) -> Vec<RetryTask> {
        let state = self.inner.state.lock();
        let mut entries: Vec<&TaskEntry> = state
            .tasks
            .values()
            .filter(|e| status.map_or(true, |s| e.task.status == s))
            .collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.task.clone()).collect()
    }

    pub fn get_stats(&self) -> QueueStats {
        let state = self.inner.state.lock();
        let mut stats = QueueStats::default();
        for entry in state.tasks.values() {
            stats.record(entry.task.status);
        }
        stats
    }

    /// No task running, pending or waiting.
    pub fn is_idle(&self) -> bool {
        self.inner.state.lock().is_idle()
    }

    /// Remove terminal tasks. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut state = self.inner.state.lock();
        let before = state.tasks.len();
        state.tasks.retain(|_, e| !e.task.status.is_terminal());
        let removed = before - state.tasks.len();
        if removed > 0 {
            debug!("Pruned {} terminal task(s)", removed);
        }
        removed
    }

    /// Resolve once the queue is idle.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Deliver queued notices in order.
    ///
    /// Only one thread delivers at a time. A caller that finds delivery in
    /// progress (another thread, or an observer re-entering the scheduler)
    /// leaves its notices to the current deliverer.
    fn flush(&self) {
        loop {
            let Some(delivering) = self.inner.delivery.try_lock() else {
                return;
            };
            loop {
                let notice = self.inner.state.lock().outbox.pop_front();
                match notice {
                    Some(notice) => self.deliver(notice),
                    None => break,
                }
            }
            drop(delivering);

            if self.inner.state.lock().outbox.is_empty() {
                return;
            }
        }
    }

    fn deliver(&self, notice: Notice) {
        match notice {
            Notice::Status(task) => {
                let observers = self.inner.status_observers.read().clone();
                for observer in &observers {
                    observer(&task);
                }
            }
            Notice::Drained => {
                info!("Retry queue drained");
                let observers = self.inner.drain_observers.read().clone();
                for observer in &observers {
                    observer();
                }
                self.inner.idle.notify_waiters();
            }
        }
    }

    /// Start pending tasks while capacity allows.
    fn pump(&self) {
        let mut launches = Vec::new();

        {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            while state.active < self.inner.config.concurrency {
                let Some(id) = state.next_pending() else {
                    break;
                };
                let Some(entry) = state.tasks.get_mut(&id) else {
                    break;
                };
                entry.task.status = TaskStatus::InProgress;
                entry.task.attempts += 1;
                entry.task.last_attempt_at = Some(Utc::now());
                entry.task.next_retry_at = None;
                state.active += 1;

                info!(
                    task_id = %id,
                    kind = %entry.task.error.kind,
                    attempt = entry.task.attempts,
                    max_attempts = entry.task.max_attempts,
                    "Starting attempt"
                );
                state.outbox.push_back(Notice::Status(entry.task.clone()));
                launches.push((id, entry.execute.clone()));
            }
            state.check_drained();
        }

        self.flush();

        for (id, execute) in launches {
            let scheduler = self.clone();
            tokio::spawn(async move {
                let outcome = run_attempt(execute).await;
                scheduler.complete(&id, outcome);
            });
        }
    }

    fn complete(&self, id: &str, outcome: AttemptOutcome) {
        {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            state.active = state.active.saturating_sub(1);
            let config = &self.inner.config;

            if let Some(entry) = state.tasks.get_mut(id) {
                entry.task.last_result = Some(outcome.clone());

                if outcome.is_success() {
                    info!(task_id = %id, attempt = entry.task.attempts, "Task succeeded");
                    entry.task.status = TaskStatus::Succeeded;
                } else if entry.task.attempts >= entry.task.max_attempts {
                    warn!(
                        task_id = %id,
                        kind = %entry.task.error.kind,
                        attempts = entry.task.attempts,
                        "Task failed after exhausting attempts"
                    );
                    entry.task.status = TaskStatus::Failed;
                } else {
                    let delay = jittered_delay(
                        entry.task.current_delay,
                        config.jitter_fraction,
                        config.max_delay,
                        random_unit(),
                    );
                    entry.task.current_delay =
                        next_delay(entry.task.current_delay, config.backoff_multiplier, config.max_delay);
                    entry.task.status = TaskStatus::Waiting;
                    entry.task.next_retry_at = chrono::Duration::from_std(delay)
                        .ok()
                        .map(|d| Utc::now() + d);

                    debug!(
                        task_id = %id,
                        attempt = entry.task.attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Attempt failed, backing off"
                    );

                    let scheduler = self.clone();
                    let timer_id = id.to_string();
                    entry.timer = Some(tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        scheduler.wake(&timer_id);
                    }));
                }
                state.outbox.push_back(Notice::Status(entry.task.clone()));
            }
        }

        self.flush();
        self.pump();
    }

    /// Backoff elapsed: move a waiting task back to pending.
    fn wake(&self, id: &str) {
        {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            match state.tasks.get_mut(id) {
                Some(entry) if entry.task.status == TaskStatus::Waiting => {
                    entry.timer = None;
                    entry.task.status = TaskStatus::Pending;
                    entry.task.next_retry_at = None;
                    state.outbox.push_back(Notice::Status(entry.task.clone()));
                }
                _ => return,
            }
        }

        self.flush();
        self.pump();
    }
}

async fn run_attempt(execute: ExecuteFn) -> AttemptOutcome {
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| execute())) {
        Ok(future) => future,
        Err(panic) => return AttemptOutcome::Errored(panic_message(panic)),
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(true)) => AttemptOutcome::Succeeded,
        Ok(Ok(false)) => AttemptOutcome::ReturnedFalse,
        Ok(Err(e)) => AttemptOutcome::Errored(format!("{e:#}")),
        Err(panic) => AttemptOutcome::Errored(panic_message(panic)),
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("execute panicked: {detail}")
}
