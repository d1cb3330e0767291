//! Routing webhook events to per-commit workers.
//!
//! The dispatcher owns the only map from [`CommitKey`] to worker. Workers are
//! spawned lazily on the first event for a commit and exit on their own after
//! settling and idling out; a later event for the same commit simply spawns a
//! fresh worker, which rehydrates from GitHub.
//!
//! Different commits proceed fully in parallel; events for one commit queue
//! behind its worker's inbox and are never dropped or interleaved.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::github::retry::RetryConfig;
use crate::types::{CommitKey, InstallationId};
use crate::webhooks::{PrAction, WebhookEvent};

use super::worker::{CheckRunApi, CommitMessage, CommitWorker, WorkerConfig};

/// Inbox depth per commit worker. Events beyond this apply backpressure to
/// the webhook handler rather than being dropped.
const COMMIT_INBOX_BUFFER: usize = 64;

/// Aggregator-wide settings applied to every worker.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Name of the guard check run this bot owns.
    pub guard_name: String,
    /// Debounce window W; zero pushes synchronously.
    pub refresh_interval: Duration,
    /// Idle retention before a settled entry is evicted.
    pub idle_retention: Duration,
    pub retry: RetryConfig,
}

impl AggregatorConfig {
    pub fn new(guard_name: impl Into<String>) -> Self {
        AggregatorConfig {
            guard_name: guard_name.into(),
            refresh_interval: Duration::ZERO,
            idle_retention: Duration::from_secs(3600),
            retry: RetryConfig::DEFAULT,
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_idle_retention(mut self, retention: Duration) -> Self {
        self.idle_retention = retention;
        self
    }
}

struct WorkerHandle {
    tx: mpsc::Sender<CommitMessage>,
    task: JoinHandle<()>,
}

/// Routes events to per-commit workers, spawning them on demand.
pub struct Dispatcher<A> {
    api: Arc<A>,
    config: AggregatorConfig,
    workers: RwLock<HashMap<CommitKey, WorkerHandle>>,
    shutdown: CancellationToken,
}

impl<A: CheckRunApi> Dispatcher<A> {
    pub fn new(api: Arc<A>, config: AggregatorConfig) -> Self {
        Dispatcher {
            api,
            config,
            workers: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Accepts a decoded event, enqueueing it onto the owning commit's worker.
    ///
    /// This only enqueues - aggregation and remote calls happen inside the
    /// worker, never on the caller's (i.e. the HTTP handler's) path. Events
    /// the bot cannot act on are logged and dropped here.
    pub async fn dispatch(&self, event: WebhookEvent) {
        match event {
            WebhookEvent::Unknown { event_type } => {
                debug!(event_type = %event_type, "Dropping unsupported event type");
            }
            WebhookEvent::PullRequest(e) => {
                if !e.action.registers_commit() && e.action != PrAction::Closed {
                    debug!(repo = %e.repo, pr = e.number, action = ?e.action, "Ignoring pull request action");
                    return;
                }
                let Some(installation) = e.installation else {
                    warn!(repo = %e.repo, pr = e.number, "Pull request event without installation id");
                    return;
                };
                let key = CommitKey::new(e.repo, e.head_sha);
                self.send(key, installation, CommitMessage::PullRequest { action: e.action })
                    .await;
            }
            WebhookEvent::CheckRun(e) => {
                let Some(installation) = e.installation else {
                    warn!(repo = %e.repo, check = %e.check_run.name, "Check run event without installation id");
                    return;
                };
                let key = CommitKey::new(e.repo, e.check_run.head_sha.clone());
                self.send(key, installation, CommitMessage::CheckRun { run: e.check_run })
                    .await;
            }
        }
    }

    async fn send(&self, key: CommitKey, installation: InstallationId, message: CommitMessage) {
        let tx = self.worker_tx(&key, installation).await;
        if let Err(send_error) = tx.send(message).await {
            // The worker evicted itself between lookup and send. Spawn a
            // replacement (which will rehydrate) and hand it the event.
            debug!(key = %key, "Worker exited mid-send, respawning");
            let tx = self.respawn(&key, installation).await;
            if tx.send(send_error.0).await.is_err() {
                warn!(key = %key, "Dropping event: replacement worker exited immediately");
            }
        }
    }

    /// Gets the sender for a commit's worker, spawning one if absent or
    /// already finished.
    async fn worker_tx(
        &self,
        key: &CommitKey,
        installation: InstallationId,
    ) -> mpsc::Sender<CommitMessage> {
        {
            let workers = self.workers.read().await;
            if let Some(handle) = workers.get(key) {
                if !handle.task.is_finished() {
                    return handle.tx.clone();
                }
            }
        }

        let mut workers = self.workers.write().await;
        // Double-check after acquiring the write lock.
        if let Some(handle) = workers.get(key) {
            if !handle.task.is_finished() {
                return handle.tx.clone();
            }
            workers.remove(key);
        }
        self.spawn_locked(&mut workers, key, installation)
    }

    async fn respawn(
        &self,
        key: &CommitKey,
        installation: InstallationId,
    ) -> mpsc::Sender<CommitMessage> {
        let mut workers = self.workers.write().await;
        workers.remove(key);
        self.spawn_locked(&mut workers, key, installation)
    }

    fn spawn_locked(
        &self,
        workers: &mut HashMap<CommitKey, WorkerHandle>,
        key: &CommitKey,
        installation: InstallationId,
    ) -> mpsc::Sender<CommitMessage> {
        debug!(key = %key, "Spawning commit worker");
        let worker_config = WorkerConfig {
            key: key.clone(),
            installation,
            guard_name: self.config.guard_name.clone(),
            refresh_interval: self.config.refresh_interval,
            idle_retention: self.config.idle_retention,
            retry: self.config.retry,
        };
        let worker = CommitWorker::new(worker_config, self.api.clone());
        let (tx, rx) = mpsc::channel(COMMIT_INBOX_BUFFER);
        let cancel = self.shutdown.child_token();
        let task = tokio::spawn(worker.run(rx, cancel));

        workers.insert(key.clone(), WorkerHandle { tx: tx.clone(), task });
        tx
    }

    /// Number of live workers (finished ones are pruned lazily, so this may
    /// briefly overcount).
    pub async fn worker_count(&self) -> usize {
        self.workers.read().await.len()
    }

    /// Signals all workers to stop, then waits for them within the drain
    /// deadline. Workers flush a final best-effort push of dirty state;
    /// whatever misses the deadline is abandoned (a stale guard status, never
    /// a crash).
    pub async fn shutdown(&self, drain: Duration) {
        info!("Shutting down aggregator workers");
        self.shutdown.cancel();

        let handles: Vec<(CommitKey, WorkerHandle)> = {
            let mut workers = self.workers.write().await;
            workers.drain().collect()
        };

        let deadline = Instant::now() + drain;
        for (key, handle) in handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, handle.task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_error)) => {
                    warn!(key = %key, error = %join_error, "Worker task failed during shutdown")
                }
                Err(_) => warn!(key = %key, "Worker did not finish within drain deadline"),
            }
        }
    }
}
