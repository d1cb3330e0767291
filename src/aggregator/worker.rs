//! Per-commit worker task.
//!
//! Each guarded commit gets exactly one worker that owns its
//! [`AggregateEntry`] and performs every remote call for it. Events arrive on
//! an mpsc inbox and are processed strictly in order; debounce deadlines fire
//! inside the same select loop. That single loop is what enforces the
//! one-writer-per-commit invariant - there is no other path to the entry or
//! to GitHub for this key.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{AuthError, CredentialManager, TokenExchanger};
use crate::github::rest::{ApiError, ApiOutcome, RestClient};
use crate::github::retry::{RetryConfig, Retryable, retry_with_backoff};
use crate::github::wire::{CheckRun, CheckRunOutput, CreateCheckRun, UpdateCheckRun};
use crate::types::{CheckRunId, CommitKey, InstallationId, RepoId};
use crate::webhooks::PrAction;

use super::entry::{AggregateDecision, AggregateEntry};

/// Messages a commit worker processes, in arrival order.
#[derive(Debug)]
pub enum CommitMessage {
    /// A pull-request action for this commit.
    PullRequest { action: PrAction },
    /// An observed check run on this commit.
    CheckRun { run: CheckRun },
}

/// Failure of one guard API operation, reduced to what the worker's retry
/// policy needs to know.
#[derive(Debug, Error)]
pub enum GuardApiError {
    /// The target no longer exists remotely; repeating the call cannot help.
    #[error("not found")]
    NotFound,

    /// Permanent failure (bad request, unusable credentials after a refresh).
    #[error("{0}")]
    Terminal(String),

    /// Transient failure (rate limited, server error, network).
    #[error("{0}")]
    Transient(String),
}

impl Retryable for GuardApiError {
    fn is_retryable(&self) -> bool {
        matches!(self, GuardApiError::Transient(_))
    }
}

/// The remote operations a worker performs, as a seam for tests.
///
/// The production implementation ([`GithubCheckRunApi`]) combines the
/// credential manager and the REST client; tests substitute a mock and count
/// calls.
pub trait CheckRunApi: Send + Sync + 'static {
    fn list_check_runs(
        &self,
        installation: InstallationId,
        key: &CommitKey,
    ) -> impl Future<Output = Result<Vec<CheckRun>, GuardApiError>> + Send;

    fn create_check_run(
        &self,
        installation: InstallationId,
        repo: &RepoId,
        body: &CreateCheckRun,
    ) -> impl Future<Output = Result<CheckRun, GuardApiError>> + Send;

    fn update_check_run(
        &self,
        installation: InstallationId,
        repo: &RepoId,
        id: CheckRunId,
        body: &UpdateCheckRun,
    ) -> impl Future<Output = Result<(), GuardApiError>> + Send;
}

/// Production [`CheckRunApi`]: minted installation tokens + REST calls, with
/// one token invalidation and a single immediate retry on Unauthorized.
pub struct GithubCheckRunApi<E> {
    credentials: Arc<CredentialManager<E>>,
    rest: RestClient,
}

impl<E: TokenExchanger> GithubCheckRunApi<E> {
    pub fn new(credentials: Arc<CredentialManager<E>>, rest: RestClient) -> Self {
        GithubCheckRunApi { credentials, rest }
    }

    async fn token(&self, installation: InstallationId) -> Result<String, GuardApiError> {
        self.credentials
            .installation_token(installation)
            .await
            .map_err(auth_error)
    }
}

fn auth_error(e: AuthError) -> GuardApiError {
    if e.is_retryable() {
        GuardApiError::Transient(format!("credential issuance failed: {e}"))
    } else {
        GuardApiError::Terminal(format!("credential issuance failed: {e}"))
    }
}

fn api_error(e: ApiError) -> GuardApiError {
    if e.is_retryable() {
        GuardApiError::Transient(e.to_string())
    } else {
        GuardApiError::Terminal(e.to_string())
    }
}

/// Collapses an outcome into the worker's error taxonomy. `Unauthorized`
/// reaching this point means the single post-invalidation retry also failed.
fn flatten_outcome<T>(outcome: ApiOutcome<T>) -> Result<T, GuardApiError> {
    match outcome {
        ApiOutcome::Success(value) => Ok(value),
        ApiOutcome::NotFound => Err(GuardApiError::NotFound),
        ApiOutcome::Unauthorized => Err(GuardApiError::Terminal(
            "unauthorized after token refresh".to_string(),
        )),
        ApiOutcome::RateLimited => Err(GuardApiError::Transient("rate limited".to_string())),
        ApiOutcome::ServerError => Err(GuardApiError::Transient("server error".to_string())),
    }
}

impl<E: TokenExchanger> CheckRunApi for GithubCheckRunApi<E> {
    async fn list_check_runs(
        &self,
        installation: InstallationId,
        key: &CommitKey,
    ) -> Result<Vec<CheckRun>, GuardApiError> {
        let token = self.token(installation).await?;
        let mut outcome = self
            .rest
            .list_check_runs(&token, key)
            .await
            .map_err(api_error)?;
        if matches!(outcome, ApiOutcome::Unauthorized) {
            self.credentials.invalidate(installation).await;
            let token = self.token(installation).await?;
            outcome = self
                .rest
                .list_check_runs(&token, key)
                .await
                .map_err(api_error)?;
        }
        flatten_outcome(outcome)
    }

    async fn create_check_run(
        &self,
        installation: InstallationId,
        repo: &RepoId,
        body: &CreateCheckRun,
    ) -> Result<CheckRun, GuardApiError> {
        let token = self.token(installation).await?;
        let mut outcome = self
            .rest
            .create_check_run(&token, repo, body)
            .await
            .map_err(api_error)?;
        if matches!(outcome, ApiOutcome::Unauthorized) {
            self.credentials.invalidate(installation).await;
            let token = self.token(installation).await?;
            outcome = self
                .rest
                .create_check_run(&token, repo, body)
                .await
                .map_err(api_error)?;
        }
        flatten_outcome(outcome)
    }

    async fn update_check_run(
        &self,
        installation: InstallationId,
        repo: &RepoId,
        id: CheckRunId,
        body: &UpdateCheckRun,
    ) -> Result<(), GuardApiError> {
        let token = self.token(installation).await?;
        let mut outcome = self
            .rest
            .update_check_run(&token, repo, id, body)
            .await
            .map_err(api_error)?;
        if matches!(outcome, ApiOutcome::Unauthorized) {
            self.credentials.invalidate(installation).await;
            let token = self.token(installation).await?;
            outcome = self
                .rest
                .update_check_run(&token, repo, id, body)
                .await
                .map_err(api_error)?;
        }
        flatten_outcome(outcome).map(|_| ())
    }
}

/// Configuration for one commit worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub key: CommitKey,
    pub installation: InstallationId,
    /// Name of the guard's own check run (excluded from aggregation).
    pub guard_name: String,
    /// Debounce window W. Zero means push synchronously after every
    /// recomputation.
    pub refresh_interval: Duration,
    /// How long a settled entry may sit idle before the worker exits.
    pub idle_retention: Duration,
    pub retry: RetryConfig,
}

/// The worker: owns the entry, drains the inbox, pushes the guard.
pub struct CommitWorker<A> {
    config: WorkerConfig,
    api: Arc<A>,
    entry: AggregateEntry,
    /// Whether the entry has been seeded from a `listCheckRuns` snapshot.
    hydrated: bool,
    /// Armed by the first mutation of a debounce window; later mutations in
    /// the same window do not reschedule.
    push_deadline: Option<Instant>,
    last_activity: Instant,
}

impl<A: CheckRunApi> CommitWorker<A> {
    pub fn new(config: WorkerConfig, api: Arc<A>) -> Self {
        let entry = AggregateEntry::new(config.key.clone(), config.guard_name.clone());
        CommitWorker {
            config,
            api,
            entry,
            hydrated: false,
            push_deadline: None,
            last_activity: Instant::now(),
        }
    }

    /// Event loop. Exits on cancellation, on inbox closure, or after the
    /// entry has settled and stayed idle beyond the retention period.
    pub async fn run(mut self, mut inbox: mpsc::Receiver<CommitMessage>, cancel: CancellationToken) {
        debug!(key = %self.config.key, "Commit worker started");
        loop {
            let push_at = self.push_deadline.unwrap_or_else(Instant::now);
            let evict_at = self.last_activity + self.config.idle_retention;

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    self.flush().await;
                    debug!(key = %self.config.key, "Commit worker cancelled");
                    return;
                }

                message = inbox.recv() => match message {
                    Some(message) => self.handle(message).await,
                    None => {
                        self.flush().await;
                        debug!(key = %self.config.key, "Commit worker inbox closed");
                        return;
                    }
                },

                _ = tokio::time::sleep_until(push_at), if self.push_deadline.is_some() => {
                    self.push_deadline = None;
                    self.push(self.config.retry).await;
                }

                _ = tokio::time::sleep_until(evict_at), if self.evictable() => {
                    debug!(key = %self.config.key, "Evicting settled entry after idle retention");
                    return;
                }
            }
        }
    }

    fn evictable(&self) -> bool {
        self.entry.is_settled() && !self.entry.is_dirty() && self.push_deadline.is_none()
    }

    async fn handle(&mut self, message: CommitMessage) {
        self.last_activity = Instant::now();
        self.hydrate().await;

        match message {
            CommitMessage::PullRequest { action } => {
                debug!(key = %self.config.key, ?action, "Applying pull request action");
                self.entry.apply_pull_request(action);
            }
            CommitMessage::CheckRun { run } => {
                debug!(key = %self.config.key, check = %run.name, "Applying check run");
                self.entry.apply_check_run(&run, Utc::now());
            }
        }

        if !self.entry.is_dirty() {
            return;
        }

        if self.config.refresh_interval.is_zero() {
            self.push(self.config.retry).await;
        } else if self.push_deadline.is_none() {
            self.push_deadline = Some(Instant::now() + self.config.refresh_interval);
        }
    }

    /// Seeds the entry from the remote check-run list on the first event.
    ///
    /// A failed snapshot is logged and retried on the next event; meanwhile
    /// the worker operates on webhook data alone (worst case: a duplicate
    /// guard run, which GitHub tolerates).
    async fn hydrate(&mut self) {
        if self.hydrated {
            return;
        }
        match self
            .api
            .list_check_runs(self.config.installation, &self.config.key)
            .await
        {
            Ok(runs) => {
                debug!(key = %self.config.key, count = runs.len(), "Rehydrated from check-run list");
                self.entry.seed(&runs, Utc::now());
                self.hydrated = true;
            }
            Err(e) => {
                warn!(key = %self.config.key, error = %e, "Failed to rehydrate check runs");
            }
        }
    }

    /// Pushes the minimal diff for the current decision: create the guard if
    /// it has no remote id yet, update it otherwise, or do nothing when the
    /// remote already matches.
    async fn push(&mut self, retry: RetryConfig) {
        if !self.entry.is_dirty() {
            return;
        }
        if !self.entry.needs_push() {
            self.entry.mark_clean();
            return;
        }

        let decision = self.entry.decision();
        let result = retry_with_backoff(retry, || self.push_once(decision)).await;

        match result {
            Ok(guard_id) => {
                info!(
                    key = %self.config.key,
                    guard_id = %guard_id,
                    status = decision.status_str(),
                    conclusion = decision.conclusion_str().unwrap_or("none"),
                    "Pushed guard state"
                );
                self.entry.record_push(decision, guard_id);
            }
            Err(GuardApiError::NotFound) => {
                // The guard run vanished remotely; recreate on the next push.
                warn!(key = %self.config.key, "Guard check run not found remotely");
                self.entry.forget_guard();
            }
            Err(e) => {
                // Entry stays dirty: the next incoming event retriggers.
                warn!(key = %self.config.key, error = %e, "Guard push failed, leaving entry dirty");
            }
        }
    }

    async fn push_once(&self, decision: AggregateDecision) -> Result<CheckRunId, GuardApiError> {
        match self.entry.guard_id() {
            None => {
                let body = create_body(&self.config, decision);
                let created = self
                    .api
                    .create_check_run(self.config.installation, &self.config.key.repo, &body)
                    .await?;
                created.id.ok_or_else(|| {
                    GuardApiError::Terminal("created check run carried no id".to_string())
                })
            }
            Some(id) => {
                let body = update_body(decision);
                self.api
                    .update_check_run(self.config.installation, &self.config.key.repo, id, &body)
                    .await?;
                Ok(id)
            }
        }
    }

    /// Final best-effort push during shutdown: one attempt, no backoff. A
    /// stale guard status is acceptable degradation; blocking shutdown is not.
    async fn flush(&mut self) {
        self.push_deadline = None;
        if self.entry.is_dirty() {
            let no_retry = RetryConfig::new(0, Duration::ZERO, Duration::ZERO);
            self.push(no_retry).await;
        }
    }
}

fn create_body(config: &WorkerConfig, decision: AggregateDecision) -> CreateCheckRun {
    let now = Utc::now();
    CreateCheckRun {
        name: config.guard_name.clone(),
        head_sha: config.key.sha.clone(),
        status: decision.status_str().to_string(),
        conclusion: decision.conclusion_str().map(str::to_string),
        started_at: Some(now),
        completed_at: decision.is_completed().then_some(now),
        output: Some(CheckRunOutput::new(decision.title())),
    }
}

fn update_body(decision: AggregateDecision) -> UpdateCheckRun {
    UpdateCheckRun {
        status: Some(decision.status_str().to_string()),
        conclusion: decision.conclusion_str().map(str::to_string),
        completed_at: decision.is_completed().then(Utc::now),
        output: Some(CheckRunOutput::new(decision.title())),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{RepoId, Sha};
    use std::sync::Mutex;

    const GUARD: &str = "merge-guard";

    /// What the mock API was asked to do, in order.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        List,
        Create {
            status: String,
            conclusion: Option<String>,
        },
        Update {
            id: CheckRunId,
            status: Option<String>,
            conclusion: Option<String>,
        },
    }

    /// Scriptable [`CheckRunApi`] that records calls.
    pub struct MockApi {
        pub calls: Mutex<Vec<Call>>,
        /// What `list_check_runs` returns.
        pub remote_runs: Mutex<Vec<CheckRun>>,
        /// When set, create/update fail with this transient error.
        pub failing: Mutex<bool>,
        next_id: Mutex<u64>,
    }

    impl MockApi {
        pub fn new() -> Self {
            MockApi {
                calls: Mutex::new(Vec::new()),
                remote_runs: Mutex::new(Vec::new()),
                failing: Mutex::new(false),
                next_id: Mutex::new(100),
            }
        }

        pub fn with_remote_runs(runs: Vec<CheckRun>) -> Self {
            let api = Self::new();
            *api.remote_runs.lock().unwrap() = runs;
            api
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn push_calls(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|c| !matches!(c, Call::List))
                .collect()
        }
    }

    impl CheckRunApi for MockApi {
        async fn list_check_runs(
            &self,
            _installation: InstallationId,
            _key: &CommitKey,
        ) -> Result<Vec<CheckRun>, GuardApiError> {
            self.calls.lock().unwrap().push(Call::List);
            Ok(self.remote_runs.lock().unwrap().clone())
        }

        async fn create_check_run(
            &self,
            _installation: InstallationId,
            _repo: &RepoId,
            body: &CreateCheckRun,
        ) -> Result<CheckRun, GuardApiError> {
            if *self.failing.lock().unwrap() {
                return Err(GuardApiError::Transient("scripted failure".to_string()));
            }
            self.calls.lock().unwrap().push(Call::Create {
                status: body.status.clone(),
                conclusion: body.conclusion.clone(),
            });
            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            Ok(CheckRun {
                id: Some(CheckRunId(*next_id)),
                name: body.name.clone(),
                head_sha: body.head_sha.clone(),
                status: body.status.clone(),
                conclusion: body.conclusion.clone(),
                started_at: body.started_at,
                completed_at: body.completed_at,
                output: body.output.clone(),
            })
        }

        async fn update_check_run(
            &self,
            _installation: InstallationId,
            _repo: &RepoId,
            id: CheckRunId,
            body: &UpdateCheckRun,
        ) -> Result<(), GuardApiError> {
            if *self.failing.lock().unwrap() {
                return Err(GuardApiError::Transient("scripted failure".to_string()));
            }
            self.calls.lock().unwrap().push(Call::Update {
                id,
                status: body.status.clone(),
                conclusion: body.conclusion.clone(),
            });
            Ok(())
        }
    }

    pub fn test_key() -> CommitKey {
        CommitKey::new(RepoId::new("octocat", "hello-world"), Sha::new("abc123"))
    }

    pub fn wire_run(name: &str, status: &str, conclusion: Option<&str>) -> CheckRun {
        CheckRun {
            id: Some(CheckRunId(name.len() as u64)),
            name: name.to_string(),
            head_sha: Sha::new("abc123"),
            status: status.to_string(),
            conclusion: conclusion.map(str::to_string),
            started_at: None,
            completed_at: None,
            output: None,
        }
    }

    fn config(refresh_interval: Duration) -> WorkerConfig {
        WorkerConfig {
            key: test_key(),
            installation: InstallationId(123),
            guard_name: GUARD.to_string(),
            refresh_interval,
            idle_retention: Duration::from_secs(3600),
            retry: RetryConfig::new(0, Duration::from_millis(1), Duration::from_millis(1)),
        }
    }

    /// Runs a worker over the given messages and returns the mock API after
    /// the worker has drained them and exited.
    async fn drive(
        api: Arc<MockApi>,
        config: WorkerConfig,
        messages: Vec<CommitMessage>,
    ) -> Arc<MockApi> {
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let worker = CommitWorker::new(config, api.clone());
        let task = tokio::spawn(worker.run(rx, cancel));

        for message in messages {
            tx.send(message).await.unwrap();
        }
        drop(tx); // closes the inbox so the worker flushes and exits
        task.await.unwrap();
        api
    }

    fn check_run_msg(name: &str, status: &str, conclusion: Option<&str>) -> CommitMessage {
        CommitMessage::CheckRun {
            run: wire_run(name, status, conclusion),
        }
    }

    // ─── Scenario B: pull_request(opened) with no prior check runs ───

    #[tokio::test]
    async fn pr_opened_creates_pending_guard() {
        let api = drive(
            Arc::new(MockApi::new()),
            config(Duration::ZERO),
            vec![CommitMessage::PullRequest {
                action: PrAction::Opened,
            }],
        )
        .await;

        assert_eq!(
            api.push_calls(),
            vec![Call::Create {
                status: "in_progress".to_string(),
                conclusion: None,
            }]
        );
    }

    // ─── Scenario A: build+test succeed, lint fails ───

    #[tokio::test]
    async fn failing_check_patches_guard_to_failure() {
        // The commit's real check suite is visible via rehydration, so the
        // guard holds while some checks are still queued.
        let api = Arc::new(MockApi::with_remote_runs(vec![
            wire_run("build", "queued", None),
            wire_run("test", "queued", None),
            wire_run("lint", "queued", None),
        ]));

        let api = drive(
            api,
            config(Duration::ZERO),
            vec![
                check_run_msg("build", "completed", Some("success")),
                check_run_msg("test", "completed", Some("success")),
                check_run_msg("lint", "completed", Some("failure")),
            ],
        )
        .await;

        let calls = api.push_calls();
        // First mutation creates the pending guard; the lint failure patches
        // it to completed/failure. The intermediate successes change nothing.
        assert_eq!(calls.len(), 2, "calls: {calls:?}");
        assert_eq!(
            calls[0],
            Call::Create {
                status: "in_progress".to_string(),
                conclusion: None,
            }
        );
        assert!(matches!(
            &calls[1],
            Call::Update { status: Some(s), conclusion: Some(c), .. }
                if s == "completed" && c == "failure"
        ));
    }

    // ─── Scenario C: everything passes ───

    #[tokio::test]
    async fn all_passing_patches_guard_to_success() {
        let api = Arc::new(MockApi::with_remote_runs(vec![
            wire_run("build", "queued", None),
            wire_run("test", "queued", None),
        ]));

        let api = drive(
            api,
            config(Duration::ZERO),
            vec![
                check_run_msg("build", "completed", Some("success")),
                check_run_msg("test", "completed", Some("success")),
            ],
        )
        .await;

        let calls = api.push_calls();
        assert!(matches!(
            calls.last(),
            Some(Call::Update { status: Some(s), conclusion: Some(c), .. })
                if s == "completed" && c == "success"
        ));
    }

    // ─── Guard reuse across restarts ───

    #[tokio::test]
    async fn existing_remote_guard_is_updated_not_recreated() {
        let api = Arc::new(MockApi::with_remote_runs(vec![
            wire_run(GUARD, "in_progress", None),
            wire_run("build", "queued", None),
        ]));

        let api = drive(
            api,
            config(Duration::ZERO),
            vec![check_run_msg("build", "completed", Some("success"))],
        )
        .await;

        let calls = api.push_calls();
        assert_eq!(calls.len(), 1, "calls: {calls:?}");
        assert!(matches!(
            &calls[0],
            Call::Update { id, status: Some(s), conclusion: Some(c) }
                if *id == CheckRunId(GUARD.len() as u64) && s == "completed" && c == "success"
        ));
    }

    // ─── Debounce coalescing ───

    #[tokio::test(start_paused = true)]
    async fn mutations_within_one_window_produce_one_push() {
        let api = Arc::new(MockApi::new());
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let worker = CommitWorker::new(config(Duration::from_secs(5)), api.clone());
        let task = tokio::spawn(worker.run(rx, cancel.clone()));

        for name in ["build", "test", "lint", "docs", "bench"] {
            tx.send(check_run_msg(name, "completed", Some("success")))
                .await
                .unwrap();
        }

        // Let the paused clock run past the debounce window.
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(
            api.push_calls().len(),
            1,
            "five mutations within one window must coalesce into one push"
        );

        cancel.cancel();
        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn later_window_pushes_again() {
        let api = Arc::new(MockApi::new());
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let worker = CommitWorker::new(config(Duration::from_secs(5)), api.clone());
        let task = tokio::spawn(worker.run(rx, cancel.clone()));

        tx.send(check_run_msg("build", "completed", Some("success")))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        tx.send(check_run_msg("build", "completed", Some("failure")))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(api.push_calls().len(), 2);

        cancel.cancel();
        drop(tx);
        task.await.unwrap();
    }

    // ─── Failure handling ───

    #[tokio::test]
    async fn exhausted_push_leaves_entry_dirty_and_next_event_retriggers() {
        let api = Arc::new(MockApi::new());
        *api.failing.lock().unwrap() = true;

        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let worker = CommitWorker::new(config(Duration::ZERO), api.clone());
        let task = tokio::spawn(worker.run(rx, cancel.clone()));

        tx.send(check_run_msg("build", "completed", Some("failure")))
            .await
            .unwrap();
        // Give the worker a moment to exhaust its (zero-retry) push.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(api.push_calls().is_empty());

        // Remote recovers; the next event retriggers a successful push.
        *api.failing.lock().unwrap() = false;
        tx.send(check_run_msg("test", "completed", Some("success")))
            .await
            .unwrap();
        drop(tx);
        task.await.unwrap();

        let calls = api.push_calls();
        assert_eq!(calls.len(), 1, "calls: {calls:?}");
        assert!(matches!(
            &calls[0],
            Call::Create { status, conclusion: Some(c) }
                if status == "completed" && c == "failure"
        ));
    }

    // ─── Eviction ───

    #[tokio::test(start_paused = true)]
    async fn settled_worker_exits_after_idle_retention() {
        let api = Arc::new(MockApi::new());
        let mut cfg = config(Duration::ZERO);
        cfg.idle_retention = Duration::from_secs(60);

        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let worker = CommitWorker::new(cfg, api.clone());
        let task = tokio::spawn(worker.run(rx, cancel));

        tx.send(check_run_msg("build", "completed", Some("success")))
            .await
            .unwrap();

        // The entry settles (guard pushed completed/success), then idles out.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(task.is_finished(), "worker should evict itself");
        drop(tx);
    }

    // ─── Idempotent redelivery ───

    #[tokio::test]
    async fn redelivered_event_causes_no_second_push() {
        let api = drive(
            Arc::new(MockApi::new()),
            config(Duration::ZERO),
            vec![
                check_run_msg("build", "completed", Some("success")),
                check_run_msg("build", "completed", Some("success")),
            ],
        )
        .await;

        assert_eq!(api.push_calls().len(), 1);
    }
}
