//! Pure per-commit aggregation state.
//!
//! [`AggregateEntry`] tracks every check run observed on one commit and
//! computes the guard's aggregate decision from them. It performs no IO; the
//! worker owns an entry and drives remote calls from its state. Keeping the
//! state pure is what makes the idempotence and ordering properties testable
//! without a GitHub in the loop.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::github::wire;
use crate::types::{CheckConclusion, CheckRunId, CheckRunRecord, CheckStatus, CommitKey};
use crate::webhooks::PrAction;

/// The guard's computed verdict over all tracked checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateDecision {
    /// At least one tracked check has not completed successfully yet - or no
    /// check has reported at all. The guard must never report success early,
    /// so an empty set is pending, not passing.
    InProgress,
    /// Every tracked check completed with a passing conclusion.
    Success,
    /// Some tracked check completed with a blocking conclusion.
    Failure,
}

impl AggregateDecision {
    pub fn is_completed(&self) -> bool {
        !matches!(self, AggregateDecision::InProgress)
    }

    /// The `status` field to report on the guard check run.
    pub fn status_str(&self) -> &'static str {
        match self {
            AggregateDecision::InProgress => "in_progress",
            AggregateDecision::Success | AggregateDecision::Failure => "completed",
        }
    }

    /// The `conclusion` field to report, absent while in progress.
    pub fn conclusion_str(&self) -> Option<&'static str> {
        match self {
            AggregateDecision::InProgress => None,
            AggregateDecision::Success => Some("success"),
            AggregateDecision::Failure => Some("failure"),
        }
    }

    /// The output title to report alongside the decision.
    pub fn title(&self) -> &'static str {
        match self {
            AggregateDecision::InProgress => wire::GUARD_PENDING_TITLE,
            AggregateDecision::Success => wire::GUARD_SUCCESS_TITLE,
            AggregateDecision::Failure => wire::GUARD_FAILURE_TITLE,
        }
    }
}

/// Lifecycle of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPhase {
    /// Created but nothing has registered the commit yet.
    Empty,
    /// The commit is guarded and checks are being tracked.
    Pending,
    /// The guard has reached a completed state (or the PR closed); the entry
    /// is eligible for idle eviction.
    Settled,
}

/// In-memory aggregation state for one commit.
///
/// The guard's own check run is excluded from the tracked set (it must never
/// aggregate itself); only its remote id is captured so updates can target it.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateEntry {
    key: CommitKey,
    guard_name: String,
    checks: HashMap<String, CheckRunRecord>,
    guard_id: Option<CheckRunId>,
    /// The decision most recently written to GitHub, used to skip no-op
    /// pushes. `None` until the guard has been created.
    last_pushed: Option<AggregateDecision>,
    phase: EntryPhase,
    dirty: bool,
}

impl AggregateEntry {
    pub fn new(key: CommitKey, guard_name: impl Into<String>) -> Self {
        AggregateEntry {
            key,
            guard_name: guard_name.into(),
            checks: HashMap::new(),
            guard_id: None,
            last_pushed: None,
            phase: EntryPhase::Empty,
            dirty: false,
        }
    }

    pub fn key(&self) -> &CommitKey {
        &self.key
    }

    pub fn phase(&self) -> EntryPhase {
        self.phase
    }

    pub fn is_settled(&self) -> bool {
        self.phase == EntryPhase::Settled
    }

    pub fn guard_id(&self) -> Option<CheckRunId> {
        self.guard_id
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn tracked_count(&self) -> usize {
        self.checks.len()
    }

    /// Applies a pull-request action for this commit.
    ///
    /// Opening actions register the commit as guarded; a close settles the
    /// entry locally (no remote write - the commit may reappear on another
    /// PR, in which case a fresh event recreates the state).
    pub fn apply_pull_request(&mut self, action: PrAction) {
        if action.registers_commit() {
            self.phase = EntryPhase::Pending;
            // Force reconciliation so a missing guard run gets created.
            self.dirty = true;
        } else if action == PrAction::Closed {
            self.phase = EntryPhase::Settled;
        }
    }

    /// Applies one observed check run, replacing any previous record for the
    /// same check name unconditionally.
    ///
    /// Webhook deliveries carry no ordering token, so last-delivered-wins is
    /// the defined tie-break; changing that policy means changing only this
    /// function. Applying an identical observation twice is a no-op.
    pub fn apply_check_run(&mut self, run: &wire::CheckRun, now: DateTime<Utc>) {
        if run.name == self.guard_name {
            // Our own run: never aggregated, but its id lets updates target it.
            if self.guard_id.is_none() {
                self.guard_id = run.id;
            }
            return;
        }

        let record = record_from_wire(run, now);
        match self.checks.get(&run.name) {
            Some(existing) if existing.same_observation(&record) => {}
            _ => {
                self.checks.insert(run.name.clone(), record);
                self.dirty = true;
                self.phase = EntryPhase::Pending;
            }
        }
    }

    /// Seeds the entry from a `listCheckRuns` snapshot (rehydration).
    ///
    /// Also adopts the remote guard state so that a freshly created entry for
    /// an already-guarded commit neither re-creates the guard nor repeats an
    /// update GitHub already has.
    pub fn seed(&mut self, runs: &[wire::CheckRun], now: DateTime<Utc>) {
        for run in runs {
            if run.name == self.guard_name {
                if self.guard_id.is_none() {
                    self.guard_id = run.id;
                }
                self.last_pushed = Some(remote_guard_decision(run));
            } else {
                self.apply_check_run(run, now);
            }
        }
    }

    /// Recomputes the aggregate decision from the tracked set.
    pub fn decision(&self) -> AggregateDecision {
        let completed_with = |record: &CheckRunRecord, f: fn(&CheckConclusion) -> bool| {
            record.status.is_completed() && record.conclusion.as_ref().is_some_and(f)
        };

        if self
            .checks
            .values()
            .any(|r| completed_with(r, |c| c.is_blocking()))
        {
            AggregateDecision::Failure
        } else if !self.checks.is_empty()
            && self
                .checks
                .values()
                .all(|r| completed_with(r, |c| c.is_passing()))
        {
            AggregateDecision::Success
        } else {
            // Covers zero tracked checks, anything still running, and
            // completed runs with conclusions we cannot interpret.
            AggregateDecision::InProgress
        }
    }

    /// Whether a push would change anything remotely.
    pub fn needs_push(&self) -> bool {
        self.dirty && (self.guard_id.is_none() || self.last_pushed != Some(self.decision()))
    }

    /// Clears the dirty flag without a remote write (the remote already
    /// matches the computed decision).
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Records a successful remote write of `decision`.
    pub fn record_push(&mut self, decision: AggregateDecision, guard_id: CheckRunId) {
        self.guard_id = Some(guard_id);
        self.last_pushed = Some(decision);
        self.dirty = false;
        if decision.is_completed() {
            self.phase = EntryPhase::Settled;
        }
    }

    /// Forgets the remote guard id (e.g. after GitHub answered 404 for it);
    /// the next push will create a fresh run.
    pub fn forget_guard(&mut self) {
        self.guard_id = None;
        self.last_pushed = None;
        self.dirty = true;
    }
}

fn record_from_wire(run: &wire::CheckRun, now: DateTime<Utc>) -> CheckRunRecord {
    CheckRunRecord {
        name: run.name.clone(),
        remote_id: run.id,
        status: CheckStatus::from_api(&run.status),
        conclusion: run
            .conclusion
            .as_deref()
            .and_then(CheckConclusion::from_api),
        applied_at: now,
    }
}

/// What a remote guard run currently reports, mapped into the decision space.
fn remote_guard_decision(run: &wire::CheckRun) -> AggregateDecision {
    if !CheckStatus::from_api(&run.status).is_completed() {
        return AggregateDecision::InProgress;
    }
    match run.conclusion.as_deref().and_then(CheckConclusion::from_api) {
        Some(CheckConclusion::Success) => AggregateDecision::Success,
        Some(_) => AggregateDecision::Failure,
        None => AggregateDecision::InProgress,
    }
}
