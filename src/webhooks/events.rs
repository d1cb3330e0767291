//! Typed webhook event union.
//!
//! The bot reacts to exactly two GitHub event types. Everything else decodes
//! to [`WebhookEvent::Unknown`] and is dropped by the aggregator; the union is
//! closed so every consumer matches it exhaustively instead of falling through
//! a stringly-typed default case.

use serde::{Deserialize, Serialize};

use crate::github::wire::CheckRun;
use crate::types::{InstallationId, RepoId, Sha};

/// A decoded GitHub webhook event.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    /// A pull request was opened, updated, or closed.
    PullRequest(PullRequestEvent),

    /// A check run on some commit changed state.
    CheckRun(CheckRunEvent),

    /// An event type the bot does not handle. Kept (rather than erroring)
    /// so the gateway can acknowledge it with a 2xx and move on.
    Unknown { event_type: String },
}

impl WebhookEvent {
    /// The installation the event belongs to, when the payload carries one.
    /// Events without an installation cannot be acted upon: no credential
    /// can be minted for them.
    pub fn installation(&self) -> Option<InstallationId> {
        match self {
            WebhookEvent::PullRequest(e) => e.installation,
            WebhookEvent::CheckRun(e) => e.installation,
            WebhookEvent::Unknown { .. } => None,
        }
    }
}

/// Action on a pull request.
///
/// `Other` absorbs the many actions the bot ignores (labeled, edited,
/// review_requested, ...) without failing decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrAction {
    Opened,
    Reopened,
    Synchronize,
    Closed,
    #[serde(other)]
    Other,
}

impl PrAction {
    /// True for actions that (re)register the head commit as guarded.
    pub fn registers_commit(&self) -> bool {
        matches!(
            self,
            PrAction::Opened | PrAction::Reopened | PrAction::Synchronize
        )
    }
}

/// A `pull_request` event reduced to the fields the aggregator needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequestEvent {
    pub repo: RepoId,
    pub installation: Option<InstallationId>,
    pub action: PrAction,
    pub number: u64,
    /// Current head commit of the PR branch - the aggregation target.
    pub head_sha: Sha,
}

/// Action on a check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckRunAction {
    Created,
    Completed,
    Rerequested,
    RequestedAction,
    #[serde(other)]
    Other,
}

/// A `check_run` event with the originating check-run payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckRunEvent {
    pub repo: RepoId,
    pub installation: Option<InstallationId>,
    pub action: CheckRunAction,
    pub check_run: CheckRun,
}
