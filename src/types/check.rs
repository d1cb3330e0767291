//! Check-run status and conclusion domain model.
//!
//! GitHub's Checks API reports a `status` (lifecycle phase) and, once a run
//! completes, a `conclusion`. Decoding from the wire is total: unknown status
//! strings map to `Queued` and unknown conclusions to `None`, so a new value
//! introduced by GitHub can never make the bot reject an event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CheckRunId;

/// Lifecycle phase of a check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Queued,
    InProgress,
    Completed,
}

impl CheckStatus {
    /// Decodes a wire value. GitHub emits `waiting`, `requested` and `pending`
    /// on some deployment flows; anything that is not `in_progress` or
    /// `completed` is treated as not-yet-started.
    pub fn from_api(s: &str) -> Self {
        match s {
            "in_progress" => CheckStatus::InProgress,
            "completed" => CheckStatus::Completed,
            _ => CheckStatus::Queued,
        }
    }

    pub fn as_api_str(&self) -> &'static str {
        match self {
            CheckStatus::Queued => "queued",
            CheckStatus::InProgress => "in_progress",
            CheckStatus::Completed => "completed",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, CheckStatus::Completed)
    }
}

/// Conclusion of a completed check run.
///
/// Absence ("none" while a run is still executing) is modeled as
/// `Option::<CheckConclusion>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckConclusion {
    Success,
    Failure,
    Neutral,
    Cancelled,
    Skipped,
    TimedOut,
    ActionRequired,
    Stale,
}

impl CheckConclusion {
    /// Decodes a wire value. Unknown conclusions map to `None`, which the
    /// aggregate treats as neither passing nor failing.
    pub fn from_api(s: &str) -> Option<Self> {
        match s {
            "success" => Some(CheckConclusion::Success),
            "failure" => Some(CheckConclusion::Failure),
            "neutral" => Some(CheckConclusion::Neutral),
            "cancelled" => Some(CheckConclusion::Cancelled),
            "skipped" => Some(CheckConclusion::Skipped),
            "timed_out" => Some(CheckConclusion::TimedOut),
            "action_required" => Some(CheckConclusion::ActionRequired),
            "stale" => Some(CheckConclusion::Stale),
            _ => None,
        }
    }

    pub fn as_api_str(&self) -> &'static str {
        match self {
            CheckConclusion::Success => "success",
            CheckConclusion::Failure => "failure",
            CheckConclusion::Neutral => "neutral",
            CheckConclusion::Cancelled => "cancelled",
            CheckConclusion::Skipped => "skipped",
            CheckConclusion::TimedOut => "timed_out",
            CheckConclusion::ActionRequired => "action_required",
            CheckConclusion::Stale => "stale",
        }
    }

    /// True for conclusions that count as passing: the check finished and
    /// does not block the merge.
    pub fn is_passing(&self) -> bool {
        matches!(
            self,
            CheckConclusion::Success | CheckConclusion::Neutral | CheckConclusion::Skipped
        )
    }

    /// True for conclusions that fail the aggregate outright.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            CheckConclusion::Failure
                | CheckConclusion::TimedOut
                | CheckConclusion::ActionRequired
                | CheckConclusion::Cancelled
                | CheckConclusion::Stale
        )
    }
}

/// The last known state of one tracked check run on a commit.
///
/// Records are replaced wholesale on each delivery (last-delivered-wins);
/// webhook payloads carry no ordering token to do better.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRunRecord {
    pub name: String,
    /// Remote id, absent until GitHub has reported one.
    pub remote_id: Option<CheckRunId>,
    pub status: CheckStatus,
    pub conclusion: Option<CheckConclusion>,
    /// When this observation was last applied.
    pub applied_at: DateTime<Utc>,
}

impl CheckRunRecord {
    /// True if this record carries the same observation as `other`, ignoring
    /// the application timestamp. Used to make event application idempotent.
    pub fn same_observation(&self, other: &CheckRunRecord) -> bool {
        self.name == other.name
            && self.remote_id == other.remote_id
            && self.status == other.status
            && self.conclusion == other.conclusion
    }
}
