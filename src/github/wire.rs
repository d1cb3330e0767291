//! Wire types for the GitHub REST API.
//!
//! Partial-field structs: only what the bot reads or writes. Status and
//! conclusion stay raw strings at this layer; [`crate::types`] owns the total
//! decode into domain enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CheckRunId, Sha};

/// Title shown on the guard while other checks are still running.
pub const GUARD_PENDING_TITLE: &str = "Waiting for other checks to complete";
/// Title shown on the guard once every tracked check has passed.
pub const GUARD_SUCCESS_TITLE: &str = "All status checks have passed";
/// Title shown on the guard when a tracked check has failed.
pub const GUARD_FAILURE_TITLE: &str = "One or more status checks failed";
/// Summary shown on the guard in every state.
pub const GUARD_SUMMARY: &str = "Will block merging until all other checks have completed";

/// A check run as returned by list/create responses and carried in
/// `check_run` webhook payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRun {
    #[serde(default)]
    pub id: Option<CheckRunId>,
    pub name: String,
    pub head_sha: Sha,
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<CheckRunOutput>,
}

/// The `output` object on a check run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRunOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl CheckRunOutput {
    pub fn new(title: impl Into<String>) -> Self {
        CheckRunOutput {
            title: Some(title.into()),
            summary: Some(GUARD_SUMMARY.to_string()),
        }
    }
}

/// Request body for `POST /repos/{owner}/{repo}/check-runs`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateCheckRun {
    pub name: String,
    pub head_sha: Sha,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<CheckRunOutput>,
}

/// Request body for `PATCH /repos/{owner}/{repo}/check-runs/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateCheckRun {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<CheckRunOutput>,
}

/// Response body for `GET /repos/{owner}/{repo}/commits/{sha}/check-runs`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckRunList {
    pub total_count: u64,
    pub check_runs: Vec<CheckRun>,
}

/// Response body for `POST /app/installations/{id}/access_tokens`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}
