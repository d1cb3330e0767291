//! REST operations against the GitHub API.
//!
//! Every operation takes the bearer token as an argument; credential
//! lifecycle is [`crate::auth`]'s concern. HTTP responses map onto
//! [`ApiOutcome`]:
//!
//! - `NotFound` is terminal for that call
//! - `Unauthorized` should trigger one token invalidation and a single retry
//! - `RateLimited` and `ServerError` are retryable with backoff
//!
//! Statuses outside that taxonomy (e.g. 422 on a bad request body) surface as
//! [`ApiError::UnexpectedStatus`] and are not retried: repeating them cannot
//! succeed.

use reqwest::{Response, StatusCode, header};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::types::{CheckRunId, CommitKey, InstallationId, RepoId};

use super::wire::{CheckRun, CheckRunList, CreateCheckRun, TokenResponse, UpdateCheckRun};

const ACCEPT_GITHUB_JSON: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("merge-guard/", env!("CARGO_PKG_VERSION"));

/// A completed HTTP exchange, classified for the caller's retry policy.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiOutcome<T> {
    Success(T),
    NotFound,
    Unauthorized,
    RateLimited,
    ServerError,
}

impl<T> ApiOutcome<T> {
    /// Maps the success payload, leaving the other variants untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiOutcome<U> {
        match self {
            ApiOutcome::Success(v) => ApiOutcome::Success(f(v)),
            ApiOutcome::NotFound => ApiOutcome::NotFound,
            ApiOutcome::Unauthorized => ApiOutcome::Unauthorized,
            ApiOutcome::RateLimited => ApiOutcome::RateLimited,
            ApiOutcome::ServerError => ApiOutcome::ServerError,
        }
    }
}

impl ApiOutcome<()> {
    /// Re-types a payload-free outcome. `None` for `Success`, whose payload
    /// cannot be conjured.
    fn cast<T>(self) -> Option<ApiOutcome<T>> {
        match self {
            ApiOutcome::Success(()) => None,
            ApiOutcome::NotFound => Some(ApiOutcome::NotFound),
            ApiOutcome::Unauthorized => Some(ApiOutcome::Unauthorized),
            ApiOutcome::RateLimited => Some(ApiOutcome::RateLimited),
            ApiOutcome::ServerError => Some(ApiOutcome::ServerError),
        }
    }
}

/// Failures below the outcome taxonomy: the exchange itself went wrong.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("failed to construct HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("{op}: request failed: {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{op}: failed to decode response body: {source}")]
    Decode {
        op: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{op}: unexpected status {status}")]
    UnexpectedStatus { op: &'static str, status: u16 },
}

impl ApiError {
    /// Transport failures may be transient (timeouts, connection resets);
    /// everything else here is terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Transport { .. })
    }
}

/// How a status code maps into the outcome taxonomy. Pure so it can be
/// tested without a server.
fn classify_status(status: StatusCode, body: &str) -> Option<ApiOutcome<()>> {
    if status.is_success() {
        return Some(ApiOutcome::Success(()));
    }
    match status.as_u16() {
        401 => Some(ApiOutcome::Unauthorized),
        // GitHub reports primary and secondary rate limits as 403 with a
        // descriptive message; a plain 403 is a permissions problem.
        403 if is_rate_limit_body(body) => Some(ApiOutcome::RateLimited),
        403 => Some(ApiOutcome::Unauthorized),
        404 => Some(ApiOutcome::NotFound),
        429 => Some(ApiOutcome::RateLimited),
        500..=599 => Some(ApiOutcome::ServerError),
        _ => None,
    }
}

fn is_rate_limit_body(body: &str) -> bool {
    let body = body.to_lowercase();
    body.contains("rate limit") || body.contains("secondary rate") || body.contains("abuse")
}

/// Typed client for the handful of GitHub endpoints the bot consumes.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base: String,
}

impl RestClient {
    /// Creates a client against the given API base URL
    /// (e.g. `https://api.github.com`).
    pub fn new(base: impl Into<String>) -> Result<Self, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static(ACCEPT_GITHUB_JSON),
        );
        headers.insert(
            header::HeaderName::from_static("x-github-api-version"),
            header::HeaderValue::from_static(API_VERSION),
        );
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(USER_AGENT),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(ApiError::Build)?;

        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        Ok(RestClient { http, base })
    }

    /// `POST /app/installations/{id}/access_tokens`, authenticated with an
    /// App JWT rather than an installation token.
    pub async fn exchange_installation_token(
        &self,
        app_jwt: &str,
        installation: InstallationId,
    ) -> Result<ApiOutcome<TokenResponse>, ApiError> {
        let op = "exchange_installation_token";
        let url = format!("{}/app/installations/{}/access_tokens", self.base, installation);
        let response = self
            .http
            .post(&url)
            .bearer_auth(app_jwt)
            .send()
            .await
            .map_err(|source| ApiError::Transport { op, source })?;
        self.read_outcome(op, response).await
    }

    /// `GET /repos/{owner}/{repo}/commits/{sha}/check-runs`.
    pub async fn list_check_runs(
        &self,
        token: &str,
        key: &CommitKey,
    ) -> Result<ApiOutcome<Vec<CheckRun>>, ApiError> {
        let op = "list_check_runs";
        let url = format!(
            "{}/repos/{}/{}/commits/{}/check-runs",
            self.base, key.repo.owner, key.repo.repo, key.sha
        );
        let response = self
            .http
            .get(&url)
            .query(&[("per_page", "100")])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| ApiError::Transport { op, source })?;
        let outcome: ApiOutcome<CheckRunList> = self.read_outcome(op, response).await?;
        Ok(outcome.map(|list| {
            debug!(
                key = %key,
                total = list.total_count,
                "Listed check runs"
            );
            list.check_runs
        }))
    }

    /// `POST /repos/{owner}/{repo}/check-runs`.
    pub async fn create_check_run(
        &self,
        token: &str,
        repo: &RepoId,
        body: &CreateCheckRun,
    ) -> Result<ApiOutcome<CheckRun>, ApiError> {
        let op = "create_check_run";
        let url = format!("{}/repos/{}/{}/check-runs", self.base, repo.owner, repo.repo);
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|source| ApiError::Transport { op, source })?;
        self.read_outcome(op, response).await
    }

    /// `PATCH /repos/{owner}/{repo}/check-runs/{id}`.
    pub async fn update_check_run(
        &self,
        token: &str,
        repo: &RepoId,
        id: CheckRunId,
        body: &UpdateCheckRun,
    ) -> Result<ApiOutcome<CheckRun>, ApiError> {
        let op = "update_check_run";
        let url = format!(
            "{}/repos/{}/{}/check-runs/{}",
            self.base, repo.owner, repo.repo, id
        );
        let response = self
            .http
            .patch(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|source| ApiError::Transport { op, source })?;
        self.read_outcome(op, response).await
    }

    /// Classifies a response and decodes the payload on success.
    async fn read_outcome<T: DeserializeOwned>(
        &self,
        op: &'static str,
        response: Response,
    ) -> Result<ApiOutcome<T>, ApiError> {
        let status = response.status();
        if status.is_success() {
            let payload = response
                .json()
                .await
                .map_err(|source| ApiError::Decode { op, source })?;
            return Ok(ApiOutcome::Success(payload));
        }

        let body = response.text().await.unwrap_or_default();
        debug!(op, status = status.as_u16(), body = %body, "GitHub API error response");

        classify_status(status, &body)
            .and_then(ApiOutcome::cast)
            .ok_or(ApiError::UnexpectedStatus {
                op,
                status: status.as_u16(),
            })
    }
}
