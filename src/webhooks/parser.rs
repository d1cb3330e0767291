//! Webhook payload decoding.
//!
//! The payload schema is selected by the `X-GitHub-Event` header, not by
//! sniffing the body. Payload structs here mirror only the fields the bot
//! consumes; GitHub's envelopes carry far more.

use serde::Deserialize;
use thiserror::Error;

use crate::github::wire::CheckRun;
use crate::types::{InstallationId, RepoId, Sha};

use super::events::{CheckRunAction, CheckRunEvent, PrAction, PullRequestEvent, WebhookEvent};

/// A payload that could not be decoded against its event type's schema.
#[derive(Debug, Error)]
#[error("malformed {event_type} payload: {source}")]
pub struct DecodeError {
    pub event_type: String,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    name: String,
    owner: RawOwner,
}

#[derive(Debug, Deserialize)]
struct RawOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawInstallation {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RawHead {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    head: RawHead,
}

#[derive(Debug, Deserialize)]
struct RawPullRequestEvent {
    action: PrAction,
    number: u64,
    pull_request: RawPullRequest,
    repository: RawRepository,
    installation: Option<RawInstallation>,
}

#[derive(Debug, Deserialize)]
struct RawCheckRunEvent {
    action: CheckRunAction,
    check_run: CheckRun,
    repository: RawRepository,
    installation: Option<RawInstallation>,
}

fn repo_id(raw: RawRepository) -> RepoId {
    RepoId::new(raw.owner.login, raw.name)
}

fn installation_id(raw: Option<RawInstallation>) -> Option<InstallationId> {
    raw.map(|i| InstallationId(i.id))
}

/// Decodes a webhook body against the schema named by the event-type header.
///
/// Unsupported event types decode to [`WebhookEvent::Unknown`]; only a body
/// that fails its schema is an error.
pub fn parse_event(event_type: &str, body: &[u8]) -> Result<WebhookEvent, DecodeError> {
    let malformed = |source| DecodeError {
        event_type: event_type.to_string(),
        source,
    };

    match event_type {
        "pull_request" => {
            let raw: RawPullRequestEvent = serde_json::from_slice(body).map_err(malformed)?;
            Ok(WebhookEvent::PullRequest(PullRequestEvent {
                repo: repo_id(raw.repository),
                installation: installation_id(raw.installation),
                action: raw.action,
                number: raw.number,
                head_sha: Sha::new(raw.pull_request.head.sha),
            }))
        }
        "check_run" => {
            let raw: RawCheckRunEvent = serde_json::from_slice(body).map_err(malformed)?;
            Ok(WebhookEvent::CheckRun(CheckRunEvent {
                repo: repo_id(raw.repository),
                installation: installation_id(raw.installation),
                action: raw.action,
                check_run: raw.check_run,
            }))
        }
        other => Ok(WebhookEvent::Unknown {
            event_type: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pr_body(action: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "action": action,
            "number": 42,
            "pull_request": {
                "head": { "sha": "a".repeat(40) }
            },
            "repository": {
                "name": "hello-world",
                "owner": { "login": "octocat" }
            },
            "installation": { "id": 123 }
        }))
        .unwrap()
    }

    fn check_run_body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "action": "completed",
            "check_run": {
                "id": 777,
                "name": "build",
                "head_sha": "b".repeat(40),
                "status": "completed",
                "conclusion": "success"
            },
            "repository": {
                "name": "hello-world",
                "owner": { "login": "octocat" }
            },
            "installation": { "id": 123 }
        }))
        .unwrap()
    }

    #[test]
    fn parses_pull_request_event() {
        let event = parse_event("pull_request", &pr_body("opened")).unwrap();
        let WebhookEvent::PullRequest(pr) = event else {
            panic!("expected pull request event");
        };
        assert_eq!(pr.action, PrAction::Opened);
        assert_eq!(pr.number, 42);
        assert_eq!(pr.repo, RepoId::new("octocat", "hello-world"));
        assert_eq!(pr.installation, Some(InstallationId(123)));
        assert_eq!(pr.head_sha.as_str(), "a".repeat(40));
    }

    #[test]
    fn parses_check_run_event() {
        let event = parse_event("check_run", &check_run_body()).unwrap();
        let WebhookEvent::CheckRun(cr) = event else {
            panic!("expected check run event");
        };
        assert_eq!(cr.action, CheckRunAction::Completed);
        assert_eq!(cr.check_run.name, "build");
        assert_eq!(cr.check_run.conclusion.as_deref(), Some("success"));
        assert_eq!(cr.installation, Some(InstallationId(123)));
    }

    #[test]
    fn unsupported_event_type_is_unknown_not_error() {
        let event = parse_event("workflow_dispatch", b"{\"anything\": true}").unwrap();
        assert_eq!(
            event,
            WebhookEvent::Unknown {
                event_type: "workflow_dispatch".to_string()
            }
        );
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let err = parse_event("pull_request", b"{not json").unwrap_err();
        assert_eq!(err.event_type, "pull_request");
    }

    #[test]
    fn schema_mismatch_is_a_decode_error() {
        // Valid JSON, but missing the pull_request object.
        let body = serde_json::to_vec(&json!({
            "action": "opened",
            "number": 1,
            "repository": { "name": "r", "owner": { "login": "o" } }
        }))
        .unwrap();
        assert!(parse_event("pull_request", &body).is_err());
    }

    #[test]
    fn missing_installation_is_tolerated() {
        let body = serde_json::to_vec(&json!({
            "action": "opened",
            "number": 7,
            "pull_request": { "head": { "sha": "c".repeat(40) } },
            "repository": { "name": "r", "owner": { "login": "o" } }
        }))
        .unwrap();
        let event = parse_event("pull_request", &body).unwrap();
        assert_eq!(event.installation(), None);
    }

    #[test]
    fn unknown_pr_action_decodes_to_other() {
        let event = parse_event("pull_request", &pr_body("locked")).unwrap();
        let WebhookEvent::PullRequest(pr) = event else {
            panic!("expected pull request event");
        };
        assert_eq!(pr.action, PrAction::Other);
    }
}
