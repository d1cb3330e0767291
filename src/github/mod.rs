//! GitHub REST API client.
//!
//! Three check-run operations plus the installation-token exchange, each
//! attaching a caller-supplied bearer token. Responses are classified into
//! typed outcomes ([`rest::ApiOutcome`]) so callers can apply policy (retry,
//! token invalidation, give up) without inspecting status codes themselves.

pub mod rest;
pub mod retry;
pub mod wire;

pub use rest::{ApiError, ApiOutcome, RestClient};
pub use retry::{Retryable, RetryConfig, retry_with_backoff};
