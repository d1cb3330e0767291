//! Webhook ingestion: signature verification and payload decoding.
//!
//! The HTTP surface itself lives in [`crate::server`]; this module holds the
//! pieces with no HTTP dependency so they can be tested in isolation.

pub mod events;
pub mod parser;
pub mod signature;

pub use events::{CheckRunEvent, PrAction, PullRequestEvent, WebhookEvent};
pub use parser::{DecodeError, parse_event};
pub use signature::{
    compute_signature, format_signature_header, parse_signature_header, verify_signature,
};
