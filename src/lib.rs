//! Merge Guard Bot - a GitHub App that stands in for an arbitrary set of CI checks.
//!
//! The bot owns one "merge guard" check run per pull request commit and completes
//! it only once every other check run on that commit has completed successfully.
//! Branch protection rules then only need to require the guard.

pub mod aggregator;
pub mod auth;
pub mod config;
pub mod github;
pub mod server;
pub mod types;
pub mod webhooks;
