//! The check aggregation engine.
//!
//! One [`entry::AggregateEntry`] per (repository, commit) pair holds every
//! check run observed on that commit and derives the guard's decision. Entries
//! are owned by per-commit [`worker::CommitWorker`] tasks - exactly one writer
//! per commit - and the [`dispatch::Dispatcher`] routes decoded webhook events
//! onto the owning worker's inbox.

pub mod dispatch;
pub mod entry;
pub mod worker;

pub use dispatch::{AggregatorConfig, Dispatcher};
pub use entry::{AggregateDecision, AggregateEntry, EntryPhase};
pub use worker::{CheckRunApi, CommitMessage, CommitWorker, GithubCheckRunApi, GuardApiError};
