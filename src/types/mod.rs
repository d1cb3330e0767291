//! Core domain types for the merge guard bot.

mod check;
mod ids;

pub use check::{CheckConclusion, CheckRunRecord, CheckStatus};
pub use ids::{CheckRunId, CommitKey, DeliveryId, InstallationId, RepoId, Sha};
