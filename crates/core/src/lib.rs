//! mergemend core library.
//!
//! This crate provides the building blocks for resolving git merge
//! conflicts: conflict-marker parsing, per-region strategy selection, merge
//! execution (with an optional text-completion service for semantic merges),
//! a reviewable proposal lifecycle, and batch orchestration over a
//! repository.

pub mod completion;
pub mod config;
pub mod conflict;
pub mod errors;
pub mod orchestrator;
pub mod vcs;

// Re-exports for convenience.
pub use completion::{CompletionService, HttpCompletionClient};
pub use config::AppConfig;
pub use conflict::{MergeExecutor, MergeStrategy, ProposalManager, StrategySelector};
pub use orchestrator::{BatchOrchestrator, CancellationFlag};
pub use vcs::{GitRepository, VcsAdapter};
