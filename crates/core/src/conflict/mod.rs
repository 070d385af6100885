//! Conflict parsing, strategy selection, merging, and proposal management.
//!
//! The conflict subsystem is responsible for:
//! 1. **Parsing** -- locating git conflict-marker blocks in file content.
//! 2. **Selection** -- picking a merge strategy for each block.
//! 3. **Merging** -- producing resolved text for a block under a strategy.
//! 4. **Proposals** -- holding per-file resolutions until they are reviewed.

pub mod merger;
pub mod parser;
pub mod proposal;
pub mod selector;

pub use merger::{structural_merge, MergeExecutor, MergeOutcome};
pub use parser::{contains_marker_line, splice_resolutions, ConflictParser, ConflictRegion, FileConflictSet};
pub use proposal::{ProposalManager, ResolutionProposal};
pub use selector::{file_type_hint, MergeStrategy, StrategySelector, UnknownStrategy};
