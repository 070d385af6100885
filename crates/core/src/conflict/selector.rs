//! Strategy selection for individual conflict regions.
//!
//! Cheap structural checks run first; only when none applies does the
//! selector fall through to the file-type based choice between semantic and
//! structural merging.

use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::parser::ConflictRegion;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How a conflict region is resolved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Let the selector decide per region.
    Auto,
    /// Keep the current branch's side.
    Ours,
    /// Keep the incoming branch's side.
    Theirs,
    /// Line-set union of both sides.
    StructuralMerge,
    /// Model-assisted merge with structural fallback.
    SemanticMerge,
}

impl MergeStrategy {
    /// Every strategy a user may pick.
    pub const ALL: [MergeStrategy; 5] = [
        Self::Auto,
        Self::Ours,
        Self::Theirs,
        Self::StructuralMerge,
        Self::SemanticMerge,
    ];

    /// Whether this is a strategy the executor can apply directly.
    pub fn is_concrete(self) -> bool {
        !matches!(self, Self::Auto)
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Ours => write!(f, "ours"),
            Self::Theirs => write!(f, "theirs"),
            Self::StructuralMerge => write!(f, "structural_merge"),
            Self::SemanticMerge => write!(f, "semantic_merge"),
        }
    }
}

/// Returned when a strategy name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown merge strategy '{0}' (expected auto, ours, theirs, structural, semantic)")]
pub struct UnknownStrategy(pub String);

impl FromStr for MergeStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "auto" => Ok(Self::Auto),
            "ours" => Ok(Self::Ours),
            "theirs" => Ok(Self::Theirs),
            "structural" | "structural_merge" => Ok(Self::StructuralMerge),
            "semantic" | "semantic_merge" => Ok(Self::SemanticMerge),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

/// Default set of extensions treated as source code.
pub const DEFAULT_SOURCE_EXTENSIONS: &[&str] = &[
    "c", "cc", "cpp", "cs", "go", "h", "hpp", "java", "js", "jsx", "kt", "php", "py", "rb", "rs",
    "scala", "swift", "ts", "tsx",
];

/// Derive the file-type hint for a path: its lower-cased extension.
pub fn file_type_hint(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// Pure, deterministic strategy selector.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    source_extensions: BTreeSet<String>,
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE_EXTENSIONS.iter().copied())
    }
}

impl StrategySelector {
    /// Create a selector recognizing the given source-code extensions.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            source_extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Whether `hint` names a known source-code file type.
    pub fn is_source(&self, hint: &str) -> bool {
        self.source_extensions
            .contains(&hint.trim_start_matches('.').to_ascii_lowercase())
    }

    /// Pick a concrete strategy for `region`. Never returns `Auto`.
    pub fn select(&self, region: &ConflictRegion, file_type_hint: &str) -> MergeStrategy {
        let strategy = self.decide(&region.ours, &region.theirs, file_type_hint);
        debug!(
            start_line = region.start_line,
            hint = file_type_hint,
            strategy = %strategy,
            "selected strategy"
        );
        strategy
    }

    fn decide(&self, ours: &str, theirs: &str, hint: &str) -> MergeStrategy {
        if ours.trim() == theirs.trim() {
            return MergeStrategy::Ours;
        }

        // Exact substring containment, whitespace included.
        if ours.contains(theirs) {
            return MergeStrategy::Ours;
        }
        if theirs.contains(ours) {
            return MergeStrategy::Theirs;
        }

        let ours_lines = line_count(ours);
        let theirs_lines = line_count(theirs);
        if ours_lines > theirs_lines * 2 {
            return MergeStrategy::Ours;
        }
        if theirs_lines > ours_lines * 2 {
            return MergeStrategy::Theirs;
        }

        if self.is_source(hint) {
            MergeStrategy::SemanticMerge
        } else {
            MergeStrategy::StructuralMerge
        }
    }
}

/// Number of `\n`-separated segments; an empty string counts as one line.
fn line_count(s: &str) -> usize {
    s.split('\n').count()
}
