//! Merge executor.
//!
//! Applies a concrete [`MergeStrategy`] to a single [`ConflictRegion`].
//! Semantic merges go through a [`CompletionService`]; any failure there
//! degrades to a structural merge instead of failing the region.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::parser::{contains_marker_line, ConflictRegion};
use super::selector::MergeStrategy;
use crate::completion::CompletionService;

/// The result of applying a strategy to one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub success: bool,
    /// Replacement text for the region's block. `None` when unsuccessful.
    pub resolved_text: Option<String>,
    /// Diagnostic for failures and fallbacks.
    pub message: Option<String>,
    /// Strategy that actually produced the text (differs from the requested
    /// one after a semantic fallback).
    pub applied: Option<MergeStrategy>,
}

impl MergeOutcome {
    fn resolved(text: String, applied: MergeStrategy) -> Self {
        Self {
            success: true,
            resolved_text: Some(text),
            message: None,
            applied: Some(applied),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            resolved_text: None,
            message: Some(message.into()),
            applied: None,
        }
    }
}

/// Applies strategies to conflict regions.
#[derive(Clone, Default)]
pub struct MergeExecutor {
    completion: Option<Arc<dyn CompletionService>>,
    semantic_timeout: Option<Duration>,
}

impl MergeExecutor {
    /// An executor without a completion service; semantic merges always
    /// take the structural fallback.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_completion(completion: Arc<dyn CompletionService>) -> Self {
        Self {
            completion: Some(completion),
            semantic_timeout: None,
        }
    }

    /// Upper bound on a single semantic-merge call, on top of whatever the
    /// completion service enforces itself.
    pub fn semantic_timeout(mut self, timeout: Duration) -> Self {
        self.semantic_timeout = Some(timeout);
        self
    }

    pub fn has_completion(&self) -> bool {
        self.completion.is_some()
    }

    /// Resolve `region` with `strategy`.
    ///
    /// `Auto` must be turned into a concrete strategy by the selector first;
    /// passing it here is the one hard failure.
    pub async fn apply(
        &self,
        region: &ConflictRegion,
        strategy: MergeStrategy,
        file_type_hint: &str,
    ) -> MergeOutcome {
        match strategy {
            MergeStrategy::Ours => MergeOutcome::resolved(region.ours.clone(), strategy),
            MergeStrategy::Theirs => MergeOutcome::resolved(region.theirs.clone(), strategy),
            MergeStrategy::StructuralMerge => {
                MergeOutcome::resolved(structural_merge(&region.ours, &region.theirs), strategy)
            }
            MergeStrategy::SemanticMerge => self.semantic_merge(region, file_type_hint).await,
            MergeStrategy::Auto => {
                warn!(start_line = region.start_line, "unresolved strategy passed to executor");
                MergeOutcome::failed("strategy 'auto' must be resolved before it can be applied")
            }
        }
    }

    async fn semantic_merge(&self, region: &ConflictRegion, file_type_hint: &str) -> MergeOutcome {
        match self.try_semantic(region, file_type_hint).await {
            Ok(text) => {
                debug!(start_line = region.start_line, "semantic merge succeeded");
                MergeOutcome::resolved(text, MergeStrategy::SemanticMerge)
            }
            Err(reason) => {
                info!(
                    start_line = region.start_line,
                    reason = %reason,
                    "semantic merge failed, falling back to structural merge"
                );
                let mut outcome = MergeOutcome::resolved(
                    structural_merge(&region.ours, &region.theirs),
                    MergeStrategy::StructuralMerge,
                );
                outcome.message = Some(format!("semantic merge fell back to structural: {reason}"));
                outcome
            }
        }
    }

    async fn try_semantic(&self, region: &ConflictRegion, file_type_hint: &str) -> Result<String, String> {
        let completion = self
            .completion
            .as_ref()
            .ok_or_else(|| "no completion service configured".to_string())?;

        let prompt = build_semantic_prompt(region, file_type_hint);
        let call = completion.complete(&prompt);
        let response = match self.semantic_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| format!("timed out after {}s", limit.as_secs_f32()))?,
            None => call.await,
        }
        .map_err(|e| e.to_string())?;

        let merged = extract_code_block(&response);
        if merged.trim().is_empty() {
            return Err("empty response".into());
        }
        if contains_marker_line(&merged) {
            return Err("response still contains conflict markers".into());
        }
        Ok(merged)
    }
}

// ---------------------------------------------------------------------------
// Structural merge
// ---------------------------------------------------------------------------

/// Line-set union: common lines, then ours-only, then theirs-only, each in
/// original relative order.
///
/// Output keeps `\r\n` endings when either side uses them.
pub fn structural_merge(ours: &str, theirs: &str) -> String {
    let ours_lines: Vec<&str> = ours.lines().collect();
    let theirs_lines: Vec<&str> = theirs.lines().collect();
    let ours_set: HashSet<&str> = ours_lines.iter().copied().collect();
    let theirs_set: HashSet<&str> = theirs_lines.iter().copied().collect();

    let common = ours_lines.iter().filter(|l| theirs_set.contains(*l));
    let ours_only = ours_lines.iter().filter(|l| !theirs_set.contains(*l));
    let theirs_only = theirs_lines.iter().filter(|l| !ours_set.contains(*l));

    let merged: Vec<&str> = common.chain(ours_only).chain(theirs_only).copied().collect();

    let newline = if ours.contains("\r\n") || theirs.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    };
    merged.join(newline)
}

// ---------------------------------------------------------------------------
// Semantic merge helpers
// ---------------------------------------------------------------------------

/// Build the single request sent to the completion service.
pub fn build_semantic_prompt(region: &ConflictRegion, file_type_hint: &str) -> String {
    let lang = if file_type_hint.is_empty() { "text" } else { file_type_hint };
    format!(
        "Resolve the following merge conflict in a .{lang} file.\n\
         The current branch (HEAD) and the incoming branch ({label}) both changed the same region.\n\
         Produce a single merged version that preserves the intent of both sides.\n\
         Return ONLY the merged code in one fenced code block. Do not include conflict markers \
         (<<<<<<<, =======, >>>>>>>) and do not add any explanation.\n\n\
         === HEAD (ours) ===\n```{lang}\n{ours}\n```\n\n\
         === {label} (theirs) ===\n```{lang}\n{theirs}\n```\n",
        lang = lang,
        label = if region.branch_label.is_empty() { "incoming" } else { region.branch_label.as_str() },
        ours = region.ours,
        theirs = region.theirs,
    )
}

fn code_fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[^\n]*\n(.*?)```").expect("code fence pattern is valid"))
}

/// The body of the first fenced code block, or the whole trimmed response
/// when there is none.
pub fn extract_code_block(response: &str) -> String {
    match code_fence_regex().captures(response).and_then(|c| c.get(1)) {
        Some(body) => {
            let body = body.as_str();
            let body = body.strip_suffix('\n').unwrap_or(body);
            body.strip_suffix('\r').unwrap_or(body).to_string()
        }
        None => response.trim().to_string(),
    }
}
