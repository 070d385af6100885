//! Per-file resolution proposals and their review lifecycle.
//!
//! Each conflicted file gets one [`ResolutionProposal`]. A proposal starts
//! as a draft, may be approved, and leaves the active set only when the
//! orchestrator has written and staged it. Any change to the proposed
//! content drops an approval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::merger::MergeExecutor;
use super::parser::{contains_marker_line, splice_resolutions, ConflictParser, ConflictRegion};
use super::selector::{file_type_hint, MergeStrategy, StrategySelector};
use crate::errors::ProposalError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The reviewable resolution of one conflicted file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionProposal {
    /// Unique proposal ID.
    pub id: String,
    /// Absolute path of the file.
    pub file_path: String,
    /// Path relative to the repository working directory.
    pub relative_path: String,
    /// Number of conflict regions when the proposal was created.
    pub conflict_count: usize,
    pub original_content: String,
    pub proposed_content: String,
    /// Strategy requested for the whole file.
    pub strategy: MergeStrategy,
    /// Strategy that actually produced each region, in document order.
    /// Empty after a manual edit.
    pub region_strategies: Vec<MergeStrategy>,
    /// Regions where a semantic merge fell back to structural.
    #[serde(default)]
    pub fallbacks: usize,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResolutionProposal {
    /// Unified diff of the original (conflicted) text against the proposal.
    pub fn diff(&self) -> String {
        diffy::create_patch(&self.original_content, &self.proposed_content).to_string()
    }

    /// Whether the proposed content still has any conflict-marker line,
    /// including fragments of a block.
    pub fn has_residual_markers(&self) -> bool {
        contains_marker_line(&self.proposed_content)
    }

    /// Whether the content was replaced by hand rather than resolved per
    /// region.
    pub fn is_manual_edit(&self) -> bool {
        self.region_strategies.is_empty()
    }

    /// Whether any region needed the structural fallback of a semantic
    /// request.
    pub fn used_fallback(&self) -> bool {
        self.fallbacks > 0
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Resolved text for a whole file.
struct FileResolution {
    content: String,
    region_strategies: Vec<MergeStrategy>,
    fallbacks: usize,
    conflict_count: usize,
}

type ChangeListener = Box<dyn Fn(&[ResolutionProposal]) + Send + Sync>;

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Owns the active proposals. All mutation goes through its methods.
pub struct ProposalManager {
    proposals: Vec<ResolutionProposal>,
    selector: StrategySelector,
    executor: MergeExecutor,
    listener: Option<ChangeListener>,
}

impl ProposalManager {
    pub fn new(selector: StrategySelector, executor: MergeExecutor) -> Self {
        Self {
            proposals: Vec::new(),
            selector,
            executor,
            listener: None,
        }
    }

    /// Register a callback that receives the full proposal list after every
    /// mutation.
    pub fn set_listener<F>(&mut self, listener: F)
    where
        F: Fn(&[ResolutionProposal]) + Send + Sync + 'static,
    {
        self.listener = Some(Box::new(listener));
    }

    fn notify(&self) {
        if let Some(ref listener) = self.listener {
            listener(&self.proposals);
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn proposals(&self) -> &[ResolutionProposal] {
        &self.proposals
    }

    pub fn get(&self, id: &str) -> Option<&ResolutionProposal> {
        self.proposals.iter().find(|p| p.id == id)
    }

    pub fn find_by_path(&self, relative_path: &str) -> Option<&ResolutionProposal> {
        self.proposals.iter().find(|p| p.relative_path == relative_path)
    }

    pub fn approved(&self) -> Vec<&ResolutionProposal> {
        self.proposals.iter().filter(|p| p.approved).collect()
    }

    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    fn index_of(&self, id: &str) -> Result<usize, ProposalError> {
        self.proposals
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| ProposalError::NotFound(id.to_string()))
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Parse `content`, resolve every region, and create (or refresh) the
    /// proposal for this file.
    ///
    /// Regions are resolved with the selector's choice; the proposal is
    /// labelled `SemanticMerge`. Returns the proposal ID, or `None` when the
    /// file has no conflict regions or resolution left it unchanged.
    pub async fn create_or_update_proposal(
        &mut self,
        file_path: &str,
        relative_path: &str,
        content: &str,
    ) -> Option<String> {
        let set = ConflictParser::parse(relative_path, content);
        if set.is_empty() {
            debug!(path = relative_path, "no conflict regions, no proposal");
            if let Some(pos) = self.proposals.iter().position(|p| p.relative_path == relative_path) {
                self.proposals.remove(pos);
                self.notify();
            }
            return None;
        }

        let resolution = self
            .resolve_regions(relative_path, content, &set.regions, MergeStrategy::Auto)
            .await;
        if resolution.content == content {
            info!(path = relative_path, "resolution left file unchanged, no proposal");
            return None;
        }

        let now = Utc::now();
        let id = match self.proposals.iter_mut().find(|p| p.relative_path == relative_path) {
            Some(existing) => {
                existing.file_path = file_path.to_string();
                existing.conflict_count = resolution.conflict_count;
                existing.original_content = content.to_string();
                existing.proposed_content = resolution.content;
                existing.strategy = MergeStrategy::SemanticMerge;
                existing.region_strategies = resolution.region_strategies;
                existing.fallbacks = resolution.fallbacks;
                existing.approved = false;
                existing.touch();
                info!(id = %existing.id, path = relative_path, "proposal refreshed");
                existing.id.clone()
            }
            None => {
                let proposal = ResolutionProposal {
                    id: Uuid::new_v4().to_string(),
                    file_path: file_path.to_string(),
                    relative_path: relative_path.to_string(),
                    conflict_count: resolution.conflict_count,
                    original_content: content.to_string(),
                    proposed_content: resolution.content,
                    strategy: MergeStrategy::SemanticMerge,
                    region_strategies: resolution.region_strategies,
                    fallbacks: resolution.fallbacks,
                    approved: false,
                    created_at: now,
                    updated_at: now,
                };
                info!(
                    id = %proposal.id,
                    path = relative_path,
                    regions = proposal.conflict_count,
                    "proposal created"
                );
                let id = proposal.id.clone();
                self.proposals.push(proposal);
                id
            }
        };

        self.notify();
        Some(id)
    }

    pub fn approve(&mut self, id: &str) -> Result<(), ProposalError> {
        let idx = self.index_of(id)?;
        let proposal = &mut self.proposals[idx];
        if proposal.has_residual_markers() {
            warn!(id, path = %proposal.relative_path, "approving proposal that still has conflict markers");
        }
        proposal.approved = true;
        info!(id, path = %proposal.relative_path, "proposal approved");
        self.notify();
        Ok(())
    }

    pub fn reject(&mut self, id: &str) -> Result<(), ProposalError> {
        let idx = self.index_of(id)?;
        let proposal = &mut self.proposals[idx];
        proposal.approved = false;
        info!(id, path = %proposal.relative_path, "proposal rejected");
        self.notify();
        Ok(())
    }

    /// Approve every active proposal. Returns how many were approved.
    pub fn approve_all(&mut self) -> usize {
        for proposal in &mut self.proposals {
            proposal.approved = true;
        }
        info!(count = self.proposals.len(), "all proposals approved");
        self.notify();
        self.proposals.len()
    }

    /// Re-resolve every region of the file with `strategy` and reset the
    /// approval.
    ///
    /// `Auto` re-runs the selector for each region.
    pub async fn change_strategy(
        &mut self,
        id: &str,
        strategy: MergeStrategy,
    ) -> Result<(), ProposalError> {
        let idx = self.index_of(id)?;
        let relative_path = self.proposals[idx].relative_path.clone();
        let original = self.proposals[idx].original_content.clone();

        let set = ConflictParser::parse(&relative_path, &original);
        let resolution = self
            .resolve_regions(&relative_path, &original, &set.regions, strategy)
            .await;

        let proposal = &mut self.proposals[idx];
        proposal.proposed_content = resolution.content;
        proposal.region_strategies = resolution.region_strategies;
        proposal.fallbacks = resolution.fallbacks;
        proposal.strategy = strategy;
        proposal.approved = false;
        proposal.touch();
        info!(id, path = %relative_path, strategy = %strategy, "proposal strategy changed");

        self.notify();
        Ok(())
    }

    /// Ask for a fresh semantic merge of every region.
    pub async fn regenerate(&mut self, id: &str) -> Result<(), ProposalError> {
        self.change_strategy(id, MergeStrategy::SemanticMerge).await
    }

    /// Replace the proposed content with a manual edit.
    pub fn edit_content(&mut self, id: &str, text: impl Into<String>) -> Result<(), ProposalError> {
        let idx = self.index_of(id)?;
        let proposal = &mut self.proposals[idx];
        proposal.proposed_content = text.into();
        proposal.region_strategies.clear();
        proposal.fallbacks = 0;
        proposal.strategy = MergeStrategy::SemanticMerge;
        proposal.approved = false;
        proposal.touch();
        info!(id, path = %proposal.relative_path, "proposal edited manually");
        self.notify();
        Ok(())
    }

    /// Drop proposals that the orchestrator has written and staged.
    pub(crate) fn remove_applied(&mut self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        self.proposals.retain(|p| !ids.contains(&p.id));
        debug!(count = ids.len(), remaining = self.proposals.len(), "applied proposals removed");
        self.notify();
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Resolve each region in order and splice the results into `content`.
    ///
    /// Regions are resolved one at a time. An unsuccessful outcome leaves
    /// that region's block in place.
    async fn resolve_regions(
        &self,
        relative_path: &str,
        content: &str,
        regions: &[ConflictRegion],
        strategy: MergeStrategy,
    ) -> FileResolution {
        let hint = file_type_hint(relative_path);
        let mut texts: Vec<Option<String>> = Vec::with_capacity(regions.len());
        let mut region_strategies = Vec::with_capacity(regions.len());
        let mut fallbacks = 0;

        for region in regions {
            let concrete = if strategy.is_concrete() {
                strategy
            } else {
                self.selector.select(region, &hint)
            };
            let outcome = self.executor.apply(region, concrete, &hint).await;
            if let Some(ref message) = outcome.message {
                debug!(path = relative_path, start_line = region.start_line, %message, "merge note");
            }
            if outcome.success {
                let applied = outcome.applied.unwrap_or(concrete);
                if concrete == MergeStrategy::SemanticMerge && applied != concrete {
                    fallbacks += 1;
                }
                region_strategies.push(applied);
                texts.push(outcome.resolved_text);
            } else {
                warn!(
                    path = relative_path,
                    start_line = region.start_line,
                    strategy = %concrete,
                    "region left unresolved"
                );
                region_strategies.push(concrete);
                texts.push(None);
            }
        }

        let pairs: Vec<(&ConflictRegion, Option<&str>)> = regions
            .iter()
            .zip(texts.iter().map(|t| t.as_deref()))
            .collect();

        FileResolution {
            content: splice_resolutions(content, &pairs),
            region_strategies,
            fallbacks,
            conflict_count: regions.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const PY_CONFLICT: &str = "import os\n<<<<<<< HEAD\na = 1\nb = 2\n=======\na = 1\nc = 3\n>>>>>>> feature\nprint(a)\n";

    fn manager() -> ProposalManager {
        ProposalManager::new(StrategySelector::default(), MergeExecutor::new())
    }

    async fn with_proposal() -> (ProposalManager, String) {
        let mut m = manager();
        let id = m
            .create_or_update_proposal("/repo/app.py", "app.py", PY_CONFLICT)
            .await
            .expect("proposal expected");
        (m, id)
    }

    #[tokio::test]
    async fn test_no_markers_no_proposal() {
        let mut m = manager();
        let id = m
            .create_or_update_proposal("/repo/a.py", "a.py", "print('hi')\n")
            .await;
        assert!(id.is_none());
        assert!(m.is_empty());
    }

    #[tokio::test]
    async fn test_semantic_unavailable_uses_structural_content() {
        let (m, id) = with_proposal().await;
        let p = m.get(&id).unwrap();
        assert_eq!(p.strategy, MergeStrategy::SemanticMerge);
        assert_eq!(p.conflict_count, 1);
        assert_eq!(p.proposed_content, "import os\na = 1\nb = 2\nc = 3\nprint(a)\n");
        assert_eq!(p.region_strategies, vec![MergeStrategy::StructuralMerge]);
        assert!(p.used_fallback());
        assert!(!p.has_residual_markers());
        assert!(!p.approved);
    }

    #[tokio::test]
    async fn test_approve_and_reject() {
        let (mut m, id) = with_proposal().await;
        m.approve(&id).unwrap();
        assert!(m.get(&id).unwrap().approved);
        assert_eq!(m.approved().len(), 1);
        m.reject(&id).unwrap();
        assert!(!m.get(&id).unwrap().approved);
        assert!(matches!(m.approve("missing"), Err(ProposalError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_content_changes_reset_approval() {
        let (mut m, id) = with_proposal().await;

        m.approve(&id).unwrap();
        m.change_strategy(&id, MergeStrategy::Theirs).await.unwrap();
        let p = m.get(&id).unwrap();
        assert!(!p.approved);
        assert_eq!(p.strategy, MergeStrategy::Theirs);
        assert_eq!(p.proposed_content, "import os\na = 1\nc = 3\nprint(a)\n");
        assert!(!p.used_fallback());

        m.approve(&id).unwrap();
        m.regenerate(&id).await.unwrap();
        assert!(!m.get(&id).unwrap().approved);
        assert_eq!(m.get(&id).unwrap().strategy, MergeStrategy::SemanticMerge);

        m.approve(&id).unwrap();
        m.edit_content(&id, "import os\nprint('manual')\n").unwrap();
        let p = m.get(&id).unwrap();
        assert!(!p.approved);
        assert_eq!(p.proposed_content, "import os\nprint('manual')\n");
        assert_eq!(p.strategy, MergeStrategy::SemanticMerge);
        assert!(p.is_manual_edit());
        assert!(p.region_strategies.is_empty());
    }

    #[tokio::test]
    async fn test_half_block_edit_reports_residual_markers() {
        let (mut m, id) = with_proposal().await;
        assert!(!m.get(&id).unwrap().has_residual_markers());

        // Separator removed by hand; the rest of the block survives.
        m.edit_content(&id, "<<<<<<< HEAD\nx\ny\n>>>>>>> b\n").unwrap();
        assert!(m.get(&id).unwrap().has_residual_markers());

        m.edit_content(&id, "x\n=======\ny\n").unwrap();
        assert!(m.get(&id).unwrap().has_residual_markers());

        m.edit_content(&id, "x\ny\n").unwrap();
        assert!(!m.get(&id).unwrap().has_residual_markers());
    }

    #[tokio::test]
    async fn test_malformed_block_stays_visible_in_proposal() {
        let content = "<<<<<<< HEAD\nno separator here\n>>>>>>> topic\nmid\n<<<<<<< HEAD\nx\n=======\nx\ny\n>>>>>>> b\n";
        let mut m = manager();
        let id = m
            .create_or_update_proposal("/repo/f.txt", "f.txt", content)
            .await
            .expect("proposal expected");
        let p = m.get(&id).unwrap();
        assert_eq!(p.conflict_count, 1);
        assert_eq!(
            p.proposed_content,
            "<<<<<<< HEAD\nno separator here\n>>>>>>> topic\nmid\nx\ny\n"
        );
        assert!(p.has_residual_markers());
    }

    #[tokio::test]
    async fn test_change_strategy_to_auto_uses_selector() {
        let (mut m, id) = with_proposal().await;
        m.change_strategy(&id, MergeStrategy::Ours).await.unwrap();
        m.change_strategy(&id, MergeStrategy::Auto).await.unwrap();
        let p = m.get(&id).unwrap();
        assert_eq!(p.strategy, MergeStrategy::Auto);
        assert!(p.region_strategies.iter().all(|s| s.is_concrete()));
        assert!(!p.has_residual_markers());
    }

    #[tokio::test]
    async fn test_update_keeps_id_and_resets_approval() {
        let (mut m, id) = with_proposal().await;
        m.approve(&id).unwrap();
        let again = m
            .create_or_update_proposal("/repo/app.py", "app.py", PY_CONFLICT)
            .await
            .unwrap();
        assert_eq!(again, id);
        assert_eq!(m.len(), 1);
        assert!(!m.get(&id).unwrap().approved);
    }

    #[tokio::test]
    async fn test_resolved_file_drops_stale_proposal() {
        let (mut m, _id) = with_proposal().await;
        let none = m
            .create_or_update_proposal("/repo/app.py", "app.py", "import os\n")
            .await;
        assert!(none.is_none());
        assert!(m.find_by_path("app.py").is_none());
    }

    #[tokio::test]
    async fn test_multiple_regions_each_resolved() {
        let content = "<<<<<<< HEAD\nsame\n=======\nsame\n>>>>>>> b\nmid\n<<<<<<< HEAD\nx\n=======\nx\ny\n>>>>>>> b\n";
        let mut m = manager();
        let id = m
            .create_or_update_proposal("/r/notes.txt", "notes.txt", content)
            .await
            .unwrap();
        let p = m.get(&id).unwrap();
        assert_eq!(p.conflict_count, 2);
        assert_eq!(p.region_strategies, vec![MergeStrategy::Ours, MergeStrategy::Theirs]);
        assert_eq!(p.proposed_content, "same\nmid\nx\ny\n");
    }

    #[tokio::test]
    async fn test_listener_sees_every_mutation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mut m = manager();
        m.set_listener(move |list| {
            assert!(list.len() <= 1);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let id = m
            .create_or_update_proposal("/repo/app.py", "app.py", PY_CONFLICT)
            .await
            .unwrap();
        m.approve(&id).unwrap();
        m.reject(&id).unwrap();
        m.approve_all();
        m.edit_content(&id, "x").unwrap();
        m.remove_applied(&[id]);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert!(m.is_empty());
    }

    #[tokio::test]
    async fn test_diff_shows_removed_markers() {
        let (m, id) = with_proposal().await;
        let diff = m.get(&id).unwrap().diff();
        assert!(diff.contains("-<<<<<<< HEAD"));
        assert!(diff.contains("+c = 3"));
    }
}
