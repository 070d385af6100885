//! Batch orchestration of scans and applies.
//!
//! The [`BatchOrchestrator`] drives the parser, selector and executor over
//! every conflicted file, and later writes approved proposals back and
//! stages them:
//!
//! 1. Ask the VCS adapter which files are conflicted.
//! 2. For each file, in order: read it and let the proposal manager build a
//!    proposal.
//! 3. On apply, for each approved proposal: write the proposed content,
//!    stage the path, and retire the proposal.
//!
//! Files are processed one at a time. Cancellation is polled before each
//! file; work already done is kept.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::conflict::proposal::ProposalManager;
use crate::errors::OrchestratorError;
use crate::vcs::VcsAdapter;

// ---------------------------------------------------------------------------
// Cancellation & progress
// ---------------------------------------------------------------------------

/// Cooperative cancellation flag shared between the caller and a batch.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation so the next batch can run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Which batch a progress report belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    Scan,
    Apply,
}

impl std::fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scan => write!(f, "scan"),
            Self::Apply => write!(f, "apply"),
        }
    }
}

/// Reported after each file of a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProgress {
    pub phase: BatchPhase,
    /// 1-based index of the file just processed.
    pub current: usize,
    pub total: usize,
    pub path: String,
}

type ProgressCallback = Box<dyn Fn(&BatchProgress) + Send + Sync>;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Stage at which a single file failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Read,
    Write,
    Stage,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Stage => write!(f, "stage"),
        }
    }
}

/// One file that could not be processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: String,
    pub stage: FailureStage,
    pub error: String,
}

/// Outcome of [`BatchOrchestrator::scan_and_propose`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    /// Files the VCS adapter reported as conflicted.
    pub conflicted_files: usize,
    /// Proposals created or refreshed by this scan.
    pub proposals: usize,
    pub failures: Vec<FileFailure>,
    pub cancelled: bool,
}

impl ScanReport {
    pub fn no_conflicts(&self) -> bool {
        self.conflicted_files == 0
    }
}

/// Outcome of [`BatchOrchestrator::apply_approved`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Approved proposals at the start of the batch.
    pub approved: usize,
    /// Proposals written, staged and retired.
    pub applied: usize,
    pub failures: Vec<FileFailure>,
    pub cancelled: bool,
}

impl ApplyReport {
    pub fn nothing_to_apply(&self) -> bool {
        self.approved == 0
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct BatchOrchestrator {
    vcs: Arc<dyn VcsAdapter>,
    proposals: ProposalManager,
    cancel: CancellationFlag,
    progress: Option<ProgressCallback>,
}

impl BatchOrchestrator {
    pub fn new(vcs: Arc<dyn VcsAdapter>, proposals: ProposalManager) -> Self {
        info!(workdir = %vcs.workdir().display(), "initializing batch orchestrator");
        Self {
            vcs,
            proposals,
            cancel: CancellationFlag::new(),
            progress: None,
        }
    }

    /// Use an externally owned cancellation flag.
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn on_progress<F>(&mut self, callback: F)
    where
        F: Fn(&BatchProgress) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
    }

    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn proposals(&self) -> &ProposalManager {
        &self.proposals
    }

    /// Lifecycle actions (approve, reject, change strategy, ...) go through
    /// the manager.
    pub fn proposals_mut(&mut self) -> &mut ProposalManager {
        &mut self.proposals
    }

    fn report(&self, phase: BatchPhase, current: usize, total: usize, path: &str) {
        debug!(%phase, current, total, path, "batch progress");
        if let Some(ref callback) = self.progress {
            callback(&BatchProgress {
                phase,
                current,
                total,
                path: path.to_string(),
            });
        }
    }

    // -----------------------------------------------------------------------
    // Scan
    // -----------------------------------------------------------------------

    /// Build a proposal for every conflicted file.
    ///
    /// Only a failure to list conflicted files is an error; unreadable files
    /// are recorded in the report and skipped.
    pub async fn scan_and_propose(&mut self) -> Result<ScanReport, OrchestratorError> {
        let paths = self
            .vcs
            .list_conflicted_files()
            .await
            .map_err(OrchestratorError::ListFailed)?;

        let mut report = ScanReport {
            conflicted_files: paths.len(),
            ..Default::default()
        };
        if paths.is_empty() {
            info!("no conflicted files");
            return Ok(report);
        }

        info!(total = paths.len(), "scanning conflicted files");
        let total = paths.len();

        for (i, relative) in paths.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(processed = i, total, "scan cancelled");
                report.cancelled = true;
                break;
            }

            match self.vcs.read_file(relative).await {
                Ok(content) => {
                    let file_path = self.vcs.workdir().join(relative).display().to_string();
                    if self
                        .proposals
                        .create_or_update_proposal(&file_path, relative, &content)
                        .await
                        .is_some()
                    {
                        report.proposals += 1;
                    }
                }
                Err(e) => {
                    error!(path = %relative, error = %e, "failed to read conflicted file");
                    report.failures.push(FileFailure {
                        path: relative.clone(),
                        stage: FailureStage::Read,
                        error: e.to_string(),
                    });
                }
            }

            self.report(BatchPhase::Scan, i + 1, total, relative);
        }

        info!(
            proposals = report.proposals,
            failures = report.failures.len(),
            cancelled = report.cancelled,
            "scan complete"
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Apply
    // -----------------------------------------------------------------------

    /// Write and stage every approved proposal.
    ///
    /// A failing file is logged and counted; its proposal stays approved so
    /// the apply can be retried. Successfully applied proposals leave the
    /// active set.
    pub async fn apply_approved(&mut self) -> ApplyReport {
        let approved: Vec<(String, String, String)> = self
            .proposals
            .approved()
            .into_iter()
            .map(|p| (p.id.clone(), p.relative_path.clone(), p.proposed_content.clone()))
            .collect();

        let mut report = ApplyReport {
            approved: approved.len(),
            ..Default::default()
        };
        if approved.is_empty() {
            info!("nothing to apply");
            return report;
        }

        info!(total = approved.len(), "applying approved proposals");
        let total = approved.len();
        let mut applied_ids = Vec::new();

        for (i, (id, relative, content)) in approved.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(processed = i, total, "apply cancelled");
                report.cancelled = true;
                break;
            }

            match self.apply_one(relative, content).await {
                Ok(()) => {
                    info!(path = %relative, "resolution applied");
                    applied_ids.push(id.clone());
                }
                Err(failure) => {
                    error!(
                        path = %failure.path,
                        stage = %failure.stage,
                        error = %failure.error,
                        "failed to apply resolution"
                    );
                    report.failures.push(failure);
                }
            }

            self.report(BatchPhase::Apply, i + 1, total, relative);
        }

        report.applied = applied_ids.len();
        self.proposals.remove_applied(&applied_ids);

        info!(
            applied = report.applied,
            failures = report.failures.len(),
            cancelled = report.cancelled,
            "apply complete"
        );
        report
    }

    async fn apply_one(&self, relative: &str, content: &str) -> Result<(), FileFailure> {
        let failure = |stage, e: &dyn std::fmt::Display| FileFailure {
            path: relative.to_string(),
            stage,
            error: e.to_string(),
        };
        self.vcs
            .write_file(relative, content)
            .await
            .map_err(|e| failure(FailureStage::Write, &e))?;
        self.vcs
            .stage(relative)
            .await
            .map_err(|e| failure(FailureStage::Stage, &e))?;
        Ok(())
    }
}
