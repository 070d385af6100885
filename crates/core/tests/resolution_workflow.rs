//! End-to-end scan → review → apply workflow against an in-memory
//! repository and scripted completion services.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use mergemend_core::completion::CompletionService;
use mergemend_core::conflict::{
    ConflictParser, MergeExecutor, MergeStrategy, ProposalManager, StrategySelector,
};
use mergemend_core::errors::{CompletionError, OrchestratorError, VcsError};
use mergemend_core::orchestrator::{BatchOrchestrator, FailureStage};
use mergemend_core::vcs::VcsAdapter;

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryRepo {
    files: Mutex<BTreeMap<String, String>>,
    conflicted: Mutex<BTreeSet<String>>,
    staged: Mutex<Vec<String>>,
    unwritable: BTreeSet<String>,
    broken: bool,
    workdir: PathBuf,
}

impl MemoryRepo {
    fn new(files: &[(&str, &str)]) -> Self {
        let repo = MemoryRepo {
            workdir: PathBuf::from("/work"),
            ..Default::default()
        };
        for (path, content) in files {
            repo.files.lock().unwrap().insert(path.to_string(), content.to_string());
            if ConflictParser::has_conflicts(content) {
                repo.conflicted.lock().unwrap().insert(path.to_string());
            }
        }
        repo
    }

    fn content(&self, path: &str) -> String {
        self.files.lock().unwrap()[path].clone()
    }
}

#[async_trait]
impl VcsAdapter for MemoryRepo {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    async fn list_conflicted_files(&self) -> Result<Vec<String>, VcsError> {
        if self.broken {
            return Err(VcsError::RepositoryNotFound("/work".into()));
        }
        Ok(self.conflicted.lock().unwrap().iter().cloned().collect())
    }

    async fn read_file(&self, path: &str) -> Result<String, VcsError> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| VcsError::IoError(std::io::ErrorKind::NotFound.into()))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), VcsError> {
        if self.unwritable.contains(path) {
            return Err(VcsError::IoError(std::io::ErrorKind::PermissionDenied.into()));
        }
        self.files.lock().unwrap().insert(path.into(), content.into());
        Ok(())
    }

    async fn stage(&self, path: &str) -> Result<(), VcsError> {
        self.conflicted.lock().unwrap().remove(path);
        self.staged.lock().unwrap().push(path.into());
        Ok(())
    }
}

/// Returns the same reply to every prompt and counts calls.
struct Scripted {
    reply: Result<String, u16>,
    calls: AtomicUsize,
}

impl Scripted {
    fn ok(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(status),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CompletionService for Scripted {
    async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(CompletionError::ApiError {
                status: *status,
                body: "unavailable".into(),
            }),
        }
    }
}

fn orchestrator(repo: Arc<MemoryRepo>, completion: Option<Arc<Scripted>>) -> BatchOrchestrator {
    let executor = match completion {
        Some(service) => {
            let service: Arc<dyn CompletionService> = service;
            MergeExecutor::with_completion(service)
        }
        None => MergeExecutor::new(),
    };
    BatchOrchestrator::new(repo, ProposalManager::new(StrategySelector::default(), executor))
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const RUST_FILE: &str = "fn main() {\n<<<<<<< HEAD\n    let x = 1;\n    run(x);\n=======\n    let x = 2;\n    run(x);\n>>>>>>> feature/x\n}\n";

const NOTES_FILE: &str = "# Notes\n<<<<<<< HEAD\nalpha\nbeta\n=======\nalpha\ngamma\n>>>>>>> topic\n";

/// Same block as ours on both sides, then a containment block.
const CONFIG_FILE: &str = "<<<<<<< HEAD\nkey = 1\n=======\nkey = 1\n>>>>>>> topic\nmid\n<<<<<<< HEAD\nport = 80\n=======\nport = 80\nhost = a\n>>>>>>> topic\n";

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_full_workflow_with_semantic_merge() {
    let repo = Arc::new(MemoryRepo::new(&[
        ("src/main.rs", RUST_FILE),
        ("notes.md", NOTES_FILE),
        ("README", "no conflicts here\n"),
    ]));
    let model = Scripted::ok("Here you go:\n```rust\n    let x = 2;\n    run(x);\n```\n");
    let mut orch = orchestrator(repo.clone(), Some(model.clone()));

    let scan = orch.scan_and_propose().await.unwrap();
    assert_eq!(scan.conflicted_files, 2);
    assert_eq!(scan.proposals, 2);
    assert!(scan.failures.is_empty());

    let rust = orch.proposals().find_by_path("src/main.rs").unwrap();
    assert_eq!(rust.proposed_content, "fn main() {\n    let x = 2;\n    run(x);\n}\n");
    assert_eq!(rust.region_strategies, vec![MergeStrategy::SemanticMerge]);
    assert!(!rust.used_fallback());
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);

    // Not a source extension: structural merge, no model call.
    let notes = orch.proposals().find_by_path("notes.md").unwrap();
    assert_eq!(notes.proposed_content, "# Notes\nalpha\nbeta\ngamma\n");
    assert_eq!(notes.region_strategies, vec![MergeStrategy::StructuralMerge]);
    assert!(!notes.used_fallback());

    let approved = orch.proposals_mut().approve_all();
    assert_eq!(approved, 2);

    let apply = orch.apply_approved().await;
    assert_eq!(apply.applied, 2);
    assert!(apply.failures.is_empty());
    assert!(orch.proposals().is_empty());

    assert_eq!(repo.content("notes.md"), "# Notes\nalpha\nbeta\ngamma\n");
    assert!(!ConflictParser::has_conflicts(&repo.content("src/main.rs")));
    assert_eq!(*repo.staged.lock().unwrap(), vec!["notes.md", "src/main.rs"]);
    assert_eq!(repo.content("README"), "no conflicts here\n");

    // Nothing is left to do.
    let rescan = orch.scan_and_propose().await.unwrap();
    assert!(rescan.no_conflicts());
}

#[tokio::test]
async fn test_semantic_failures_fall_back_to_structural() {
    for model in [
        Scripted::failing(503),
        Scripted::ok(""),
        Scripted::ok("```\n<<<<<<< HEAD\nstill broken\n```"),
    ] {
        let repo = Arc::new(MemoryRepo::new(&[("src/main.rs", RUST_FILE)]));
        let mut orch = orchestrator(repo, Some(model.clone()));
        orch.scan_and_propose().await.unwrap();

        let p = orch.proposals().find_by_path("src/main.rs").unwrap();
        assert_eq!(p.strategy, MergeStrategy::SemanticMerge);
        assert_eq!(p.region_strategies, vec![MergeStrategy::StructuralMerge]);
        assert!(p.used_fallback());
        assert_eq!(
            p.proposed_content,
            "fn main() {\n    run(x);\n    let x = 1;\n    let x = 2;\n}\n"
        );
        assert!(!p.has_residual_markers());
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn test_scenario_d_without_completion_service() {
    let content = "import os\n<<<<<<< HEAD\nx = 1\ny = 2\n=======\nx = 1\nz = 3\n>>>>>>> feature\n";
    let repo = Arc::new(MemoryRepo::new(&[("app.py", content)]));
    let mut orch = orchestrator(repo, None);
    orch.scan_and_propose().await.unwrap();

    let p = orch.proposals().find_by_path("app.py").unwrap();
    assert_eq!(p.strategy, MergeStrategy::SemanticMerge);
    assert_eq!(p.proposed_content, "import os\nx = 1\ny = 2\nz = 3\n");
    assert!(!p.has_residual_markers());
}

#[tokio::test]
async fn test_selector_rules_per_region() {
    let repo = Arc::new(MemoryRepo::new(&[("settings.toml", CONFIG_FILE)]));
    let mut orch = orchestrator(repo, None);
    orch.scan_and_propose().await.unwrap();

    let p = orch.proposals().find_by_path("settings.toml").unwrap();
    assert_eq!(p.conflict_count, 2);
    assert_eq!(
        p.region_strategies,
        vec![MergeStrategy::Ours, MergeStrategy::Theirs]
    );
    assert_eq!(p.proposed_content, "key = 1\nmid\nport = 80\nhost = a\n");
}

#[tokio::test]
async fn test_diff3_blocks_resolve_without_base_lines() {
    let diff3 = "# Notes\n<<<<<<< HEAD\nalpha\nbeta\n||||||| merged common ancestors\nalpha\nold\n=======\nalpha\ngamma\n>>>>>>> topic\n";
    let repo = Arc::new(MemoryRepo::new(&[("notes.md", diff3)]));
    let mut orch = orchestrator(repo, None);
    orch.scan_and_propose().await.unwrap();

    let p = orch.proposals().find_by_path("notes.md").unwrap();
    assert_eq!(p.conflict_count, 1);
    assert_eq!(p.proposed_content, "# Notes\nalpha\nbeta\ngamma\n");
    assert!(!p.has_residual_markers());
}

#[tokio::test]
async fn test_malformed_block_left_for_review() {
    let content = "<<<<<<< HEAD\nx\n>>>>>>> topic\nmid\n<<<<<<< HEAD\np\n=======\nq\n>>>>>>> topic\n";
    let repo = Arc::new(MemoryRepo::new(&[("notes.md", content)]));
    let mut orch = orchestrator(repo, None);
    orch.scan_and_propose().await.unwrap();

    let p = orch.proposals().find_by_path("notes.md").unwrap();
    assert_eq!(p.conflict_count, 1);
    assert_eq!(
        p.proposed_content,
        "<<<<<<< HEAD\nx\n>>>>>>> topic\nmid\np\nq\n"
    );
    assert!(p.has_residual_markers());
}

#[tokio::test]
async fn test_rescan_is_idempotent_and_keeps_ids() {
    let repo = Arc::new(MemoryRepo::new(&[("notes.md", NOTES_FILE)]));
    let mut orch = orchestrator(repo, None);

    orch.scan_and_propose().await.unwrap();
    let first = orch.proposals().proposals().to_vec();

    orch.scan_and_propose().await.unwrap();
    let second = orch.proposals().proposals();

    assert_eq!(second.len(), 1);
    assert_eq!(first[0].id, second[0].id);
    assert_eq!(first[0].proposed_content, second[0].proposed_content);
}

#[tokio::test]
async fn test_only_approved_proposals_are_written() {
    let repo = Arc::new(MemoryRepo::new(&[
        ("a.md", NOTES_FILE),
        ("b.md", NOTES_FILE),
    ]));
    let mut orch = orchestrator(repo.clone(), None);
    orch.scan_and_propose().await.unwrap();

    let id_a = orch.proposals().find_by_path("a.md").unwrap().id.clone();
    let id_b = orch.proposals().find_by_path("b.md").unwrap().id.clone();
    orch.proposals_mut().approve(&id_a).unwrap();
    orch.proposals_mut().approve(&id_b).unwrap();
    orch.proposals_mut().reject(&id_b).unwrap();

    let apply = orch.apply_approved().await;
    assert_eq!(apply.applied, 1);
    assert_eq!(repo.content("b.md"), NOTES_FILE);
    assert_eq!(*repo.staged.lock().unwrap(), vec!["a.md"]);

    // The rejected proposal stays for a later decision.
    assert_eq!(orch.proposals().len(), 1);
    assert_eq!(orch.proposals().proposals()[0].id, id_b);
}

#[tokio::test]
async fn test_change_strategy_resets_approval() {
    let repo = Arc::new(MemoryRepo::new(&[("notes.md", NOTES_FILE)]));
    let mut orch = orchestrator(repo.clone(), None);
    orch.scan_and_propose().await.unwrap();
    let id = orch.proposals().proposals()[0].id.clone();

    orch.proposals_mut().approve(&id).unwrap();
    orch.proposals_mut()
        .change_strategy(&id, MergeStrategy::Theirs)
        .await
        .unwrap();

    let p = orch.proposals().get(&id).unwrap();
    assert!(!p.approved);
    assert_eq!(p.proposed_content, "# Notes\nalpha\ngamma\n");

    let apply = orch.apply_approved().await;
    assert!(apply.nothing_to_apply());
    assert_eq!(repo.content("notes.md"), NOTES_FILE);
}

#[tokio::test]
async fn test_write_failure_does_not_abort_batch() {
    let repo = Arc::new(MemoryRepo {
        unwritable: ["a.md".to_string()].into(),
        ..MemoryRepo::new(&[("a.md", NOTES_FILE), ("b.md", NOTES_FILE)])
    });
    let mut orch = orchestrator(repo.clone(), None);
    orch.scan_and_propose().await.unwrap();
    orch.proposals_mut().approve_all();

    let apply = orch.apply_approved().await;
    assert_eq!(apply.applied, 1);
    assert_eq!(apply.failures.len(), 1);
    assert_eq!(apply.failures[0].stage, FailureStage::Write);
    assert_eq!(*repo.staged.lock().unwrap(), vec!["b.md"]);
    assert!(orch.proposals().find_by_path("a.md").unwrap().approved);
}

#[tokio::test]
async fn test_listing_failure_is_reported() {
    let repo = Arc::new(MemoryRepo {
        broken: true,
        ..MemoryRepo::new(&[("a.md", NOTES_FILE)])
    });
    let mut orch = orchestrator(repo, None);
    let err = orch.scan_and_propose().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::ListFailed(_)));
    assert!(err.to_string().contains("failed to list conflicted files"));
}

#[tokio::test]
async fn test_cancelled_scan_keeps_finished_files() {
    let repo = Arc::new(MemoryRepo::new(&[
        ("a.md", NOTES_FILE),
        ("b.md", NOTES_FILE),
        ("c.md", NOTES_FILE),
    ]));
    let mut orch = orchestrator(repo, None);
    let flag = orch.cancellation_flag();
    orch.on_progress(move |p| {
        if p.current == 2 {
            flag.cancel();
        }
    });

    let scan = orch.scan_and_propose().await.unwrap();
    assert!(scan.cancelled);
    assert_eq!(orch.proposals().len(), 2);
    assert!(orch.proposals().find_by_path("c.md").is_none());

    orch.cancellation_flag().reset();
    orch.on_progress(|_| {});
    let scan = orch.scan_and_propose().await.unwrap();
    assert!(!scan.cancelled);
    assert_eq!(orch.proposals().len(), 3);
}
