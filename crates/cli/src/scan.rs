//! `scan` and `show`: build proposals and display them.

use std::time::Duration;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};

use mergemend_core::conflict::ResolutionProposal;
use mergemend_core::orchestrator::{BatchOrchestrator, FileFailure, ScanReport};

use crate::style;

/// Run a scan behind a spinner (hidden when `quiet`).
pub async fn scan_with_spinner(orch: &mut BatchOrchestrator, quiet: bool) -> Result<ScanReport> {
    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.blue} {msg}")
                .context("invalid spinner template")?
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.set_message("Scanning for conflicts...");
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    };

    let bar = spinner.clone();
    orch.on_progress(move |p| {
        bar.set_message(format!("[{}/{}] {}", p.current, p.total, p.path));
    });

    let report = orch.scan_and_propose().await;
    spinner.finish_and_clear();
    report.context("failed to scan repository")
}

/// `mergemend scan`
pub async fn run_scan(orch: &mut BatchOrchestrator, json: bool) -> Result<()> {
    let report = scan_with_spinner(orch, json).await?;

    if json {
        let out = serde_json::json!({
            "conflicted_files": report.conflicted_files,
            "cancelled": report.cancelled,
            "failures": report.failures,
            "proposals": orch.proposals().proposals(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if report.no_conflicts() {
        println!();
        println!("{}", style::success("No conflicted files"));
        println!();
        return Ok(());
    }

    print_failures(&report.failures);
    if report.cancelled {
        println!("{}", style::warn("Scan cancelled; showing partial results"));
    }

    let proposals = orch.proposals().proposals();
    println!();
    println!(
        "{}",
        style::header(&format!(
            "Proposals ({} of {} conflicted files)",
            proposals.len(),
            report.conflicted_files
        ))
    );
    println!();
    println!("{}", proposal_table(proposals));
    println!();
    println!(
        "{}",
        style::dim("Run 'mergemend show <file>' for a diff or 'mergemend resolve' to review.")
    );
    Ok(())
}

/// `mergemend show <file>`
pub async fn run_show(orch: &mut BatchOrchestrator, file: &str) -> Result<()> {
    let report = scan_with_spinner(orch, false).await?;
    print_failures(&report.failures);

    let Some(proposal) = orch.proposals().find_by_path(file) else {
        anyhow::bail!("no resolvable conflicts in '{}'", file);
    };

    print_proposal_summary(proposal);
    println!();
    println!("{}", style::diff(&proposal.diff()));
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared rendering
// ---------------------------------------------------------------------------

pub fn proposal_table(proposals: &[ResolutionProposal]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ID", "File", "Regions", "Strategy", "Status"]);

    for p in proposals {
        let id_short = if p.id.len() > 8 { &p.id[..8] } else { &p.id };
        table.add_row(vec![
            Cell::new(id_short),
            Cell::new(&p.relative_path),
            Cell::new(p.conflict_count),
            Cell::new(style::strategy_label(p)),
            style::status_cell(p),
        ]);
    }
    table
}

pub fn print_proposal_summary(p: &ResolutionProposal) {
    println!();
    println!("{}", style::header(&p.relative_path));
    println!(
        "  {} region(s), strategy {}",
        p.conflict_count,
        style::strategy_label(p)
    );
    println!("  {}", style::dim(&style::provenance(p)));
    if p.has_residual_markers() {
        println!("  {}", style::warn("proposed content still contains conflict markers"));
    }
}

pub fn print_failures(failures: &[FileFailure]) {
    for f in failures {
        println!(
            "{}",
            style::error(&format!("{} ({} failed): {}", f.path, f.stage, f.error))
        );
    }
}
