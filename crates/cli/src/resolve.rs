//! `resolve`: review proposals interactively and apply the approved ones.

use anyhow::{Context, Result};
use dialoguer::{Confirm, Editor, Select};
use indicatif::{ProgressBar, ProgressStyle};

use mergemend_core::conflict::{file_type_hint, MergeStrategy, ProposalManager};
use mergemend_core::orchestrator::{BatchOrchestrator, BatchPhase};

use crate::scan::{print_failures, print_proposal_summary, scan_with_spinner};
use crate::style;

const ACTIONS: &[&str] = &[
    "Approve",
    "Reject",
    "Change strategy",
    "Regenerate (semantic merge)",
    "Edit in $EDITOR",
    "View diff",
    "Skip for now",
];

/// `mergemend resolve`
pub async fn run_resolve(
    orch: &mut BatchOrchestrator,
    strategy: Option<MergeStrategy>,
    yes: bool,
) -> Result<()> {
    let report = scan_with_spinner(orch, false).await?;
    print_failures(&report.failures);

    if orch.proposals().is_empty() {
        println!();
        if report.no_conflicts() {
            println!("{}", style::success("No conflicted files"));
        } else {
            println!("{}", style::warn("No resolvable conflicts found"));
        }
        println!();
        return Ok(());
    }

    let ids: Vec<String> = orch.proposals().proposals().iter().map(|p| p.id.clone()).collect();

    if let Some(strategy) = strategy {
        for id in &ids {
            orch.proposals_mut()
                .change_strategy(id, strategy)
                .await
                .context("failed to change strategy")?;
        }
        println!("{}", style::success(&format!("Applied strategy '{}' to every file", strategy)));
    }

    if yes {
        let count = orch.proposals_mut().approve_all();
        println!("{}", style::success(&format!("Approved {} proposal(s)", count)));
    } else {
        let total = ids.len();
        for (i, id) in ids.iter().enumerate() {
            if orch.cancellation_flag().is_cancelled() {
                break;
            }
            println!();
            println!("{}", style::dim(&format!("[{}/{}]", i + 1, total)));
            review(orch.proposals_mut(), id).await?;
        }
    }

    apply(orch, yes).await
}

/// Walk one proposal until it is approved, rejected or skipped.
async fn review(manager: &mut ProposalManager, id: &str) -> Result<()> {
    loop {
        let Some(proposal) = manager.get(id) else {
            return Ok(());
        };
        print_proposal_summary(proposal);

        let choice = Select::new()
            .with_prompt("Action")
            .items(ACTIONS)
            .default(0)
            .interact()
            .context("failed to read action")?;

        match choice {
            0 => {
                manager.approve(id)?;
                println!("{}", style::success("Approved"));
                return Ok(());
            }
            1 => {
                manager.reject(id)?;
                println!("{}", style::warn("Rejected; the file will be left as is"));
                return Ok(());
            }
            2 => {
                let names: Vec<String> = MergeStrategy::ALL.iter().map(|s| s.to_string()).collect();
                let current = MergeStrategy::ALL
                    .iter()
                    .position(|s| *s == proposal.strategy)
                    .unwrap_or(0);
                let picked = Select::new()
                    .with_prompt("Strategy")
                    .items(&names)
                    .default(current)
                    .interact()
                    .context("failed to read strategy")?;
                manager.change_strategy(id, MergeStrategy::ALL[picked]).await?;
            }
            3 => {
                manager.regenerate(id).await?;
            }
            4 => {
                let extension = format!(".{}", file_type_hint(&proposal.relative_path));
                let edited = Editor::new()
                    .extension(&extension)
                    .edit(&proposal.proposed_content)
                    .context("failed to run editor")?;
                match edited {
                    Some(text) => manager.edit_content(id, text)?,
                    None => println!("{}", style::dim("Editor closed without saving")),
                }
            }
            5 => {
                println!();
                println!("{}", style::diff(&proposal.diff()));
            }
            _ => return Ok(()),
        }
    }
}

async fn apply(orch: &mut BatchOrchestrator, yes: bool) -> Result<()> {
    let approved = orch.proposals().approved().len();
    println!();
    if approved == 0 {
        println!("{}", style::warn("No proposals approved; nothing written"));
        return Ok(());
    }

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Write and stage {} file(s)?", approved))
            .default(true)
            .interact()
            .context("failed to read confirmation")?;
        if !confirmed {
            println!("{}", style::warn("Apply cancelled. No files were modified."));
            return Ok(());
        }
    }

    let bar = ProgressBar::new(approved as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .context("invalid progress template")?,
    );
    let progress = bar.clone();
    orch.on_progress(move |p| {
        if p.phase == BatchPhase::Apply {
            progress.set_position(p.current as u64);
            progress.set_message(p.path.clone());
        }
    });

    let report = orch.apply_approved().await;
    bar.finish_and_clear();

    print_failures(&report.failures);
    println!(
        "{}",
        style::success(&format!("Applied {} of {} approved file(s)", report.applied, report.approved))
    );
    if report.cancelled {
        println!("{}", style::warn("Apply cancelled; remaining files were not written"));
    }
    let pending = orch.proposals().len();
    if pending > 0 {
        println!("{}", style::dim(&format!("{} proposal(s) still pending", pending)));
    }

    if !report.failures.is_empty() {
        anyhow::bail!("{} file(s) could not be applied", report.failures.len());
    }
    Ok(())
}
