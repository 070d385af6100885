//! Terminal rendering for status lines, proposals and diffs.

use comfy_table::{Cell, Color};
use console::Style;

use mergemend_core::conflict::ResolutionProposal;

// ---------------------------------------------------------------------------
// Status lines
// ---------------------------------------------------------------------------

fn mark(symbol: &str, style: Style, msg: &str) -> String {
    format!("{} {}", style.apply_to(symbol), msg)
}

pub fn success(msg: &str) -> String {
    mark("✓", Style::new().green(), msg)
}

pub fn error(msg: &str) -> String {
    mark("✗", Style::new().red(), msg)
}

pub fn warn(msg: &str) -> String {
    mark("⚠", Style::new().yellow(), msg)
}

pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

// ---------------------------------------------------------------------------
// Proposals
// ---------------------------------------------------------------------------

/// File-level strategy, flagged when a semantic merge fell back.
pub fn strategy_label(p: &ResolutionProposal) -> String {
    if p.used_fallback() {
        format!("{} (fallback)", p.strategy)
    } else {
        p.strategy.to_string()
    }
}

/// How the proposed content was produced, region by region.
pub fn provenance(p: &ResolutionProposal) -> String {
    if p.is_manual_edit() {
        return "manual edit".to_string();
    }
    let per_region: Vec<String> = p.region_strategies.iter().map(|s| s.to_string()).collect();
    format!("per region: {}", per_region.join(", "))
}

pub fn status_text(p: &ResolutionProposal) -> &'static str {
    if p.has_residual_markers() {
        "⚠ markers remain"
    } else if p.approved {
        "✓ approved"
    } else {
        "pending"
    }
}

pub fn status_cell(p: &ResolutionProposal) -> Cell {
    let cell = Cell::new(status_text(p));
    if p.has_residual_markers() {
        cell.fg(Color::Yellow)
    } else if p.approved {
        cell.fg(Color::Green)
    } else {
        cell
    }
}

// ---------------------------------------------------------------------------
// Diffs
// ---------------------------------------------------------------------------

fn diff_line_style(line: &str) -> Option<Style> {
    if line.starts_with("+++") || line.starts_with("---") {
        Some(Style::new().bold())
    } else if line.starts_with('+') {
        Some(Style::new().green())
    } else if line.starts_with('-') {
        Some(Style::new().red())
    } else if line.starts_with("@@") {
        Some(Style::new().cyan())
    } else {
        None
    }
}

/// Colorize a unified diff: additions green, removals red, hunks cyan.
pub fn diff(patch: &str) -> String {
    patch
        .lines()
        .map(|line| match diff_line_style(line) {
            Some(style) => style.apply_to(line).to_string(),
            None => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
