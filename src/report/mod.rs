pub mod types;

pub use types::{CardOutcome, Report};

use crate::card::CardState;
use crate::session::Session;
use colored::Colorize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Build a Report from the current state of a session.
pub fn build(session: &Session) -> Report {
    let mut cards: Vec<CardOutcome> = session
        .cards()
        .map(|card| CardOutcome {
            file_path: card.file_path().to_string(),
            start_line: card.start_line(),
            end_line: card.end_line(),
            signature: card.signature().to_string(),
            state: card.state(),
        })
        .collect();
    cards.sort_by(|a, b| (&a.file_path, a.start_line).cmp(&(&b.file_path, b.start_line)));

    Report {
        repo: session.repo().to_string(),
        session_id: session.id().to_string(),
        branch_name: session.branch_name().to_string(),
        status: session.status(),
        progress: session.progress(),
        cards,
        pr_url: session.pr_url().map(str::to_string),
    }
}

/// Output the report to terminal (default) or to a markdown file.
#[instrument(skip(report), fields(session = %report.session_id, status = %report.status))]
pub fn output(report: &Report, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            print_terminal_report(report);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            write_markdown_report(report, path)
        }
    }
}

/// Format and print the report to the terminal with colors.
///
/// Review of octo/widgets (session 1c0f…)
/// Status: completed | Reviewed: 5/5 (100%)
/// Approved: 2 | Edited: 1 | Skipped: 2
///
/// ═══ Cards ═══
///   EDITED    src/utils.py:1-8  def validate_email(email: str) -> bool
///
/// ═══ Pull Request: https://github.com/octo/widgets/pull/12 ═══
fn print_terminal_report(report: &Report) {
    let progress = &report.progress;
    println!();
    println!("Review of {} (session {})", report.repo.bold(), report.session_id);
    println!(
        "Status: {} | Reviewed: {}/{} ({:.0}%)",
        report.status, progress.processed, progress.total, progress.percentage
    );
    println!(
        "Approved: {} | Edited: {} | Skipped: {}",
        progress.approved_count, progress.edited_count, progress.skipped_count
    );
    println!();

    println!("═══ Cards ═══");
    if report.cards.is_empty() {
        println!("  No cards.");
    }
    for card in &report.cards {
        println!(
            "  {:<9} {}:{}-{}  {}",
            colorize_state(card.state),
            card.file_path,
            card.start_line,
            card.end_line,
            card.signature.dimmed()
        );
    }
    println!();

    match &report.pr_url {
        Some(url) => println!("═══ Pull Request: {} ═══", url.green().bold()),
        None => println!("═══ Branch: {} (no pull request yet) ═══", report.branch_name),
    }
    println!();
}

/// Write the report as a markdown file.
fn write_markdown_report(report: &Report, path: &Path) -> Result<(), ReportError> {
    let progress = &report.progress;
    let mut md = String::new();
    md.push_str(&format!("# Review of {}\n\n", report.repo));
    md.push_str(&format!(
        "**Session:** `{}` | **Status:** {} | **Reviewed:** {}/{} ({:.0}%)\n\n",
        report.session_id, report.status, progress.processed, progress.total, progress.percentage
    ));
    md.push_str(&format!(
        "**Approved:** {} | **Edited:** {} | **Skipped:** {}\n\n",
        progress.approved_count, progress.edited_count, progress.skipped_count
    ));

    md.push_str("## Cards\n\n");
    if report.cards.is_empty() {
        md.push_str("No cards.\n\n");
    } else {
        for card in &report.cards {
            md.push_str(&format!(
                "- **[{}]** `{}:{}-{}` {}\n",
                card.state.to_string().to_uppercase(),
                card.file_path,
                card.start_line,
                card.end_line,
                card.signature
            ));
        }
        md.push('\n');
    }

    match &report.pr_url {
        Some(url) => md.push_str(&format!("## Pull Request\n\n{}\n", url)),
        None => md.push_str(&format!("## Pull Request\n\nNot submitted (branch `{}`).\n", report.branch_name)),
    }

    std::fs::write(path, md)?;
    Ok(())
}

/// Helper to colorize a card state for terminal output.
fn colorize_state(state: CardState) -> colored::ColoredString {
    match state {
        CardState::Approved => "APPROVED".green().bold(),
        CardState::Edited => "EDITED".yellow().bold(),
        CardState::Skipped => "SKIPPED".dimmed(),
        CardState::Pending => "PENDING".normal(),
    }
}
