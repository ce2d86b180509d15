pub mod github;
pub mod repo;

pub use github::GitHubSubmitter;
pub use repo::{InvalidRepoName, RepoName};

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::card::{Card, CardId, CardState};
use crate::session::SessionId;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("GitHub API request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("GitHub token not found in config or environment")]
    MissingToken,

    #[error("Overlapping changes in {path}: lines {first_start}-{first_end} and {second_start}-{second_end}")]
    OverlappingChanges {
        path: String,
        first_start: usize,
        first_end: usize,
        second_start: usize,
        second_end: usize,
    },

    #[error("Lines {start}-{end} are outside {path} ({len} lines)")]
    LineOutOfRange {
        path: String,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("Approved cards leave every file unchanged")]
    NothingChanged,

    #[error("Timed out after {}s", .0.as_secs_f64())]
    TimedOut(Duration),

    #[error("Submission rejected: {0}")]
    Rejected(String),

    #[error("Invalid GitHub API url: {0}")]
    InvalidUrl(String),
}

/// One approved or edited card, as it should land in the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardChange {
    pub card_id: CardId,
    pub file_path: String,
    /// 1-based, inclusive
    pub start_line: usize,
    pub end_line: usize,
    /// Edited content if the card was edited, original content otherwise
    pub content: String,
    pub edited: bool,
}

impl CardChange {
    pub fn from_card(card: &Card) -> Self {
        Self {
            card_id: card.id(),
            file_path: card.file_path().to_string(),
            start_line: card.start_line(),
            end_line: card.end_line(),
            content: card.effective_content().to_string(),
            edited: card.state() == CardState::Edited,
        }
    }
}

/// Everything a submitter needs to open a pull request for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub session_id: SessionId,
    pub repo: RepoName,
    /// Head branch of the pull request
    pub branch_name: String,
    /// Sorted by file path, then start line
    pub changes: Vec<CardChange>,
}

impl ChangeSet {
    pub fn by_file(&self) -> BTreeMap<&str, Vec<&CardChange>> {
        let mut files: BTreeMap<&str, Vec<&CardChange>> = BTreeMap::new();
        for change in &self.changes {
            files.entry(change.file_path.as_str()).or_default().push(change);
        }
        files
    }

    pub fn edited_count(&self) -> usize {
        self.changes.iter().filter(|c| c.edited).count()
    }
}

/// The version-control collaborator that turns a change set into a pull request.
///
/// Implementations own their retry policy. Callers bound the call with a timeout
/// and may drop the future to cancel it.
#[async_trait]
pub trait PullRequestSubmitter: Send + Sync {
    fn name(&self) -> &str;

    /// Open a pull request and return its url.
    async fn submit(&self, changes: &ChangeSet) -> Result<String, SubmitError>;
}

/// Replace each change's line range in `text` with its content.
///
/// Ranges are 1-based and inclusive and must not overlap. A replaced block
/// keeps the trailing newline of the last line it replaces.
pub fn apply_changes(path: &str, text: &str, changes: &[&CardChange]) -> Result<String, SubmitError> {
    let mut lines: Vec<String> = text.split_inclusive('\n').map(str::to_string).collect();

    let mut sorted = changes.to_vec();
    sorted.sort_by_key(|c| (c.start_line, c.end_line));
    for pair in sorted.windows(2) {
        if pair[1].start_line <= pair[0].end_line {
            return Err(SubmitError::OverlappingChanges {
                path: path.to_string(),
                first_start: pair[0].start_line,
                first_end: pair[0].end_line,
                second_start: pair[1].start_line,
                second_end: pair[1].end_line,
            });
        }
    }

    for change in sorted.iter().rev() {
        if change.start_line == 0 || change.end_line < change.start_line || change.end_line > lines.len() {
            return Err(SubmitError::LineOutOfRange {
                path: path.to_string(),
                start: change.start_line,
                end: change.end_line,
                len: lines.len(),
            });
        }
        let mut replacement = change.content.clone();
        if lines[change.end_line - 1].ends_with('\n') && !replacement.ends_with('\n') {
            replacement.push('\n');
        }
        lines.drain(change.start_line - 1..change.end_line);
        lines.insert(change.start_line - 1, replacement);
    }

    Ok(lines.concat())
}

/// Markdown body listing each card that went into the pull request.
pub fn pull_request_body(changes: &ChangeSet) -> String {
    let mut body = format!(
        "Reviewed with code-swipe (session `{}`).\n\n{} card(s): {} edited, {} approved as-is.\n\n",
        changes.session_id,
        changes.changes.len(),
        changes.edited_count(),
        changes.changes.len() - changes.edited_count()
    );
    for change in &changes.changes {
        let verdict = if change.edited { "edited" } else { "approved" };
        body.push_str(&format!(
            "- `{}` L{}-{} ({})\n",
            change.file_path, change.start_line, change.end_line, verdict
        ));
    }
    body
}

/// Logs the change set and reports the repository's pull request list
/// without touching the network.
#[derive(Debug, Default)]
pub struct DryRunSubmitter;

#[async_trait]
impl PullRequestSubmitter for DryRunSubmitter {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn submit(&self, changes: &ChangeSet) -> Result<String, SubmitError> {
        for (path, file_changes) in changes.by_file() {
            debug!(path, cards = file_changes.len(), "would update file");
        }
        info!(
            branch = %changes.branch_name,
            edited = changes.edited_count(),
            total = changes.changes.len(),
            "dry run: pull request not created"
        );
        Ok(format!("https://github.com/{}/pulls", changes.repo))
    }
}
