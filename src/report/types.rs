use crate::card::CardState;
use crate::session::{Progress, SessionStatus};

/// Final line for one card in the session summary.
#[derive(Debug, Clone)]
pub struct CardOutcome {
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub signature: String,
    pub state: CardState,
}

/// Summary of a review session, ready to print or write out.
#[derive(Debug)]
pub struct Report {
    /// Repository as owner/name
    pub repo: String,
    pub session_id: String,
    pub branch_name: String,
    pub status: SessionStatus,
    pub progress: Progress,
    /// Sorted by file path, then start line
    pub cards: Vec<CardOutcome>,
    pub pr_url: Option<String>,
}
