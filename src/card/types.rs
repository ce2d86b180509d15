use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque identifier of a single card (UUID v4, hyphenated when displayed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(Uuid);

impl CardId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CardId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CardId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Review lifecycle of a card. Only `Pending` is non-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardState {
    Pending,
    Approved,
    Edited,
    Skipped,
}

impl CardState {
    pub fn is_pending(self) -> bool {
        self == CardState::Pending
    }
}

impl fmt::Display for CardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardState::Pending => write!(f, "pending"),
            CardState::Approved => write!(f, "approved"),
            CardState::Edited => write!(f, "edited"),
            CardState::Skipped => write!(f, "skipped"),
        }
    }
}

/// An extracted snippet before it becomes a card.
/// Produced by a `CardSource`; lines are 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDraft {
    /// Path of the file inside the repository (e.g. "src/utils.py")
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    /// Signature of the extracted function or method
    pub ast_signature: String,
    /// Source text exactly as extracted
    pub original_content: String,
}
