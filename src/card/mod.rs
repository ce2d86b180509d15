pub mod types;

pub use types::{CardDraft, CardId, CardState};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CardError {
    #[error("Card {card_id} is already {state}")]
    InvalidTransition { card_id: CardId, state: CardState },

    #[error("Edited content cannot be empty")]
    EmptyContent,
}

/// Review outcome held by a card. Edited text lives inside the `Edited`
/// variant, so it exists exactly when the card is edited.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Review {
    Pending,
    Approved,
    Edited(String),
    Skipped,
}

/// A single reviewable snippet.
///
/// Location and content are fixed at creation; the only mutation is one
/// transition out of `Pending` via [`Card::approve`], [`Card::edit`] or
/// [`Card::skip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    id: CardId,
    file_path: String,
    start_line: usize,
    end_line: usize,
    signature: String,
    original_content: String,
    review: Review,
}

impl Card {
    pub fn new(draft: CardDraft) -> Self {
        Self::with_id(CardId::new(), draft)
    }

    pub fn with_id(id: CardId, draft: CardDraft) -> Self {
        Self {
            id,
            file_path: draft.file_path,
            start_line: draft.start_line,
            end_line: draft.end_line,
            signature: draft.ast_signature,
            original_content: draft.original_content,
            review: Review::Pending,
        }
    }

    pub fn id(&self) -> CardId {
        self.id
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn start_line(&self) -> usize {
        self.start_line
    }

    pub fn end_line(&self) -> usize {
        self.end_line
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn original_content(&self) -> &str {
        &self.original_content
    }

    pub fn edited_content(&self) -> Option<&str> {
        match &self.review {
            Review::Edited(content) => Some(content),
            _ => None,
        }
    }

    /// Content that would land in the repository: the edit if any, else the original.
    pub fn effective_content(&self) -> &str {
        self.edited_content().unwrap_or(&self.original_content)
    }

    pub fn state(&self) -> CardState {
        match self.review {
            Review::Pending => CardState::Pending,
            Review::Approved => CardState::Approved,
            Review::Edited(_) => CardState::Edited,
            Review::Skipped => CardState::Skipped,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.review == Review::Pending
    }

    pub fn approve(&mut self) -> Result<(), CardError> {
        self.ensure_pending()?;
        self.review = Review::Approved;
        Ok(())
    }

    /// Replace the snippet with `content`. A card that already left `Pending`
    /// reports `InvalidTransition` even when `content` is blank.
    pub fn edit(&mut self, content: impl Into<String>) -> Result<(), CardError> {
        let content = content.into();
        self.ensure_pending()?;
        if content.trim().is_empty() {
            return Err(CardError::EmptyContent);
        }
        self.review = Review::Edited(content);
        Ok(())
    }

    pub fn skip(&mut self) -> Result<(), CardError> {
        self.ensure_pending()?;
        self.review = Review::Skipped;
        Ok(())
    }

    fn ensure_pending(&self) -> Result<(), CardError> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(CardError::InvalidTransition {
                card_id: self.id,
                state: self.state(),
            })
        }
    }
}
