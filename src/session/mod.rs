pub mod shared;
pub mod store;
pub mod types;

pub use shared::SharedSession;
pub use store::{SessionStore, StoreError};
pub use types::{Progress, PullRequestResult, SessionId, SessionStatus};

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::card::{Card, CardDraft, CardError, CardId, CardState};
use crate::submit::{CardChange, ChangeSet, PullRequestSubmitter, RepoName, SubmitError};

pub const DEFAULT_BRANCH_PREFIX: &str = "code-swipe/session-";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Card {card_id} not found in session {session_id}")]
    CardNotFound {
        session_id: SessionId,
        card_id: CardId,
    },

    #[error(transparent)]
    Card(#[from] CardError),

    #[error("No approved or edited cards to submit")]
    NoChangesToSubmit,

    #[error("Pull request submission failed: {0}")]
    SubmissionFailed(#[source] SubmitError),
}

impl SessionError {
    /// Errors a reviewer can trigger by acting on a stale card.
    /// The controller drops these and refreshes instead of failing.
    pub fn is_ignorable(&self) -> bool {
        matches!(
            self,
            SessionError::CardNotFound { .. } | SessionError::Card(CardError::InvalidTransition { .. })
        )
    }
}

/// One reviewer's pass over every card extracted from one repository.
///
/// Cards are never added or removed after creation. Aggregate counters are
/// not stored; [`Session::progress`] counts card states each time it is asked.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    repo: RepoName,
    branch_name: String,
    cards: BTreeMap<CardId, Card>,
    status: SessionStatus,
    pr_url: Option<String>,
}

impl Session {
    pub fn new(repo: RepoName, drafts: Vec<CardDraft>) -> Self {
        Self::with_branch_prefix(repo, drafts, DEFAULT_BRANCH_PREFIX)
    }

    pub fn with_branch_prefix(repo: RepoName, drafts: Vec<CardDraft>, branch_prefix: &str) -> Self {
        let id = SessionId::new();
        let cards = drafts
            .into_iter()
            .map(Card::new)
            .map(|card| (card.id(), card))
            .collect();
        Self {
            id,
            repo,
            branch_name: format!("{}{}", branch_prefix, id),
            cards,
            status: SessionStatus::Active,
            pr_url: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn repo(&self) -> &RepoName {
        &self.repo
    }

    pub fn branch_name(&self) -> &str {
        &self.branch_name
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn pr_url(&self) -> Option<&str> {
        self.pr_url.as_deref()
    }

    /// Cards in id order.
    pub fn cards(&self) -> impl Iterator<Item = &Card> {
        self.cards.values()
    }

    pub fn card(&self, card_id: CardId) -> Option<&Card> {
        self.cards.get(&card_id)
    }

    pub fn contains(&self, card_id: CardId) -> bool {
        self.cards.contains_key(&card_id)
    }

    #[instrument(skip(self), fields(session = %self.id))]
    pub fn apply_approval(&mut self, card_id: CardId) -> Result<CardState, SessionError> {
        self.transition(card_id, Card::approve)
    }

    #[instrument(skip(self, content), fields(session = %self.id, content_len = content.len()))]
    pub fn apply_edit(&mut self, card_id: CardId, content: &str) -> Result<CardState, SessionError> {
        self.transition(card_id, |card| card.edit(content))
    }

    #[instrument(skip(self), fields(session = %self.id))]
    pub fn apply_skip(&mut self, card_id: CardId) -> Result<CardState, SessionError> {
        self.transition(card_id, Card::skip)
    }

    fn transition<F>(&mut self, card_id: CardId, apply: F) -> Result<CardState, SessionError>
    where
        F: FnOnce(&mut Card) -> Result<(), CardError>,
    {
        let session_id = self.id;
        let card = self
            .cards
            .get_mut(&card_id)
            .ok_or(SessionError::CardNotFound { session_id, card_id })?;
        apply(card)?;
        let state = card.state();
        debug!(card = %card_id, %state, "card transitioned");
        Ok(state)
    }

    pub fn progress(&self) -> Progress {
        let mut progress = Progress {
            total: self.cards.len(),
            processed: 0,
            approved_count: 0,
            edited_count: 0,
            skipped_count: 0,
            percentage: 0.0,
        };
        for card in self.cards.values() {
            match card.state() {
                CardState::Pending => {}
                CardState::Approved => progress.approved_count += 1,
                CardState::Edited => progress.edited_count += 1,
                CardState::Skipped => progress.skipped_count += 1,
            }
        }
        progress.processed = progress.approved_count + progress.edited_count + progress.skipped_count;
        if progress.total > 0 {
            progress.percentage = progress.processed as f64 / progress.total as f64 * 100.0;
        }
        progress
    }

    /// True once no card is pending; an empty session is complete from the start.
    pub fn is_complete(&self) -> bool {
        self.cards.values().all(|card| !card.is_pending())
    }

    /// Collect approved and edited cards into the change set handed to a submitter.
    pub fn change_set(&self) -> Result<ChangeSet, SessionError> {
        let mut changes: Vec<CardChange> = self
            .cards
            .values()
            .filter(|card| matches!(card.state(), CardState::Approved | CardState::Edited))
            .map(CardChange::from_card)
            .collect();
        if changes.is_empty() {
            return Err(SessionError::NoChangesToSubmit);
        }
        changes.sort_by(|a, b| (&a.file_path, a.start_line).cmp(&(&b.file_path, b.start_line)));
        Ok(ChangeSet {
            session_id: self.id,
            repo: self.repo.clone(),
            branch_name: self.branch_name.clone(),
            changes,
        })
    }

    pub fn record_submission(&mut self, pr_url: &str) {
        self.pr_url = Some(pr_url.to_string());
        self.status = SessionStatus::Completed;
    }

    /// Mark an active session as left unfinished. Has no effect otherwise.
    pub fn abandon(&mut self) {
        if self.status == SessionStatus::Active {
            self.status = SessionStatus::Abandoned;
        }
    }

    /// Submit approved and edited cards as a pull request.
    ///
    /// For a session behind a [`SharedSession`] use
    /// [`SharedSession::request_pull_request`], which does not keep the
    /// session locked while the submitter runs.
    pub async fn request_pull_request(
        &mut self,
        submitter: &dyn PullRequestSubmitter,
        timeout: Duration,
    ) -> Result<PullRequestResult, SessionError> {
        let changes = self.change_set()?;
        let pr_url = submit_with_timeout(&changes, submitter, timeout).await?;
        self.record_submission(&pr_url);
        Ok(PullRequestResult {
            pr_url,
            branch: changes.branch_name,
            change_count: changes.changes.len(),
        })
    }
}

/// Run the submitter under `timeout`. Dropping the returned future cancels the call.
#[instrument(skip_all, fields(session = %changes.session_id, submitter = submitter.name(), changes = changes.changes.len()))]
pub(crate) async fn submit_with_timeout(
    changes: &ChangeSet,
    submitter: &dyn PullRequestSubmitter,
    timeout: Duration,
) -> Result<String, SessionError> {
    info!(repo = %changes.repo, branch = %changes.branch_name, "submitting pull request");
    match tokio::time::timeout(timeout, submitter.submit(changes)).await {
        Ok(Ok(pr_url)) => {
            info!(%pr_url, "pull request created");
            Ok(pr_url)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "pull request submission failed");
            Err(SessionError::SubmissionFailed(e))
        }
        Err(_elapsed) => {
            warn!(timeout_secs = timeout.as_secs(), "pull request submission timed out");
            Err(SessionError::SubmissionFailed(SubmitError::TimedOut(timeout)))
        }
    }
}
