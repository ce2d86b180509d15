//! Transport-agnostic handlers for the review endpoints.
//!
//! Each method corresponds to one route of the HTTP surface and speaks in the
//! same JSON payloads; binding them to a server is left to the caller.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{instrument, warn};

use crate::card::{Card, CardError, CardId, CardState};
use crate::config::DEFAULT_TIMEOUT_SECS;
use crate::queue::{CardQueue, Draw};
use crate::session::{Session, SessionError, SessionId, SessionStatus, SessionStore, SharedSession, StoreError};
use crate::source::CardSource;
use crate::submit::PullRequestSubmitter;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    pub repo_full_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditCardRequest {
    pub edited_content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionResponse {
    pub id: SessionId,
    pub repo_full_name: String,
    pub status: SessionStatus,
    pub branch_name: String,
    pub total_cards: usize,
    pub approved_cards: usize,
    pub edited_cards: usize,
    pub skipped_cards: usize,
    pub pr_url: Option<String>,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        let progress = session.progress();
        Self {
            id: session.id(),
            repo_full_name: session.repo().to_string(),
            status: session.status(),
            branch_name: session.branch_name().to_string(),
            total_cards: progress.total,
            approved_cards: progress.approved_count,
            edited_cards: progress.edited_count,
            skipped_cards: progress.skipped_count,
            pr_url: session.pr_url().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardResponse {
    pub id: CardId,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub ast_signature: String,
    pub original_content: String,
    pub status: CardState,
}

impl From<&Card> for CardResponse {
    fn from(card: &Card) -> Self {
        Self {
            id: card.id(),
            file_path: card.file_path().to_string(),
            start_line: card.start_line(),
            end_line: card.end_line(),
            ast_signature: card.signature().to_string(),
            original_content: card.original_content().to_string(),
            status: card.state(),
        }
    }
}

/// Answer of the random-card route: a pending card, or the end of the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CardFetch {
    Card(CardResponse),
    NoMoreCards,
}

impl CardFetch {
    /// HTTP status an adapter should answer with; the body is the same either way.
    pub fn status_code(&self) -> u16 {
        match self {
            CardFetch::Card(_) => 200,
            CardFetch::NoMoreCards => 404,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardActionResponse {
    pub status: CardState,
    pub card_id: CardId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatePrResponse {
    pub pr_url: String,
    pub branch: String,
    pub change_count: usize,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid {kind} id: {value}")]
    InvalidId { kind: &'static str, value: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ApiError {
    /// HTTP status an adapter should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InvalidId { .. } => 400,
            ApiError::Store(StoreError::SessionNotFound(_) | StoreError::CardNotFound(_)) => 404,
            ApiError::Store(StoreError::InvalidRepo(_)) => 422,
            ApiError::Store(StoreError::Source(_)) => 502,
            ApiError::Session(SessionError::CardNotFound { .. }) => 404,
            ApiError::Session(SessionError::Card(CardError::InvalidTransition { .. })) => 409,
            ApiError::Session(SessionError::Card(CardError::EmptyContent)) => 400,
            ApiError::Session(SessionError::NoChangesToSubmit) => 400,
            ApiError::Session(SessionError::SubmissionFailed(_)) => 502,
        }
    }
}

fn parse_session_id(raw: &str) -> Result<SessionId, ApiError> {
    raw.parse().map_err(|_| ApiError::InvalidId {
        kind: "session",
        value: raw.to_string(),
    })
}

fn parse_card_id(raw: &str) -> Result<CardId, ApiError> {
    raw.parse().map_err(|_| ApiError::InvalidId {
        kind: "card",
        value: raw.to_string(),
    })
}

pub struct ReviewApi {
    store: Arc<SessionStore>,
    source: Arc<dyn CardSource>,
    submitter: Arc<dyn PullRequestSubmitter>,
    queue: Mutex<CardQueue>,
    submit_timeout: Duration,
}

impl ReviewApi {
    pub fn new(
        store: Arc<SessionStore>,
        source: Arc<dyn CardSource>,
        submitter: Arc<dyn PullRequestSubmitter>,
    ) -> Self {
        Self {
            store,
            source,
            submitter,
            queue: Mutex::new(CardQueue::new()),
            submit_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_queue(mut self, queue: CardQueue) -> Self {
        self.queue = Mutex::new(queue);
        self
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    fn session(&self, session_id: &str) -> Result<SharedSession, ApiError> {
        Ok(self.store.get(parse_session_id(session_id)?)?)
    }

    fn owner_of(&self, card_id: &str) -> Result<(SharedSession, CardId), ApiError> {
        let card_id = parse_card_id(card_id)?;
        Ok((self.store.find_by_card(card_id)?, card_id))
    }

    /// `POST session`
    #[instrument(skip(self, body), fields(repo = %body.repo_full_name))]
    pub async fn create_session(&self, body: CreateSessionRequest) -> Result<SessionResponse, ApiError> {
        let shared = self.store.create(&body.repo_full_name, self.source.as_ref()).await?;
        Ok(shared.with(|session| SessionResponse::from(&*session)))
    }

    /// `GET session/{id}`
    pub fn get_session(&self, session_id: &str) -> Result<SessionResponse, ApiError> {
        Ok(self.session(session_id)?.with(|session| SessionResponse::from(&*session)))
    }

    /// `GET session/{id}/cards/random`
    pub fn random_card(&self, session_id: &str) -> Result<CardFetch, ApiError> {
        let shared = self.session(session_id)?;
        let mut queue = self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(match shared.draw(&mut *queue) {
            Draw::Card(card) => CardFetch::Card(CardResponse::from(&card)),
            Draw::Exhausted => CardFetch::NoMoreCards,
        })
    }

    /// `POST cards/{id}/approve`
    pub fn approve_card(&self, card_id: &str) -> Result<CardActionResponse, ApiError> {
        let (shared, card_id) = self.owner_of(card_id)?;
        let status = shared.apply_approval(card_id).inspect_err(log_rejection)?;
        Ok(CardActionResponse { status, card_id })
    }

    /// `POST cards/{id}/edit`
    pub fn edit_card(&self, card_id: &str, body: EditCardRequest) -> Result<CardActionResponse, ApiError> {
        let (shared, card_id) = self.owner_of(card_id)?;
        let status = shared
            .apply_edit(card_id, &body.edited_content)
            .inspect_err(log_rejection)?;
        Ok(CardActionResponse { status, card_id })
    }

    /// `POST cards/{id}/skip`
    pub fn skip_card(&self, card_id: &str) -> Result<CardActionResponse, ApiError> {
        let (shared, card_id) = self.owner_of(card_id)?;
        let status = shared.apply_skip(card_id).inspect_err(log_rejection)?;
        Ok(CardActionResponse { status, card_id })
    }

    /// `POST session/{id}/create-pr`
    pub async fn create_pr(&self, session_id: &str) -> Result<CreatePrResponse, ApiError> {
        let shared = self.session(session_id)?;
        let result = shared
            .request_pull_request(self.submitter.as_ref(), self.submit_timeout)
            .await?;
        Ok(CreatePrResponse {
            pr_url: result.pr_url,
            branch: result.branch,
            change_count: result.change_count,
        })
    }
}

fn log_rejection(err: &SessionError) {
    if err.is_ignorable() {
        warn!(error = %err, "card action ignored");
    }
}
