use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::{info, instrument};

use super::{Session, SessionId, SharedSession, DEFAULT_BRANCH_PREFIX};
use crate::card::CardId;
use crate::source::{CardSource, SourceError};
use crate::submit::{InvalidRepoName, RepoName};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Card not found: {0}")]
    CardNotFound(CardId),

    #[error(transparent)]
    InvalidRepo(#[from] InvalidRepoName),

    #[error("Card extraction failed: {0}")]
    Source(#[from] SourceError),
}

/// In-memory registry of live sessions, each behind its own lock.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SharedSession>>,
    branch_prefix: String,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_branch_prefix(DEFAULT_BRANCH_PREFIX)
    }

    pub fn with_branch_prefix(prefix: impl Into<String>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            branch_prefix: prefix.into(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionId, SharedSession>> {
        self.sessions.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionId, SharedSession>> {
        self.sessions.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create a session for `repo_full_name`, populated by `source`.
    #[instrument(skip(self, source), fields(source = source.name()))]
    pub async fn create(
        &self,
        repo_full_name: &str,
        source: &dyn CardSource,
    ) -> Result<SharedSession, StoreError> {
        let repo: RepoName = repo_full_name.parse()?;
        let drafts = source.extract(&repo).await?;
        let session = Session::with_branch_prefix(repo, drafts, &self.branch_prefix);
        info!(session = %session.id(), cards = session.progress().total, "session created");
        Ok(self.insert(session))
    }

    pub fn insert(&self, session: Session) -> SharedSession {
        let shared = SharedSession::new(session);
        self.write().insert(shared.id(), shared.clone());
        shared
    }

    pub fn get(&self, id: SessionId) -> Result<SharedSession, StoreError> {
        self.read().get(&id).cloned().ok_or(StoreError::SessionNotFound(id))
    }

    /// Locate the session owning `card_id`.
    pub fn find_by_card(&self, card_id: CardId) -> Result<SharedSession, StoreError> {
        self.read()
            .values()
            .find(|session| session.contains(card_id))
            .cloned()
            .ok_or(StoreError::CardNotFound(card_id))
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
