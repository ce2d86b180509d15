use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{info, instrument};

use super::{submit_with_timeout, Progress, PullRequestResult, Session, SessionError, SessionId};
use crate::card::{CardId, CardState};
use crate::queue::{CardQueue, Draw};
use crate::submit::PullRequestSubmitter;

/// A session guarded by its own mutex.
///
/// Every card transition runs under the lock, so the pending check and the
/// state change cannot interleave between concurrent callers. The lock is
/// never held across an `.await`.
#[derive(Debug, Clone)]
pub struct SharedSession {
    id: SessionId,
    inner: Arc<Mutex<Session>>,
}

impl SharedSession {
    pub fn new(session: Session) -> Self {
        Self {
            id: session.id(),
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    // Transitions are all-or-nothing, so a guard recovered from a poisoned
    // lock still sees a consistent session.
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` with exclusive access to the session.
    pub fn with<T>(&self, f: impl FnOnce(&mut Session) -> T) -> T {
        f(&mut self.lock())
    }

    pub fn snapshot(&self) -> Session {
        self.lock().clone()
    }

    pub fn contains(&self, card_id: CardId) -> bool {
        self.lock().contains(card_id)
    }

    pub fn apply_approval(&self, card_id: CardId) -> Result<CardState, SessionError> {
        self.lock().apply_approval(card_id)
    }

    pub fn apply_edit(&self, card_id: CardId, content: &str) -> Result<CardState, SessionError> {
        self.lock().apply_edit(card_id, content)
    }

    pub fn apply_skip(&self, card_id: CardId) -> Result<CardState, SessionError> {
        self.lock().apply_skip(card_id)
    }

    pub fn progress(&self) -> Progress {
        self.lock().progress()
    }

    pub fn is_complete(&self) -> bool {
        self.lock().is_complete()
    }

    pub fn abandon(&self) {
        self.lock().abandon();
    }

    pub fn draw<R: rand::Rng>(&self, queue: &mut CardQueue<R>) -> Draw {
        queue.next(&self.lock())
    }

    /// Submit approved and edited cards as a pull request.
    ///
    /// The change set is taken under the lock, the submitter runs unlocked,
    /// and the resulting PR url is recorded under the lock again. Reviews
    /// applied while the submitter is in flight are not part of this PR.
    #[instrument(skip(self, submitter), fields(session = %self.id))]
    pub async fn request_pull_request(
        &self,
        submitter: &dyn PullRequestSubmitter,
        timeout: Duration,
    ) -> Result<PullRequestResult, SessionError> {
        let changes = self.lock().change_set()?;
        let pr_url = submit_with_timeout(&changes, submitter, timeout).await?;
        self.lock().record_submission(&pr_url);
        info!(%pr_url, "session marked completed");
        Ok(PullRequestResult {
            pr_url,
            branch: changes.branch_name,
            change_count: changes.changes.len(),
        })
    }
}
