use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::card::{Card, CardId, CardState};
use crate::config::DEFAULT_TIMEOUT_SECS;
use crate::queue::{CardQueue, Draw};
use crate::session::{Progress, PullRequestResult, SessionError, SessionId, SessionStore, SharedSession, StoreError};
use crate::submit::PullRequestSubmitter;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("No session loaded; call start() first")]
    NotStarted,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// A reviewer's verdict on the card in front of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Approve,
    Edit(String),
    Skip,
}

impl Action {
    pub fn kind(&self) -> CardState {
        match self {
            Action::Approve => CardState::Approved,
            Action::Edit(_) => CardState::Edited,
            Action::Skip => CardState::Skipped,
        }
    }
}

/// Where the review currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewState {
    Idle,
    Loading,
    Showing(Card),
    Submitting { card_id: CardId, action: CardState },
    Exhausted,
}

/// Why a submitted action was dropped.
#[derive(Debug, Error)]
pub enum IgnoreReason {
    /// The action named a card other than the one on screen.
    #[error("Card {card_id} is not the card on screen")]
    NotShown { card_id: CardId },

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// What happened to a submitted action.
#[derive(Debug)]
pub enum SubmitOutcome {
    Applied(CardState),
    /// Nothing changed. A card that is not on screen leaves the view as it
    /// was; a shown card that was already reviewed refreshes it.
    Ignored(IgnoreReason),
}

/// Drives one reviewer through one session, one card at a time.
///
/// All review state lives in the controller instance, so several controllers
/// can run against the same store side by side. Input handling is left to
/// whatever presentation layer calls [`ReviewController::start`] and
/// [`ReviewController::submit`].
pub struct ReviewController<R = StdRng> {
    store: Arc<SessionStore>,
    submitter: Arc<dyn PullRequestSubmitter>,
    queue: CardQueue<R>,
    submit_timeout: Duration,
    session: Option<SharedSession>,
    state: ReviewState,
}

impl ReviewController<StdRng> {
    pub fn new(store: Arc<SessionStore>, submitter: Arc<dyn PullRequestSubmitter>) -> Self {
        Self::with_queue(store, submitter, CardQueue::new())
    }
}

impl<R: Rng> ReviewController<R> {
    pub fn with_queue(
        store: Arc<SessionStore>,
        submitter: Arc<dyn PullRequestSubmitter>,
        queue: CardQueue<R>,
    ) -> Self {
        Self {
            store,
            submitter,
            queue,
            submit_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            session: None,
            state: ReviewState::Idle,
        }
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn state(&self) -> &ReviewState {
        &self.state
    }

    pub fn current_card(&self) -> Option<&Card> {
        match &self.state {
            ReviewState::Showing(card) => Some(card),
            _ => None,
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(SharedSession::id)
    }

    fn session(&self) -> Result<&SharedSession, ControllerError> {
        self.session.as_ref().ok_or(ControllerError::NotStarted)
    }

    pub fn progress(&self) -> Result<Progress, ControllerError> {
        Ok(self.session()?.progress())
    }

    pub fn is_complete(&self) -> Result<bool, ControllerError> {
        Ok(self.session()?.is_complete())
    }

    /// Load a session and show its first card, or go straight to `Exhausted`.
    #[instrument(skip(self))]
    pub fn start(&mut self, session_id: SessionId) -> Result<&ReviewState, ControllerError> {
        self.state = ReviewState::Loading;
        let session = match self.store.get(session_id) {
            Ok(session) => session,
            Err(e) => {
                self.state = ReviewState::Idle;
                return Err(e.into());
            }
        };
        info!(progress = ?session.progress(), "review started");
        self.session = Some(session);
        self.advance()?;
        Ok(&self.state)
    }

    /// Apply `action` to the shown card `card_id`, then draw a fresh card.
    ///
    /// `card_id` is the card the caller was looking at. If it is not the card
    /// on screen (a double submit, or a stale view) the action is dropped and
    /// the view kept. If the shown card is no longer pending because another
    /// reviewer got there first, the action is dropped and the view
    /// refreshed. Blank edits are returned as errors and the card stays on
    /// screen.
    #[instrument(skip(self, action), fields(card = %card_id, action = %action.kind()))]
    pub fn submit(&mut self, card_id: CardId, action: Action) -> Result<SubmitOutcome, ControllerError> {
        let session = self.session()?.clone();
        if self.current_card().map(Card::id) != Some(card_id) {
            warn!("card is not on screen, action ignored");
            return Ok(SubmitOutcome::Ignored(IgnoreReason::NotShown { card_id }));
        }
        let previous = std::mem::replace(
            &mut self.state,
            ReviewState::Submitting {
                card_id,
                action: action.kind(),
            },
        );

        let applied = match &action {
            Action::Approve => session.apply_approval(card_id),
            Action::Edit(content) => session.apply_edit(card_id, content),
            Action::Skip => session.apply_skip(card_id),
        };

        match applied {
            Ok(state) => {
                debug!(%state, "action applied");
                self.advance()?;
                Ok(SubmitOutcome::Applied(state))
            }
            Err(e) if e.is_ignorable() => {
                warn!(error = %e, "action ignored");
                self.refresh(previous)?;
                Ok(SubmitOutcome::Ignored(e.into()))
            }
            Err(e) => {
                self.state = previous;
                Err(e.into())
            }
        }
    }

    /// Keep showing the previous card if it is still pending, otherwise draw.
    fn refresh(&mut self, previous: ReviewState) -> Result<(), ControllerError> {
        let still_pending = match &previous {
            ReviewState::Showing(card) => self
                .session()?
                .with(|session| session.card(card.id()).is_some_and(Card::is_pending)),
            _ => false,
        };
        if still_pending {
            self.state = previous;
            Ok(())
        } else {
            self.advance()
        }
    }

    fn advance(&mut self) -> Result<(), ControllerError> {
        let session = self.session()?.clone();
        self.state = match session.draw(&mut self.queue) {
            Draw::Card(card) => {
                debug!(card = %card.id(), file = %card.file_path(), "showing card");
                ReviewState::Showing(card)
            }
            Draw::Exhausted => {
                info!("no more cards to review");
                ReviewState::Exhausted
            }
        };
        Ok(())
    }

    /// Submit the session's approved and edited cards as a pull request.
    /// The review state is untouched whatever the outcome.
    pub async fn request_pull_request(&self) -> Result<PullRequestResult, ControllerError> {
        let session = self.session()?;
        Ok(session
            .request_pull_request(self.submitter.as_ref(), self.submit_timeout)
            .await?)
    }

    /// Leave the review. An unfinished session is marked abandoned.
    pub fn exit(&mut self) {
        if let Some(session) = self.session.take() {
            if !session.is_complete() {
                session.abandon();
            }
        }
        self.state = ReviewState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::CardError;
    use crate::session::tests::test_session;
    use crate::session::SessionStatus;
    use crate::submit::tests::RecordingSubmitter;

    fn controller_for(n: usize) -> (ReviewController, SessionId, Arc<SessionStore>) {
        let store = Arc::new(SessionStore::new());
        let session_id = store.insert(test_session(n)).id();
        let controller = ReviewController::with_queue(
            store.clone(),
            Arc::new(RecordingSubmitter::default()),
            CardQueue::seeded(5),
        );
        (controller, session_id, store)
    }

    fn shown(controller: &ReviewController) -> CardId {
        controller.current_card().expect("a card is shown").id()
    }

    #[test]
    fn test_start_shows_a_card() {
        let (mut controller, session_id, _) = controller_for(2);
        assert_eq!(controller.state(), &ReviewState::Idle);
        controller.start(session_id).unwrap();
        assert!(matches!(controller.state(), ReviewState::Showing(card) if card.is_pending()));
        assert_eq!(controller.session_id(), Some(session_id));
    }

    #[test]
    fn test_start_empty_session_is_exhausted() {
        let (mut controller, session_id, _) = controller_for(0);
        controller.start(session_id).unwrap();
        assert_eq!(controller.state(), &ReviewState::Exhausted);
        assert!(controller.is_complete().unwrap());
    }

    #[test]
    fn test_start_unknown_session() {
        let (mut controller, _, _) = controller_for(1);
        let err = controller.start(SessionId::new()).unwrap_err();
        assert!(matches!(err, ControllerError::Store(StoreError::SessionNotFound(_))));
        assert_eq!(controller.state(), &ReviewState::Idle);
    }

    #[test]
    fn test_submit_before_start() {
        let (mut controller, _, _) = controller_for(1);
        let err = controller.submit(CardId::new(), Action::Approve).unwrap_err();
        assert!(matches!(err, ControllerError::NotStarted));
    }

    #[test]
    fn test_submit_walks_to_exhaustion() {
        let (mut controller, session_id, _) = controller_for(3);
        controller.start(session_id).unwrap();

        let actions = [Action::Approve, Action::Edit("x=1".to_string()), Action::Skip];
        for action in actions {
            let card_id = shown(&controller);
            let outcome = controller.submit(card_id, action).unwrap();
            assert!(matches!(outcome, SubmitOutcome::Applied(_)));
        }

        assert_eq!(controller.state(), &ReviewState::Exhausted);
        let progress = controller.progress().unwrap();
        assert_eq!((progress.approved_count, progress.edited_count, progress.skipped_count), (1, 1, 1));
    }

    #[test]
    fn test_double_submit_is_ignored() {
        let (mut controller, session_id, _) = controller_for(3);
        controller.start(session_id).unwrap();
        let first = shown(&controller);

        controller.submit(first, Action::Approve).unwrap();
        let next = shown(&controller);
        assert_ne!(next, first);

        let outcome = controller.submit(first, Action::Approve).unwrap();
        assert!(matches!(
            outcome,
            SubmitOutcome::Ignored(IgnoreReason::NotShown { card_id }) if card_id == first
        ));
        assert_eq!(shown(&controller), next);
        assert_eq!(controller.progress().unwrap().approved_count, 1);
    }

    #[test]
    fn test_foreign_card_is_ignored() {
        let (mut controller, session_id, _) = controller_for(2);
        controller.start(session_id).unwrap();
        let showing = shown(&controller);

        let outcome = controller.submit(CardId::new(), Action::Skip).unwrap();
        assert!(matches!(outcome, SubmitOutcome::Ignored(IgnoreReason::NotShown { .. })));
        assert_eq!(shown(&controller), showing);
        assert_eq!(controller.progress().unwrap().processed, 0);
    }

    #[test]
    fn test_pending_card_off_screen_is_ignored() {
        let (mut controller, session_id, store) = controller_for(3);
        controller.start(session_id).unwrap();
        let showing = shown(&controller);
        let other = store
            .get(session_id)
            .unwrap()
            .snapshot()
            .cards()
            .map(Card::id)
            .find(|id| *id != showing)
            .unwrap();

        let outcome = controller.submit(other, Action::Approve).unwrap();
        assert!(matches!(
            outcome,
            SubmitOutcome::Ignored(IgnoreReason::NotShown { card_id }) if card_id == other
        ));
        assert_eq!(shown(&controller), showing);

        let snapshot = store.get(session_id).unwrap().snapshot();
        assert!(snapshot.card(other).unwrap().is_pending());
        assert!(snapshot.card(showing).unwrap().is_pending());
        assert_eq!(controller.progress().unwrap().processed, 0);
    }

    #[test]
    fn test_submit_after_exhaustion_is_ignored() {
        let (mut controller, session_id, _) = controller_for(1);
        controller.start(session_id).unwrap();
        let only = shown(&controller);
        controller.submit(only, Action::Skip).unwrap();
        assert_eq!(controller.state(), &ReviewState::Exhausted);

        let outcome = controller.submit(only, Action::Approve).unwrap();
        assert!(matches!(outcome, SubmitOutcome::Ignored(IgnoreReason::NotShown { .. })));
        assert_eq!(controller.state(), &ReviewState::Exhausted);
        assert_eq!(controller.progress().unwrap().approved_count, 0);
    }

    #[test]
    fn test_card_reviewed_elsewhere_refreshes_view() {
        let (mut controller, session_id, store) = controller_for(2);
        controller.start(session_id).unwrap();
        let showing = shown(&controller);

        store.get(session_id).unwrap().apply_skip(showing).unwrap();
        let outcome = controller.submit(showing, Action::Approve).unwrap();
        assert!(matches!(
            outcome,
            SubmitOutcome::Ignored(IgnoreReason::Session(SessionError::Card(CardError::InvalidTransition { .. })))
        ));
        let now = shown(&controller);
        assert_ne!(now, showing);
        assert_eq!(controller.progress().unwrap().skipped_count, 1);
        assert_eq!(controller.progress().unwrap().approved_count, 0);
    }

    #[test]
    fn test_blank_edit_keeps_card() {
        let (mut controller, session_id, _) = controller_for(2);
        controller.start(session_id).unwrap();
        let showing = shown(&controller);

        let err = controller.submit(showing, Action::Edit(" \n ".to_string())).unwrap_err();
        assert!(matches!(err, ControllerError::Session(SessionError::Card(CardError::EmptyContent))));
        assert_eq!(shown(&controller), showing);
    }

    #[test]
    fn test_controllers_are_independent() {
        let (mut first, first_id, store) = controller_for(1);
        let second_id = store.insert(test_session(2)).id();
        let mut second = ReviewController::with_queue(
            store.clone(),
            Arc::new(RecordingSubmitter::default()),
            CardQueue::seeded(9),
        );
        first.start(first_id).unwrap();
        second.start(second_id).unwrap();

        let card = shown(&first);
        first.submit(card, Action::Skip).unwrap();
        assert_eq!(first.state(), &ReviewState::Exhausted);
        assert!(matches!(second.state(), ReviewState::Showing(_)));
        assert_eq!(second.progress().unwrap().processed, 0);
    }

    #[tokio::test]
    async fn test_request_pull_request_after_review() {
        let (mut controller, session_id, store) = controller_for(2);
        controller.start(session_id).unwrap();
        let card = shown(&controller);
        controller.submit(card, Action::Edit("x=1".to_string())).unwrap();

        let result = controller.request_pull_request().await.unwrap();
        assert_eq!(result.change_count, 1);
        assert_eq!(store.get(session_id).unwrap().snapshot().status(), SessionStatus::Completed);
        assert!(matches!(controller.state(), ReviewState::Showing(_)));
    }

    #[test]
    fn test_exit_abandons_unfinished_session() {
        let (mut controller, session_id, store) = controller_for(2);
        controller.start(session_id).unwrap();
        controller.exit();
        assert_eq!(controller.state(), &ReviewState::Idle);
        assert_eq!(store.get(session_id).unwrap().snapshot().status(), SessionStatus::Abandoned);
    }
}
