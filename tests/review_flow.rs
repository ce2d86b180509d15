use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use code_swipe::card::{CardDraft, CardError, CardId, CardState};
use code_swipe::controller::{Action, ReviewController, ReviewState, SubmitOutcome};
use code_swipe::queue::{CardQueue, Draw};
use code_swipe::session::{Session, SessionError, SessionStore};
use code_swipe::submit::{ChangeSet, PullRequestSubmitter, SubmitError};

#[derive(Default)]
struct RecordingSubmitter {
    submitted: Mutex<Vec<ChangeSet>>,
}

#[async_trait]
impl PullRequestSubmitter for RecordingSubmitter {
    fn name(&self) -> &str {
        "recording"
    }

    async fn submit(&self, changes: &ChangeSet) -> Result<String, SubmitError> {
        self.submitted.lock().unwrap().push(changes.clone());
        Ok(format!("https://github.com/{}/pull/1", changes.repo))
    }
}

fn draft(path: &str, content: &str) -> CardDraft {
    CardDraft {
        file_path: path.to_string(),
        start_line: 1,
        end_line: content.lines().count(),
        ast_signature: format!("def {}()", path.trim_end_matches(".py")),
        original_content: content.to_string(),
    }
}

/// Session with cards A, B, C (in a.py, b.py, c.py).
fn abc_session() -> (Session, CardId, CardId, CardId) {
    let session = Session::new(
        "octo/widgets".parse().unwrap(),
        vec![
            draft("a.py", "def a():\n    return 1"),
            draft("b.py", "def b():\n    return 2"),
            draft("c.py", "def c():\n    return 3"),
        ],
    );
    let id_of = |path: &str| {
        session
            .cards()
            .find(|card| card.file_path() == path)
            .map(|card| card.id())
            .unwrap()
    };
    let (a, b, c) = (id_of("a.py"), id_of("b.py"), id_of("c.py"));
    (session, a, b, c)
}

#[tokio::test]
async fn approve_edit_skip_then_submit() {
    let (mut session, a, b, c) = abc_session();
    let mut queue = CardQueue::seeded(2024);

    session.apply_approval(a).unwrap();
    let progress = session.progress();
    assert_eq!((progress.total, progress.processed, progress.approved_count), (3, 1, 1));

    session.apply_edit(b, "x=1").unwrap();
    let progress = session.progress();
    assert_eq!((progress.processed, progress.edited_count), (2, 1));

    let next = queue.next(&session).into_card().unwrap();
    assert_eq!(next.id(), c);

    session.apply_skip(c).unwrap();
    assert!(session.is_complete());
    assert_eq!(queue.next(&session), Draw::Exhausted);

    let submitter = RecordingSubmitter::default();
    let result = session
        .request_pull_request(&submitter, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(result.change_count, 2);

    let submitted = submitter.submitted.lock().unwrap();
    assert_eq!(submitted.len(), 1);
    let changes = &submitted[0].changes;
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].card_id, a);
    assert_eq!(changes[0].file_path, "a.py");
    assert_eq!(changes[0].content, "def a():\n    return 1");
    assert_eq!(changes[1].card_id, b);
    assert_eq!(changes[1].content, "x=1");
    assert!(changes.iter().all(|change| change.card_id != c));
}

#[tokio::test]
async fn all_skipped_has_nothing_to_submit() {
    let (mut session, a, b, c) = abc_session();
    for id in [a, b, c] {
        session.apply_skip(id).unwrap();
    }
    let err = session
        .request_pull_request(&RecordingSubmitter::default(), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NoChangesToSubmit));
}

#[test]
fn approving_twice_counts_once() {
    let (mut session, a, _, _) = abc_session();
    session.apply_approval(a).unwrap();
    let err = session.apply_approval(a).unwrap_err();
    assert!(matches!(err, SessionError::Card(CardError::InvalidTransition { .. })));
    assert_eq!(session.progress().approved_count, 1);
}

#[test]
fn processed_matches_non_pending_cards() {
    let (mut session, a, b, c) = abc_session();
    let steps: [(CardId, Action); 5] = [
        (a, Action::Edit("   ".to_string())),
        (a, Action::Skip),
        (b, Action::Approve),
        (a, Action::Approve),
        (c, Action::Edit("y = 3".to_string())),
    ];
    for (id, action) in steps {
        let _ = match action {
            Action::Approve => session.apply_approval(id),
            Action::Edit(content) => session.apply_edit(id, &content),
            Action::Skip => session.apply_skip(id),
        };
        let non_pending = session.cards().filter(|card| card.state() != CardState::Pending).count();
        assert_eq!(session.progress().processed, non_pending);
    }
    assert!(session.is_complete());
}

#[test]
fn controller_reviews_whole_session() {
    let (session, _, _, _) = abc_session();
    let store = Arc::new(SessionStore::new());
    let session_id = store.insert(session).id();
    let mut controller = ReviewController::with_queue(
        store.clone(),
        Arc::new(RecordingSubmitter::default()),
        CardQueue::seeded(1),
    );

    controller.start(session_id).unwrap();
    let mut reviewed = Vec::new();
    while let ReviewState::Showing(card) = controller.state() {
        let card_id = card.id();
        reviewed.push(card_id);
        let outcome = controller.submit(card_id, Action::Approve).unwrap();
        assert!(matches!(outcome, SubmitOutcome::Applied(CardState::Approved)));

        let again = controller.submit(card_id, Action::Skip).unwrap();
        assert!(matches!(again, SubmitOutcome::Ignored(_)));
    }

    assert_eq!(controller.state(), &ReviewState::Exhausted);
    reviewed.sort();
    reviewed.dedup();
    assert_eq!(reviewed.len(), 3);
    assert_eq!(controller.progress().unwrap().approved_count, 3);
}
