use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::card::Card;
use crate::session::Session;

/// Result of asking the queue for the next card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Draw {
    Card(Card),
    /// No pending card remains in the session.
    Exhausted,
}

impl Draw {
    pub fn into_card(self) -> Option<Card> {
        match self {
            Draw::Card(card) => Some(card),
            Draw::Exhausted => None,
        }
    }
}

/// Picks the next card uniformly at random among the session's pending cards.
///
/// The eligible set is recomputed from card states on every call; the queue
/// keeps no record of what it has served, only its random source.
#[derive(Debug)]
pub struct CardQueue<R = StdRng> {
    rng: R,
}

impl CardQueue<StdRng> {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for CardQueue<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> CardQueue<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    pub fn next(&mut self, session: &Session) -> Draw {
        let pending: Vec<&Card> = session.cards().filter(|card| card.is_pending()).collect();
        match pending.choose(&mut self.rng) {
            Some(card) => Draw::Card((*card).clone()),
            None => Draw::Exhausted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::tests::test_draft;
    use crate::card::CardId;
    use std::collections::HashSet;

    fn session_with(n: usize) -> Session {
        let drafts = (1..=n)
            .map(|i| test_draft("src/lib.py", i * 10, i * 10 + 5, "pass"))
            .collect();
        Session::new("org/repo".parse().unwrap(), drafts)
    }

    #[test]
    fn test_empty_session_is_exhausted() {
        let session = session_with(0);
        let mut queue = CardQueue::seeded(7);
        assert_eq!(queue.next(&session), Draw::Exhausted);
    }

    #[test]
    fn test_never_returns_non_pending_card() {
        let mut session = session_with(5);
        let mut queue = CardQueue::seeded(42);
        let mut served = HashSet::new();

        while let Draw::Card(card) = queue.next(&session) {
            assert!(card.is_pending());
            assert!(served.insert(card.id()), "card served twice after leaving pending");
            session.apply_skip(card.id()).unwrap();
        }

        assert_eq!(served.len(), 5);
        for _ in 0..10 {
            assert_eq!(queue.next(&session), Draw::Exhausted);
        }
    }

    #[test]
    fn test_returns_the_last_pending_card() {
        let mut session = session_with(3);
        let ids: Vec<CardId> = session.cards().map(|c| c.id()).collect();
        session.apply_approval(ids[0]).unwrap();
        session.apply_edit(ids[2], "x=1").unwrap();

        let mut queue = CardQueue::seeded(1);
        for _ in 0..20 {
            assert_eq!(queue.next(&session).into_card().map(|c| c.id()), Some(ids[1]));
        }
    }

    #[test]
    fn test_selection_covers_all_pending_cards() {
        let session = session_with(4);
        let mut queue = CardQueue::seeded(3);
        let seen: HashSet<CardId> = (0..200)
            .filter_map(|_| queue.next(&session).into_card())
            .map(|c| c.id())
            .collect();
        assert_eq!(seen.len(), 4);
    }
}
