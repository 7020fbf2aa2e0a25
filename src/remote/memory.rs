//! In-process card service.
//!
//! Behaves like the remote API (create + list, no update) and supports
//! failure injection and artificial latency, so sync runs can be driven
//! deterministically without a network.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{
    CardContent, RemoteCard, RemoteCardMaintenance, RemoteCardService, RemoteError, RemoteResult,
};

#[derive(Debug, Default)]
struct State {
    cards: Vec<RemoteCard>,
    next_id: u64,
    version: u64,
    /// Errors returned by the next `create_card` calls, in order.
    queued_create_failures: VecDeque<RemoteError>,
    /// `(needle, error)`: creates whose content contains `needle` fail.
    content_failures: Vec<(String, RemoteError)>,
    list_failure: Option<RemoteError>,
    create_calls: usize,
    list_calls: usize,
}

/// In-memory stand-in for the remote card service.
#[derive(Debug, Default)]
pub struct InMemoryCardService {
    state: Mutex<State>,
    create_delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryCardService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every `create_card` call (to exercise timeouts and parallelism).
    #[must_use]
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic while holding the lock only happens in a failing test.
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn stamp(state: &mut State) -> String {
        state.version += 1;
        format!("v{}", state.version)
    }

    /// Add a card as if someone created it directly on the remote.
    pub fn insert_card(&self, deck_id: &str, content: &str, tags: &[&str]) -> RemoteCard {
        let mut state = self.lock();
        state.next_id += 1;
        let card = RemoteCard {
            id: format!("card{}", state.next_id),
            deck_id: deck_id.to_string(),
            content: content.to_string(),
            name: None,
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            updated_at: Some(Self::stamp(&mut state)),
        };
        state.cards.push(card.clone());
        card
    }

    /// Edit a card's content as if changed in the remote UI.
    pub fn edit_card(&self, card_id: &str, content: &str) -> bool {
        let mut state = self.lock();
        let stamp = Self::stamp(&mut state);
        match state.cards.iter_mut().find(|c| c.id == card_id) {
            Some(card) => {
                card.content = content.to_string();
                card.updated_at = Some(stamp);
                true
            }
            None => false,
        }
    }

    /// Remove a card as if deleted in the remote UI.
    pub fn remove_card(&self, card_id: &str) -> bool {
        let mut state = self.lock();
        let before = state.cards.len();
        state.cards.retain(|c| c.id != card_id);
        state.cards.len() != before
    }

    /// Fail the next `create_card` call with `error`.
    pub fn fail_next_create(&self, error: RemoteError) {
        self.lock().queued_create_failures.push_back(error);
    }

    /// Fail every create whose content contains `needle`.
    pub fn fail_creates_containing(&self, needle: &str, error: RemoteError) {
        self.lock().content_failures.push((needle.to_string(), error));
    }

    /// Fail every `list_cards` call until cleared.
    pub fn fail_list(&self, error: Option<RemoteError>) {
        self.lock().list_failure = error;
    }

    #[must_use]
    pub fn get_card(&self, card_id: &str) -> Option<RemoteCard> {
        self.lock().cards.iter().find(|c| c.id == card_id).cloned()
    }

    #[must_use]
    pub fn cards_in(&self, deck_id: &str) -> Vec<RemoteCard> {
        self.lock()
            .cards
            .iter()
            .filter(|c| c.deck_id == deck_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.lock().create_calls
    }

    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    /// Highest number of concurrently running `create_card` calls seen.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn try_create(&self, deck_id: &str, content: &CardContent) -> RemoteResult<RemoteCard> {
        let mut state = self.lock();
        state.create_calls += 1;

        if let Some(err) = state.queued_create_failures.pop_front() {
            return Err(err);
        }
        if let Some((_, err)) = state
            .content_failures
            .iter()
            .find(|(needle, _)| content.content.contains(needle.as_str()))
        {
            return Err(err.clone());
        }

        state.next_id += 1;
        let card = RemoteCard {
            id: format!("card{}", state.next_id),
            deck_id: deck_id.to_string(),
            content: content.content.clone(),
            name: None,
            tags: content.tags.clone(),
            updated_at: Some(Self::stamp(&mut state)),
        };
        state.cards.push(card.clone());
        Ok(card)
    }
}

impl RemoteCardService for InMemoryCardService {
    async fn list_cards(&self, deck_id: &str) -> RemoteResult<Vec<RemoteCard>> {
        let mut state = self.lock();
        state.list_calls += 1;
        if let Some(err) = state.list_failure.clone() {
            return Err(err);
        }
        Ok(state
            .cards
            .iter()
            .filter(|c| c.deck_id == deck_id)
            .cloned()
            .collect())
    }

    async fn create_card(&self, deck_id: &str, content: &CardContent) -> RemoteResult<RemoteCard> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.try_create(deck_id, content);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl RemoteCardMaintenance for InMemoryCardService {
    async fn delete_card(&self, card_id: &str) -> RemoteResult<bool> {
        Ok(self.remove_card(card_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(text: &str) -> CardContent {
        CardContent {
            content: text.to_string(),
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let remote = InMemoryCardService::new();
        let card = remote.create_card("d1", &content("Q\n---\nA")).await.unwrap();
        remote.insert_card("d2", "other deck", &[]);

        let listed = remote.list_cards("d1").await.unwrap();
        assert_eq!(listed, vec![card]);
        assert_eq!(remote.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let remote = InMemoryCardService::new();
        remote.fail_next_create(RemoteError::Timeout);
        remote.fail_creates_containing("boom", RemoteError::Unauthorized);

        assert_eq!(
            remote.create_card("d", &content("ok")).await,
            Err(RemoteError::Timeout)
        );
        assert!(remote.create_card("d", &content("ok")).await.is_ok());
        assert_eq!(
            remote.create_card("d", &content("boom")).await,
            Err(RemoteError::Unauthorized)
        );
        assert_eq!(remote.cards_in("d").len(), 1);
    }

    #[tokio::test]
    async fn test_edit_bumps_version() {
        let remote = InMemoryCardService::new();
        let card = remote.insert_card("d", "before", &[]);
        assert!(remote.edit_card(&card.id, "after"));
        let edited = remote.get_card(&card.id).unwrap();
        assert_eq!(edited.content, "after");
        assert_ne!(edited.updated_at, card.updated_at);
    }
}
