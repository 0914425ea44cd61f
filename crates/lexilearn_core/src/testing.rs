//! crates/lexilearn_core/src/testing.rs
//!
//! An in-memory stand-in for the LexiLearn backend, used by the unit tests.
//! It counts calls per operation, can be told to fail an operation, and can
//! hold an operation until the test releases it so futures can be interleaved.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::domain::{
    AccessToken, Card, CardFields, CardId, Deck, DeckId, Hint, ReviewFeedback, StudyCard, User,
};
use crate::ports::{ApiError, ApiResult, AuthService, CardService, DeckService, StudyService};

pub const GOOD_PASSWORD: &str = "password123";

#[derive(Default)]
struct Backend {
    next_id: i64,
    decks: Vec<Deck>,
    cards: Vec<Card>,
    due: VecDeque<CardId>,
    hints: HashMap<CardId, String>,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, usize>,
}

impl Backend {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn recount(&mut self, deck_id: DeckId) {
        let count = self.cards.iter().filter(|c| c.deck_id == deck_id).count() as u32;
        if let Some(deck) = self.decks.iter_mut().find(|d| d.id == deck_id) {
            deck.card_count = count;
        }
    }
}

#[derive(Default)]
pub struct FakeApi {
    backend: Mutex<Backend>,
    gates: Mutex<HashMap<&'static str, Arc<Notify>>>,
}

fn server_error() -> ApiError {
    ApiError::Server {
        status: 500,
        message: "The server encountered an error. Please try again later.".to_string(),
    }
}

fn not_found() -> ApiError {
    ApiError::Validation {
        status: 404,
        message: "Not found".to_string(),
    }
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_deck(&self, name: &str) -> Deck {
        let mut backend = self.backend.lock();
        let deck = Deck {
            id: DeckId(backend.id()),
            name: name.to_string(),
            card_count: 0,
        };
        backend.decks.push(deck.clone());
        deck
    }

    /// Adds a card and makes it due.
    pub fn add_card(&self, deck_id: DeckId, question: &str, answer: &str) -> Card {
        let mut backend = self.backend.lock();
        let card = Card {
            id: CardId(backend.id()),
            deck_id,
            question: question.to_string(),
            answer: answer.to_string(),
        };
        backend.cards.push(card.clone());
        backend.due.push_back(card.id);
        backend.recount(deck_id);
        card
    }

    pub fn set_hint(&self, card_id: CardId, hint: &str) {
        self.backend.lock().hints.insert(card_id, hint.to_string());
    }

    /// Makes the next `times` calls to `op` fail with a 500.
    pub fn fail(&self, op: &'static str, times: usize) {
        self.backend.lock().failures.insert(op, times);
    }

    pub fn calls(&self, op: &'static str) -> usize {
        self.backend.lock().calls.get(op).copied().unwrap_or(0)
    }

    /// Parks every future call to `op` until the returned handle is notified
    /// (one call per `notify_one`).
    pub fn hold(&self, op: &'static str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().insert(op, gate.clone());
        gate
    }

    pub fn release(&self, op: &'static str) {
        self.gates.lock().remove(op);
    }

    async fn enter(&self, op: &'static str) -> ApiResult<()> {
        {
            let mut backend = self.backend.lock();
            *backend.calls.entry(op).or_insert(0) += 1;
        }
        let gate = self.gates.lock().get(op).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let mut backend = self.backend.lock();
        match backend.failures.get_mut(op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(server_error())
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl AuthService for FakeApi {
    async fn login(&self, identifier: &str, secret: &str) -> ApiResult<AccessToken> {
        self.enter("login").await?;
        if secret != GOOD_PASSWORD {
            return Err(ApiError::Unauthorized(
                "Incorrect username or password".to_string(),
            ));
        }
        Ok(AccessToken {
            access_token: format!("token-for-{}", identifier),
            token_type: Some("bearer".to_string()),
        })
    }

    async fn signup(&self, email: &str, _password: &str) -> ApiResult<User> {
        self.enter("signup").await?;
        let mut backend = self.backend.lock();
        Ok(User {
            id: backend.id(),
            email: email.to_string(),
        })
    }
}

#[async_trait]
impl DeckService for FakeApi {
    async fn list_decks(&self) -> ApiResult<Vec<Deck>> {
        self.enter("list_decks").await?;
        Ok(self.backend.lock().decks.clone())
    }

    async fn get_deck(&self, deck_id: DeckId) -> ApiResult<Deck> {
        self.enter("get_deck").await?;
        let backend = self.backend.lock();
        backend
            .decks
            .iter()
            .find(|d| d.id == deck_id)
            .cloned()
            .ok_or_else(not_found)
    }

    async fn create_deck(&self, name: &str) -> ApiResult<Deck> {
        self.enter("create_deck").await?;
        Ok(self.add_deck(name))
    }

    async fn update_deck(&self, deck_id: DeckId, name: &str) -> ApiResult<Deck> {
        self.enter("update_deck").await?;
        let mut backend = self.backend.lock();
        let deck = backend
            .decks
            .iter_mut()
            .find(|d| d.id == deck_id)
            .ok_or_else(not_found)?;
        deck.name = name.to_string();
        Ok(deck.clone())
    }

    async fn delete_deck(&self, deck_id: DeckId) -> ApiResult<()> {
        self.enter("delete_deck").await?;
        let mut backend = self.backend.lock();
        backend.decks.retain(|d| d.id != deck_id);
        backend.cards.retain(|c| c.deck_id != deck_id);
        Ok(())
    }
}

#[async_trait]
impl CardService for FakeApi {
    async fn list_cards(&self, deck_id: DeckId) -> ApiResult<Vec<Card>> {
        self.enter("list_cards").await?;
        let backend = self.backend.lock();
        Ok(backend
            .cards
            .iter()
            .filter(|c| c.deck_id == deck_id)
            .cloned()
            .collect())
    }

    async fn create_card(&self, deck_id: DeckId, fields: &CardFields) -> ApiResult<Card> {
        self.enter("create_card").await?;
        Ok(self.add_card(deck_id, &fields.question, &fields.answer))
    }

    async fn update_card(&self, card_id: CardId, fields: &CardFields) -> ApiResult<Card> {
        self.enter("update_card").await?;
        let mut backend = self.backend.lock();
        let card = backend
            .cards
            .iter_mut()
            .find(|c| c.id == card_id)
            .ok_or_else(not_found)?;
        card.question = fields.question.clone();
        card.answer = fields.answer.clone();
        Ok(card.clone())
    }

    async fn delete_card(&self, card_id: CardId) -> ApiResult<()> {
        self.enter("delete_card").await?;
        let mut backend = self.backend.lock();
        let deck_id = backend
            .cards
            .iter()
            .find(|c| c.id == card_id)
            .map(|c| c.deck_id)
            .ok_or_else(not_found)?;
        backend.cards.retain(|c| c.id != card_id);
        backend.due.retain(|id| *id != card_id);
        backend.recount(deck_id);
        Ok(())
    }
}

#[async_trait]
impl StudyService for FakeApi {
    async fn next_card(&self, deck_id: DeckId) -> ApiResult<Option<StudyCard>> {
        self.enter("next_card").await?;
        let backend = self.backend.lock();
        Ok(backend
            .due
            .iter()
            .filter_map(|id| backend.cards.iter().find(|c| c.id == *id))
            .find(|c| c.deck_id == deck_id)
            .map(StudyCard::from))
    }

    /// Grades case-insensitively and takes the card off the due queue.
    async fn review_card(&self, card_id: CardId, user_answer: &str) -> ApiResult<ReviewFeedback> {
        self.enter("review_card").await?;
        let mut backend = self.backend.lock();
        let answer = backend
            .cards
            .iter()
            .find(|c| c.id == card_id)
            .map(|c| c.answer.clone())
            .ok_or_else(not_found)?;
        backend.due.retain(|id| *id != card_id);
        Ok(ReviewFeedback {
            was_correct: user_answer.trim().eq_ignore_ascii_case(answer.trim()),
            correct_answer: answer,
        })
    }

    async fn hint(&self, card_id: CardId) -> ApiResult<Hint> {
        self.enter("hint").await?;
        let backend = self.backend.lock();
        let hint = backend
            .hints
            .get(&card_id)
            .cloned()
            .unwrap_or_else(|| "Think about greetings.".to_string());
        Ok(Hint { hint })
    }
}
