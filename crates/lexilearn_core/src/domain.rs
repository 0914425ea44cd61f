//! crates/lexilearn_core/src/domain.rs
//!
//! Defines the core data structures exchanged with the LexiLearn backend.
//! Every business field (card counts, correctness, hints) is produced by the
//! server; the client only carries these values around.

use serde::{Deserialize, Serialize};
use std::fmt;

//=========================================================================================
// Identifiers
//=========================================================================================

/// Server-assigned identifier of a deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeckId(pub i64);

/// Server-assigned identifier of a card. This is the join key for every
/// update, delete, review and hint call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(pub i64);

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//=========================================================================================
// Authentication
//=========================================================================================

/// An opaque bearer token. Present means the user is authenticated.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for the `Authorization` header and durable storage only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

// Tokens never end up in logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Body of a successful `POST /users/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// The account returned by `POST /users/signup`. The client only cares that
/// the call succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
}

//=========================================================================================
// Decks and Cards
//=========================================================================================

/// A named collection of cards. `card_count` is a server-side projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    pub id: DeckId,
    pub name: String,
    pub card_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub deck_id: DeckId,
    pub question: String,
    pub answer: String,
}

/// The editable fields of a card, sent on create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardFields {
    pub question: String,
    pub answer: String,
}

impl CardFields {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

//=========================================================================================
// Study Session
//=========================================================================================

/// The card currently under review. The answer is deliberately not carried,
/// even if the server includes it, so it can only be learned from feedback.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StudyCard {
    pub id: CardId,
    pub question: String,
    #[serde(default)]
    pub deck_id: Option<DeckId>,
}

impl From<&Card> for StudyCard {
    fn from(card: &Card) -> Self {
        Self {
            id: card.id,
            question: card.question.clone(),
            deck_id: Some(card.deck_id),
        }
    }
}

/// The server's verdict on one submitted answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewFeedback {
    pub was_correct: bool,
    pub correct_answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub hint: String,
}
