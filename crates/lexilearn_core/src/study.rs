//! crates/lexilearn_core/src/study.rs
//!
//! The Study Session Engine: the state machine for one review session over a
//! deck.
//!
//! ```text
//! Loading --fetch_next--> Presenting --submit_answer--> Submitting --ok--> Revealed
//!    ^  \                     ^                             |                 |
//!    |   `--empty--> Exhausted `-----------failure----------'                 |
//!    `-------------------------------- advance ----------------------------------'
//! ```
//!
//! Every operation checks its precondition against the current state and is
//! rejected without side effects when it does not hold. Each card step gets a
//! fresh epoch; a response that comes back for an older epoch, or after the
//! session was abandoned, is dropped.

use parking_lot::Mutex;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{CardId, DeckId, ReviewFeedback, StudyCard};
use crate::ports::{ApiError, StudyService};

/// Shown in place of a hint when fetching one failed under `HintPolicy::Fallback`.
pub const FALLBACK_HINT: &str = "Sorry, couldn't get a hint right now.";

//=========================================================================================
// Public Types
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudyState {
    Loading,
    Presenting,
    Submitting,
    Revealed,
    /// No card is due in this deck.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudyOp {
    FetchNext,
    SubmitAnswer,
    FetchHint,
    Advance,
}

impl fmt::Display for StudyOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StudyOp::FetchNext => "fetch next card",
            StudyOp::SubmitAnswer => "submit answer",
            StudyOp::FetchHint => "fetch hint",
            StudyOp::Advance => "advance",
        };
        f.write_str(name)
    }
}

/// What happens to the hint slot when fetching a hint fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HintPolicy {
    /// Store `FALLBACK_HINT` as if it were the hint. The action is not offered again.
    #[default]
    Fallback,
    /// Mark the slot as failed and allow another attempt.
    Retryable,
}

impl FromStr for HintPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fallback" => Ok(HintPolicy::Fallback),
            "retryable" => Ok(HintPolicy::Retryable),
            other => Err(format!("'{}' is not a hint policy (fallback|retryable)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HintSlot {
    Empty,
    Pending,
    Ready(String),
    Failed,
}

impl HintSlot {
    pub fn text(&self) -> Option<&str> {
        match self {
            HintSlot::Ready(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StudyError {
    #[error("Cannot {op} while {state:?}")]
    Rejected { op: StudyOp, state: StudyState },
    #[error(transparent)]
    Api(#[from] ApiError),
    /// The response belonged to a card or session that is no longer current.
    #[error("Response arrived for a card that is no longer shown")]
    Stale,
}

/// An immutable picture of the session for presentation layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyView {
    pub deck_id: DeckId,
    pub state: StudyState,
    pub card: Option<StudyCard>,
    pub feedback: Option<ReviewFeedback>,
    pub hint: HintSlot,
    pub draft: String,
    /// Set when the last fetch or submit failed, for a retry affordance.
    pub last_error: Option<String>,
}

//=========================================================================================
// The Engine
//=========================================================================================

struct Inner {
    state: StudyState,
    card: Option<StudyCard>,
    feedback: Option<ReviewFeedback>,
    hint: HintSlot,
    draft: String,
    last_error: Option<String>,
    epoch: u64,
    fetching: bool,
}

impl Inner {
    fn clear_card(&mut self) {
        self.card = None;
        self.feedback = None;
        self.hint = HintSlot::Empty;
        self.draft.clear();
    }

    fn reject(&self, op: StudyOp) -> StudyError {
        debug!("Rejected {} while {:?}", op, self.state);
        StudyError::Rejected {
            op,
            state: self.state,
        }
    }
}

pub struct StudySession {
    deck_id: DeckId,
    api: Arc<dyn StudyService>,
    hint_policy: HintPolicy,
    cancel: CancellationToken,
    inner: Mutex<Inner>,
}

impl StudySession {
    /// Opens a session in `Loading`. Call `fetch_next` to show the first card.
    pub fn new(api: Arc<dyn StudyService>, deck_id: DeckId, hint_policy: HintPolicy) -> Self {
        Self {
            deck_id,
            api,
            hint_policy,
            cancel: CancellationToken::new(),
            inner: Mutex::new(Inner {
                state: StudyState::Loading,
                card: None,
                feedback: None,
                hint: HintSlot::Empty,
                draft: String::new(),
                last_error: None,
                epoch: 0,
                fetching: false,
            }),
        }
    }

    pub fn deck_id(&self) -> DeckId {
        self.deck_id
    }

    pub fn state(&self) -> StudyState {
        self.inner.lock().state
    }

    pub fn is_exhausted(&self) -> bool {
        self.state() == StudyState::Exhausted
    }

    pub fn view(&self) -> StudyView {
        let inner = self.inner.lock();
        StudyView {
            deck_id: self.deck_id,
            state: inner.state,
            card: inner.card.clone(),
            feedback: inner.feedback.clone(),
            hint: inner.hint.clone(),
            draft: inner.draft.clone(),
            last_error: inner.last_error.clone(),
        }
    }

    /// Records what the learner has typed so far. Cleared on every new card.
    pub fn set_draft(&self, text: &str) {
        let mut inner = self.inner.lock();
        if inner.state == StudyState::Presenting {
            inner.draft = text.to_string();
        }
    }

    /// Marks the session as left behind. Requests still in flight are not
    /// cancelled, but whatever they return is ignored.
    pub fn abandon(&self) {
        info!("Study session for deck {} abandoned", self.deck_id);
        self.cancel.cancel();
    }

    pub fn is_abandoned(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Asks the server for the next due card. `Ok(None)` means the deck is
    /// exhausted. On failure the session stays in `Loading` so it can be retried.
    pub async fn fetch_next(&self) -> Result<Option<StudyCard>, StudyError> {
        let epoch = {
            let mut inner = self.inner.lock();
            let ready = match inner.state {
                StudyState::Loading => !inner.fetching,
                StudyState::Exhausted => true,
                _ => false,
            };
            if !ready || self.is_abandoned() {
                return Err(inner.reject(StudyOp::FetchNext));
            }
            inner.state = StudyState::Loading;
            inner.fetching = true;
            inner.epoch += 1;
            inner.clear_card();
            inner.epoch
        };

        let result = self.api.next_card(self.deck_id).await;

        let mut inner = self.inner.lock();
        if self.is_abandoned() || inner.epoch != epoch {
            debug!("Discarding stale next-card response for deck {}", self.deck_id);
            return Err(StudyError::Stale);
        }
        inner.fetching = false;
        match result {
            Ok(Some(card)) => {
                debug!("Presenting card {}", card.id);
                inner.clear_card();
                inner.last_error = None;
                inner.card = Some(card.clone());
                inner.state = StudyState::Presenting;
                Ok(Some(card))
            }
            Ok(None) => {
                info!("No more due cards in deck {}", self.deck_id);
                inner.last_error = None;
                inner.state = StudyState::Exhausted;
                Ok(None)
            }
            Err(e) => {
                warn!("Failed to fetch next card for deck {}: {}", self.deck_id, e);
                inner.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Submits the learner's answer for the current card. At most one
    /// submission is accepted per card; later calls are rejected.
    pub async fn submit_answer(&self, answer: &str) -> Result<ReviewFeedback, StudyError> {
        let (epoch, card_id) = {
            let mut inner = self.inner.lock();
            let card_id = match (&inner.card, &inner.feedback, inner.state) {
                (Some(card), None, StudyState::Presenting) => card.id,
                _ => return Err(inner.reject(StudyOp::SubmitAnswer)),
            };
            if self.is_abandoned() {
                return Err(inner.reject(StudyOp::SubmitAnswer));
            }
            inner.state = StudyState::Submitting;
            inner.draft = answer.to_string();
            (inner.epoch, card_id)
        };

        let result = self.api.review_card(card_id, answer).await;

        let mut inner = self.inner.lock();
        if !self.is_current(&inner, epoch, card_id) {
            debug!("Discarding stale review of card {}", card_id);
            return Err(StudyError::Stale);
        }
        match result {
            Ok(feedback) => {
                info!(
                    "Card {} reviewed: {}",
                    card_id,
                    if feedback.was_correct { "correct" } else { "incorrect" }
                );
                inner.feedback = Some(feedback.clone());
                inner.last_error = None;
                inner.state = StudyState::Revealed;
                Ok(feedback)
            }
            Err(e) => {
                warn!("Failed to review card {}: {}", card_id, e);
                inner.last_error = Some(e.to_string());
                inner.state = StudyState::Presenting;
                Err(e.into())
            }
        }
    }

    /// Fetches the hint for the current card, at most once per card.
    pub async fn fetch_hint(&self) -> Result<String, StudyError> {
        let (epoch, card_id) = {
            let mut inner = self.inner.lock();
            let presenting = matches!(inner.state, StudyState::Presenting | StudyState::Revealed);
            let slot_open = match inner.hint {
                HintSlot::Empty => true,
                HintSlot::Failed => self.hint_policy == HintPolicy::Retryable,
                HintSlot::Pending | HintSlot::Ready(_) => false,
            };
            let card_id = match &inner.card {
                Some(card) if presenting && slot_open && !self.is_abandoned() => card.id,
                _ => return Err(inner.reject(StudyOp::FetchHint)),
            };
            inner.hint = HintSlot::Pending;
            (inner.epoch, card_id)
        };

        let result = self.api.hint(card_id).await;

        let mut inner = self.inner.lock();
        if !self.is_current(&inner, epoch, card_id) {
            debug!("Discarding stale hint for card {}", card_id);
            return Err(StudyError::Stale);
        }
        match result {
            Ok(hint) => {
                inner.hint = HintSlot::Ready(hint.hint.clone());
                Ok(hint.hint)
            }
            Err(e) => {
                warn!("Failed to fetch hint for card {}: {}", card_id, e);
                match self.hint_policy {
                    HintPolicy::Fallback => {
                        inner.hint = HintSlot::Ready(FALLBACK_HINT.to_string());
                        Ok(FALLBACK_HINT.to_string())
                    }
                    HintPolicy::Retryable => {
                        inner.hint = HintSlot::Failed;
                        Err(e.into())
                    }
                }
            }
        }
    }

    /// Leaves the revealed card behind and fetches the next one.
    pub async fn advance(&self) -> Result<Option<StudyCard>, StudyError> {
        {
            let mut inner = self.inner.lock();
            if inner.state != StudyState::Revealed || self.is_abandoned() {
                return Err(inner.reject(StudyOp::Advance));
            }
            inner.state = StudyState::Loading;
            inner.clear_card();
        }
        self.fetch_next().await
    }

    fn is_current(&self, inner: &Inner, epoch: u64, card_id: CardId) -> bool {
        !self.is_abandoned()
            && inner.epoch == epoch
            && inner.card.as_ref().map(|c| c.id) == Some(card_id)
    }
}
