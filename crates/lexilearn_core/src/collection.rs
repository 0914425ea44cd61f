//! crates/lexilearn_core/src/collection.rs
//!
//! The Collection Cache: ordered, in-memory lists of decks and cards kept in
//! step with the server.
//!
//! Every mutation is send-then-reconcile. The request goes out first and the
//! local list only changes once the server has answered, using the entity the
//! server returned. A failed request leaves the list exactly as it was.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::domain::{Card, CardFields, CardId, Deck, DeckId};
use crate::ports::{ApiError, ApiResult, CardService, Confirm, DeckService};

#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    /// The same action is already in flight; the trigger should be disabled.
    #[error("Another change to this item is still in progress")]
    Busy,
    #[error("No item with id {0} in the list")]
    NotFound(String),
    #[error("Deletion was not confirmed")]
    Declined,
    /// The list was reloaded while the request was in flight; its result was dropped.
    #[error("The list changed while the request was in flight")]
    Stale,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Anything a collection can hold: a server entity with a stable identity.
pub trait Entity: Clone + Send + Sync + 'static {
    type Id: Copy + Eq + Hash + fmt::Display + Send + Sync + 'static;
    fn id(&self) -> Self::Id;
}

impl Entity for Deck {
    type Id = DeckId;
    fn id(&self) -> DeckId {
        self.id
    }
}

impl Entity for Card {
    type Id = CardId;
    fn id(&self) -> CardId {
        self.id
    }
}

//=========================================================================================
// Generic Collection
//=========================================================================================

struct Inner<T: Entity> {
    items: Vec<T>,
    error: Option<String>,
    loading: bool,
    generation: u64,
    /// Token of the create in flight, if any.
    creating: Option<u64>,
    /// Token of the update or delete in flight, per entity.
    pending: HashMap<T::Id, u64>,
    next_action: u64,
}

#[derive(Clone, Copy)]
enum Slot<Id> {
    Create,
    Item(Id),
}

pub struct Collection<T: Entity> {
    label: &'static str,
    inner: Mutex<Inner<T>>,
}

impl<T: Entity> Collection<T> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            inner: Mutex::new(Inner {
                items: Vec::new(),
                error: None,
                loading: false,
                generation: 0,
                creating: None,
                pending: HashMap::new(),
                next_action: 0,
            }),
        }
    }

    pub fn items(&self) -> Vec<T> {
        self.inner.lock().items.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn get(&self, id: T::Id) -> Option<T> {
        self.inner.lock().items.iter().find(|item| item.id() == id).cloned()
    }

    /// The sticky error left by the last failed list fetch.
    pub fn error(&self) -> Option<String> {
        self.inner.lock().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock().loading
    }

    pub fn is_creating(&self) -> bool {
        self.inner.lock().creating.is_some()
    }

    /// Whether an update or delete of `id` is in flight.
    pub fn is_pending(&self, id: T::Id) -> bool {
        self.inner.lock().pending.contains_key(&id)
    }

    /// Drops the current contents and invalidates every in-flight request.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.items.clear();
        inner.error = None;
        inner.loading = false;
        inner.creating = None;
        inner.pending.clear();
    }

    /// Replaces the list wholesale with the fetched one. On failure the list
    /// is emptied and the error is kept until the next successful load.
    pub async fn load<Fut>(&self, fetch: Fut) -> Result<(), CollectionError>
    where
        Fut: Future<Output = ApiResult<Vec<T>>>,
    {
        let generation = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.loading = true;
            inner.generation
        };

        let result = fetch.await;

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            debug!("Discarding stale {} list response", self.label);
            return Err(CollectionError::Stale);
        }
        inner.loading = false;
        match result {
            Ok(items) => {
                info!("Loaded {} {}", items.len(), self.label);
                inner.items = items;
                inner.error = None;
                Ok(())
            }
            Err(e) => {
                error!("Failed to load {}: {}", self.label, e);
                inner.items.clear();
                inner.error = Some(format!("Failed to load {}.", self.label));
                Err(e.into())
            }
        }
    }

    /// Appends the server-created entity once the server has confirmed it.
    pub async fn create<Fut>(&self, send: Fut) -> Result<T, CollectionError>
    where
        Fut: Future<Output = ApiResult<T>>,
    {
        let guard = self.begin(Slot::Create)?;
        let result = send.await;

        let mut inner = self.inner.lock();
        let created = result.map_err(|e| {
            error!("Failed to create {} entry: {}", self.label, e);
            CollectionError::Api(e)
        })?;
        if inner.generation != guard.generation {
            debug!("Discarding stale create of {} {}", self.label, created.id());
            return Err(CollectionError::Stale);
        }
        if !inner.items.iter().any(|item| item.id() == created.id()) {
            inner.items.push(created.clone());
        }
        info!("Created {} entry {}", self.label, created.id());
        Ok(created)
    }

    /// Swaps in the server's version of `id` in place.
    pub async fn update<Fut>(&self, id: T::Id, send: Fut) -> Result<T, CollectionError>
    where
        Fut: Future<Output = ApiResult<T>>,
    {
        self.require(id)?;
        let guard = self.begin(Slot::Item(id))?;
        let result = send.await;

        let mut inner = self.inner.lock();
        let updated = result.map_err(|e| {
            error!("Failed to update {} entry {}: {}", self.label, id, e);
            CollectionError::Api(e)
        })?;
        if inner.generation != guard.generation {
            return Err(CollectionError::Stale);
        }
        if let Some(slot) = inner.items.iter_mut().find(|item| item.id() == id) {
            *slot = updated.clone();
        }
        info!("Updated {} entry {}", self.label, id);
        Ok(updated)
    }

    /// Removes `id` after the user confirmed and the server agreed.
    /// Nothing is sent when confirmation is declined.
    pub async fn delete<F, Fut>(
        &self,
        id: T::Id,
        confirm: &dyn Confirm,
        prompt: &str,
        send: F,
    ) -> Result<(), CollectionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<()>>,
    {
        self.require(id)?;
        if self.is_pending(id) {
            return Err(CollectionError::Busy);
        }
        if !confirm.confirm(prompt) {
            debug!("Deletion of {} entry {} declined", self.label, id);
            return Err(CollectionError::Declined);
        }
        let guard = self.begin(Slot::Item(id))?;
        let result = send().await;

        let mut inner = self.inner.lock();
        result.map_err(|e| {
            error!("Failed to delete {} entry {}: {}", self.label, id, e);
            CollectionError::Api(e)
        })?;
        if inner.generation != guard.generation {
            debug!("Discarding stale delete of {} {}", self.label, id);
            return Err(CollectionError::Stale);
        }
        inner.items.retain(|item| item.id() != id);
        info!("Deleted {} entry {}", self.label, id);
        Ok(())
    }

    fn require(&self, id: T::Id) -> Result<(), CollectionError> {
        if self.get(id).is_some() {
            Ok(())
        } else {
            Err(CollectionError::NotFound(id.to_string()))
        }
    }

    fn begin(&self, slot: Slot<T::Id>) -> Result<ActionGuard<'_, T>, CollectionError> {
        let mut inner = self.inner.lock();
        let busy = match slot {
            Slot::Create => inner.creating.is_some(),
            Slot::Item(id) => inner.pending.contains_key(&id),
        };
        if busy {
            return Err(CollectionError::Busy);
        }
        inner.next_action += 1;
        let token = inner.next_action;
        match slot {
            Slot::Create => inner.creating = Some(token),
            Slot::Item(id) => {
                inner.pending.insert(id, token);
            }
        }
        Ok(ActionGuard {
            collection: self,
            slot,
            token,
            generation: inner.generation,
        })
    }
}

/// Marks an action as in flight; re-enables it on drop, whatever the outcome.
///
/// The slot is only released while it still holds this guard's token. After a
/// reset a newer action may own the same slot.
struct ActionGuard<'a, T: Entity> {
    collection: &'a Collection<T>,
    slot: Slot<T::Id>,
    token: u64,
    generation: u64,
}

impl<T: Entity> Drop for ActionGuard<'_, T> {
    fn drop(&mut self) {
        let mut inner = self.collection.inner.lock();
        match self.slot {
            Slot::Create => {
                if inner.creating == Some(self.token) {
                    inner.creating = None;
                }
            }
            Slot::Item(id) => {
                if inner.pending.get(&id) == Some(&self.token) {
                    inner.pending.remove(&id);
                }
            }
        }
    }
}

//=========================================================================================
// Dashboard Decks
//=========================================================================================

pub struct DeckCollection {
    api: Arc<dyn DeckService>,
    decks: Collection<Deck>,
}

impl DeckCollection {
    pub fn new(api: Arc<dyn DeckService>) -> Self {
        Self {
            api,
            decks: Collection::new("decks"),
        }
    }

    pub fn decks(&self) -> &Collection<Deck> {
        &self.decks
    }

    pub async fn load(&self) -> Result<(), CollectionError> {
        self.decks.load(self.api.list_decks()).await
    }

    pub async fn create(&self, name: &str) -> Result<Deck, CollectionError> {
        self.decks.create(self.api.create_deck(name)).await
    }

    pub async fn rename(&self, deck_id: DeckId, name: &str) -> Result<Deck, CollectionError> {
        self.decks
            .update(deck_id, self.api.update_deck(deck_id, name))
            .await
    }

    /// Re-reads one deck, picking up a new `card_count` after card edits.
    pub async fn refresh(&self, deck_id: DeckId) -> Result<Deck, CollectionError> {
        self.decks.update(deck_id, self.api.get_deck(deck_id)).await
    }

    /// The question put to the user before `deck_id` is deleted.
    pub fn delete_prompt(&self, deck_id: DeckId) -> Result<String, CollectionError> {
        let deck = self
            .decks
            .get(deck_id)
            .ok_or_else(|| CollectionError::NotFound(deck_id.to_string()))?;
        Ok(format!("Are you sure you want to delete the deck \"{}\"?", deck.name))
    }

    pub async fn delete(
        &self,
        deck_id: DeckId,
        confirm: &dyn Confirm,
    ) -> Result<(), CollectionError> {
        let prompt = self.delete_prompt(deck_id)?;
        self.decks
            .delete(deck_id, confirm, &prompt, || self.api.delete_deck(deck_id))
            .await
    }
}

//=========================================================================================
// Cards of One Deck
//=========================================================================================

const CARD_DELETE_PROMPT: &str = "Are you sure you want to delete this card?";

pub struct CardCollection {
    api: Arc<dyn CardService>,
    deck_id: Mutex<DeckId>,
    cards: Collection<Card>,
}

impl CardCollection {
    pub fn new(api: Arc<dyn CardService>, deck_id: DeckId) -> Self {
        Self {
            api,
            deck_id: Mutex::new(deck_id),
            cards: Collection::new("cards"),
        }
    }

    pub fn deck_id(&self) -> DeckId {
        *self.deck_id.lock()
    }

    pub fn cards(&self) -> &Collection<Card> {
        &self.cards
    }

    /// A study session only makes sense once the deck has cards.
    pub fn can_start_study(&self) -> bool {
        !self.cards.is_empty()
    }

    pub async fn load(&self) -> Result<(), CollectionError> {
        let deck_id = self.deck_id();
        self.cards.load(self.api.list_cards(deck_id)).await
    }

    /// Points the list at another deck and reloads. Responses still in flight
    /// for the previous deck are discarded.
    pub async fn switch_deck(&self, deck_id: DeckId) -> Result<(), CollectionError> {
        *self.deck_id.lock() = deck_id;
        self.cards.reset();
        self.load().await
    }

    pub async fn create(&self, fields: CardFields) -> Result<Card, CollectionError> {
        let deck_id = self.deck_id();
        self.cards
            .create(self.api.create_card(deck_id, &fields))
            .await
    }

    pub async fn update(
        &self,
        card_id: CardId,
        fields: CardFields,
    ) -> Result<Card, CollectionError> {
        self.cards
            .update(card_id, self.api.update_card(card_id, &fields))
            .await
    }

    pub fn delete_prompt(&self) -> &'static str {
        CARD_DELETE_PROMPT
    }

    pub async fn delete(
        &self,
        card_id: CardId,
        confirm: &dyn Confirm,
    ) -> Result<(), CollectionError> {
        self.cards
            .delete(card_id, confirm, CARD_DELETE_PROMPT, || {
                self.api.delete_card(card_id)
            })
            .await
    }
}
