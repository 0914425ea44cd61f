//! crates/lexilearn_core/src/ports.rs
//!
//! Defines the service contracts (traits) the client core depends on.
//! These traits form the boundary of the hexagonal architecture: the HTTP
//! transport, the durable credential storage and the user-confirmation prompt
//! are all plugged in from the outside.

use async_trait::async_trait;
use bytes::Bytes;
use crate::domain::{
    AccessToken, Card, CardFields, CardId, Credential, Deck, DeckId, Hint, ReviewFeedback,
    StudyCard, User,
};

//=========================================================================================
// Remote API Error and Result Types
//=========================================================================================

/// The classified failure of a remote call. The gateway produces these and
/// never recovers from them itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// No response was received (connection refused, DNS, timeout).
    #[error("Network error: {0}")]
    Transport(String),
    /// 401: the credential is missing, expired or the login was rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// Any other 4xx. The message is the server's own when it sent one.
    #[error("{message}")]
    Validation { status: u16, message: String },
    /// 5xx. The message is always generic.
    #[error("{message}")]
    Server { status: u16, message: String },
    /// A success response whose body did not match the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }
}

/// A convenience type alias for `Result<T, ApiError>`.
pub type ApiResult<T> = Result<T, ApiError>;

//=========================================================================================
// HTTP Transport Port
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    /// `application/x-www-form-urlencoded` pairs, used by the login endpoint.
    Form(Vec<(String, String)>),
}

/// A request as handed to the transport, with the bearer already decided.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the configured base URL, starting with `/`.
    pub path: String,
    pub body: Option<RequestBody>,
    pub bearer: Option<Credential>,
}

/// A raw response. Status classification happens in the gateway.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Bytes,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends one request. Implementations only ever fail with
    /// `ApiError::Transport`; any HTTP status is a successful send.
    async fn send(&self, request: ApiRequest) -> ApiResult<ApiResponse>;
}

//=========================================================================================
// Typed Remote Services
//=========================================================================================

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn login(&self, identifier: &str, secret: &str) -> ApiResult<AccessToken>;
    async fn signup(&self, email: &str, password: &str) -> ApiResult<User>;
}

#[async_trait]
pub trait DeckService: Send + Sync {
    async fn list_decks(&self) -> ApiResult<Vec<Deck>>;
    async fn get_deck(&self, deck_id: DeckId) -> ApiResult<Deck>;
    async fn create_deck(&self, name: &str) -> ApiResult<Deck>;
    async fn update_deck(&self, deck_id: DeckId, name: &str) -> ApiResult<Deck>;
    async fn delete_deck(&self, deck_id: DeckId) -> ApiResult<()>;
}

#[async_trait]
pub trait CardService: Send + Sync {
    async fn list_cards(&self, deck_id: DeckId) -> ApiResult<Vec<Card>>;
    async fn create_card(&self, deck_id: DeckId, fields: &CardFields) -> ApiResult<Card>;
    async fn update_card(&self, card_id: CardId, fields: &CardFields) -> ApiResult<Card>;
    async fn delete_card(&self, card_id: CardId) -> ApiResult<()>;
}

#[async_trait]
pub trait StudyService: Send + Sync {
    /// The most urgent due card, or `None` when nothing is due.
    async fn next_card(&self, deck_id: DeckId) -> ApiResult<Option<StudyCard>>;
    async fn review_card(&self, card_id: CardId, user_answer: &str) -> ApiResult<ReviewFeedback>;
    async fn hint(&self, card_id: CardId) -> ApiResult<Hint>;
}

//=========================================================================================
// Durable Storage Port
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(String),
    #[error("Storage data is corrupt: {0}")]
    Corrupt(String),
}

/// A string key/value store that survives process restarts.
pub trait CredentialStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

//=========================================================================================
// User Confirmation Port
//=========================================================================================

/// Asks the user to confirm a destructive action.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}
