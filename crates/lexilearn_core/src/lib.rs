pub mod collection;
pub mod domain;
pub mod gateway;
pub mod ports;
pub mod route;
pub mod session;
pub mod storage;
pub mod study;

#[cfg(test)]
mod testing;

pub use collection::{CardCollection, Collection, CollectionError, DeckCollection, Entity};
pub use domain::{
    AccessToken, Card, CardFields, CardId, Credential, Deck, DeckId, Hint, ReviewFeedback,
    StudyCard, User,
};
pub use gateway::ApiGateway;
pub use ports::{
    ApiError, ApiRequest, ApiResponse, ApiResult, AuthService, CardService, Confirm,
    CredentialStorage, DeckService, HttpTransport, Method, RequestBody, StorageError,
    StudyService,
};
pub use route::{Access, Route, RouteGuard};
pub use session::{SessionError, SessionStore, CREDENTIAL_KEY};
pub use storage::MemoryStorage;
pub use study::{
    HintPolicy, HintSlot, StudyError, StudyOp, StudySession, StudyState, StudyView, FALLBACK_HINT,
};
