//! crates/lexilearn_core/src/gateway.rs
//!
//! The API Gateway: the single point every remote call flows through.
//!
//! It decides whether the bearer credential is attached, hands the request to
//! the `HttpTransport` port, and classifies the response into an `ApiError`.
//! It never retries. A 401 on a credentialed call clears the session.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{
    AccessToken, Card, CardFields, CardId, Deck, DeckId, Hint, ReviewFeedback, StudyCard, User,
};
use crate::ports::{
    ApiError, ApiRequest, ApiResponse, ApiResult, AuthService, CardService, DeckService,
    HttpTransport, Method, RequestBody, StudyService,
};
use crate::session::SessionStore;

const LOGIN_PATH: &str = "/users/login";
const SIGNUP_PATH: &str = "/users/signup";

const UNAUTHORIZED_FALLBACK: &str = "Your session is not valid. Please log in again.";
const CLIENT_ERROR_FALLBACK: &str = "The request could not be completed.";
const SERVER_ERROR_MESSAGE: &str = "The server encountered an error. Please try again later.";

//=========================================================================================
// The Gateway
//=========================================================================================

pub struct ApiGateway {
    transport: Arc<dyn HttpTransport>,
    session: Arc<SessionStore>,
}

impl ApiGateway {
    pub fn new(transport: Arc<dyn HttpTransport>, session: Arc<SessionStore>) -> Self {
        Self { transport, session }
    }

    /// Sends one request and returns the response if its status is 2xx.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
    ) -> ApiResult<ApiResponse> {
        let bearer = if is_auth_endpoint(path) {
            None
        } else {
            self.session.credential()
        };
        let sent = bearer.clone();

        debug!("{:?} {}", method, path);
        let response = self
            .transport
            .send(ApiRequest {
                method,
                path: path.to_string(),
                body,
                bearer,
            })
            .await
            .map_err(|e| {
                warn!("{:?} {} failed: {}", method, path, e);
                e
            })?;

        if let Err(e) = classify(&response) {
            warn!("{:?} {} returned {}: {}", method, path, response.status, e);
            if let (Some(sent), true) = (&sent, e.is_unauthorized()) {
                if let Err(logout_err) = self.session.logout_if(sent) {
                    warn!("Could not clear rejected session: {}", logout_err);
                }
            }
            return Err(e);
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
    ) -> ApiResult<T> {
        let response = self.request(method, path, body).await?;
        decode(&response)
    }
}

fn is_auth_endpoint(path: &str) -> bool {
    path == LOGIN_PATH || path == SIGNUP_PATH
}

//=========================================================================================
// Response Classification
//=========================================================================================

/// Maps a non-2xx status into the error taxonomy.
pub fn classify(response: &ApiResponse) -> ApiResult<()> {
    let status = response.status;
    match status {
        200..=299 => Ok(()),
        401 => Err(ApiError::Unauthorized(
            server_message(&response.body).unwrap_or_else(|| UNAUTHORIZED_FALLBACK.to_string()),
        )),
        400..=499 => Err(ApiError::Validation {
            status,
            message: server_message(&response.body)
                .unwrap_or_else(|| CLIENT_ERROR_FALLBACK.to_string()),
        }),
        _ => Err(ApiError::Server {
            status,
            message: SERVER_ERROR_MESSAGE.to_string(),
        }),
    }
}

/// Pulls the human-readable message out of a structured error body.
///
/// Accepts `{"detail": "..."}`, the list form `{"detail": [{"msg": "..."}]}`
/// and `{"message": "..."}`.
fn server_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let detail = value.get("detail").or_else(|| value.get("message"))?;
    match detail {
        Value::String(message) if !message.is_empty() => Some(message.clone()),
        Value::Array(items) => items
            .iter()
            .find_map(|item| item.get("msg").and_then(Value::as_str).map(str::to_owned)),
        _ => None,
    }
}

fn decode<T: DeserializeOwned>(response: &ApiResponse) -> ApiResult<T> {
    // An empty 2xx body decodes like JSON `null`, which is how "no due card"
    // is represented.
    let body: &[u8] = if response.body.is_empty() {
        b"null"
    } else {
        &response.body[..]
    };
    serde_json::from_slice(body).map_err(|e| ApiError::Decode(e.to_string()))
}

//=========================================================================================
// Typed Endpoints
//=========================================================================================

#[async_trait]
impl AuthService for ApiGateway {
    async fn login(&self, identifier: &str, secret: &str) -> ApiResult<AccessToken> {
        let form = RequestBody::Form(vec![
            ("username".to_string(), identifier.to_string()),
            ("password".to_string(), secret.to_string()),
        ]);
        self.json(Method::Post, LOGIN_PATH, Some(form)).await
    }

    async fn signup(&self, email: &str, password: &str) -> ApiResult<User> {
        let body = RequestBody::Json(json!({ "email": email, "password": password }));
        self.json(Method::Post, SIGNUP_PATH, Some(body)).await
    }
}

#[async_trait]
impl DeckService for ApiGateway {
    async fn list_decks(&self) -> ApiResult<Vec<Deck>> {
        self.json(Method::Get, "/decks/", None).await
    }

    async fn get_deck(&self, deck_id: DeckId) -> ApiResult<Deck> {
        self.json(Method::Get, &format!("/decks/{}", deck_id), None).await
    }

    async fn create_deck(&self, name: &str) -> ApiResult<Deck> {
        let body = RequestBody::Json(json!({ "name": name }));
        self.json(Method::Post, "/decks/", Some(body)).await
    }

    async fn update_deck(&self, deck_id: DeckId, name: &str) -> ApiResult<Deck> {
        let body = RequestBody::Json(json!({ "name": name }));
        self.json(Method::Patch, &format!("/decks/{}", deck_id), Some(body))
            .await
    }

    async fn delete_deck(&self, deck_id: DeckId) -> ApiResult<()> {
        self.request(Method::Delete, &format!("/decks/{}", deck_id), None)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CardService for ApiGateway {
    async fn list_cards(&self, deck_id: DeckId) -> ApiResult<Vec<Card>> {
        self.json(Method::Get, &format!("/decks/{}/cards", deck_id), None)
            .await
    }

    async fn create_card(&self, deck_id: DeckId, fields: &CardFields) -> ApiResult<Card> {
        let body = RequestBody::Json(card_body(fields));
        self.json(Method::Post, &format!("/decks/{}/cards", deck_id), Some(body))
            .await
    }

    async fn update_card(&self, card_id: CardId, fields: &CardFields) -> ApiResult<Card> {
        let body = RequestBody::Json(card_body(fields));
        self.json(Method::Patch, &format!("/cards/{}", card_id), Some(body))
            .await
    }

    async fn delete_card(&self, card_id: CardId) -> ApiResult<()> {
        self.request(Method::Delete, &format!("/cards/{}", card_id), None)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StudyService for ApiGateway {
    async fn next_card(&self, deck_id: DeckId) -> ApiResult<Option<StudyCard>> {
        self.json(Method::Get, &format!("/decks/{}/study", deck_id), None)
            .await
    }

    async fn review_card(&self, card_id: CardId, user_answer: &str) -> ApiResult<ReviewFeedback> {
        let body = RequestBody::Json(json!({ "user_answer": user_answer }));
        self.json(Method::Patch, &format!("/cards/{}/review", card_id), Some(body))
            .await
    }

    async fn hint(&self, card_id: CardId) -> ApiResult<Hint> {
        self.json(Method::Get, &format!("/cards/{}/hint", card_id), None)
            .await
    }
}

fn card_body(fields: &CardFields) -> Value {
    json!({ "question": fields.question, "answer": fields.answer })
}
