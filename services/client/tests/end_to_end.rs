//! services/client/tests/end_to_end.rs
//!
//! Drives the client against a small in-process axum server that mimics the
//! flashcard API: form login, bearer auth, FastAPI-style error bodies.

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Form, Json, Router,
};
use client_lib::{
    cli::{execute, Cli},
    config::Config,
    error::ClientError,
    state::AppState,
};
use clap::Parser;
use lexilearn_core::{ApiError, CollectionError, DeckCollection};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path as FsPath, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const TOKEN: &str = "token-1";
const PASSWORD: &str = "password123";

//=========================================================================================
// Mock Backend
//=========================================================================================

#[derive(Default)]
struct Backend {
    next_id: i64,
    decks: Vec<(i64, String)>,
    cards: Vec<Value>,
    due: Vec<i64>,
    revoked: bool,
    deletes: usize,
}

impl Backend {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn deck_json(&self, id: i64) -> Option<Value> {
        let (_, name) = self.decks.iter().find(|(deck_id, _)| *deck_id == id)?;
        let count = self.cards.iter().filter(|c| c["deck_id"] == id).count();
        Some(json!({ "id": id, "name": name, "card_count": count }))
    }
}

type Shared = Arc<Mutex<Backend>>;
type Reply = Result<Response, Response>;

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

fn authorize(backend: &Shared, headers: &HeaderMap) -> Result<(), Response> {
    let expected = format!("Bearer {}", TOKEN);
    let sent = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    if backend.lock().unwrap().revoked || sent != Some(expected.as_str()) {
        return Err(detail(StatusCode::UNAUTHORIZED, "Could not validate credentials"));
    }
    Ok(())
}

async fn login(Form(form): Form<HashMap<String, String>>) -> Response {
    if form.get("password").map(String::as_str) == Some(PASSWORD) {
        Json(json!({ "access_token": TOKEN, "token_type": "bearer" })).into_response()
    } else {
        detail(StatusCode::UNAUTHORIZED, "Incorrect email or password")
    }
}

async fn signup(Json(body): Json<Value>) -> Response {
    if body["email"] == "taken@example.com" {
        return detail(StatusCode::BAD_REQUEST, "Email already registered");
    }
    (StatusCode::CREATED, Json(json!({ "id": 7, "email": body["email"] }))).into_response()
}

async fn list_decks(State(backend): State<Shared>, headers: HeaderMap) -> Reply {
    authorize(&backend, &headers)?;
    let b = backend.lock().unwrap();
    let decks: Vec<Value> = b.decks.iter().filter_map(|(id, _)| b.deck_json(*id)).collect();
    Ok(Json(decks).into_response())
}

async fn create_deck(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    authorize(&backend, &headers)?;
    let name = body["name"].as_str().unwrap_or_default().to_string();
    if name.is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "detail": [{ "loc": ["body", "name"], "msg": "Name must not be empty" }]
            })),
        )
            .into_response());
    }
    let mut b = backend.lock().unwrap();
    let id = b.id();
    b.decks.push((id, name));
    let deck = b.deck_json(id);
    Ok((StatusCode::CREATED, Json(deck)).into_response())
}

async fn get_deck(State(backend): State<Shared>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    authorize(&backend, &headers)?;
    let b = backend.lock().unwrap();
    b.deck_json(id)
        .map(|deck| Json(deck).into_response())
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, "Deck not found"))
}

async fn rename_deck(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Reply {
    authorize(&backend, &headers)?;
    let mut b = backend.lock().unwrap();
    let deck = b
        .decks
        .iter_mut()
        .find(|(deck_id, _)| *deck_id == id)
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, "Deck not found"))?;
    deck.1 = body["name"].as_str().unwrap_or_default().to_string();
    Ok(Json(b.deck_json(id)).into_response())
}

async fn delete_deck(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Reply {
    authorize(&backend, &headers)?;
    let mut b = backend.lock().unwrap();
    b.deletes += 1;
    b.decks.retain(|(deck_id, _)| *deck_id != id);
    b.cards.retain(|c| c["deck_id"] != id);
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn list_cards(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Reply {
    authorize(&backend, &headers)?;
    let b = backend.lock().unwrap();
    let cards: Vec<Value> = b.cards.iter().filter(|c| c["deck_id"] == id).cloned().collect();
    Ok(Json(cards).into_response())
}

async fn create_card(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Path(deck_id): Path<i64>,
    Json(body): Json<Value>,
) -> Reply {
    authorize(&backend, &headers)?;
    let mut b = backend.lock().unwrap();
    let id = b.id();
    let card = json!({
        "id": id,
        "deck_id": deck_id,
        "question": body["question"],
        "answer": body["answer"],
    });
    b.cards.push(card.clone());
    b.due.push(id);
    Ok((StatusCode::CREATED, Json(card)).into_response())
}

async fn update_card(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Reply {
    authorize(&backend, &headers)?;
    let mut b = backend.lock().unwrap();
    let card = b
        .cards
        .iter_mut()
        .find(|c| c["id"] == id)
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, "Card not found"))?;
    card["question"] = body["question"].clone();
    card["answer"] = body["answer"].clone();
    Ok(Json(card.clone()).into_response())
}

async fn delete_card(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Reply {
    authorize(&backend, &headers)?;
    let mut b = backend.lock().unwrap();
    b.deletes += 1;
    b.cards.retain(|c| c["id"] != id);
    b.due.retain(|due| *due != id);
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn next_card(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Path(deck_id): Path<i64>,
) -> Reply {
    authorize(&backend, &headers)?;
    let b = backend.lock().unwrap();
    let card = b
        .due
        .iter()
        .filter_map(|id| b.cards.iter().find(|c| c["id"] == *id))
        .find(|c| c["deck_id"] == deck_id)
        .cloned()
        .unwrap_or(Value::Null);
    Ok(Json(card).into_response())
}

async fn review_card(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Reply {
    authorize(&backend, &headers)?;
    let mut b = backend.lock().unwrap();
    let answer = b
        .cards
        .iter()
        .find(|c| c["id"] == id)
        .and_then(|c| c["answer"].as_str())
        .map(str::to_string)
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, "Card not found"))?;
    b.due.retain(|due| *due != id);
    let given = body["user_answer"].as_str().unwrap_or_default();
    Ok(Json(json!({
        "was_correct": given.trim().eq_ignore_ascii_case(&answer),
        "correct_answer": answer,
    }))
    .into_response())
}

async fn hint(State(backend): State<Shared>, headers: HeaderMap, Path(_id): Path<i64>) -> Reply {
    authorize(&backend, &headers)?;
    Ok(Json(json!({ "hint": "It is a farewell." })).into_response())
}

async fn spawn_backend() -> (String, Shared) {
    let backend: Shared = Arc::new(Mutex::new(Backend::default()));
    let api = Router::new()
        .route("/users/login", post(login))
        .route("/users/signup", post(signup))
        .route("/decks/", get(list_decks).post(create_deck))
        .route("/decks/{id}", get(get_deck).patch(rename_deck).delete(delete_deck))
        .route("/decks/{id}/cards", get(list_cards).post(create_card))
        .route("/decks/{id}/study", get(next_card))
        .route("/cards/{id}", patch(update_card).delete(delete_card))
        .route("/cards/{id}/review", patch(review_card))
        .route("/cards/{id}/hint", get(hint))
        .with_state(backend.clone());
    let app = Router::new().nest("/api", api);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/api", addr), backend)
}

//=========================================================================================
// Harness
//=========================================================================================

fn client(api_url: &str, storage: &FsPath) -> AppState {
    let vars: HashMap<&str, String> = HashMap::from([
        ("LEXILEARN_API_URL", api_url.to_string()),
        ("LEXILEARN_STORAGE_PATH", storage.display().to_string()),
        ("LEXILEARN_HTTP_TIMEOUT_SECS", "5".to_string()),
    ]);
    let config = Config::from_lookup(|name| vars.get(name).cloned()).unwrap();
    AppState::new(config).unwrap()
}

async fn run(state: &AppState, args: &[&str], input: &str) -> Result<String, ClientError> {
    let argv = std::iter::once("lexilearn").chain(args.iter().copied());
    let cli = Cli::try_parse_from(argv).unwrap();
    let mut out = Vec::new();
    execute(cli.command, state, input.as_bytes(), &mut out).await?;
    Ok(String::from_utf8(out).unwrap())
}

async fn log_in(state: &AppState) -> String {
    run(state, &["login", "ana@example.com", "--password", PASSWORD], "")
        .await
        .unwrap()
}

fn storage_path(dir: &TempDir) -> PathBuf {
    dir.path().join("state").join("storage.json")
}

//=========================================================================================
// Scenarios
//=========================================================================================

#[tokio::test]
async fn learner_builds_a_deck_and_studies_it() {
    let (url, _backend) = spawn_backend().await;
    let dir = TempDir::new().unwrap();
    let state = client(&url, &storage_path(&dir));

    let denied = run(&state, &["decks", "list"], "").await.unwrap_err();
    assert!(matches!(denied, ClientError::AccessDenied(_)));

    let out = log_in(&state).await;
    assert!(out.contains("Logged in as ana@example.com"));

    let out = run(&state, &["decks", "create", "Spanish"], "").await.unwrap();
    assert!(out.contains("Created deck 1 \"Spanish\""));
    run(&state, &["cards", "add", "1", "hola", "hello"], "").await.unwrap();
    run(&state, &["cards", "add", "1", "adios", "goodbye"], "").await.unwrap();

    let out = run(&state, &["decks", "show", "1"], "").await.unwrap();
    assert!(out.contains("Spanish  (2 cards)"));

    let out = run(&state, &["study", "1"], "Hello\n\n?\nsee you\n\n").await.unwrap();
    assert!(out.contains("Q: hola"));
    assert!(out.contains("Correct! The answer is: hello"));
    assert!(out.contains("Q: adios"));
    assert!(out.contains("Hint: It is a farewell."));
    assert!(out.contains("Not quite... The answer is: goodbye"));
    assert!(out.contains("No more cards are due"));

    run(&state, &["logout"], "").await.unwrap();
    let out = run(&state, &["whoami"], "").await.unwrap();
    assert_eq!(out.trim(), "Not logged in.");
}

#[tokio::test]
async fn session_survives_a_restart() {
    let (url, _backend) = spawn_backend().await;
    let dir = TempDir::new().unwrap();

    let first = client(&url, &storage_path(&dir));
    run(&first, &["login", "ana@example.com"], &format!("{}\n", PASSWORD)).await.unwrap();
    drop(first);

    let second = client(&url, &storage_path(&dir));
    assert!(second.session.is_authenticated());
    let out = run(&second, &["login", "ana@example.com", "--password", PASSWORD], "")
        .await
        .unwrap();
    assert!(out.contains("Already logged in"));
}

#[tokio::test]
async fn rejected_token_ends_the_session() {
    let (url, backend) = spawn_backend().await;
    let dir = TempDir::new().unwrap();
    let state = client(&url, &storage_path(&dir));
    log_in(&state).await;

    backend.lock().unwrap().revoked = true;
    let err = run(&state, &["decks", "list"], "").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Collection(CollectionError::Api(ApiError::Unauthorized(_)))
    ));
    assert!(!state.session.is_authenticated());

    let restarted = client(&url, &storage_path(&dir));
    assert!(!restarted.session.is_authenticated());
}

#[tokio::test]
async fn failed_login_stores_nothing() {
    let (url, _backend) = spawn_backend().await;
    let dir = TempDir::new().unwrap();
    let state = client(&url, &storage_path(&dir));

    let err = run(&state, &["login", "ana@example.com", "--password", "nope"], "")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Incorrect email or password"));
    assert!(!state.session.is_authenticated());
    assert!(!state.session.is_loading());
}

#[tokio::test]
async fn server_messages_reach_the_user() {
    let (url, _backend) = spawn_backend().await;
    let dir = TempDir::new().unwrap();
    let state = client(&url, &storage_path(&dir));

    let err = run(&state, &["signup", "taken@example.com", "--password", PASSWORD], "")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Email already registered");

    log_in(&state).await;
    let decks = DeckCollection::new(state.gateway.clone());
    decks.load().await.unwrap();
    let err = decks.create("").await.unwrap_err();
    assert_eq!(err.to_string(), "Name must not be empty");
    assert!(decks.decks().is_empty());
}

#[tokio::test]
async fn deck_and_card_edits_round_trip() {
    let (url, _backend) = spawn_backend().await;
    let dir = TempDir::new().unwrap();
    let state = client(&url, &storage_path(&dir));
    log_in(&state).await;

    run(&state, &["decks", "create", "Spanish"], "").await.unwrap();
    run(&state, &["decks", "rename", "1", "Español"], "").await.unwrap();
    run(&state, &["cards", "add", "1", "hola", "hi"], "").await.unwrap();
    run(&state, &["cards", "edit", "1", "2", "hola", "hello"], "").await.unwrap();

    let out = run(&state, &["cards", "list", "1"], "").await.unwrap();
    assert!(out.contains("A: hello"));

    run(&state, &["cards", "delete", "1", "2", "--yes"], "").await.unwrap();
    let out = run(&state, &["cards", "list", "1"], "").await.unwrap();
    assert!(out.contains("This deck has no cards yet."));

    let out = run(&state, &["decks", "list"], "").await.unwrap();
    assert!(out.contains("Español  (0 cards)"));
    run(&state, &["decks", "delete", "1", "--yes"], "").await.unwrap();
    let out = run(&state, &["decks", "list"], "").await.unwrap();
    assert!(out.contains("No decks yet."));
}

#[tokio::test]
async fn deletes_are_only_sent_after_the_user_agrees() {
    let (url, backend) = spawn_backend().await;
    let dir = TempDir::new().unwrap();
    let state = client(&url, &storage_path(&dir));
    log_in(&state).await;
    run(&state, &["decks", "create", "Spanish"], "").await.unwrap();
    run(&state, &["cards", "add", "1", "hola", "hello"], "").await.unwrap();

    let err = run(&state, &["cards", "delete", "1", "2"], "n\n").await.unwrap_err();
    assert!(matches!(err, ClientError::Collection(CollectionError::Declined)));
    let err = run(&state, &["decks", "delete", "1"], "").await.unwrap_err();
    assert!(matches!(err, ClientError::Collection(CollectionError::Declined)));
    assert_eq!(backend.lock().unwrap().deletes, 0);

    let out = run(&state, &["decks", "delete", "1"], "y\n").await.unwrap();
    assert!(out.contains("Are you sure you want to delete the deck \"Spanish\"? [y/N] "));
    assert!(out.contains("Deleted deck 1."));
    assert_eq!(backend.lock().unwrap().deletes, 1);
}
