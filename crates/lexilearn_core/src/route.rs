//! crates/lexilearn_core/src/route.rs
//!
//! The Route Guard: decides whether a page may be shown, purely from whether a
//! credential is present. It keeps no state of its own.

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use crate::domain::DeckId;
use crate::session::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Signup,
    /// The dashboard listing every deck.
    Home,
    DeckDetail(DeckId),
    Study(DeckId),
}

impl Route {
    /// Parses an application path such as `/decks/3/study`.
    pub fn parse(path: &str) -> Option<Route> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => Some(Route::Home),
            ["login"] => Some(Route::Login),
            ["signup"] => Some(Route::Signup),
            ["decks", id] => id.parse().ok().map(|id| Route::DeckDetail(DeckId(id))),
            ["decks", id, "study"] => id.parse().ok().map(|id| Route::Study(DeckId(id))),
            _ => None,
        }
    }

    /// Login and signup are only for visitors without a credential.
    pub fn is_public(&self) -> bool {
        matches!(self, Route::Login | Route::Signup)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Login => f.write_str("/login"),
            Route::Signup => f.write_str("/signup"),
            Route::Home => f.write_str("/"),
            Route::DeckDetail(id) => write!(f, "/decks/{}", id),
            Route::Study(id) => write!(f, "/decks/{}/study", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Redirect(Route),
}

/// The whole guard, as a pure function.
pub fn evaluate(route: Route, authenticated: bool) -> Access {
    match (route.is_public(), authenticated) {
        (true, true) => Access::Redirect(Route::Home),
        (false, false) => Access::Redirect(Route::Login),
        _ => Access::Allow,
    }
}

/// Binds `evaluate` to a live session so it can be re-run on navigation and
/// on every credential change.
#[derive(Clone)]
pub struct RouteGuard {
    session: Arc<SessionStore>,
}

impl RouteGuard {
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self { session }
    }

    pub fn check(&self, route: Route) -> Access {
        evaluate(route, self.session.is_authenticated())
    }

    /// Resolves the page actually shown for `route`.
    pub fn resolve(&self, route: Route) -> Route {
        match self.check(route) {
            Access::Allow => route,
            Access::Redirect(target) => target,
        }
    }

    pub fn watch(&self) -> watch::Receiver<bool> {
        self.session.subscribe()
    }
}
