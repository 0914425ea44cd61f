//! crates/lexilearn_core/src/session.rs
//!
//! The Session Store: the single owner of the authentication credential.
//!
//! The in-memory credential and the durable copy are kept in lockstep. Every
//! transition writes (or deletes) the stored value first and only then
//! publishes the new value, while holding the write lock, so no reader can
//! observe one without the other. Responses that arrive after the session has
//! moved on (a late login, a 401 for a replaced token) are discarded.

use crate::domain::Credential;
use crate::ports::{ApiError, AuthService, CredentialStorage, StorageError};
use parking_lot::{RwLock, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// The fixed storage key the credential is persisted under.
pub const CREDENTIAL_KEY: &str = "lexi_token";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("A login is already in progress")]
    LoginInFlight,
    /// A logout happened while the login was pending; its token was dropped.
    #[error("The login was cancelled by a logout")]
    Superseded,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("Could not persist the session: {0}")]
    Storage(#[from] StorageError),
}

pub struct SessionStore {
    storage: Arc<dyn CredentialStorage>,
    current: RwLock<Current>,
    loading: AtomicBool,
    authenticated_tx: watch::Sender<bool>,
}

struct Current {
    credential: Option<Credential>,
    /// Bumped by every transition and every logout, so a login that started
    /// before a logout can tell it was superseded.
    epoch: u64,
}

impl SessionStore {
    /// Creates the store, restoring any credential left in durable storage.
    pub fn init(storage: Arc<dyn CredentialStorage>) -> Result<Self, SessionError> {
        let credential = storage.get(CREDENTIAL_KEY)?.map(Credential::new);
        if credential.is_some() {
            info!("Restored session from storage.");
        }
        let (authenticated_tx, _) = watch::channel(credential.is_some());
        Ok(Self {
            storage,
            current: RwLock::new(Current {
                credential,
                epoch: 0,
            }),
            loading: AtomicBool::new(false),
            authenticated_tx,
        })
    }

    pub fn credential(&self) -> Option<Credential> {
        self.current.read().credential.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().credential.is_some()
    }

    /// True for the whole lifetime of a login request.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Observes authentication state changes (used to re-run the route guard).
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.authenticated_tx.subscribe()
    }

    /// Exchanges the user's credentials for a bearer token and stores it.
    ///
    /// On failure nothing stored is touched. Only one login may be in flight,
    /// and its token is dropped if a logout happened while it was pending.
    pub async fn login(
        &self,
        auth: &dyn AuthService,
        identifier: &str,
        secret: &str,
    ) -> Result<Credential, SessionError> {
        let _loading = LoadingGuard::acquire(&self.loading).ok_or(SessionError::LoginInFlight)?;
        let started = self.current.read().epoch;

        debug!("Logging in as {}", identifier);
        let token = auth.login(identifier, secret).await.map_err(|e| {
            warn!("Login failed: {}", e);
            e
        })?;

        let credential = Credential::new(token.access_token);
        let current = self.current.write();
        if current.epoch != started {
            warn!("Discarding login response: the session was ended while it was pending.");
            return Err(SessionError::Superseded);
        }
        self.store(current, Some(credential.clone()))?;
        info!("Logged in.");
        Ok(credential)
    }

    /// Forgets the credential. No network call; calling it twice is harmless.
    /// A login still in flight is cancelled.
    pub fn logout(&self) -> Result<(), SessionError> {
        let mut current = self.current.write();
        current.epoch += 1;
        if current.credential.is_none() {
            return Ok(());
        }
        self.store(current, None)?;
        info!("Logged out.");
        Ok(())
    }

    /// Logs out only if `rejected` is still the current credential. Returns
    /// whether the session was cleared.
    pub fn logout_if(&self, rejected: &Credential) -> Result<bool, SessionError> {
        let current = self.current.write();
        if current.credential.as_ref() != Some(rejected) {
            debug!("Rejected credential is no longer current; session kept.");
            return Ok(false);
        }
        self.store(current, None)?;
        info!("Logged out after the server rejected the credential.");
        Ok(true)
    }

    /// Writes storage first, then memory, then notifies. Memory is left as it
    /// was when the storage write fails.
    fn store(
        &self,
        mut current: RwLockWriteGuard<'_, Current>,
        next: Option<Credential>,
    ) -> Result<(), SessionError> {
        match &next {
            Some(credential) => self.storage.set(CREDENTIAL_KEY, credential.expose())?,
            None => self.storage.remove(CREDENTIAL_KEY)?,
        }
        let authenticated = next.is_some();
        current.credential = next;
        current.epoch += 1;
        drop(current);
        self.authenticated_tx.send_replace(authenticated);
        Ok(())
    }
}

/// Holds the `loading` flag for the duration of a login; released on drop
/// whatever the outcome.
struct LoadingGuard<'a>(&'a AtomicBool);

impl<'a> LoadingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
