//! services/client/src/state.rs
//!
//! Defines the application state shared by every command: the configuration,
//! the session store, the API gateway and the route guard. It is created once
//! at startup and passed around by reference.

use crate::adapters::{FileStorage, ReqwestTransport};
use crate::config::Config;
use crate::error::ClientError;
use lexilearn_core::{ApiGateway, CredentialStorage, HttpTransport, RouteGuard, SessionStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session: Arc<SessionStore>,
    pub gateway: Arc<ApiGateway>,
    pub guard: RouteGuard,
}

impl AppState {
    /// Wires the production adapters: file-backed storage and `reqwest`.
    pub fn new(config: Config) -> Result<Self, ClientError> {
        let storage = Arc::new(FileStorage::new(&config.storage_path));
        let transport = Arc::new(ReqwestTransport::new(
            config.api_url.clone(),
            config.http_timeout,
        )?);
        Self::with_adapters(config, storage, transport)
    }

    /// Wires the state around arbitrary adapters.
    pub fn with_adapters(
        config: Config,
        storage: Arc<dyn CredentialStorage>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ClientError> {
        let session = Arc::new(SessionStore::init(storage)?);
        let gateway = Arc::new(ApiGateway::new(transport, session.clone()));
        let guard = RouteGuard::new(session.clone());
        Ok(Self {
            config: Arc::new(config),
            session,
            gateway,
            guard,
        })
    }
}
