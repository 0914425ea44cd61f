//! services/client/src/error.rs
//!
//! Defines the primary error type for the client binary and library.

use crate::config::ConfigError;
use lexilearn_core::{ApiError, CollectionError, SessionError};

/// The primary error type for the `client` service.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A remote call failed.
    #[error("{0}")]
    Api(#[from] ApiError),

    #[error("{0}")]
    Session(#[from] SessionError),

    #[error("{0}")]
    Collection(#[from] CollectionError),

    /// The route guard refused the command; the payload says where to go instead.
    #[error("{0}")]
    AccessDenied(String),

    /// Represents a standard Input/Output error (e.g. reading the terminal).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
