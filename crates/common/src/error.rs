//! Common error types for depwatch components.

use std::fmt;

/// A specialized Result type for depwatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for depwatch operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Resolver error: {0}")]
    Resolver(String),

    #[error("Dependency '{0}' is already registered as a different dependency")]
    NameConflict(String),

    #[error("Dependency '{parent}' depends on unknown dependency '{child}'")]
    UnknownDependency { parent: String, child: String },

    #[error("Dependency '{0}' is declared more than once")]
    DuplicateDependency(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new resolver error.
    pub fn resolver(msg: impl fmt::Display) -> Self {
        Error::Resolver(msg.to_string())
    }

    /// Create a new HTTP error.
    pub fn http(msg: impl fmt::Display) -> Self {
        Error::Http(msg.to_string())
    }
}
