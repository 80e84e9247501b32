//! Process-level error types for the secret injector
//!
//! Admission-time failures live in `injector_webhook::WebhookError`; the
//! variants here cover startup: configuration, TLS material and the listener.

use thiserror::Error;

/// Main error type for injector startup and serving
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid or missing process configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// TLS certificate or key could not be loaded
    #[error("TLS error: {0}")]
    Tls(String),

    /// The HTTPS listener failed
    #[error("server error: {0}")]
    Server(String),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a TLS error with the given message
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }

    /// Create a server error with the given message
    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }
}
