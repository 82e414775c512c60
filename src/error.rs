use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by a debug-stub transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error while {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("debug stub closed the connection")]
    Closed,

    #[error("no response from debug stub within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("receive was cancelled")]
    Cancelled,

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("could not start debug service '{service}': {message}")]
    ServiceStart { service: String, message: String },

    #[error("invalid receive configuration: {0}")]
    Config(String),
}

impl TransportError {
    #[must_use]
    pub fn io(operation: &'static str, source: std::io::Error) -> Self {
        Self::Io { operation, source }
    }

    /// Returns true when the failure came from the cancellation predicate.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Setup or launch failure that ends a session before monitoring starts.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("bundle '{bundle_id}' is not installed on the device")]
    UnknownBundle { bundle_id: String },

    #[error("a debugging session is already running")]
    AlreadyRunning,

    #[error("could not start debug stub: {0}")]
    StubStart(#[source] TransportError),

    #[error("could not configure receive parameters: {0}")]
    ReceiveParams(#[source] TransportError),

    #[error("failed to send {step}: {source}")]
    Send {
        step: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("{step} rejected by debug stub: {response}")]
    Rejected { step: &'static str, response: String },

    #[error("session worker exited without reporting an outcome")]
    WorkerLost,
}

impl SessionError {
    #[must_use]
    pub fn send(step: &'static str, source: TransportError) -> Self {
        Self::Send { step, source }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("I/O error while reading app catalog at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse app catalog at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a non-negative integer, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}
