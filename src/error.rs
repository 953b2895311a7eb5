//! Error types for the PhoenixCare resilience layer

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::failsafe::{CircuitOpen, Classify, NetworkCode};

/// Result type alias for the resilience layer
pub type Result<T> = std::result::Result<T, Error>;

/// Resilience layer errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Call rejected because the breaker guarding the dependency is open
    #[error("Circuit breaker is OPEN for {name}. Service temporarily unavailable.")]
    CircuitOpen {
        /// Breaker name
        name: String,
    },

    /// Transport-level failure before any HTTP response
    #[error("Network error ({code}): {message}")]
    Network {
        /// Classified transport code
        code: NetworkCode,
        /// Underlying message
        message: String,
    },

    /// Upstream answered with a non-success HTTP status
    #[error("Upstream error {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Status text or response excerpt
        message: String,
    },

    /// A single attempt exceeded its deadline
    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Upstream payload did not match the expected shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an upstream status error
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Whether this is a breaker rejection rather than a dependency failure
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

impl From<CircuitOpen> for Error {
    fn from(open: CircuitOpen) -> Self {
        Self::CircuitOpen { name: open.name }
    }
}

impl Classify for Error {
    fn network_code(&self) -> Option<NetworkCode> {
        match self {
            Self::Network { code, .. } => Some(*code),
            Self::Timeout(_) => Some(NetworkCode::TimedOut),
            Self::Io(e) => e.network_code(),
            Self::Http(e) if e.is_timeout() => Some(NetworkCode::TimedOut),
            Self::Http(e) if e.is_connect() => Some(NetworkCode::ConnectionRefused),
            _ => None,
        }
    }

    fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Http(e) => e.is_timeout(),
            Self::Io(e) => e.kind() == io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}
