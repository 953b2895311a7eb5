//! PhoenixCare resilience layer
//!
//! Circuit breaker and retry-with-backoff primitives guarding the calls the
//! PhoenixCare assistant makes to its RAG/AI service.
//!
//! # Features
//!
//! - **Circuit breaker**: per-dependency admission control with half-open trials
//! - **Retry with backoff**: bounded exponential retries filtered by predicates
//! - **Registry**: named breakers shared by every caller of a dependency
//! - **RAG client**: chat and document analysis with graceful degradation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod failsafe;
pub mod rag;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` takes precedence over `level`; `format` selects `json` or text output.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
