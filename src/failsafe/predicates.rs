//! Retry predicates
//!
//! Building blocks for the `should_retry` argument of
//! [`retry_with_backoff`](super::retry_with_backoff). Each predicate looks at
//! a failure through the [`Classify`] trait, so any error type that can
//! report a transport code, an HTTP status or a timeout can be filtered.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

/// Transport-level failure codes worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkCode {
    /// Peer refused the connection (`ECONNREFUSED`)
    #[serde(rename = "ECONNREFUSED")]
    ConnectionRefused,
    /// Connection or request timed out (`ETIMEDOUT`)
    #[serde(rename = "ETIMEDOUT")]
    TimedOut,
    /// Host could not be resolved (`ENOTFOUND`)
    #[serde(rename = "ENOTFOUND")]
    NotFound,
    /// No route to the network (`ENETUNREACH`)
    #[serde(rename = "ENETUNREACH")]
    NetworkUnreachable,
    /// Temporary DNS failure (`EAI_AGAIN`)
    #[serde(rename = "EAI_AGAIN")]
    DnsTryAgain,
}

impl NetworkCode {
    /// Conventional errno-style name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionRefused => "ECONNREFUSED",
            Self::TimedOut => "ETIMEDOUT",
            Self::NotFound => "ENOTFOUND",
            Self::NetworkUnreachable => "ENETUNREACH",
            Self::DnsTryAgain => "EAI_AGAIN",
        }
    }

    /// Map an IO error kind onto a transport code, if it is one
    #[must_use]
    pub fn from_io_kind(kind: io::ErrorKind) -> Option<Self> {
        match kind {
            io::ErrorKind::ConnectionRefused => Some(Self::ConnectionRefused),
            io::ErrorKind::TimedOut => Some(Self::TimedOut),
            io::ErrorKind::NetworkUnreachable | io::ErrorKind::HostUnreachable => {
                Some(Self::NetworkUnreachable)
            }
            _ => None,
        }
    }
}

impl fmt::Display for NetworkCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure classification used by the retry predicates
pub trait Classify {
    /// Transport code, when the failure happened below HTTP
    fn network_code(&self) -> Option<NetworkCode> {
        None
    }

    /// HTTP status carried by the failure or its response
    fn status(&self) -> Option<u16> {
        None
    }

    /// Whether the failure is a timeout of any kind
    fn is_timeout(&self) -> bool {
        false
    }
}

impl Classify for io::Error {
    fn network_code(&self) -> Option<NetworkCode> {
        NetworkCode::from_io_kind(self.kind())
    }

    fn is_timeout(&self) -> bool {
        self.kind() == io::ErrorKind::TimedOut
    }
}

/// Retry every failure
pub fn always<E>(_error: &E) -> bool {
    true
}

/// Retry transport-level failures (refused, timed out, DNS, unreachable)
pub fn network_errors<E: Classify>(error: &E) -> bool {
    error.network_code().is_some()
}

/// Retry 5xx responses; 4xx are client errors and never transient
pub fn server_errors<E: Classify>(error: &E) -> bool {
    matches!(error.status(), Some(500..=599))
}

/// Retry timeouts only
pub fn timeout_only<E: Classify>(error: &E) -> bool {
    error.network_code() == Some(NetworkCode::TimedOut) || error.is_timeout()
}

/// Network or server errors; the default policy for the RAG service
pub fn standard<E: Classify>(error: &E) -> bool {
    network_errors(error) || server_errors(error)
}

/// Logical OR of two predicates
pub fn any_of<E, A, B>(a: A, b: B) -> impl Fn(&E) -> bool
where
    A: Fn(&E) -> bool,
    B: Fn(&E) -> bool,
{
    move |error| a(error) || b(error)
}
