//! Unified error types for the `orbit-sdk` crate.
//!
//! This module centralizes all failures that can occur while using the SDK and
//! provides a single top-level [`Error`] enum plus the convenient [`Result`]
//! alias. The operational taxonomy mirrors what the dispatcher stores and
//! delivers: every variant is `Clone`, because a request outcome is written
//! once and then observed both by `RequestHandle::wait` and by a (possibly
//! later re-attached) completion handler. Lower-layer causes that are not
//! cloneable (`reqwest`, `std::io`) are captured as rendered messages.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// --- Build-Time Error ---

/// Errors that can occur while building an [`crate::OrbitHttpClient`].
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to build the HTTP client (reqwest configuration).
    #[error("Failed to build the HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    /// The configured base URL could not be parsed.
    #[error("Invalid base URL: {0}")]
    BaseUrl(#[from] url::ParseError),

    /// The builder was missing a required setting or given an inconsistent one.
    #[error("Invalid client configuration: {message}")]
    Config {
        /// Human-readable explanation of what was missing or inconsistent.
        message: String,
    },
}

// --- Structured Server Error Body ---

/// The structured JSON body the Orbit backend attaches to 4xx/5xx responses.
///
/// Servers are not obliged to produce it; when the body is absent or
/// malformed, the raw text lands in [`ErrorBody::message`] with no code so the
/// original failure is still reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Application-level error code (e.g. the reserved invalid-session code).
    #[serde(default)]
    pub code: Option<i64>,
    /// Server-provided description, or the raw body when undecodable.
    #[serde(default)]
    pub message: String,
}

impl std::fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{code}] {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

// --- The Main Operational Error Enum ---

/// The crate's top-level operational error type.
///
/// It groups failures into the categories the dispatcher distinguishes:
/// - [`Error::Connection`] — transport-level failure (DNS, socket, TLS)
/// - [`Error::Io`] — stream/parse failure, including malformed success bodies
/// - [`Error::Client`] — 4xx other than the reserved invalid-session condition
/// - [`Error::InvalidSession`] — 401 carrying the reserved app error code
/// - [`Error::Server`] — 5xx
/// - [`Error::Canceled`] — the caller canceled the request before delivery
/// - [`Error::UnexpectedStatus`] — 1xx/3xx with no handler attached
/// - [`Error::Validation`] — the caller supplied an invalid argument
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// The transport could not complete the exchange at all.
    #[error("Connection failed: {message}")]
    Connection {
        /// Rendered transport-level cause.
        message: String,
    },

    /// Reading or decoding a body failed.
    #[error("I/O failure: {message}")]
    Io {
        /// Rendered parse/stream cause.
        message: String,
    },

    /// The server rejected the request (4xx, not invalid-session).
    #[error("Client error {status}: {body}")]
    Client {
        /// HTTP status code returned by the server.
        status: u16,
        /// Structured (or degraded raw) error body.
        body: ErrorBody,
    },

    /// The current session token is no longer accepted by the server.
    ///
    /// The dispatcher intercepts this once per request and re-authenticates
    /// transparently; if it reaches the caller, the retry allowance is spent.
    #[error("Session is no longer valid")]
    InvalidSession,

    /// The server failed (5xx).
    #[error("Server error {status}: {body}")]
    Server {
        /// HTTP status code returned by the server.
        status: u16,
        /// Structured (or degraded raw) error body.
        body: ErrorBody,
    },

    /// The request was canceled before its result could be delivered.
    #[error("Request was canceled")]
    Canceled,

    /// A 1xx/3xx response arrived and the envelope had no handler for it.
    #[error("Unexpected status {status}")]
    UnexpectedStatus {
        /// The status code that had no handler.
        status: u16,
    },

    /// Caller supplied an invalid URL/path/argument for this API.
    #[error("Invalid request: {message}")]
    Validation {
        /// Human-readable explanation of what was invalid.
        message: String,
    },
}

impl Error {
    /// Shorthand for a [`Error::Validation`] with a rendered message.
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for an [`Error::Io`] with a rendered message.
    pub fn io(message: impl Into<String>) -> Self {
        Error::Io {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() || err.is_body() {
            Error::Io {
                message: err.to_string(),
            }
        } else {
            Error::Connection {
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Io {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Validation {
            message: err.to_string(),
        }
    }
}

/// A specialized `Result` type for `orbit-sdk` operations.
pub type Result<T> = std::result::Result<T, Error>;
