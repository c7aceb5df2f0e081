//! The schedulable unit of work: one logical API call, fully described.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::client::transport::{TransportRequest, TransportResponse};
use crate::errors::{Error, Result};

/// Scheduling priority. Higher runs first; within one level, submission order.
///
/// [`Priority::Critical`] preempts everything and is what the dispatcher uses
/// for its internally-injected session-refresh work; application requests
/// normally live in the other three levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    /// Background work: prefetches, cache warming.
    Low,
    /// The default for application requests.
    #[default]
    Normal,
    /// User-visible work that should jump the queue.
    High,
    /// Preempts all ordinary work. Reserved for session recovery and other
    /// requests nothing else can proceed without.
    Critical,
}

/// Lifecycle of a submitted request, as observed through its handle.
///
/// ```text
/// POSTED → ACTIVE → EXECUTED → DELIVERED*
///    \         |         \
///     \        |          → SUSPENDED → (resume) → DELIVERED*
///      → CANCELED*
/// ```
///
/// Terminal states are `Delivered` and `Canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Queued, not yet picked up by a worker.
    Posted,
    /// Executing on a worker (or waiting to re-enter the queue mid-recovery).
    Active,
    /// Finished executing; result retained, not yet handed to a handler.
    Executed,
    /// Completion handler detached; the result (current or future) is retained
    /// until [`crate::RequestHandle::resume`] re-attaches one.
    Suspended,
    /// Result handed to the completion lane. Terminal.
    Delivered,
    /// Canceled before delivery. Terminal.
    Canceled,
}

/// Typed result of a successful exchange.
///
/// A closed enum instead of any runtime type recovery: the parser decides the
/// shape, entity wrappers deserialize `Json` payloads into their own types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// No body expected (deletes, logouts).
    Empty,
    /// Decoded JSON body.
    Json(serde_json::Value),
    /// Raw body bytes (downloads).
    Bytes(Bytes),
}

impl Payload {
    /// Extract the JSON value, or fail with [`Error::Io`] for other shapes.
    pub fn into_json(self) -> Result<serde_json::Value> {
        match self {
            Payload::Json(value) => Ok(value),
            other => Err(Error::io(format!("expected a JSON payload, got {other:?}"))),
        }
    }

    /// Extract the raw bytes, or fail with [`Error::Io`] for other shapes.
    pub fn into_bytes(self) -> Result<Bytes> {
        match self {
            Payload::Bytes(bytes) => Ok(bytes),
            other => Err(Error::io(format!("expected a byte payload, got {other:?}"))),
        }
    }

    /// Deserialize a `Json` payload into `T`.
    pub fn deserialize<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        let value = self.into_json()?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Final result of one request, as stored and delivered. Set at most once.
pub type Outcome = Result<Payload>;

/// Converts a raw 2xx (or handled 1xx/3xx) response into a typed [`Payload`].
pub type ParseFn = Arc<dyn Fn(&TransportResponse) -> Outcome + Send + Sync>;

/// Completion callback, invoked exactly once on the serialized completion lane.
pub type CompletionFn = Box<dyn FnOnce(Outcome) + Send + Sync + 'static>;

/// Parser for endpoints that answer with a JSON body.
///
/// An empty body on this path is an I/O error: the endpoint promised one.
#[must_use]
pub fn json_parser() -> ParseFn {
    Arc::new(|response: &TransportResponse| {
        if response.body.is_empty() {
            return Err(Error::io("expected a response body"));
        }
        let value = serde_json::from_slice(&response.body)
            .map_err(|e| Error::io(format!("malformed response body: {e}")))?;
        Ok(Payload::Json(value))
    })
}

/// Parser for endpoints that answer with raw bytes.
#[must_use]
pub fn bytes_parser() -> ParseFn {
    Arc::new(|response: &TransportResponse| Ok(Payload::Bytes(response.body.clone())))
}

/// Parser for endpoints whose success carries no interesting body.
#[must_use]
pub fn empty_parser() -> ParseFn {
    Arc::new(|_: &TransportResponse| Ok(Payload::Empty))
}

/// Immutable description of one logical call.
///
/// Everything the dispatcher needs to execute, classify and deliver it: the
/// transport request, scheduling priority, an optional correlation tag, the
/// success parser, optional 1xx/3xx handlers, and an optional completion
/// callback. The sequence number is not part of the envelope; it is assigned
/// exactly once at submission.
pub struct RequestEnvelope {
    pub(crate) request: TransportRequest,
    pub(crate) priority: Priority,
    pub(crate) tag: Option<String>,
    pub(crate) parser: ParseFn,
    pub(crate) on_continue: Option<ParseFn>,
    pub(crate) on_redirect: Option<ParseFn>,
    pub(crate) handler: Option<CompletionFn>,
    /// Attach the stored session token at execution time.
    pub(crate) authenticate: bool,
}

impl RequestEnvelope {
    /// Envelope for `request`, JSON parser, normal priority, authenticated.
    #[must_use]
    pub fn new(request: TransportRequest) -> Self {
        Self {
            request,
            priority: Priority::Normal,
            tag: None,
            parser: json_parser(),
            on_continue: None,
            on_redirect: None,
            handler: None,
            authenticate: true,
        }
    }

    /// Set the scheduling priority.
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Attach a correlation tag, visible on the handle.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Replace the success parser.
    #[must_use]
    pub fn parser(mut self, parser: ParseFn) -> Self {
        self.parser = parser;
        self
    }

    /// Handle 1xx responses instead of failing with `UnexpectedStatus`.
    #[must_use]
    pub fn on_continue(mut self, handler: ParseFn) -> Self {
        self.on_continue = Some(handler);
        self
    }

    /// Handle 3xx responses instead of failing with `UnexpectedStatus`.
    #[must_use]
    pub fn on_redirect(mut self, handler: ParseFn) -> Self {
        self.on_redirect = Some(handler);
        self
    }

    /// Attach a completion callback, delivered on the completion lane.
    #[must_use]
    pub fn on_complete(mut self, handler: impl FnOnce(Outcome) + Send + Sync + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Skip session-token injection (login, signup, public reads).
    #[must_use]
    pub fn unauthenticated(mut self) -> Self {
        self.authenticate = false;
        self
    }
}

impl fmt::Debug for RequestEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestEnvelope")
            .field("method", &self.request.method)
            .field("url", &self.request.url.as_str())
            .field("priority", &self.priority)
            .field("tag", &self.tag)
            .field("authenticate", &self.authenticate)
            .finish_non_exhaustive()
    }
}
