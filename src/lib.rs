#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod api;
mod auth;
mod client;
mod constants;
mod dispatch;
pub mod errors;
pub mod global;
mod orbit;
mod stream;

#[cfg(test)]
pub(crate) mod test_support;

// --- PUBLIC API EXPORTS ---
// Transport
pub use client::core::{OrbitHttpClient, OrbitHttpClientBuilder};
pub use client::transport::{
    ByteStream, HttpTransport, StreamingResponse, Transport, TransportError, TransportRequest,
    TransportResponse,
};

// High level façade and entity wrappers
pub use api::{Document, Documents, FileDetails, Files, Link, Links, Push, UserProfile, Users};
pub use orbit::Orbit;

// Dispatch core
pub use dispatch::{
    CompletionFn, Dispatcher, Outcome, ParseFn, Payload, Priority, RequestEnvelope, RequestHandle,
    RequestState, bytes_parser, empty_parser, json_parser,
};

// Credentials
pub use auth::{CredentialStore, Credentials, FileVault, MemoryVault, Vault};

// Streaming
pub use stream::{
    CacheWriter, CachedEntry, CollectSink, ContentCache, DirCache, StreamMeta, StreamSink,
    stream_response,
};

// Errors
pub use errors::{BuildError, Error, ErrorBody, Result};

// Wire constants callers may need when standing up their own backends/mocks
pub use constants::{APP_CODE_HEADER, INVALID_SESSION_CODE, SESSION_HEADER, STREAM_CHUNK_SIZE};

// Re-exports
pub use reqwest::Method;
