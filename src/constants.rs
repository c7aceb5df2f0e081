//! Wire-level constants shared across the crate.

/// Header carrying the session token on authenticated requests.
pub const SESSION_HEADER: &str = "X-Orbit-Session";

/// Header identifying the application to the backend.
pub const APP_CODE_HEADER: &str = "X-Orbit-Appcode";

/// Reserved application error code signaling an invalid/expired session.
///
/// Only meaningful inside a 401 response body.
pub const INVALID_SESSION_CODE: i64 = 40101;

/// Fixed buffer size for streamed body reads.
pub const STREAM_CHUNK_SIZE: usize = 4096;
