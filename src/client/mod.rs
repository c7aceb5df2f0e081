//! Transport client: configuration, construction, and the narrow HTTP
//! boundary the core depends on.

pub mod core;
pub mod transport;

pub use self::core::{OrbitHttpClient, OrbitHttpClientBuilder};
pub use self::transport::{
    ByteStream, HttpTransport, StreamingResponse, Transport, TransportError, TransportRequest,
    TransportResponse,
};
