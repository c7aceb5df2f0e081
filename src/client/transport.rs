//! The narrow transport boundary the core depends on.
//!
//! The dispatcher, the direct execution path and the streaming handler only
//! ever talk to [`Transport`]: execute a request, get back status + headers +
//! body, or a transport-level failure. [`HttpTransport`] is the production
//! implementation over reqwest; tests substitute a scripted mock.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::Method;
use thiserror::Error;
use url::Url;

/// Failure at the transport level, before any status classification.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection-level problem: DNS, socket, TLS, timeout.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The exchange started but reading the body failed.
    #[error("i/o failure: {0}")]
    Io(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() || err.is_body() {
            TransportError::Io(err.to_string())
        } else {
            TransportError::Connection(err.to_string())
        }
    }
}

impl From<TransportError> for crate::Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connection(message) => crate::Error::Connection { message },
            TransportError::Io(message) => crate::Error::Io { message },
        }
    }
}

/// One fully-described HTTP exchange to perform.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute target URL.
    pub url: Url,
    /// Header name/value pairs, applied in order.
    pub headers: Vec<(String, String)>,
    /// Optional request body.
    pub body: Option<Bytes>,
}

impl TransportRequest {
    /// Build a bodyless request for `method` and `url`.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Append a header pair.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a raw body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Attach a JSON body and the matching content type.
    ///
    /// # Errors
    /// Returns the serializer error if `value` cannot be encoded.
    pub fn json<T: serde::Serialize + ?Sized>(self, value: &T) -> serde_json::Result<Self> {
        let encoded = serde_json::to_vec(value)?;
        Ok(self
            .header("Content-Type", "application/json")
            .body(encoded))
    }
}

/// A fully-buffered response from the transport.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, lowercased names.
    pub headers: HashMap<String, String>,
    /// Full response body.
    pub body: Bytes,
}

impl TransportResponse {
    /// Look up a response header by (case-insensitive) name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Incrementally readable response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// A response whose body is consumed as a stream of chunks.
pub struct StreamingResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, lowercased names.
    pub headers: HashMap<String, String>,
    /// The body, yielded chunk by chunk.
    pub body: ByteStream,
}

impl StreamingResponse {
    /// Look up a response header by (case-insensitive) name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Declared body length, when the server sent one.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.parse().ok())
    }

    /// Drain the remaining body into memory.
    pub(crate) async fn collect_body(mut self) -> Result<TransportResponse, TransportError> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(TransportResponse {
            status: self.status,
            headers: self.headers,
            body: Bytes::from(buf),
        })
    }
}

impl fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &"<stream>")
            .finish()
    }
}

/// Contract the core depends on: execute one HTTP exchange.
///
/// Implementations must be safe to share across worker tasks. Connection
/// pooling, timeouts and TLS are the implementation's business; the core only
/// sees status + headers + body or a [`TransportError`].
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Execute `request` and buffer the whole response.
    async fn execute(&self, request: TransportRequest)
    -> Result<TransportResponse, TransportError>;

    /// Execute `request`, handing the body back as a chunk stream.
    async fn execute_streaming(
        &self,
        request: TransportRequest,
    ) -> Result<StreamingResponse, TransportError>;
}

/// Production [`Transport`] over a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Wrap an already-configured reqwest client.
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn build(&self, request: TransportRequest) -> reqwest::RequestBuilder {
        let mut rb = self.http.request(request.method, request.url);
        for (name, value) in request.headers {
            rb = rb.header(name, value);
        }
        if let Some(body) = request.body {
            rb = rb.body(body);
        }
        rb
    }
}

fn header_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_owned()))
        })
        .collect()
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let response = self.build(request).send().await?;
        let status = response.status().as_u16();
        let headers = header_map(response.headers());
        let body = response.bytes().await?;
        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }

    async fn execute_streaming(
        &self,
        request: TransportRequest,
    ) -> Result<StreamingResponse, TransportError> {
        let response = self.build(request).send().await?;
        let status = response.status().as_u16();
        let headers = header_map(response.headers());
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed();
        Ok(StreamingResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn buffered_execute_maps_status_headers_and_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/ping");
                then.status(200)
                    .header("Content-Type", "text/plain")
                    .body("pong");
            })
            .await;

        let transport = HttpTransport::new(reqwest::Client::new());
        let request = TransportRequest::new(Method::GET, server.url("/ping").parse().unwrap());
        let response = transport.execute(request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 200);
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(&response.body[..], b"pong");
    }

    #[tokio::test]
    async fn streaming_execute_yields_the_full_body() {
        let server = MockServer::start_async().await;
        let payload = vec![7u8; 10_000];
        server
            .mock_async(|when, then| {
                when.method(GET).path("/blob");
                then.status(200).body(payload.clone());
            })
            .await;

        let transport = HttpTransport::new(reqwest::Client::new());
        let request = TransportRequest::new(Method::GET, server.url("/blob").parse().unwrap());
        let streaming = transport.execute_streaming(request).await.unwrap();
        let buffered = streaming.collect_body().await.unwrap();
        assert_eq!(buffered.body.len(), payload.len());
    }

    #[tokio::test]
    async fn connection_failures_map_to_transport_errors() {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_millis(200))
            .build()
            .unwrap();
        let transport = HttpTransport::new(http);
        // Reserved TEST-NET-1 address, nothing listens there.
        let request = TransportRequest::new(
            Method::GET,
            "http://192.0.2.1:9/nope".parse().unwrap(),
        );
        let err = transport.execute(request).await.unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));
    }
}
