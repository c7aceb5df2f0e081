//! File upload, download and metadata.

use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::client::core::OrbitHttpClient;
use crate::dispatch::{Priority, RequestEnvelope, RequestHandle, bytes_parser, empty_parser};
use crate::errors::Result;
use crate::stream::{CollectSink, StreamMeta, StreamSink};

/// Server-side metadata for one stored file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDetails {
    /// Server-assigned file id.
    pub id: String,
    /// Original file name, if recorded.
    #[serde(default)]
    pub name: Option<String>,
    /// Content type, if recorded.
    #[serde(default, rename = "contentType")]
    pub content_type: Option<String>,
    /// Size in bytes, if recorded.
    #[serde(default)]
    pub length: Option<u64>,
}

/// File operations.
///
/// Created via [`crate::Orbit::files`]. Downloads stream through the
/// configured content cache, so a repeated fetch of the same file id never
/// re-reads the network.
#[derive(Debug, Clone)]
pub struct Files {
    pub(crate) client: OrbitHttpClient,
    pub(crate) priority: Priority,
}

static BOUNDARY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Encode a single-part `multipart/form-data` body.
fn multipart_body(name: &str, content_type: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let boundary = format!(
        "orbit-{}-{}",
        std::process::id(),
        BOUNDARY_COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    let mut body = Vec::with_capacity(bytes.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (
        format!("multipart/form-data; boundary={boundary}"),
        body,
    )
}

impl Files {
    /// Run subsequent calls from this wrapper at `priority`.
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Upload `bytes` as a new file. Returns the stored file's details.
    pub async fn upload(
        &self,
        name: &str,
        content_type: &str,
        bytes: impl AsRef<[u8]>,
    ) -> Result<FileDetails> {
        let (mime, body) = multipart_body(name, content_type, bytes.as_ref());
        let request = self
            .client
            .request(Method::POST, "file")?
            .header("Content-Type", mime)
            .body(body);
        let payload = self
            .client
            .submit(RequestEnvelope::new(request).priority(self.priority))
            .wait()
            .await?;
        payload.deserialize()
    }

    /// Fetch a file's metadata.
    pub async fn details(&self, id: &str) -> Result<FileDetails> {
        let request = self
            .client
            .request(Method::GET, &format!("file/details/{id}"))?;
        let payload = self
            .client
            .submit(RequestEnvelope::new(request).priority(self.priority))
            .wait()
            .await?;
        payload.deserialize()
    }

    /// Delete a file.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let request = self.client.request(Method::DELETE, &format!("file/{id}"))?;
        self.client
            .submit(
                RequestEnvelope::new(request)
                    .priority(self.priority)
                    .parser(empty_parser()),
            )
            .wait()
            .await?;
        Ok(())
    }

    /// Stream a file's content to `sink` through the cache.
    ///
    /// Cached under `file/<id>`; a second download of the same id is served
    /// locally without a network round trip.
    pub async fn download(&self, id: &str, sink: &mut dyn StreamSink) -> Result<StreamMeta> {
        let request = self.client.request(Method::GET, &format!("file/{id}"))?;
        self.client
            .stream(request, Some(&format!("file/{id}")), sink)
            .await
    }

    /// Download a file fully into memory.
    pub async fn download_bytes(&self, id: &str) -> Result<Vec<u8>> {
        let mut sink = CollectSink::new();
        self.download(id, &mut sink).await?;
        Ok(sink.bytes)
    }

    /// Queued raw download (no cache): returns the handle.
    ///
    /// Useful when the caller wants cancel/suspend/resume over a large
    /// buffered fetch rather than incremental delivery.
    pub fn download_handle(&self, id: &str) -> Result<RequestHandle> {
        let request = self.client.request(Method::GET, &format!("file/{id}"))?;
        Ok(self.client.submit(
            RequestEnvelope::new(request)
                .priority(self.priority)
                .parser(bytes_parser()),
        ))
    }
}
