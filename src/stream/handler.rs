//! Incremental body delivery with write-through caching.
//!
//! One entry point, [`stream_response`]: serve a cache hit without touching
//! the network, or pump the transport body to the consumer in bounded chunks
//! while appending to a cache entry that is committed only on a complete
//! read. Every exit path releases every resource: the body stream and the
//! transport connection drop with the response, and the cache writer aborts
//! itself unless explicitly committed.

use futures_util::StreamExt;

use crate::client::transport::{Transport, TransportRequest};
use crate::constants::STREAM_CHUNK_SIZE;
use crate::dispatch::classify_failure;
use crate::errors::{Error, Result};
use crate::stream::cache::{CacheWriter, ContentCache};

/// End-of-stream metadata handed to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMeta {
    /// Content type, when the server (or cache entry) declared one.
    pub content_type: Option<String>,
    /// Total number of bytes delivered.
    pub content_length: u64,
}

/// Consumer of a streamed body.
///
/// `on_chunk` returning an error aborts the stream (and the pending cache
/// entry); `on_complete` fires exactly once, after the final chunk.
pub trait StreamSink: Send {
    /// Receive the next chunk.
    ///
    /// Network reads arrive in at most [`STREAM_CHUNK_SIZE`] bytes; a cache
    /// hit arrives as one chunk holding the whole entry.
    fn on_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()>;

    /// Receive the end-of-stream signal.
    fn on_complete(&mut self, meta: &StreamMeta);
}

/// [`StreamSink`] that buffers everything in memory.
#[derive(Debug, Default)]
pub struct CollectSink {
    /// All received bytes, in order.
    pub bytes: Vec<u8>,
    /// Set once the end-of-stream signal arrived.
    pub meta: Option<StreamMeta>,
}

impl CollectSink {
    /// Fresh empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamSink for CollectSink {
    fn on_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.bytes.extend_from_slice(chunk);
        Ok(())
    }

    fn on_complete(&mut self, meta: &StreamMeta) {
        self.meta = Some(meta.clone());
    }
}

/// Aborts the pending cache entry unless the pump committed it.
struct PendingEntry {
    writer: Option<Box<dyn CacheWriter>>,
}

impl PendingEntry {
    fn write(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.write(chunk),
            None => Ok(()),
        }
    }

    fn commit(&mut self) -> std::io::Result<()> {
        match self.writer.take() {
            Some(writer) => writer.commit(),
            None => Ok(()),
        }
    }
}

impl Drop for PendingEntry {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

/// Fetch `request`, delivering the body to `sink` through the cache.
///
/// With a `cache` and `cache_key`, a committed entry short-circuits the
/// network entirely: the cached bytes arrive as a single chunk followed by
/// the end-of-stream signal. On a miss the body is read in
/// [`STREAM_CHUNK_SIZE`] pieces (clipped to the declared remaining length
/// when one was sent), forwarded to the consumer and appended to the pending
/// entry, which is committed only after a full read. Any mid-stream failure
/// (transport, cache write, or the consumer itself) aborts the entry and
/// surfaces as an error; nothing partial ever becomes visible to lookups.
pub async fn stream_response(
    transport: &dyn Transport,
    request: TransportRequest,
    cache: Option<&dyn ContentCache>,
    cache_key: Option<&str>,
    sink: &mut dyn StreamSink,
) -> Result<StreamMeta> {
    // 1) Cache hit: synthesize the full read without a network round trip.
    if let (Some(cache), Some(key)) = (cache, cache_key) {
        if let Some(entry) = cache.read(key)? {
            tracing::debug!("serving {key} from cache ({} bytes)", entry.bytes.len());
            let meta = StreamMeta {
                content_type: entry.content_type,
                content_length: entry.bytes.len() as u64,
            };
            sink.on_chunk(&entry.bytes)?;
            sink.on_complete(&meta);
            return Ok(meta);
        }
    }

    // 2) Miss: open the response stream.
    let response = transport.execute_streaming(request).await?;
    if response.status / 100 != 2 {
        let buffered = response.collect_body().await?;
        return Err(classify_failure(buffered.status, &buffered.body));
    }

    let content_type = response.header("content-type").map(str::to_owned);
    let mut remaining = response.content_length();
    let mut pending = PendingEntry {
        writer: match (cache, cache_key) {
            (Some(cache), Some(key)) => Some(cache.begin_write(key, content_type.as_deref())?),
            _ => None,
        },
    };

    // 3) Pump bounded chunks to the consumer and the pending entry.
    let mut body = response.body;
    let mut total: u64 = 0;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(Error::from)?;
        for piece in chunk.chunks(STREAM_CHUNK_SIZE) {
            let piece = match remaining {
                Some(0) => break,
                Some(left) if (piece.len() as u64) > left => &piece[..left as usize],
                _ => piece,
            };
            sink.on_chunk(piece)?;
            pending.write(piece)?;
            total += piece.len() as u64;
            if let Some(left) = remaining.as_mut() {
                *left -= piece.len() as u64;
            }
        }
    }

    // 4) Full read: publish the entry, then signal end of stream.
    pending.commit()?;
    let meta = StreamMeta {
        content_type,
        content_length: total,
    };
    sink.on_complete(&meta);
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::cache::DirCache;
    use crate::test_support::MockTransport;
    use reqwest::Method;

    fn request(path: &str) -> TransportRequest {
        let url = format!("https://api.test{path}").parse().unwrap();
        TransportRequest::new(Method::GET, url)
    }

    #[tokio::test]
    async fn cache_round_trip_short_circuits_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DirCache::open(dir.path(), "1.0").unwrap();
        let transport = MockTransport::new();
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        transport.respond_bytes("/file/42", 200, payload.clone(), "application/octet-stream");

        // Miss: network read, write-through, commit.
        let mut first = CollectSink::new();
        let meta = stream_response(
            &transport,
            request("/file/42"),
            Some(&cache),
            Some("file/42"),
            &mut first,
        )
        .await
        .unwrap();
        assert_eq!(first.bytes, payload);
        assert_eq!(meta.content_length, payload.len() as u64);
        assert_eq!(transport.calls_to("/file/42"), 1);

        // Hit: identical bytes, no second network call.
        let mut second = CollectSink::new();
        let cached_meta = stream_response(
            &transport,
            request("/file/42"),
            Some(&cache),
            Some("file/42"),
            &mut second,
        )
        .await
        .unwrap();
        assert_eq!(second.bytes, payload);
        assert_eq!(cached_meta.content_length, payload.len() as u64);
        assert_eq!(
            cached_meta.content_type.as_deref(),
            Some("application/octet-stream")
        );
        assert_eq!(transport.calls_to("/file/42"), 1);
        assert!(second.meta.is_some());
    }

    #[tokio::test]
    async fn consumer_failure_aborts_the_pending_entry() {
        struct FailingSink;
        impl StreamSink for FailingSink {
            fn on_chunk(&mut self, _chunk: &[u8]) -> std::io::Result<()> {
                Err(std::io::Error::other("consumer refused"))
            }
            fn on_complete(&mut self, _meta: &StreamMeta) {
                panic!("must not complete");
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let cache = DirCache::open(dir.path(), "1.0").unwrap();
        let transport = MockTransport::new();
        transport.respond_bytes("/file/9", 200, vec![1u8; 5000], "application/octet-stream");

        let mut sink = FailingSink;
        let err = stream_response(
            &transport,
            request("/file/9"),
            Some(&cache),
            Some("file/9"),
            &mut sink,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        // Nothing partial became visible.
        assert!(cache.read("file/9").unwrap().is_none());
    }

    #[tokio::test]
    async fn failure_statuses_classify_instead_of_caching() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DirCache::open(dir.path(), "1.0").unwrap();
        let transport = MockTransport::new();
        transport.respond_json("/file/404", 404, &serde_json::json!({ "message": "missing" }));

        let mut sink = CollectSink::new();
        let err = stream_response(
            &transport,
            request("/file/404"),
            Some(&cache),
            Some("file/404"),
            &mut sink,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Client { status: 404, .. }));
        assert!(sink.bytes.is_empty());
        assert!(cache.read("file/404").unwrap().is_none());
    }

    #[tokio::test]
    async fn chunks_are_bounded_and_cacheless_streaming_works() {
        struct CountingSink {
            chunks: usize,
            max: usize,
            total: usize,
            completed: bool,
        }
        impl StreamSink for CountingSink {
            fn on_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()> {
                self.chunks += 1;
                self.max = self.max.max(chunk.len());
                self.total += chunk.len();
                Ok(())
            }
            fn on_complete(&mut self, _meta: &StreamMeta) {
                self.completed = true;
            }
        }

        let transport = MockTransport::new();
        transport.respond_bytes("/big", 200, vec![9u8; 20_000], "application/octet-stream");

        let mut sink = CountingSink {
            chunks: 0,
            max: 0,
            total: 0,
            completed: false,
        };
        stream_response(&transport, request("/big"), None, None, &mut sink)
            .await
            .unwrap();
        assert_eq!(sink.total, 20_000);
        assert!(sink.max <= STREAM_CHUNK_SIZE);
        assert!(sink.completed);
    }
}
