//! Streaming bodies and the local content cache behind them.

mod cache;
mod handler;

pub use cache::{CacheWriter, CachedEntry, ContentCache, DirCache};
pub use handler::{CollectSink, StreamMeta, StreamSink, stream_response};
