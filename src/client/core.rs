//! Transport client configuration and construction.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use url::Url;

use crate::auth::{CredentialStore, FileVault, MemoryVault, Vault};
use crate::client::transport::{HttpTransport, Transport, TransportRequest};
use crate::constants::{APP_CODE_HEADER, SESSION_HEADER};
use crate::dispatch::{Dispatcher, Outcome, RequestEnvelope, RequestHandle, default_workers};
use crate::errors::{BuildError, Result};
use crate::stream::{ContentCache, DirCache, StreamMeta, StreamSink, stream_response};

const DEFAULT_USER_AGENT: &str = concat!("orbit-sdk", "@", env!("CARGO_PKG_VERSION"));

/// Configures an [`OrbitHttpClient`] before construction.
///
/// Customize the backend address, app code, timeouts, user-agent, worker-pool
/// size, credential persistence and the content cache. Most code obtains this
/// via [`OrbitHttpClient::builder()`].
///
/// # Defaults
/// - Worker pool: the host's available parallelism
/// - Credential vault: in-memory (nothing persisted) unless
///   [`Self::credentials_file`] or [`Self::vault`] is set
/// - Content cache: none unless [`Self::cache_dir`] is set
/// - HTTP request timeout: reqwest default (no global timeout) unless set via
///   [`Self::request_timeout`]
/// - User-agent: `orbit-sdk@<crate-version>` plus any [`Self::user_agent_extra`]
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// # use orbit_sdk::OrbitHttpClient;
/// let client = OrbitHttpClient::builder()
///     .base_url("https://api.example.com")
///     .app_code("1234567890")
///     .request_timeout(Duration::from_secs(10))
///     .user_agent_extra("myapp/1.2.3")
///     .build()?;
/// # Ok::<_, orbit_sdk::BuildError>(())
/// ```
#[derive(Default)]
#[must_use]
pub struct OrbitHttpClientBuilder {
    base_url: Option<String>,
    app_code: Option<String>,
    request_timeout: Option<Duration>,
    user_agent_extra: Option<String>,
    workers: Option<usize>,
    vault: Option<Arc<dyn Vault>>,
    cache: Option<Arc<dyn ContentCache>>,
    cache_dir: Option<std::path::PathBuf>,
    transport: Option<Arc<dyn Transport>>,
}

impl OrbitHttpClientBuilder {
    /// Set the backend's base URL (required).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the app code sent with every request.
    pub fn app_code(mut self, app_code: impl Into<String>) -> Self {
        self.app_code = Some(app_code.into());
        self
    }

    /// Set the HTTP request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Append an extra user-agent segment after the default
    /// `orbit-sdk@<version>`. Example: `.user_agent_extra("myapp/1.2.3")`.
    pub fn user_agent_extra(mut self, extra: impl Into<String>) -> Self {
        self.user_agent_extra = Some(extra.into());
        self
    }

    /// Set the dispatcher worker-pool size (default: available parallelism).
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Persist credentials to a JSON file at `path`.
    pub fn credentials_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.vault = Some(Arc::new(FileVault::new(path.into())));
        self
    }

    /// Use a custom credential vault.
    pub fn vault(mut self, vault: Arc<dyn Vault>) -> Self {
        self.vault = Some(vault);
        self
    }

    /// Cache streamed downloads under `dir` (namespaced by crate version).
    pub fn cache_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Use a custom content cache.
    pub fn cache(mut self, cache: Arc<dyn ContentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Substitute the transport implementation (tests, exotic stacks).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build an [`OrbitHttpClient`].
    pub fn build(self) -> std::result::Result<OrbitHttpClient, BuildError> {
        let raw = self.base_url.ok_or_else(|| BuildError::Config {
            message: "base_url is required".into(),
        })?;
        // Normalize to a trailing slash so path joins append instead of
        // replacing the last segment.
        let mut base_url = Url::parse(&raw)?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                let user_agent = match &self.user_agent_extra {
                    Some(extra) if !extra.trim().is_empty() => {
                        format!("{DEFAULT_USER_AGENT} {}", extra.trim())
                    }
                    _ => DEFAULT_USER_AGENT.to_owned(),
                };
                let mut http = reqwest::Client::builder().user_agent(user_agent);
                if let Some(timeout) = self.request_timeout {
                    http = http.timeout(timeout);
                }
                Arc::new(HttpTransport::new(http.build()?))
            }
        };

        let vault: Arc<dyn Vault> = self
            .vault
            .unwrap_or_else(|| Arc::new(MemoryVault::new()));
        let cache: Option<Arc<dyn ContentCache>> = match (self.cache, self.cache_dir) {
            (Some(cache), _) => Some(cache),
            (None, Some(dir)) => Some(Arc::new(DirCache::open_default(dir).map_err(|err| {
                BuildError::Config {
                    message: format!("cannot open cache directory: {err}"),
                }
            })?)),
            (None, None) => None,
        };

        let credentials = CredentialStore::new(
            vault,
            Arc::clone(&transport),
            base_url.clone(),
            self.app_code.clone(),
        );
        let dispatcher = Dispatcher::new(
            Arc::clone(&transport),
            credentials.clone(),
            self.workers.unwrap_or_else(default_workers),
        );

        Ok(OrbitHttpClient {
            transport,
            base_url,
            app_code: self.app_code,
            credentials,
            dispatcher,
            cache,
        })
    }
}

impl Debug for OrbitHttpClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrbitHttpClientBuilder")
            .field("base_url", &self.base_url)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

/// Transport + dispatcher + credential store for one Orbit backend.
///
/// `OrbitHttpClient` is the low-level engine the higher-level actors
/// ([`crate::Orbit`] and the entity wrappers) are built on. It owns the
/// transport, the background [`Dispatcher`], the [`CredentialStore`] and the
/// optional content cache, and knows how to turn API paths into fully-formed
/// transport requests (base URL joining, app-code header, session token).
///
/// Cheap to clone; clones share everything.
#[derive(Clone, Debug)]
pub struct OrbitHttpClient {
    transport: Arc<dyn Transport>,
    base_url: Url,
    app_code: Option<String>,
    credentials: CredentialStore,
    dispatcher: Dispatcher,
    cache: Option<Arc<dyn ContentCache>>,
}

impl OrbitHttpClient {
    /// Returns a builder to configure and construct a client.
    pub fn builder() -> OrbitHttpClientBuilder {
        OrbitHttpClientBuilder::default()
    }

    /// The configured backend base URL (always with a trailing slash).
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The credential store shared with the dispatcher.
    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// The background dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The transport boundary (advanced use).
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// The content cache, when one is configured.
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<dyn ContentCache>> {
        self.cache.as_ref()
    }

    /// Build a transport request for an API path relative to the base URL.
    ///
    /// Attaches the app-code header; the session token is attached later, at
    /// execution time, so retries after re-authentication pick up the fresh
    /// token.
    pub fn request(&self, method: Method, path: &str) -> Result<TransportRequest> {
        let url = self.base_url.join(path.trim_start_matches('/'))?;
        let mut request = TransportRequest::new(method, url);
        if let Some(app_code) = &self.app_code {
            request = request.header(APP_CODE_HEADER, app_code);
        }
        Ok(request)
    }

    /// Submit an envelope to the background dispatcher.
    pub fn submit(&self, envelope: RequestEnvelope) -> RequestHandle {
        self.dispatcher.submit(envelope)
    }

    /// Execute an envelope inline (no queue, no completion posting).
    pub async fn execute(&self, envelope: RequestEnvelope) -> Outcome {
        self.dispatcher.execute_direct(envelope).await
    }

    /// Stream a response body to `sink` through the configured cache.
    ///
    /// `cache_key = None` (or no configured cache) streams straight from the
    /// network. The request carries the current session token.
    pub async fn stream(
        &self,
        request: TransportRequest,
        cache_key: Option<&str>,
        sink: &mut dyn StreamSink,
    ) -> Result<StreamMeta> {
        let request = self.attach_session(request);
        stream_response(
            self.transport.as_ref(),
            request,
            self.cache.as_deref(),
            cache_key,
            sink,
        )
        .await
    }

    fn attach_session(&self, mut request: TransportRequest) -> TransportRequest {
        if let Some(token) = self.credentials.session_token() {
            request = request.header(SESSION_HEADER, token);
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_requires_a_base_url() {
        let err = OrbitHttpClient::builder().build().unwrap_err();
        assert!(matches!(err, BuildError::Config { .. }));
    }

    #[test]
    fn base_url_is_normalized_for_joining() {
        let client = OrbitHttpClient::builder()
            .base_url("https://api.test/v1")
            .app_code("42")
            .build()
            .unwrap();
        let request = client.request(Method::GET, "/document/memos").unwrap();
        assert_eq!(request.url.as_str(), "https://api.test/v1/document/memos");
        assert!(
            request
                .headers
                .iter()
                .any(|(name, value)| name == APP_CODE_HEADER && value == "42")
        );
    }

    #[test]
    fn invalid_base_url_is_a_build_error() {
        let err = OrbitHttpClient::builder()
            .base_url("not a url")
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::BaseUrl(_)));
    }
}
