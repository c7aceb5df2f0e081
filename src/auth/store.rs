//! Sequence-stamped credential store with durable persistence.
//!
//! The store resolves races between concurrent login/refresh/logout
//! operations with a single synchronization token: the request sequence
//! number. A mutation is accepted only if its sequence number is not older
//! than the stamp of what is already stored (last-writer-wins by sequence,
//! not by wall-clock), and every accepted mutation is pushed to the
//! [`Vault`] before the call returns, retrying until the durable write lands.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use url::Url;

use crate::auth::credentials::Credentials;
use crate::auth::vault::Vault;
use crate::client::transport::{Transport, TransportRequest};
use crate::constants::APP_CODE_HEADER;

const VAULT_KEY: &str = "credentials";
const PERSIST_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Body of a successful `/login` response.
#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub user: Option<serde_json::Value>,
}

/// Build the password-login request shared by [`CredentialStore`] and the
/// users API.
pub(crate) fn login_request(
    base_url: &Url,
    app_code: Option<&str>,
    username: &str,
    password: &str,
) -> Result<TransportRequest, crate::Error> {
    let url = base_url.join("login")?;
    let mut request = TransportRequest::new(Method::POST, url).json(&serde_json::json!({
        "username": username,
        "password": password,
        "appcode": app_code,
    }))?;
    if let Some(code) = app_code {
        request = request.header(APP_CODE_HEADER, code);
    }
    Ok(request)
}

#[derive(Debug)]
struct StoreState {
    loaded: bool,
    stamp: u64,
    credentials: Option<Credentials>,
}

#[derive(Debug)]
struct StoreInner {
    vault: Arc<dyn Vault>,
    transport: Arc<dyn Transport>,
    base_url: Url,
    app_code: Option<String>,
    state: Mutex<StoreState>,
    // Serializes durable writes so a retried older commit can never land on
    // top of a newer one; each pass writes the then-current snapshot.
    persist_gate: tokio::sync::Mutex<()>,
}

/// Holder of the current authentication material.
///
/// Cheap to clone; all clones share one record. The stamp is a process-local
/// ordering token: persisted records are re-loaded with stamp zero, since
/// sequence numbers restart with the process.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    inner: Arc<StoreInner>,
}

impl CredentialStore {
    /// Store reading/writing `vault`, re-authenticating through `transport`.
    #[must_use]
    pub fn new(
        vault: Arc<dyn Vault>,
        transport: Arc<dyn Transport>,
        base_url: Url,
        app_code: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                vault,
                transport,
                base_url,
                app_code,
                state: Mutex::new(StoreState {
                    loaded: false,
                    stamp: 0,
                    credentials: None,
                }),
                persist_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    fn lock_loaded(&self) -> std::sync::MutexGuard<'_, StoreState> {
        let mut state = self.inner.state.lock().expect("credential lock poisoned");
        if !state.loaded {
            let stored = self.inner.vault.get_all();
            state.credentials = stored
                .get(VAULT_KEY)
                .and_then(|raw| serde_json::from_str(raw).ok());
            state.loaded = true;
        }
        state
    }

    /// Current credentials, loading from the vault on first access.
    #[must_use]
    pub fn get(&self) -> Option<Credentials> {
        self.lock_loaded().credentials.clone()
    }

    /// Current session token, if any.
    #[must_use]
    pub fn session_token(&self) -> Option<String> {
        self.lock_loaded()
            .credentials
            .as_ref()
            .and_then(|c| c.session_token.clone())
    }

    /// Sequence stamp of the stored record.
    #[must_use]
    pub fn stamp(&self) -> u64 {
        self.lock_loaded().stamp
    }

    /// Replace the stored credentials if `seq` is not older than the current
    /// stamp.
    ///
    /// On acceptance the record is persisted before returning; the durable
    /// write is retried until it succeeds, so a credential change is never
    /// silently dropped. Returns whether the swap was accepted.
    pub async fn compare_and_swap(&self, seq: u64, new: Credentials) -> bool {
        {
            let mut state = self.lock_loaded();
            if seq < state.stamp {
                tracing::debug!(
                    "rejecting stale credential update (seq {seq} < stamp {})",
                    state.stamp
                );
                return false;
            }
            state.stamp = seq;
            state.credentials = Some(new);
        }
        self.persist_current().await;
        true
    }

    /// Clear both memory and durable storage, under the same staleness check.
    pub async fn clear(&self, seq: u64) -> bool {
        {
            let mut state = self.lock_loaded();
            if seq < state.stamp {
                return false;
            }
            state.stamp = seq;
            state.credentials = None;
        }
        self.persist_current().await;
        true
    }

    /// Perform a password login against the transport and store the fresh
    /// session token under `seq`.
    ///
    /// Returns `false` without throwing on any failure: missing
    /// username/password, transport trouble, a rejecting server, or a
    /// response body without a token.
    pub async fn refresh_session_token(&self, seq: u64) -> bool {
        let Some(credentials) = self.get() else {
            return false;
        };
        if !credentials.can_reauthenticate() {
            tracing::debug!("cannot refresh session: no username/password on record");
            return false;
        }
        let (username, password) = (
            credentials.username.clone().unwrap_or_default(),
            credentials.password.clone().unwrap_or_default(),
        );

        let request = match login_request(
            &self.inner.base_url,
            self.inner.app_code.as_deref(),
            &username,
            &password,
        ) {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!("failed to build refresh-login request: {err}");
                return false;
            }
        };

        let response = match self.inner.transport.execute(request).await {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!("session refresh transport failure: {err}");
                return false;
            }
        };
        if response.status / 100 != 2 {
            tracing::warn!("session refresh rejected with status {}", response.status);
            return false;
        }
        let Ok(login) = serde_json::from_slice::<LoginResponse>(&response.body) else {
            tracing::warn!("session refresh returned an undecodable body");
            return false;
        };

        let mut updated = credentials.with_session_token(login.token);
        if login.user.is_some() {
            updated.profile = login.user;
        }
        let accepted = self.compare_and_swap(seq, updated).await;
        if accepted {
            tracing::info!("session token refreshed (seq {seq})");
        }
        accepted
    }

    /// Push the current record to the vault, retrying until the commit lands.
    async fn persist_current(&self) {
        let _gate = self.inner.persist_gate.lock().await;
        loop {
            // Snapshot inside the loop: a retry must write the newest state,
            // not the state that existed when the first attempt failed.
            let snapshot = self.lock_loaded().credentials.clone();
            let committed = match snapshot {
                Some(credentials) => {
                    let encoded = match serde_json::to_string(&credentials) {
                        Ok(e) => e,
                        Err(err) => {
                            tracing::error!("credentials are not serializable: {err}");
                            return;
                        }
                    };
                    self.inner.vault.put(&[(VAULT_KEY, encoded)])
                }
                None => self.inner.vault.clear(),
            };
            if committed {
                return;
            }
            tracing::warn!("credential persistence failed; retrying");
            tokio::time::sleep(PERSIST_RETRY_DELAY).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::vault::MemoryVault;
    use crate::test_support::MockTransport;

    fn store_with(vault: Arc<MemoryVault>, transport: Arc<MockTransport>) -> CredentialStore {
        CredentialStore::new(
            vault,
            transport,
            Url::parse("https://api.test").unwrap(),
            Some("appcode".into()),
        )
    }

    #[tokio::test]
    async fn stale_swap_is_rejected() {
        let store = store_with(Arc::new(MemoryVault::new()), Arc::new(MockTransport::new()));

        let five = Credentials::password_login("alice", "pw").with_session_token("t5");
        assert!(store.compare_and_swap(5, five.clone()).await);

        let three = Credentials::password_login("alice", "pw").with_session_token("t3");
        assert!(!store.compare_and_swap(3, three).await);

        assert_eq!(store.get(), Some(five));
        assert_eq!(store.stamp(), 5);
    }

    #[tokio::test]
    async fn equal_sequence_wins() {
        let store = store_with(Arc::new(MemoryVault::new()), Arc::new(MockTransport::new()));
        assert!(store.compare_and_swap(4, Credentials::default()).await);
        assert!(
            store
                .compare_and_swap(4, Credentials::password_login("a", "b"))
                .await
        );
    }

    #[tokio::test]
    async fn persistence_is_retried_until_it_lands() {
        let vault = Arc::new(MemoryVault::new());
        vault.fail_next(2);
        let store = store_with(Arc::clone(&vault), Arc::new(MockTransport::new()));

        assert!(
            store
                .compare_and_swap(1, Credentials::password_login("alice", "pw"))
                .await
        );
        // The failed attempts were retried; the vault holds the record now.
        assert!(vault.get_all().contains_key("credentials"));
    }

    #[tokio::test]
    async fn reload_from_vault_resets_the_stamp() {
        let vault = Arc::new(MemoryVault::new());
        let store = store_with(Arc::clone(&vault), Arc::new(MockTransport::new()));
        assert!(
            store
                .compare_and_swap(9, Credentials::password_login("alice", "pw"))
                .await
        );

        // A fresh store (new process) sees the credentials but starts at stamp 0.
        let reloaded = store_with(vault, Arc::new(MockTransport::new()));
        assert_eq!(reloaded.stamp(), 0);
        assert!(reloaded.get().is_some_and(|c| c.can_reauthenticate()));
    }

    #[tokio::test]
    async fn refresh_updates_token_on_success() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_json(
            "/login",
            200,
            &serde_json::json!({ "token": "fresh", "user": { "name": "alice" } }),
        );
        let store = store_with(Arc::new(MemoryVault::new()), Arc::clone(&transport));
        assert!(
            store
                .compare_and_swap(1, Credentials::password_login("alice", "pw"))
                .await
        );

        assert!(store.refresh_session_token(2).await);
        assert_eq!(store.session_token().as_deref(), Some("fresh"));
        assert_eq!(transport.calls_to("/login"), 1);
    }

    #[tokio::test]
    async fn refresh_fails_cleanly_without_password_or_on_rejection() {
        let transport = Arc::new(MockTransport::new());
        let store = store_with(Arc::new(MemoryVault::new()), Arc::clone(&transport));

        // Nothing stored at all.
        assert!(!store.refresh_session_token(1).await);

        // Token-only record: no way to log back in.
        assert!(
            store
                .compare_and_swap(2, Credentials::default().with_session_token("t"))
                .await
        );
        assert!(!store.refresh_session_token(3).await);
        assert_eq!(transport.calls_to("/login"), 0);

        // Server rejects the password.
        transport.respond_json(
            "/login",
            401,
            &serde_json::json!({ "code": 40100, "message": "bad password" }),
        );
        assert!(
            store
                .compare_and_swap(4, Credentials::password_login("alice", "wrong"))
                .await
        );
        assert!(!store.refresh_session_token(5).await);
    }
}
