//! Inline execution path: same classification and recovery, no queue.
//!
//! `execute_direct` runs entirely on the caller's future. It shares the
//! classifier and the exactly-once re-authentication protocol with the
//! worker path, but retries by looping in place instead of re-enqueueing,
//! and never touches the completion lane.

use crate::dispatch::classify::classify;
use crate::dispatch::dispatcher::Dispatcher;
use crate::dispatch::envelope::{Outcome, RequestEnvelope};
use crate::errors::Error;

impl Dispatcher {
    /// Execute `envelope` inline and return its outcome directly.
    ///
    /// Priority, tag and completion handler on the envelope are ignored:
    /// there is no queue to order against and no posting to do. An invalid
    /// session triggers one synchronous token refresh and one retry; a second
    /// invalid session surfaces as the result.
    pub async fn execute_direct(&self, envelope: RequestEnvelope) -> Outcome {
        let mut auth_retried = false;
        loop {
            let request = self.inner.authenticated_request(&envelope);
            let response = match self.inner.transport().execute(request).await {
                Ok(response) => response,
                Err(err) => return Err(Error::from(err)),
            };
            let outcome = classify(&response, &envelope);

            if matches!(outcome, Err(Error::InvalidSession)) && !auth_retried {
                auth_retried = true;
                let seq = self.inner.next_seq();
                tracing::info!("inline request hit an invalid session; re-authenticating once");
                // Retry even if the refresh failed: the next attempt surfaces
                // the InvalidSession with the allowance spent, same as the
                // queued path.
                let _ = self.inner.credentials().refresh_session_token(seq).await;
                continue;
            }
            return outcome;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialStore, Credentials, MemoryVault};
    use crate::client::transport::{Transport, TransportRequest};
    use crate::dispatch::envelope::Payload;
    use crate::test_support::MockTransport;
    use reqwest::Method;
    use std::sync::Arc;

    fn dispatcher(transport: &Arc<MockTransport>) -> Dispatcher {
        let credentials = CredentialStore::new(
            Arc::new(MemoryVault::new()),
            Arc::clone(transport) as Arc<dyn Transport>,
            "https://api.test/".parse().unwrap(),
            None,
        );
        Dispatcher::new(Arc::clone(transport) as Arc<dyn Transport>, credentials, 1)
    }

    fn envelope(path: &str) -> RequestEnvelope {
        let url = format!("https://api.test{path}").parse().unwrap();
        RequestEnvelope::new(TransportRequest::new(Method::GET, url))
    }

    #[tokio::test]
    async fn inline_success_and_failure_share_the_classifier() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_json("/ok", 200, &serde_json::json!({ "fine": true }));
        transport.respond_json("/gone", 404, &serde_json::json!({ "message": "missing" }));
        let dispatcher = dispatcher(&transport);

        let ok = dispatcher.execute_direct(envelope("/ok")).await.unwrap();
        assert_eq!(ok, Payload::Json(serde_json::json!({ "fine": true })));

        let gone = dispatcher.execute_direct(envelope("/gone")).await;
        assert!(matches!(
            gone.unwrap_err(),
            Error::Client { status: 404, .. }
        ));
    }

    #[tokio::test]
    async fn inline_reauthentication_is_bounded_to_one_retry() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_json(
            "/secure",
            401,
            &serde_json::json!({ "code": 40101, "message": "expired" }),
        );
        transport.respond_json("/login", 200, &serde_json::json!({ "token": "fresh" }));
        let dispatcher = dispatcher(&transport);
        assert!(
            dispatcher
                .credentials()
                .compare_and_swap(1, Credentials::password_login("alice", "pw"))
                .await
        );

        let outcome = dispatcher.execute_direct(envelope("/secure")).await;
        assert_eq!(outcome.unwrap_err(), Error::InvalidSession);
        assert_eq!(transport.calls_to("/secure"), 2);
        assert_eq!(transport.calls_to("/login"), 1);
    }

    #[tokio::test]
    async fn inline_recovery_succeeds_after_refresh() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_sequence(
            "/secure",
            vec![
                (401, br#"{"code":40101,"message":"expired"}"#.to_vec()),
                (200, br#"{"ok":true}"#.to_vec()),
            ],
        );
        transport.respond_json("/login", 200, &serde_json::json!({ "token": "fresh" }));
        let dispatcher = dispatcher(&transport);
        assert!(
            dispatcher
                .credentials()
                .compare_and_swap(1, Credentials::password_login("alice", "pw"))
                .await
        );

        let outcome = dispatcher.execute_direct(envelope("/secure")).await.unwrap();
        assert_eq!(outcome, Payload::Json(serde_json::json!({ "ok": true })));
    }
}
