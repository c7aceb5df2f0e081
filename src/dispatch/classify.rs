//! Status classification: raw transport responses to typed outcomes.
//!
//! Dispatch is by status-code family (`status / 100`). Success bodies go
//! through the envelope's parser; failure bodies are decoded into the
//! structured [`ErrorBody`], degrading to the raw text when the server sent
//! something unparseable so the original failure is never masked.

use bytes::Bytes;

use crate::client::transport::TransportResponse;
use crate::constants::INVALID_SESSION_CODE;
use crate::dispatch::envelope::{Outcome, RequestEnvelope};
use crate::errors::{Error, ErrorBody};

/// Decode a 4xx/5xx body, falling back to the raw text.
pub(crate) fn parse_error_body(body: &Bytes) -> ErrorBody {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => parsed,
        Err(_) => ErrorBody {
            code: None,
            message: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

/// Classify a failure status without an envelope (streaming path).
pub(crate) fn classify_failure(status: u16, body: &Bytes) -> Error {
    match status / 100 {
        4 => {
            let parsed = parse_error_body(body);
            if status == 401 && parsed.code == Some(INVALID_SESSION_CODE) {
                Error::InvalidSession
            } else {
                Error::Client {
                    status,
                    body: parsed,
                }
            }
        }
        5 => Error::Server {
            status,
            body: parse_error_body(body),
        },
        _ => Error::UnexpectedStatus { status },
    }
}

/// Classify `response` for `envelope`, per the status-family table.
///
/// | Family | Action |
/// |---|---|
/// | 1xx | envelope's continue handler, else `UnexpectedStatus` |
/// | 2xx | envelope's success parser |
/// | 3xx | envelope's redirect handler, else `UnexpectedStatus` |
/// | 4xx | `Client`, or `InvalidSession` on 401 + the reserved code |
/// | 5xx | `Server` |
///
/// Anything outside those families cannot come off a conforming transport;
/// it is reported as an I/O failure rather than crashing the worker.
pub(crate) fn classify(response: &TransportResponse, envelope: &RequestEnvelope) -> Outcome {
    let status = response.status;
    match status / 100 {
        1 => match &envelope.on_continue {
            Some(handler) => handler(response),
            None => Err(Error::UnexpectedStatus { status }),
        },
        2 => (envelope.parser)(response),
        3 => match &envelope.on_redirect {
            Some(handler) => handler(response),
            None => Err(Error::UnexpectedStatus { status }),
        },
        4 | 5 => Err(classify_failure(status, &response.body)),
        other => {
            debug_assert!(false, "unclassifiable status family {other}xx");
            Err(Error::io(format!("unclassifiable status {status}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::TransportRequest;
    use crate::dispatch::envelope::Payload;
    use reqwest::Method;
    use std::sync::Arc;

    fn response(status: u16, body: &str) -> TransportResponse {
        TransportResponse {
            status,
            headers: Default::default(),
            body: Bytes::from(body.to_owned()),
        }
    }

    fn envelope() -> RequestEnvelope {
        let url = "https://api.test/thing".parse().unwrap();
        RequestEnvelope::new(TransportRequest::new(Method::GET, url))
    }

    #[test]
    fn success_goes_through_the_parser() {
        let outcome = classify(&response(200, r#"{"ok":true}"#), &envelope());
        assert_eq!(
            outcome.unwrap(),
            Payload::Json(serde_json::json!({ "ok": true }))
        );
    }

    #[test]
    fn invalid_session_needs_both_401_and_the_reserved_code() {
        let invalid = response(401, r#"{"code":40101,"message":"expired"}"#);
        assert_eq!(
            classify(&invalid, &envelope()).unwrap_err(),
            Error::InvalidSession
        );

        // 401 with a different app code is an ordinary client error.
        let other_code = response(401, r#"{"code":40100,"message":"bad password"}"#);
        assert!(matches!(
            classify(&other_code, &envelope()).unwrap_err(),
            Error::Client { status: 401, .. }
        ));

        // The reserved code outside a 401 is an ordinary client error too.
        let wrong_status = response(403, r#"{"code":40101,"message":"nope"}"#);
        assert!(matches!(
            classify(&wrong_status, &envelope()).unwrap_err(),
            Error::Client { status: 403, .. }
        ));
    }

    #[test]
    fn malformed_error_bodies_degrade_to_raw_text() {
        let outcome = classify(&response(404, "<html>missing</html>"), &envelope());
        match outcome.unwrap_err() {
            Error::Client { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body.code, None);
                assert_eq!(body.message, "<html>missing</html>");
            }
            other => panic!("expected Client, got {other:?}"),
        }
    }

    #[test]
    fn server_failures_are_their_own_category() {
        assert!(matches!(
            classify(&response(503, r#"{"message":"overloaded"}"#), &envelope()).unwrap_err(),
            Error::Server { status: 503, .. }
        ));
    }

    #[test]
    fn unhandled_informational_and_redirect_families_fail() {
        assert_eq!(
            classify(&response(100, ""), &envelope()).unwrap_err(),
            Error::UnexpectedStatus { status: 100 }
        );
        assert_eq!(
            classify(&response(301, ""), &envelope()).unwrap_err(),
            Error::UnexpectedStatus { status: 301 }
        );
    }

    #[test]
    fn attached_redirect_handler_is_consulted() {
        let env = envelope().on_redirect(Arc::new(|resp: &TransportResponse| {
            Ok(Payload::Bytes(resp.body.clone()))
        }));
        let outcome = classify(&response(302, "elsewhere"), &env);
        assert_eq!(
            outcome.unwrap(),
            Payload::Bytes(Bytes::from_static(b"elsewhere"))
        );
    }
}
