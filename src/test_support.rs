//! Scripted transport and small async helpers shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::Semaphore;

use crate::client::transport::{
    StreamingResponse, Transport, TransportError, TransportRequest, TransportResponse,
};

/// Releases a held (gated) scripted response.
#[derive(Debug, Clone)]
pub(crate) struct Gate {
    permits: Arc<Semaphore>,
}

impl Gate {
    pub fn release(&self) {
        self.permits.add_permits(1);
    }
}

#[derive(Debug, Clone)]
struct Scripted {
    status: u16,
    body: Vec<u8>,
    content_type: Option<String>,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
}

#[derive(Debug)]
enum Route {
    Fixed(Scripted),
    /// Responses consumed front to back; the last one repeats.
    Sequence(VecDeque<(u16, Vec<u8>)>),
}

/// One request as the mock saw it.
#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl RecordedCall {
    pub fn header(&self, name: &str) -> Option<&String> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}

/// In-process [`Transport`] scripted per URL path.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `path` with `status` and a JSON body.
    pub fn respond_json(&self, path: &str, status: u16, body: &serde_json::Value) {
        self.install(
            path,
            Route::Fixed(Scripted {
                status,
                body: serde_json::to_vec(body).expect("scripted body"),
                content_type: Some("application/json".into()),
                delay: None,
                gate: None,
            }),
        );
    }

    /// Always answer `path` with raw bytes and a content type.
    pub fn respond_bytes(&self, path: &str, status: u16, body: Vec<u8>, content_type: &str) {
        self.install(
            path,
            Route::Fixed(Scripted {
                status,
                body,
                content_type: Some(content_type.into()),
                delay: None,
                gate: None,
            }),
        );
    }

    /// Answer `path` after a fixed delay.
    pub fn respond_delayed(&self, path: &str, status: u16, body: Vec<u8>, delay: Duration) {
        self.install(
            path,
            Route::Fixed(Scripted {
                status,
                body,
                content_type: None,
                delay: Some(delay),
                gate: None,
            }),
        );
    }

    /// Hold every response on `path` until the returned [`Gate`] is released.
    #[must_use]
    pub fn respond_gated(&self, path: &str, status: u16, body: Vec<u8>) -> Gate {
        let permits = Arc::new(Semaphore::new(0));
        self.install(
            path,
            Route::Fixed(Scripted {
                status,
                body,
                content_type: None,
                delay: None,
                gate: Some(Arc::clone(&permits)),
            }),
        );
        Gate { permits }
    }

    /// Answer `path` with each response in turn; the last repeats.
    pub fn respond_sequence(&self, path: &str, responses: Vec<(u16, Vec<u8>)>) {
        self.install(path, Route::Sequence(responses.into()));
    }

    fn install(&self, path: &str, route: Route) {
        self.routes
            .lock()
            .expect("routes lock")
            .insert(path.to_owned(), route);
    }

    /// Everything the mock has served so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Paths only, in arrival order.
    pub fn call_paths(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.path).collect()
    }

    /// How many times `path` was hit.
    pub fn calls_to(&self, path: &str) -> usize {
        self.calls().iter().filter(|c| c.path == path).count()
    }

    async fn serve(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let path = request.url.path().to_owned();
        self.calls.lock().expect("calls lock").push(RecordedCall {
            method: request.method.to_string(),
            path: path.clone(),
            headers: request.headers.clone(),
        });

        let scripted = {
            let mut routes = self.routes.lock().expect("routes lock");
            match routes.get_mut(&path) {
                Some(Route::Fixed(s)) => Some(s.clone()),
                Some(Route::Sequence(seq)) => {
                    let next = if seq.len() > 1 {
                        seq.pop_front()
                    } else {
                        seq.front().cloned()
                    };
                    next.map(|(status, body)| Scripted {
                        status,
                        body,
                        content_type: None,
                        delay: None,
                        gate: None,
                    })
                }
                None => None,
            }
        };
        let Some(scripted) = scripted else {
            return Err(TransportError::Connection(format!("no route for {path}")));
        };

        if let Some(gate) = &scripted.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| TransportError::Connection("gate closed".into()))?;
            permit.forget();
        }
        if let Some(delay) = scripted.delay {
            tokio::time::sleep(delay).await;
        }

        let mut headers = HashMap::new();
        headers.insert(
            "content-length".to_owned(),
            scripted.body.len().to_string(),
        );
        if let Some(content_type) = scripted.content_type {
            headers.insert("content-type".to_owned(), content_type);
        }
        Ok(TransportResponse {
            status: scripted.status,
            headers,
            body: Bytes::from(scripted.body),
        })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        self.serve(request).await
    }

    async fn execute_streaming(
        &self,
        request: TransportRequest,
    ) -> Result<StreamingResponse, TransportError> {
        let buffered = self.serve(request).await?;
        // Deliver the body in uneven chunks so consumers see real streaming.
        let chunks: Vec<Result<Bytes, TransportError>> = buffered
            .body
            .chunks(1024)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(StreamingResponse {
            status: buffered.status,
            headers: buffered.headers,
            body: futures_util::stream::iter(chunks).boxed(),
        })
    }
}

/// Poll `condition` until it holds, panicking after two seconds.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within 2s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
