//! The scheduler: a fixed worker pool over a shared priority queue.
//!
//! Workers pull envelopes in priority order (priority first, submission
//! sequence second), execute them against the transport, classify the
//! outcome, transparently re-authenticate once per request on an invalid
//! session, and hand finished results to a single serialized completion lane.
//!
//! Ordering guarantees, exactly:
//! - dispatch *start* order follows priority, then submission order;
//! - completion/delivery order is NOT guaranteed to match submission order
//!   when more than one worker is configured;
//! - completion callbacks are invoked one at a time, FIFO by completion.

use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use crate::auth::CredentialStore;
use crate::client::transport::{Transport, TransportRequest};
use crate::constants::SESSION_HEADER;
use crate::dispatch::classify::classify;
use crate::dispatch::envelope::{CompletionFn, Outcome, Priority, RequestEnvelope};
use crate::dispatch::flight::Flight;
use crate::dispatch::handle::RequestHandle;
use crate::errors::Error;

/// Worker-pool size when the caller does not configure one.
pub(crate) fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(4)
}

type CompletionJob = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Work {
    /// Execute the tracked flight with this sequence number.
    Call,
    /// Refresh the session token, then re-enqueue flight `resume`.
    Refresh { resume: u64 },
}

#[derive(Debug, PartialEq, Eq)]
struct QueuedJob {
    priority: Priority,
    seq: u64,
    work: Work,
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: higher priority first, then lower sequence (FIFO).
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

pub(crate) struct DispatcherInner {
    transport: Arc<dyn Transport>,
    credentials: CredentialStore,
    queue: Mutex<BinaryHeap<QueuedJob>>,
    /// One permit per queued job; closed on shutdown.
    available: Semaphore,
    tracked: Mutex<HashMap<u64, Arc<Flight>>>,
    seq: AtomicU64,
    workers: usize,
    completion_tx: flume::Sender<CompletionJob>,
    /// Consumed when the worker pool starts (first submission).
    startup: Mutex<Option<flume::Receiver<CompletionJob>>>,
}

/// Priority-ordered background executor for [`RequestEnvelope`]s.
///
/// Cheap to clone; all clones share one queue and pool. Workers are plain
/// tokio tasks, spawned lazily on the first submission, so constructing a
/// dispatcher outside a runtime is fine.
#[derive(Clone)]
pub struct Dispatcher {
    pub(crate) inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    /// Dispatcher executing against `transport`, authenticating from
    /// `credentials`, with a pool of `workers` workers.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, credentials: CredentialStore, workers: usize) -> Self {
        let workers = workers.max(1);
        let (completion_tx, completion_rx) = flume::unbounded();
        Self {
            inner: Arc::new(DispatcherInner {
                transport,
                credentials,
                queue: Mutex::new(BinaryHeap::new()),
                available: Semaphore::new(0),
                tracked: Mutex::new(HashMap::new()),
                seq: AtomicU64::new(0),
                workers,
                completion_tx,
                startup: Mutex::new(Some(completion_rx)),
            }),
        }
    }

    /// Configured worker-pool size.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.inner.workers
    }

    /// The credential store this dispatcher authenticates from.
    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    /// Allocate the next sequence number (submission stamp).
    pub(crate) fn next_seq(&self) -> u64 {
        self.inner.next_seq()
    }

    /// Submit an envelope for background execution.
    ///
    /// Assigns the sequence number, registers the flight for later
    /// cancel/suspend/resume lookups, enqueues it and wakes a worker. The
    /// returned handle is the only way to observe or steer the request.
    pub fn submit(&self, envelope: RequestEnvelope) -> RequestHandle {
        self.inner.ensure_started();
        let seq = self.inner.next_seq();
        let priority = envelope.priority;
        let flight = Flight::new(seq, envelope);
        if self.inner.available.is_closed() {
            // Shut down: refuse up front instead of parking forever.
            flight.try_cancel(false);
            return RequestHandle::new(flight, Arc::clone(&self.inner));
        }
        self.inner
            .lock_tracked()
            .insert(seq, Arc::clone(&flight));
        self.inner.push(QueuedJob {
            priority,
            seq,
            work: Work::Call,
        });
        tracing::debug!("submitted request {seq} at {priority:?}");
        RequestHandle::new(flight, Arc::clone(&self.inner))
    }

    /// Stop accepting work and stop the pool.
    ///
    /// Queued-but-unstarted requests are canceled (their waiters observe
    /// [`Error::Canceled`]); requests already executing run to completion and
    /// deliver normally. Idempotent.
    pub fn shutdown(&self) {
        self.inner.available.close();
        let drained: Vec<QueuedJob> = {
            let mut queue = self.inner.lock_queue();
            std::mem::take(&mut *queue).into_vec()
        };
        for job in drained {
            if job.work == Work::Call {
                let flight = self.inner.lock_tracked().remove(&job.seq);
                if let Some(flight) = flight {
                    flight.try_cancel(false);
                }
            }
        }
        tracing::info!("dispatcher shut down");
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workers", &self.inner.workers)
            .field("pending", &self.inner.lock_queue().len())
            .finish_non_exhaustive()
    }
}

impl DispatcherInner {
    fn lock_queue(&self) -> std::sync::MutexGuard<'_, BinaryHeap<QueuedJob>> {
        self.queue.lock().expect("queue lock poisoned")
    }

    fn lock_tracked(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Arc<Flight>>> {
        self.tracked.lock().expect("tracking lock poisoned")
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Spawn the worker pool and the completion lane, exactly once.
    fn ensure_started(self: &Arc<Self>) {
        let Some(completion_rx) = self
            .startup
            .lock()
            .expect("startup lock poisoned")
            .take()
        else {
            return;
        };
        // A single consumer serializes callback invocation: FIFO by
        // completion, one at a time.
        tokio::spawn(async move {
            while let Ok(job) = completion_rx.recv_async().await {
                job();
            }
        });
        for id in 0..self.workers {
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                inner.worker_loop(id).await;
            });
        }
        tracing::debug!("started {} dispatcher workers", self.workers);
    }

    fn push(&self, job: QueuedJob) {
        self.lock_queue().push(job);
        self.available.add_permits(1);
    }

    /// Hand a finished outcome to the serialized completion lane.
    pub(crate) fn post(&self, handler: CompletionFn, outcome: Outcome) {
        let _ = self
            .completion_tx
            .send(Box::new(move || handler(outcome)));
    }

    async fn worker_loop(self: Arc<Self>, id: usize) {
        loop {
            match self.available.acquire().await {
                Ok(permit) => permit.forget(),
                // Semaphore closed: shutdown.
                Err(_) => break,
            }
            let job = self.lock_queue().pop();
            let Some(job) = job else { continue };
            match job.work {
                Work::Call => self.run_call(job.seq).await,
                Work::Refresh { resume } => self.run_refresh(job.seq, resume).await,
            }
        }
        tracing::debug!("dispatcher worker {id} stopped");
    }

    /// Execute one tracked flight end to end.
    ///
    /// Every failure mode is caught and categorized into the outcome; a
    /// worker never dies to a request, so the pool's concurrency level is
    /// preserved across failures.
    async fn run_call(&self, seq: u64) {
        let flight = self.lock_tracked().get(&seq).cloned();
        let Some(flight) = flight else {
            // Canceled and untracked while queued.
            return;
        };
        if !flight.begin_execution() {
            self.lock_tracked().remove(&seq);
            return;
        }

        let request = self.authenticated_request(&flight.envelope);
        let mut cancel_rx = flight.subscribe_cancel();
        let raced = tokio::select! {
            result = self.transport.execute(request) => Some(result),
            _ = cancel_rx.wait_for(|&canceled| canceled) => None,
        };

        let Some(result) = raced else {
            // Interrupted by an explicit cancel: drop silently.
            tracing::debug!("request {seq} interrupted by cancel");
            self.lock_tracked().remove(&seq);
            return;
        };
        if flight.is_canceled() {
            self.lock_tracked().remove(&seq);
            return;
        }

        let outcome = match result {
            Ok(response) => classify(&response, &flight.envelope),
            Err(err) => Err(Error::from(err)),
        };

        if matches!(outcome, Err(Error::InvalidSession)) && flight.consume_auth_retry() {
            tracing::info!("request {seq} hit an invalid session; re-authenticating once");
            self.push(QueuedJob {
                priority: Priority::Critical,
                seq: self.next_seq(),
                work: Work::Refresh { resume: seq },
            });
            return;
        }

        self.finish(&flight, outcome);
    }

    /// Internal maximum-priority job: refresh the token, then re-enqueue the
    /// flight that tripped over the invalid session.
    async fn run_refresh(&self, seq: u64, resume: u64) {
        let refreshed = self.credentials.refresh_session_token(seq).await;
        if !refreshed {
            // The re-run will fail with InvalidSession again and surface it:
            // its retry allowance is already spent.
            tracing::warn!("session refresh for request {resume} failed");
        }
        let flight = self.lock_tracked().get(&resume).cloned();
        let Some(flight) = flight else { return };
        if flight.awaiting_auth_rerun() {
            self.push(QueuedJob {
                priority: flight.envelope.priority,
                seq: resume,
                work: Work::Call,
            });
        } else {
            // Canceled while parked.
            self.lock_tracked().remove(&resume);
        }
    }

    fn finish(&self, flight: &Arc<Flight>, outcome: Outcome) {
        if let Some((handler, outcome)) = flight.complete(outcome) {
            self.post(handler, outcome);
        }
        self.lock_tracked().remove(&flight.seq);
    }

    /// Clone the envelope's request, attaching the current session token.
    ///
    /// Resolution happens at execution time, not submission time, so a
    /// re-run after re-authentication picks up the fresh token.
    pub(crate) fn authenticated_request(&self, envelope: &RequestEnvelope) -> TransportRequest {
        let mut request = envelope.request.clone();
        if envelope.authenticate {
            if let Some(token) = self.credentials.session_token() {
                request.headers.push((SESSION_HEADER.to_owned(), token));
            }
        }
        request
    }
}

impl std::fmt::Debug for DispatcherInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherInner")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}
