//! The caller-held token for one submitted request.

use std::sync::Arc;

use crate::dispatch::dispatcher::DispatcherInner;
use crate::dispatch::envelope::{Outcome, RequestState};
use crate::dispatch::flight::{Flight, ResumeAction};
use crate::errors::Error;

/// Handle to one in-flight (or finished) request.
///
/// Returned by [`crate::Dispatcher::submit`]. Clones refer to the same
/// request. The handle outlives the dispatcher's own tracking: suspending,
/// resuming and waiting all keep working after the request finished.
#[derive(Clone, Debug)]
pub struct RequestHandle {
    flight: Arc<Flight>,
    dispatcher: Arc<DispatcherInner>,
}

impl RequestHandle {
    pub(crate) fn new(flight: Arc<Flight>, dispatcher: Arc<DispatcherInner>) -> Self {
        Self { flight, dispatcher }
    }

    /// Sequence number assigned at submission.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.flight.seq
    }

    /// Correlation tag, if the envelope carried one.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.flight.envelope.tag.as_deref()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RequestState {
        self.flight.public_state()
    }

    /// Best-effort cancellation. Returns whether it took effect.
    ///
    /// - Still queued: canceled, the worker will skip it, the transport is
    ///   never touched.
    /// - Executing and `interrupt_if_running`: the blocking transport call is
    ///   aborted and its result dropped silently.
    /// - Executing without `interrupt_if_running`, or at/past EXECUTED:
    ///   refused (`false`). DELIVERED and CANCELED are terminal.
    ///
    /// A successful cancel resolves [`RequestHandle::wait`] with
    /// [`Error::Canceled`]; the completion handler is dropped, not invoked.
    pub fn cancel(&self, interrupt_if_running: bool) -> bool {
        self.flight.try_cancel(interrupt_if_running)
    }

    /// Detach the completion handler without canceling the work.
    ///
    /// The request keeps executing and its result is retained for a later
    /// [`RequestHandle::resume`]. Returns `false` once the request is
    /// DELIVERED or CANCELED.
    pub fn suspend(&self) -> bool {
        self.flight.try_suspend()
    }

    /// Re-attach a completion handler to a suspended request.
    ///
    /// If the request already finished while suspended, the retained result
    /// is posted to `handler` immediately (on the serialized completion
    /// lane); otherwise `handler` fires on natural completion. Either way it
    /// is invoked exactly once. Returns `false` when there is nothing
    /// suspended to resume.
    pub fn resume(&self, handler: impl FnOnce(Outcome) + Send + Sync + 'static) -> bool {
        match self.flight.try_resume(Box::new(handler)) {
            ResumeAction::PostNow(handler, outcome) => {
                self.dispatcher.post(handler, outcome);
                true
            }
            ResumeAction::Attached => true,
            ResumeAction::Refused => false,
        }
    }

    /// Wait for the result, independent of completion posting.
    ///
    /// Resolves as soon as the outcome is recorded, even while the request is
    /// suspended or its callback is still queued on the completion lane.
    /// Waiting repeatedly returns clones of the same stored result.
    pub async fn wait(&self) -> Outcome {
        let mut done = self.flight.subscribe_done();
        loop {
            if let Some(outcome) = self.flight.outcome() {
                return outcome;
            }
            if done.changed().await.is_err() {
                // Flight dropped without an outcome; treat as canceled.
                return Err(Error::Canceled);
            }
        }
    }

    /// Wait for the result and deserialize its JSON payload into `T`.
    pub async fn wait_json<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        self.wait().await?.deserialize()
    }
}
