//! Per-request tracked state: the envelope plus its lifecycle.
//!
//! The dispatcher exclusively owns state transitions; the caller's handle
//! only requests them. Every transition happens under the flight's own lock,
//! and the `done` watch flips exactly once, after the outcome is recorded,
//! so `wait()` never observes a done flag without an outcome.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use crate::dispatch::envelope::{CompletionFn, Outcome, RequestEnvelope, RequestState};
use crate::errors::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Posted,
    Active,
    Executed,
    Delivered,
    Canceled,
}

pub(crate) struct FlightState {
    pub phase: Phase,
    pub suspended: bool,
    pub auth_retried: bool,
    pub handler: Option<CompletionFn>,
    pub outcome: Option<Outcome>,
}

/// One submitted request, tracked from submission to its terminal state.
pub(crate) struct Flight {
    pub seq: u64,
    pub envelope: RequestEnvelope,
    state: Mutex<FlightState>,
    done: watch::Sender<bool>,
    cancel: watch::Sender<bool>,
}

/// What `resume` decided under the lock.
pub(crate) enum ResumeAction {
    /// Result was already retained: post it to the new handler now.
    PostNow(CompletionFn, Outcome),
    /// Handler re-attached; natural completion will deliver it.
    Attached,
    /// Not suspended (or already terminal): nothing to resume.
    Refused,
}

impl Flight {
    pub fn new(seq: u64, mut envelope: RequestEnvelope) -> Arc<Self> {
        let handler = envelope.handler.take();
        let (done, _) = watch::channel(false);
        let (cancel, _) = watch::channel(false);
        Arc::new(Self {
            seq,
            envelope,
            state: Mutex::new(FlightState {
                phase: Phase::Posted,
                suspended: false,
                auth_retried: false,
                handler,
                outcome: None,
            }),
            done,
            cancel,
        })
    }

    fn lock(&self) -> MutexGuard<'_, FlightState> {
        self.state.lock().expect("flight lock poisoned")
    }

    /// Caller-visible state.
    pub fn public_state(&self) -> RequestState {
        let state = self.lock();
        match state.phase {
            Phase::Canceled => RequestState::Canceled,
            Phase::Delivered => RequestState::Delivered,
            _ if state.suspended => RequestState::Suspended,
            Phase::Posted => RequestState::Posted,
            Phase::Active => RequestState::Active,
            Phase::Executed => RequestState::Executed,
        }
    }

    /// Clone of the retained outcome, if set.
    pub fn outcome(&self) -> Option<Outcome> {
        self.lock().outcome.clone()
    }

    /// Subscribe to the done flag (flips once, after the outcome is set).
    pub fn subscribe_done(&self) -> watch::Receiver<bool> {
        self.done.subscribe()
    }

    /// Subscribe to the cancel-interrupt signal.
    pub fn subscribe_cancel(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    /// POSTED → ACTIVE. Returns `false` if the flight was canceled while
    /// queued (the worker then skips it without touching the transport).
    pub fn begin_execution(&self) -> bool {
        let mut state = self.lock();
        match state.phase {
            Phase::Posted => {
                state.phase = Phase::Active;
                true
            }
            _ => false,
        }
    }

    /// Consume the one re-authentication allowance: ACTIVE → POSTED.
    ///
    /// Returns `false` when the allowance is already spent or the flight was
    /// canceled mid-execution; the caller then surfaces the invalid-session
    /// failure (or drops it) instead of retrying. The allowance flag doubles
    /// as the resubmission guard: one sequence number re-enters the queue at
    /// most once.
    pub fn consume_auth_retry(&self) -> bool {
        let mut state = self.lock();
        if state.phase != Phase::Active || state.auth_retried {
            return false;
        }
        state.auth_retried = true;
        state.phase = Phase::Posted;
        true
    }

    /// Whether this flight is parked waiting for its post-refresh re-run.
    pub fn awaiting_auth_rerun(&self) -> bool {
        let state = self.lock();
        state.phase == Phase::Posted && state.auth_retried
    }

    /// Record the outcome: ACTIVE → EXECUTED, then → DELIVERED unless
    /// suspended. Returns the handler to post, if delivery should happen.
    ///
    /// No-op on canceled/delivered flights; the result is set at most once.
    pub fn complete(&self, outcome: Outcome) -> Option<(CompletionFn, Outcome)> {
        let post = {
            let mut state = self.lock();
            if matches!(state.phase, Phase::Canceled | Phase::Delivered) {
                return None;
            }
            state.phase = Phase::Executed;
            state.outcome = Some(outcome.clone());
            if state.suspended {
                None
            } else {
                state.phase = Phase::Delivered;
                state.handler.take().map(|handler| (handler, outcome))
            }
        };
        // Outcome is visible before the flag flips.
        self.done.send_replace(true);
        post
    }

    /// Best-effort cancel. See the dispatcher docs for the exact semantics.
    pub fn try_cancel(&self, interrupt_if_running: bool) -> bool {
        let interrupted = {
            let mut state = self.lock();
            match state.phase {
                Phase::Posted => {
                    state.phase = Phase::Canceled;
                    state.handler = None;
                    state.outcome = Some(Err(Error::Canceled));
                    false
                }
                Phase::Active if interrupt_if_running => {
                    state.phase = Phase::Canceled;
                    state.handler = None;
                    state.outcome = Some(Err(Error::Canceled));
                    true
                }
                // Running without permission to interrupt, or at/past
                // EXECUTED: cancellation does not take effect.
                _ => return false,
            }
        };
        if interrupted {
            self.cancel.send_replace(true);
        }
        self.done.send_replace(true);
        true
    }

    /// Detach the completion handler; the work keeps running and its result
    /// is retained. Refused once terminal.
    pub fn try_suspend(&self) -> bool {
        let mut state = self.lock();
        if matches!(state.phase, Phase::Canceled | Phase::Delivered) {
            return false;
        }
        state.suspended = true;
        state.handler = None;
        true
    }

    /// Re-attach a handler to a suspended flight.
    pub fn try_resume(&self, handler: CompletionFn) -> ResumeAction {
        let mut state = self.lock();
        if !state.suspended || state.phase == Phase::Canceled {
            return ResumeAction::Refused;
        }
        state.suspended = false;
        match state.outcome.clone() {
            Some(outcome) => {
                state.phase = Phase::Delivered;
                ResumeAction::PostNow(handler, outcome)
            }
            None => {
                state.handler = Some(handler);
                ResumeAction::Attached
            }
        }
    }

    /// Whether the flight was canceled (worker-side check after an
    /// interrupted transport call).
    pub fn is_canceled(&self) -> bool {
        self.lock().phase == Phase::Canceled
    }
}

impl std::fmt::Debug for Flight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flight")
            .field("seq", &self.seq)
            .field("state", &self.public_state())
            .field("tag", &self.envelope.tag)
            .finish_non_exhaustive()
    }
}
