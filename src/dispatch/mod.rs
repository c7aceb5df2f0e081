//! The asynchronous request dispatch core.
//!
//! Submission hands a [`RequestEnvelope`] to the [`Dispatcher`]; the returned
//! [`RequestHandle`] is the caller's token for cancel/suspend/resume/wait.
//! Classification, the re-authentication protocol and the completion lane
//! live here too.

mod classify;
mod direct;
mod dispatcher;
mod envelope;
mod flight;
mod handle;

pub use dispatcher::Dispatcher;
pub use envelope::{
    CompletionFn, Outcome, ParseFn, Payload, Priority, RequestEnvelope, RequestState,
    bytes_parser, empty_parser, json_parser,
};
pub use handle::RequestHandle;

pub(crate) use classify::classify_failure;
pub(crate) use dispatcher::default_workers;
