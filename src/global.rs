//! Global, resettable [`Orbit`] handle for callers that want global-style
//! access.
//!
//! # Why this exists
//! The core dispatcher/credential logic takes an explicit context object
//! everywhere. Some applications (CLIs, examples, tests) still prefer a
//! process-wide instance over threading an [`Orbit`] through every call
//! site; this module is that thin convenience layer, and nothing in the SDK
//! itself depends on it.
//!
//! # Design
//! - Backing storage is `ArcSwapOption<Orbit>` inside a `OnceLock`.
//! - **Reads are lock-free**; [`global`] does a single atomic load and returns
//!   a cheap clone of the current handle.
//! - **Reset is safe**; [`set_global`]/[`drop_global`] publish a new instance
//!   (or `None`). Existing clones keep working independently.
//! - There is no lazy construction: an `Orbit` needs a base URL, so the
//!   application must [`set_global`] one explicitly before reading it.
//!
//! # Test hygiene
//! Use [`drop_global`] between tests, or [`set_global`] to inject a
//! deterministic instance (e.g. one with a scripted transport).

use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::sync::OnceLock;

use crate::orbit::Orbit;

/// Process-wide slot for the optional default handle.
///
/// Lock-free loads; last-writer-wins stores.
static GLOBAL: OnceLock<ArcSwapOption<Orbit>> = OnceLock::new();

#[inline]
fn slot() -> &'static ArcSwapOption<Orbit> {
    GLOBAL.get_or_init(|| ArcSwapOption::from(None))
}

/// The process-wide default handle, if one was published.
///
/// Returns a **clone** of the stored [`Orbit`]; clones remain valid even if
/// the slot is later replaced or cleared.
#[must_use]
pub fn global() -> Option<Orbit> {
    slot().load_full().map(|current| current.as_ref().clone())
}

/// Publish `orbit` as the process-wide default.
pub fn set_global(orbit: Orbit) {
    slot().store(Some(Arc::new(orbit)));
}

/// Clear the process-wide default. Existing clones keep working.
pub fn drop_global() {
    slot().store(None);
}
