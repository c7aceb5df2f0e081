//! High-level façade for the Orbit crate.
//!
//! ## Mental model
//! - `Orbit` - your entrypoint/handle to the SDK. Owns an `OrbitHttpClient`.
//! - Entity wrappers (`Documents`, `Files`, `Users`, `Links`, `Push`) - thin,
//!   cheap-to-construct request builders over that client.
//! - `Dispatcher` / `RequestHandle` - the background execution core, reachable
//!   through [`Orbit::dispatcher`] for callers that submit raw envelopes.
//!
//! ## Quick start
//! ```no_run
//! use orbit_sdk::{Orbit, OrbitHttpClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OrbitHttpClient::builder()
//!     .base_url("https://api.example.com")
//!     .app_code("1234567890")
//!     .build()?;
//! let orbit = Orbit::with_client(client);
//!
//! orbit.users().login("alice", "secret").await?;
//! let memo = orbit
//!     .documents("memos")
//!     .save(&serde_json::json!({ "title": "hello" }))
//!     .await?;
//! # let _ = memo;
//! # Ok(()) }
//! ```

use crate::api::{Documents, Files, Links, Push, Users};
use crate::client::core::OrbitHttpClient;
use crate::dispatch::{Dispatcher, Priority};

/// High-level façade. Owns an `OrbitHttpClient` and constructs the wrappers.
///
/// An explicit context object: nothing in the SDK depends on process-wide
/// state. Callers that want global-style access can park one instance in
/// [`crate::global`].
#[derive(Clone, Debug)]
pub struct Orbit {
    client: OrbitHttpClient,
}

impl Orbit {
    /// Construct from an already-configured client.
    #[must_use]
    pub fn with_client(client: OrbitHttpClient) -> Self {
        Self { client }
    }

    /// Document operations scoped to `collection`.
    #[must_use]
    pub fn documents(&self, collection: impl Into<String>) -> Documents {
        Documents {
            client: self.client.clone(),
            collection: collection.into(),
            priority: Priority::Normal,
        }
    }

    /// File operations.
    #[must_use]
    pub fn files(&self) -> Files {
        Files {
            client: self.client.clone(),
            priority: Priority::Normal,
        }
    }

    /// User/identity operations.
    #[must_use]
    pub fn users(&self) -> Users {
        Users {
            client: self.client.clone(),
        }
    }

    /// Link operations.
    #[must_use]
    pub fn links(&self) -> Links {
        Links {
            client: self.client.clone(),
            priority: Priority::Normal,
        }
    }

    /// Push messaging.
    #[must_use]
    pub fn push(&self) -> Push {
        Push {
            client: self.client.clone(),
        }
    }

    /// The background dispatcher (submit raw envelopes, shut down the pool).
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        self.client.dispatcher()
    }

    /// Access the underlying client (advanced use).
    #[inline]
    #[must_use]
    pub fn client(&self) -> &OrbitHttpClient {
        &self.client
    }
}
