//! Links between documents.

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::client::core::OrbitHttpClient;
use crate::dispatch::{Priority, RequestEnvelope, empty_parser};
use crate::errors::Result;

/// One directed, labeled link between two documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Link(serde_json::Value);

impl Link {
    /// The server-assigned link id (empty if the server omitted one).
    #[must_use]
    pub fn id(&self) -> &str {
        self.0.get("id").and_then(|v| v.as_str()).unwrap_or("")
    }

    /// The link's label, if present.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.0.get("label").and_then(|v| v.as_str())
    }

    /// The raw JSON value.
    #[must_use]
    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }
}

/// Link operations.
///
/// Created via [`crate::Orbit::links`].
#[derive(Debug, Clone)]
pub struct Links {
    pub(crate) client: OrbitHttpClient,
    pub(crate) priority: Priority,
}

impl Links {
    /// Run subsequent calls from this wrapper at `priority`.
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Link `source_id` to `dest_id` under `label`.
    pub async fn create(&self, label: &str, source_id: &str, dest_id: &str) -> Result<Link> {
        let request = self
            .client
            .request(Method::POST, &format!("link/{source_id}/{label}/{dest_id}"))?;
        let payload = self
            .client
            .submit(RequestEnvelope::new(request).priority(self.priority))
            .wait()
            .await?;
        payload.deserialize()
    }

    /// Fetch a link by id.
    pub async fn get(&self, id: &str) -> Result<Link> {
        let request = self.client.request(Method::GET, &format!("link/{id}"))?;
        let payload = self
            .client
            .submit(RequestEnvelope::new(request).priority(self.priority))
            .wait()
            .await?;
        payload.deserialize()
    }

    /// List links, optionally restricted to one label.
    pub async fn list(&self, label: Option<&str>) -> Result<Vec<Link>> {
        let mut request = self.client.request(Method::GET, "link")?;
        if let Some(label) = label {
            request.url.query_pairs_mut().append_pair("label", label);
        }
        let payload = self
            .client
            .submit(RequestEnvelope::new(request).priority(self.priority))
            .wait()
            .await?;
        payload.deserialize()
    }

    /// Delete a link.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let request = self.client.request(Method::DELETE, &format!("link/{id}"))?;
        self.client
            .submit(
                RequestEnvelope::new(request)
                    .priority(self.priority)
                    .parser(empty_parser()),
            )
            .wait()
            .await?;
        Ok(())
    }
}
