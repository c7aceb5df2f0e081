//! Document CRUD against one collection.

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::client::core::OrbitHttpClient;
use crate::dispatch::{Priority, RequestEnvelope, RequestHandle, empty_parser};
use crate::errors::{Error, Result};

/// One stored document: arbitrary JSON plus the server-assigned `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(serde_json::Value);

impl Document {
    /// The server-assigned document id (empty if the server omitted one).
    #[must_use]
    pub fn id(&self) -> &str {
        self.0.get("id").and_then(|v| v.as_str()).unwrap_or("")
    }

    /// Look up a field on the document body.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.0.get(field)
    }

    /// The raw JSON value.
    #[must_use]
    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }
}

/// Document operations scoped to one collection.
///
/// Created via [`crate::Orbit::documents`]. All calls go through the
/// background dispatcher at this wrapper's priority (default
/// [`Priority::Normal`]).
#[derive(Debug, Clone)]
pub struct Documents {
    pub(crate) client: OrbitHttpClient,
    pub(crate) collection: String,
    pub(crate) priority: Priority,
}

impl Documents {
    /// Run subsequent calls from this wrapper at `priority`.
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Create a document. Returns it as stored (with its assigned id).
    pub async fn save<B: Serialize + ?Sized>(&self, body: &B) -> Result<Document> {
        let request = self
            .client
            .request(Method::POST, &format!("document/{}", self.collection))?
            .json(body)?;
        let payload = self
            .client
            .submit(RequestEnvelope::new(request).priority(self.priority))
            .wait()
            .await?;
        payload.deserialize()
    }

    /// Fetch a document by id.
    pub async fn get(&self, id: &str) -> Result<Document> {
        self.get_handle(id)?.wait_json().await
    }

    /// Queued fetch: returns the handle for cancel/suspend/resume/wait.
    pub fn get_handle(&self, id: &str) -> Result<RequestHandle> {
        let request = self
            .client
            .request(Method::GET, &format!("document/{}/{id}", self.collection))?;
        Ok(self
            .client
            .submit(RequestEnvelope::new(request).priority(self.priority)))
    }

    /// List the collection's documents.
    pub async fn list(&self) -> Result<Vec<Document>> {
        let request = self
            .client
            .request(Method::GET, &format!("document/{}", self.collection))?;
        let payload = self
            .client
            .submit(RequestEnvelope::new(request).priority(self.priority))
            .wait()
            .await?;
        payload.deserialize()
    }

    /// Replace a document's body.
    pub async fn update<B: Serialize + ?Sized>(&self, id: &str, body: &B) -> Result<Document> {
        let request = self
            .client
            .request(Method::PUT, &format!("document/{}/{id}", self.collection))?
            .json(body)?;
        let payload = self
            .client
            .submit(RequestEnvelope::new(request).priority(self.priority))
            .wait()
            .await?;
        payload.deserialize()
    }

    /// Delete a document.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let request = self
            .client
            .request(Method::DELETE, &format!("document/{}/{id}", self.collection))?;
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

    /// Number of documents in the collection.
    pub async fn count(&self) -> Result<u64> {
        let request = self
            .client
            .request(Method::GET, &format!("document/{}/count", self.collection))?;
        let payload = self
            .client
            .submit(RequestEnvelope::new(request).priority(self.priority))
            .wait()
            .await?;
        let value = payload.into_json()?;
        value
            .get("count")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| Error::io("count response missing `count`"))
    }
}
