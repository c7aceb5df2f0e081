//! Push messaging to other users' devices.

use reqwest::Method;
use serde::Serialize;

use crate::client::core::OrbitHttpClient;
use crate::dispatch::{RequestEnvelope, empty_parser};
use crate::errors::{Error, Result};

/// Push messaging operations.
///
/// Created via [`crate::Orbit::push`]. The server fans a message out to every
/// device registered by the target usernames; the SDK only builds the
/// request.
#[derive(Debug, Clone)]
pub struct Push {
    pub(crate) client: OrbitHttpClient,
}

impl Push {
    /// Send `message` to every listed username.
    pub async fn send(&self, message: &str, usernames: &[&str]) -> Result<()> {
        if usernames.is_empty() {
            return Err(Error::validation("push needs at least one recipient"));
        }
        self.send_payload(&serde_json::json!({
            "message": message,
            "users": usernames,
        }))
        .await
    }

    /// Send a fully custom payload (platform-specific keys, badges, sounds).
    pub async fn send_payload<B: Serialize + ?Sized>(&self, payload: &B) -> Result<()> {
        let request = self
            .client
            .request(Method::POST, "push/message")?
            .json(payload)?;
        self.client
            .submit(RequestEnvelope::new(request).parser(empty_parser()))
            .wait()
            .await?;
        Ok(())
    }
}
