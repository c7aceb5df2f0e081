//! Identity flows: signup, login, logout, and the signed-in user's profile.

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::auth::{Credentials, LoginResponse};
use crate::client::core::OrbitHttpClient;
use crate::dispatch::{RequestEnvelope, empty_parser};
use crate::errors::{Error, Result};

/// Profile of a user, as the server returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(serde_json::Value);

impl UserProfile {
    /// The username, if present in the profile.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.0.get("username").and_then(|v| v.as_str())
    }

    /// Look up a field on the profile.
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

/// User/identity operations.
///
/// Created via [`crate::Orbit::users`]. `signup` and `login` store the
/// accepted credentials (with the fresh session token) in the credential
/// store, stamped with the call's sequence number so racing identity
/// operations resolve last-writer-wins; `logout` clears them under the same
/// discipline.
#[derive(Debug, Clone)]
pub struct Users {
    pub(crate) client: OrbitHttpClient,
}

impl Users {
    /// Create an account and sign in as it.
    pub async fn signup(&self, username: &str, password: &str) -> Result<UserProfile> {
        let seq = self.client.dispatcher().next_seq();
        let request = self.client.request(Method::POST, "user")?.json(&serde_json::json!({
            "username": username,
            "password": password,
        }))?;
        let payload = self
            .client
            .execute(RequestEnvelope::new(request).unauthenticated())
            .await?;
        self.store_session(seq, username, password, payload.into_json()?)
            .await
    }

    /// Sign in with a username and password.
    ///
    /// On success the store holds the username/password (for transparent
    /// session recovery), the fresh token and the cached profile.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile> {
        let seq = self.client.dispatcher().next_seq();
        let request = self.client.request(Method::POST, "login")?.json(&serde_json::json!({
            "username": username,
            "password": password,
        }))?;
        let payload = self
            .client
            .execute(RequestEnvelope::new(request).unauthenticated())
            .await?;
        self.store_session(seq, username, password, payload.into_json()?)
            .await
    }

    /// Sign out: invalidate the session server-side, then clear the store.
    pub async fn logout(&self) -> Result<()> {
        let seq = self.client.dispatcher().next_seq();
        let request = self.client.request(Method::POST, "logout")?;
        self.client
            .execute(RequestEnvelope::new(request).parser(empty_parser()))
            .await?;
        self.client.credentials().clear(seq).await;
        Ok(())
    }

    /// Fetch the signed-in user's profile.
    pub async fn me(&self) -> Result<UserProfile> {
        let request = self.client.request(Method::GET, "me")?;
        let payload = self
            .client
            .submit(RequestEnvelope::new(request))
            .wait()
            .await?;
        payload.deserialize()
    }

    /// Update the signed-in user's profile.
    pub async fn update_profile<B: Serialize + ?Sized>(&self, body: &B) -> Result<UserProfile> {
        let request = self.client.request(Method::PUT, "me")?.json(body)?;
        let payload = self
            .client
            .submit(RequestEnvelope::new(request))
            .wait()
            .await?;
        payload.deserialize()
    }

    /// Change the signed-in user's password.
    pub async fn change_password(&self, old: &str, new: &str) -> Result<()> {
        let request = self
            .client
            .request(Method::PUT, "me/password")?
            .json(&serde_json::json!({ "old": old, "new": new }))?;
        self.client
            .submit(RequestEnvelope::new(request).parser(empty_parser()))
            .wait()
            .await?;
        Ok(())
    }

    /// Decode a login/signup body and store the accepted credentials.
    async fn store_session(
        &self,
        seq: u64,
        username: &str,
        password: &str,
        body: serde_json::Value,
    ) -> Result<UserProfile> {
        let login: LoginResponse = serde_json::from_value(body)
            .map_err(|e| Error::io(format!("malformed login response: {e}")))?;
        let mut credentials =
            Credentials::password_login(username, password).with_session_token(login.token);
        credentials.profile = login.user.clone();

        self.client.credentials().compare_and_swap(seq, credentials).await;
        let profile = login.user.unwrap_or(serde_json::Value::Null);
        Ok(UserProfile(profile))
    }
}
