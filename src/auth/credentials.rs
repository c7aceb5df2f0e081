//! The authentication material the SDK holds for one backend.

use serde::{Deserialize, Serialize};

/// Current authentication material, stored and swapped as one unit.
///
/// A record may hold a username/password (enabling transparent
/// re-authentication), a session token (attached to authenticated requests),
/// a cached copy of the signed-in user's profile, or any combination.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account name used for password login.
    #[serde(default)]
    pub username: Option<String>,
    /// Account password used for password login.
    #[serde(default)]
    pub password: Option<String>,
    /// Session token returned by the last successful login/refresh.
    #[serde(default)]
    pub session_token: Option<String>,
    /// Cached profile of the signed-in user, as last returned by the server.
    #[serde(default)]
    pub profile: Option<serde_json::Value>,
}

impl Credentials {
    /// Record holding only a username/password pair.
    #[must_use]
    pub fn password_login(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    /// Whether this record can perform a password login.
    #[must_use]
    pub fn can_reauthenticate(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Copy of this record with a replaced session token.
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("profile", &self.profile)
            .finish()
    }
}
