//! CSRF state records for the OAuth authorization-code flow.
//!
//! A state record is written when a login starts and consumed by the
//! matching callback. It lives in the same store as sessions but under its
//! own key prefix and with a much shorter lifetime.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::session::generate_token;

/// Default lifetime of a state record.
pub const DEFAULT_STATE_TTL_MINUTES: i64 = 10;

/// The opaque `state` parameter sent to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateToken(String);

impl StateToken {
    /// Wraps a state value received on a callback.
    #[must_use]
    pub fn new(token: String) -> Self {
        Self(token)
    }

    /// Generates a new unpredictable state value.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS random source is unavailable.
    pub fn generate() -> Result<Self, rand::Error> {
        generate_token().map(Self)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StateToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A pending login awaiting its callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrfState {
    state: StateToken,
    /// Where to send the browser once the login completes.
    redirect_uri: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl CsrfState {
    /// Creates a state record valid for `duration` from now.
    #[must_use]
    pub fn new(state: StateToken, redirect_uri: Option<String>, duration: Duration) -> Self {
        let now = Utc::now();
        Self {
            state,
            redirect_uri,
            created_at: now,
            expires_at: now + duration,
        }
    }

    #[must_use]
    pub fn state(&self) -> &StateToken {
        &self.state
    }

    #[must_use]
    pub fn redirect_uri(&self) -> Option<&str> {
        self.redirect_uri.as_deref()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn set_expires_at(&mut self, expires_at: DateTime<Utc>) {
        self.expires_at = expires_at;
    }
}
