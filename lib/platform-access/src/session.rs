//! Server-side sessions for users who signed in through the identity provider.
//!
//! A session is created at the end of a successful OAuth callback. Its
//! identifier doubles as the bearer token handed to the client and as the
//! key-value store key, so it is generated from the OS random source.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::provider::{ProviderUser, UpstreamTokens};

/// Number of random bytes in a generated token.
pub const TOKEN_BYTES: usize = 32;

/// Generates a fresh opaque token: 32 random bytes, hex-encoded.
///
/// # Errors
///
/// Returns an error if the OS random source is unavailable.
pub fn generate_token() -> Result<String, rand::Error> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(hex::encode(bytes))
}

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a new unpredictable identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS random source is unavailable.
    pub fn generate() -> Result<Self, rand::Error> {
        generate_token().map(Self)
    }

    /// Returns the session ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Membership of the signed-in user in a team of an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMembership {
    /// Organization login, e.g. `tacokumo`.
    pub org_name: String,
    /// Team slug within the organization.
    pub team_name: String,
    /// Role of the user within the team.
    pub role: String,
}

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    /// Principal identifier: the provider's numeric user id as a string.
    user_id: String,
    provider_user_id: i64,
    username: String,
    email: String,
    display_name: String,
    avatar_url: String,
    /// Upstream OAuth access token, kept for calls to the provider API.
    access_token: String,
    refresh_token: Option<String>,
    team_memberships: Vec<TeamMembership>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session for `user`, valid for `duration` from now.
    #[must_use]
    pub fn for_user(
        id: SessionId,
        user: &ProviderUser,
        tokens: &UpstreamTokens,
        team_memberships: Vec<TeamMembership>,
        duration: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: user.id.to_string(),
            provider_user_id: user.id,
            username: user.login.clone(),
            email: user.email.clone(),
            display_name: user.name.clone(),
            avatar_url: user.avatar_url.clone(),
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            team_memberships,
            created_at: now,
            expires_at: now + duration,
        }
    }

    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the principal identifier.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn provider_user_id(&self) -> i64 {
        self.provider_user_id
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn avatar_url(&self) -> &str {
        &self.avatar_url
    }

    /// Returns the upstream access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the upstream refresh token, if the provider issued one.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    #[must_use]
    pub fn team_memberships(&self) -> &[TeamMembership] {
        &self.team_memberships
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Moves the expiry to `expires_at`.
    pub fn set_expires_at(&mut self, expires_at: DateTime<Utc>) {
        self.expires_at = expires_at;
    }

    /// Returns true if the session is expired as of `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Returns true if the session has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn octocat() -> ProviderUser {
        ProviderUser {
            id: 583231,
            login: "octocat".to_string(),
            name: "The Octocat".to_string(),
            email: "octocat@github.com".to_string(),
            avatar_url: "https://avatars.githubusercontent.com/u/583231".to_string(),
        }
    }

    pub(crate) fn upstream_tokens() -> UpstreamTokens {
        UpstreamTokens {
            access_token: "gho_upstream".to_string(),
            refresh_token: None,
        }
    }

    pub(crate) fn session_expiring_in(duration: Duration) -> Session {
        Session::for_user(
            SessionId::generate().expect("random source"),
            &octocat(),
            &upstream_tokens(),
            vec![TeamMembership {
                org_name: "tacokumo".to_string(),
                team_name: "platform".to_string(),
                role: "member".to_string(),
            }],
            duration,
        )
    }

    #[test]
    fn generated_tokens_are_64_hex_chars() {
        let token = generate_token().expect("random source");
        assert_eq!(token.len(), 2 * TOKEN_BYTES);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generated_tokens_differ() {
        let a = SessionId::generate().expect("random source");
        let b = SessionId::generate().expect("random source");
        assert_ne!(a, b);
    }

    #[test]
    fn session_copies_profile_fields() {
        let session = session_expiring_in(Duration::hours(1));
        assert_eq!(session.user_id(), "583231");
        assert_eq!(session.provider_user_id(), 583231);
        assert_eq!(session.username(), "octocat");
        assert_eq!(session.email(), "octocat@github.com");
        assert_eq!(session.access_token(), "gho_upstream");
        assert_eq!(session.team_memberships().len(), 1);
        assert!(session.expires_at() > session.created_at());
    }

    #[test]
    fn session_validity_is_strictly_before_expiry() {
        let session = session_expiring_in(Duration::hours(1));
        assert!(!session.is_expired());
        assert!(session.is_expired_at(session.expires_at()));
        assert!(!session.is_expired_at(session.expires_at() - Duration::seconds(1)));
    }

    #[test]
    fn already_expired_session() {
        let session = session_expiring_in(Duration::seconds(-1));
        assert!(session.is_expired());
    }

    #[test]
    fn set_expires_at_extends_session() {
        let mut session = session_expiring_in(Duration::seconds(-1));
        session.set_expires_at(Utc::now() + Duration::hours(2));
        assert!(!session.is_expired());
    }
}
