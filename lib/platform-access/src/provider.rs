//! Contract for the upstream identity provider.
//!
//! The OAuth flow depends only on [`IdentityProvider`]; the GitHub
//! implementation lives in the server crate.

use async_trait::async_trait;
use rootcause::Report;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ProviderError;
use crate::session::TeamMembership;
use crate::state::StateToken;

/// Tokens issued by the provider for a completed authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// The signed-in user's profile.
///
/// Optional profile fields the provider reports as `null` decode as empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: i64,
    pub login: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub avatar_url: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// An organization the user belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub login: String,
}

/// An OAuth2 identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Builds the URL the browser is sent to, carrying `state`.
    fn authorization_url(&self, state: &StateToken) -> String;

    /// Exchanges an authorization code for tokens. Codes are single use, so
    /// this is never retried.
    async fn exchange_code(&self, code: &str) -> Result<UpstreamTokens, Report<ProviderError>>;

    /// Fetches the user's profile.
    async fn fetch_user(
        &self,
        tokens: &UpstreamTokens,
    ) -> Result<ProviderUser, Report<ProviderError>>;

    /// Fetches the organizations the user belongs to.
    async fn fetch_organizations(
        &self,
        tokens: &UpstreamTokens,
    ) -> Result<Vec<Organization>, Report<ProviderError>>;

    /// Fetches the user's team memberships.
    async fn fetch_team_memberships(
        &self,
        tokens: &UpstreamTokens,
    ) -> Result<Vec<TeamMembership>, Report<ProviderError>>;
}

/// Returns true if any of `organizations` is in `allowed`.
///
/// An empty allow-list admits everyone.
#[must_use]
pub fn is_member_of_allowed_org(allowed: &[String], organizations: &[Organization]) -> bool {
    allowed.is_empty()
        || organizations
            .iter()
            .any(|org| allowed.iter().any(|name| name == &org.login))
}
