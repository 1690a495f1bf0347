//! GitHub OAuth and REST API client.

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use reqwest::header::{ACCEPT, USER_AGENT};
use rootcause::Report;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tacokumo_admin_platform_access::{
    GitHubConfig, IdentityProvider, Organization, ProviderError, ProviderUser, StateToken,
    TeamMembership, UpstreamTokens,
};
use tracing::{debug, instrument};

type GitHubOAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

const USER_AGENT_VALUE: &str = "tacokumo-admin-api";
const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// Role recorded for every team membership; `/user/teams` does not
/// report the caller's role within a team.
const TEAM_ROLE: &str = "member";

/// Errors building the client from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubClientError {
    pub details: String,
}

impl std::fmt::Display for GitHubClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid GitHub client configuration: {}", self.details)
    }
}

impl std::error::Error for GitHubClientError {}

#[derive(Debug, Deserialize)]
struct EmailEntry {
    email: String,
    primary: bool,
    verified: bool,
}

#[derive(Debug, Deserialize)]
struct TeamEntry {
    slug: String,
    organization: TeamOrganization,
}

#[derive(Debug, Deserialize)]
struct TeamOrganization {
    login: String,
}

/// [`IdentityProvider`] backed by a GitHub OAuth app.
pub struct GitHubClient {
    oauth: GitHubOAuthClient,
    http: reqwest::Client,
    api_base_url: String,
    scopes: Vec<String>,
}

impl GitHubClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Fails if an endpoint URL is invalid or the HTTP client cannot be built.
    pub fn new(config: &GitHubConfig) -> Result<Self, Report<GitHubClientError>> {
        let invalid = |what: &str, e: &dyn std::fmt::Display| GitHubClientError {
            details: format!("{what}: {e}"),
        };

        let oauth = BasicClient::new(ClientId::new(config.client_id().to_string()))
            .set_client_secret(ClientSecret::new(config.client_secret().to_string()))
            .set_auth_uri(
                AuthUrl::new(config.authorize_url().to_string())
                    .map_err(|e| invalid("authorize URL", &e))?,
            )
            .set_token_uri(
                TokenUrl::new(config.token_url().to_string())
                    .map_err(|e| invalid("token URL", &e))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(config.callback_url().to_string())
                    .map_err(|e| invalid("callback URL", &e))?,
            );

        // Following redirects from the token endpoint would leak the code.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| invalid("HTTP client", &e))?;

        Ok(Self {
            oauth,
            http,
            api_base_url: config.api_base_url().to_string(),
            scopes: config.scopes().into_iter().map(str::to_string).collect(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        tokens: &UpstreamTokens,
    ) -> Result<T, Report<ProviderError>> {
        let response = self
            .http
            .get(format!("{}{endpoint}", self.api_base_url))
            .bearer_auth(&tokens.access_token)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .header(ACCEPT, GITHUB_ACCEPT)
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                endpoint: endpoint.to_string(),
                details: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ProviderError::Status {
                endpoint: endpoint.to_string(),
                status: response.status().as_u16(),
            }
            .into());
        }

        response.json::<T>().await.map_err(|e| {
            ProviderError::Decode {
                endpoint: endpoint.to_string(),
                details: e.to_string(),
            }
            .into()
        })
    }

    async fn primary_verified_email(
        &self,
        tokens: &UpstreamTokens,
    ) -> Result<String, Report<ProviderError>> {
        let emails: Vec<EmailEntry> = self.get_json("/user/emails", tokens).await?;
        emails
            .into_iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email)
            .ok_or_else(|| {
                ProviderError::Decode {
                    endpoint: "/user/emails".to_string(),
                    details: "no primary verified email".to_string(),
                }
                .into()
            })
    }
}

#[async_trait]
impl IdentityProvider for GitHubClient {
    fn authorization_url(&self, state: &StateToken) -> String {
        let state = state.as_str().to_string();
        let (url, _) = self
            .oauth
            .authorize_url(move || CsrfToken::new(state))
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .url();
        url.to_string()
    }

    #[instrument(skip_all)]
    async fn exchange_code(&self, code: &str) -> Result<UpstreamTokens, Report<ProviderError>> {
        let token = self
            .oauth
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| ProviderError::TokenExchange {
                details: e.to_string(),
            })?;

        debug!("authorization code exchanged");
        Ok(UpstreamTokens {
            access_token: token.access_token().secret().clone(),
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
        })
    }

    #[instrument(skip_all)]
    async fn fetch_user(
        &self,
        tokens: &UpstreamTokens,
    ) -> Result<ProviderUser, Report<ProviderError>> {
        let mut user: ProviderUser = self.get_json("/user", tokens).await?;
        if user.email.is_empty() {
            user.email = self.primary_verified_email(tokens).await?;
        }
        Ok(user)
    }

    #[instrument(skip_all)]
    async fn fetch_organizations(
        &self,
        tokens: &UpstreamTokens,
    ) -> Result<Vec<Organization>, Report<ProviderError>> {
        self.get_json("/user/orgs", tokens).await
    }

    #[instrument(skip_all)]
    async fn fetch_team_memberships(
        &self,
        tokens: &UpstreamTokens,
    ) -> Result<Vec<TeamMembership>, Report<ProviderError>> {
        let teams: Vec<TeamEntry> = self.get_json("/user/teams", tokens).await?;
        Ok(teams
            .into_iter()
            .map(|team| TeamMembership {
                org_name: team.organization.login,
                team_name: team.slug,
                role: TEAM_ROLE.to_string(),
            })
            .collect())
    }
}
