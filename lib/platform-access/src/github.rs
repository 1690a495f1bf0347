//! GitHub OAuth application configuration.
//!
//! Fields with defaults can be omitted when loading from environment
//! variables; the endpoint URLs only need overriding for GitHub Enterprise
//! or tests.

use serde::{Deserialize, Serialize};

/// Configuration for the GitHub OAuth application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// The OAuth client ID.
    client_id: String,
    /// The OAuth client secret.
    client_secret: String,
    /// The callback URL registered with GitHub
    /// (e.g. "https://admin.example.com/v1alpha1/auth/callback").
    callback_url: String,
    /// Scopes to request as a comma-separated string.
    /// Default: "user:email,read:org"
    #[serde(default = "default_scopes")]
    scopes: String,
    /// Organizations whose members may sign in, comma-separated.
    /// Empty allows any GitHub user.
    #[serde(default)]
    allowed_orgs: String,
    #[serde(default = "default_authorize_url")]
    authorize_url: String,
    #[serde(default = "default_token_url")]
    token_url: String,
    /// Base URL of the REST API.
    #[serde(default = "default_api_base_url")]
    api_base_url: String,
}

fn default_scopes() -> String {
    "user:email,read:org".to_string()
}

fn default_authorize_url() -> String {
    "https://github.com/login/oauth/authorize".to_string()
}

fn default_token_url() -> String {
    "https://github.com/login/oauth/access_token".to_string()
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

impl GitHubConfig {
    /// Creates a configuration with defaults for optional fields.
    #[must_use]
    pub fn new(client_id: String, client_secret: String, callback_url: String) -> Self {
        GitHubConfigBuilder::new(client_id, client_secret, callback_url).build()
    }

    /// Creates a configuration builder for more customization.
    #[must_use]
    pub fn builder(
        client_id: String,
        client_secret: String,
        callback_url: String,
    ) -> GitHubConfigBuilder {
        GitHubConfigBuilder::new(client_id, client_secret, callback_url)
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    #[must_use]
    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// Returns the scopes to request.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        split_list(&self.scopes)
    }

    /// Returns the allowed organization logins.
    #[must_use]
    pub fn allowed_orgs(&self) -> Vec<String> {
        split_list(&self.allowed_orgs)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    #[must_use]
    pub fn authorize_url(&self) -> &str {
        &self.authorize_url
    }

    #[must_use]
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Returns the API base URL without a trailing slash.
    #[must_use]
    pub fn api_base_url(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }
}

/// Builder for `GitHubConfig`.
#[derive(Debug)]
pub struct GitHubConfigBuilder {
    client_id: String,
    client_secret: String,
    callback_url: String,
    scopes: Vec<String>,
    allowed_orgs: Vec<String>,
    authorize_url: String,
    token_url: String,
    api_base_url: String,
}

impl GitHubConfigBuilder {
    #[must_use]
    pub fn new(client_id: String, client_secret: String, callback_url: String) -> Self {
        Self {
            client_id,
            client_secret,
            callback_url,
            scopes: vec!["user:email".to_string(), "read:org".to_string()],
            allowed_orgs: Vec::new(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            api_base_url: default_api_base_url(),
        }
    }

    /// Adds a scope to the list of scopes to request.
    #[must_use]
    pub fn add_scope(mut self, scope: String) -> Self {
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }

    /// Restricts sign-in to members of `orgs`.
    #[must_use]
    pub fn allowed_orgs(mut self, orgs: Vec<String>) -> Self {
        self.allowed_orgs = orgs;
        self
    }

    /// Points every endpoint at `base_url`, e.g. a mock server.
    #[must_use]
    pub fn endpoints_at(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.authorize_url = format!("{base}/login/oauth/authorize");
        self.token_url = format!("{base}/login/oauth/access_token");
        self.api_base_url = base.to_string();
        self
    }

    #[must_use]
    pub fn build(self) -> GitHubConfig {
        GitHubConfig {
            client_id: self.client_id,
            client_secret: self.client_secret,
            callback_url: self.callback_url,
            scopes: self.scopes.join(","),
            allowed_orgs: self.allowed_orgs.join(","),
            authorize_url: self.authorize_url,
            token_url: self.token_url,
            api_base_url: self.api_base_url,
        }
    }
}
