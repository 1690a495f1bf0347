//! The OAuth authorization-code flow, independent of any HTTP framework.
//!
//! [`OAuthFlow::begin_login`] records a pending login and returns the
//! provider URL to send the browser to. [`OAuthFlow::complete_callback`]
//! consumes that record, exchanges the code, checks organization membership
//! and creates the session. No session is written unless every check passes.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use url::Url;

use crate::error::FlowError;
use crate::provider::{IdentityProvider, is_member_of_allowed_org};
use crate::session::{Session, SessionId};
use crate::state::{CsrfState, DEFAULT_STATE_TTL_MINUTES, StateToken};
use crate::store::{SessionStore, StateStore};

/// Deployment settings for the flow.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    /// Where to send the browser when the login carried no redirect URI.
    pub frontend_url: Url,
    /// Lifetime of new sessions.
    pub session_ttl: Duration,
    /// Lifetime of pending-login state records.
    pub state_ttl: Duration,
    /// Organizations whose members may sign in. Empty admits everyone.
    pub allowed_orgs: Vec<String>,
}

impl FlowSettings {
    /// Settings with a 24 hour session and a 10 minute state lifetime.
    #[must_use]
    pub fn new(frontend_url: Url) -> Self {
        Self {
            frontend_url,
            session_ttl: Duration::hours(24),
            state_ttl: Duration::minutes(DEFAULT_STATE_TTL_MINUTES),
            allowed_orgs: Vec::new(),
        }
    }
}

/// A started login.
#[derive(Debug, Clone)]
pub struct LoginInitiation {
    /// The provider URL the browser must visit.
    pub authorization_url: String,
    /// The state value embedded in `authorization_url`.
    pub state: StateToken,
}

/// A finished login.
#[derive(Debug, Clone)]
pub struct CompletedLogin {
    /// The newly stored session.
    pub session: Session,
    /// Where to send the browser, with `token` and `state` appended.
    pub redirect_url: Url,
}

/// Orchestrates login and callback.
pub struct OAuthFlow {
    provider: Arc<dyn IdentityProvider>,
    sessions: Arc<SessionStore>,
    states: Arc<StateStore>,
    settings: FlowSettings,
}

impl OAuthFlow {
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        sessions: Arc<SessionStore>,
        states: Arc<StateStore>,
        settings: FlowSettings,
    ) -> Self {
        Self {
            provider,
            sessions,
            states,
            settings,
        }
    }

    /// Starts a login, remembering `redirect_uri` for the callback.
    ///
    /// # Errors
    ///
    /// Fails if `redirect_uri` is not an absolute URL on the frontend's
    /// origin, or if the state record cannot be generated or stored.
    #[instrument(skip(self))]
    pub async fn begin_login(
        &self,
        redirect_uri: Option<&str>,
    ) -> Result<LoginInitiation, FlowError> {
        let redirect_uri = match redirect_uri.filter(|uri| !uri.is_empty()) {
            Some(uri) => {
                let parsed = Url::parse(uri).map_err(|_| FlowError::InvalidRedirectUri {
                    uri: uri.to_string(),
                })?;
                // The callback appends the session token to this URL.
                if parsed.origin() != self.settings.frontend_url.origin() {
                    return Err(FlowError::InvalidRedirectUri {
                        uri: uri.to_string(),
                    });
                }
                Some(uri.to_string())
            }
            None => None,
        };

        let state = StateToken::generate().map_err(|e| FlowError::TokenGeneration {
            details: e.to_string(),
        })?;
        let record = CsrfState::new(state.clone(), redirect_uri, self.settings.state_ttl);
        self.states
            .create(&record)
            .await
            .map_err(|e| FlowError::Storage {
                details: e.to_string(),
            })?;

        Ok(LoginInitiation {
            authorization_url: self.provider.authorization_url(&state),
            state,
        })
    }

    /// Completes a login from the callback's `code` and `state` parameters.
    ///
    /// # Errors
    ///
    /// Each failed step maps to its own [`FlowError`] variant. Only the
    /// team-membership lookup and the state-record deletion are allowed to
    /// fail without aborting the login.
    #[instrument(skip_all)]
    pub async fn complete_callback(
        &self,
        code: Option<&str>,
        state: Option<&str>,
    ) -> Result<CompletedLogin, FlowError> {
        let (Some(code), Some(state)) = (
            code.filter(|c| !c.is_empty()),
            state.filter(|s| !s.is_empty()),
        ) else {
            return Err(FlowError::MissingParameters);
        };

        let pending = match self.states.get(state).await {
            Ok(Some(pending)) => pending,
            Ok(None) => {
                return Err(FlowError::InvalidState {
                    details: "no pending login for state".to_string(),
                });
            }
            Err(e) => {
                return Err(FlowError::InvalidState {
                    details: e.to_string(),
                });
            }
        };

        // Lookup and delete are separate calls; two callbacks racing on one
        // state can both pass the lookup.
        if let Err(e) = self.states.delete(state).await {
            warn!(error = %e, "failed to delete oauth state");
        }

        if pending.expires_at() <= Utc::now() {
            return Err(FlowError::InvalidState {
                details: "pending login expired".to_string(),
            });
        }

        let tokens = self
            .provider
            .exchange_code(code)
            .await
            .map_err(|e| FlowError::CodeExchange {
                details: e.to_string(),
            })?;

        let user = self
            .provider
            .fetch_user(&tokens)
            .await
            .map_err(|e| FlowError::UserInfo {
                details: e.to_string(),
            })?;

        let organizations = self
            .provider
            .fetch_organizations(&tokens)
            .await
            .map_err(|e| FlowError::Organizations {
                details: e.to_string(),
            })?;

        if !is_member_of_allowed_org(&self.settings.allowed_orgs, &organizations) {
            warn!(username = %user.login, "sign-in rejected: not in an allowed organization");
            return Err(FlowError::OrganizationNotAllowed {
                username: user.login,
            });
        }

        let teams = match self.provider.fetch_team_memberships(&tokens).await {
            Ok(teams) => teams,
            Err(e) => {
                warn!(error = %e, username = %user.login, "failed to fetch team memberships");
                Vec::new()
            }
        };

        let session_id = SessionId::generate().map_err(|e| FlowError::TokenGeneration {
            details: e.to_string(),
        })?;
        let session = Session::for_user(
            session_id,
            &user,
            &tokens,
            teams,
            self.settings.session_ttl,
        );

        let mut redirect_url = pending
            .redirect_uri()
            .and_then(|uri| Url::parse(uri).ok())
            .unwrap_or_else(|| self.settings.frontend_url.clone());
        redirect_url
            .query_pairs_mut()
            .append_pair("token", session.id().as_str())
            .append_pair("state", state);

        self.sessions
            .create(&session)
            .await
            .map_err(|e| FlowError::Storage {
                details: e.to_string(),
            })?;

        info!(username = %user.login, "user signed in");
        Ok(CompletedLogin {
            session,
            redirect_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::{Organization, ProviderUser, UpstreamTokens};
    use crate::session::TeamMembership;
    use crate::session::tests::octocat;
    use crate::store::{DEFAULT_SESSION_TTL, DEFAULT_STATE_TTL, MemoryStore, RecordStore};
    use async_trait::async_trait;
    use rootcause::Report;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeProvider {
        fail_exchange: bool,
        fail_teams: bool,
        organizations: Vec<&'static str>,
        exchanges: AtomicUsize,
    }

    fn provider_error(endpoint: &str) -> Report<ProviderError> {
        ProviderError::Status {
            endpoint: endpoint.to_string(),
            status: 500,
        }
        .into()
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        fn authorization_url(&self, state: &StateToken) -> String {
            format!("https://github.test/login/oauth/authorize?state={state}")
        }

        async fn exchange_code(
            &self,
            code: &str,
        ) -> Result<UpstreamTokens, Report<ProviderError>> {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            if self.fail_exchange {
                return Err(ProviderError::TokenExchange {
                    details: format!("bad code {code}"),
                }
                .into());
            }
            Ok(UpstreamTokens {
                access_token: "gho_test".to_string(),
                refresh_token: None,
            })
        }

        async fn fetch_user(
            &self,
            _tokens: &UpstreamTokens,
        ) -> Result<ProviderUser, Report<ProviderError>> {
            Ok(octocat())
        }

        async fn fetch_organizations(
            &self,
            _tokens: &UpstreamTokens,
        ) -> Result<Vec<Organization>, Report<ProviderError>> {
            Ok(self
                .organizations
                .iter()
                .map(|login| Organization {
                    id: 1,
                    login: (*login).to_string(),
                })
                .collect())
        }

        async fn fetch_team_memberships(
            &self,
            _tokens: &UpstreamTokens,
        ) -> Result<Vec<TeamMembership>, Report<ProviderError>> {
            if self.fail_teams {
                return Err(provider_error("/user/teams"));
            }
            Ok(vec![TeamMembership {
                org_name: "tacokumo".to_string(),
                team_name: "platform".to_string(),
                role: "member".to_string(),
            }])
        }
    }

    struct Harness {
        flow: OAuthFlow,
        provider: Arc<FakeProvider>,
        sessions: Arc<MemoryStore<Session>>,
        states: Arc<MemoryStore<CsrfState>>,
    }

    fn harness(provider: FakeProvider, allowed_orgs: &[&str]) -> Harness {
        let provider = Arc::new(provider);
        let sessions = Arc::new(MemoryStore::<Session>::new(DEFAULT_SESSION_TTL));
        let states = Arc::new(MemoryStore::<CsrfState>::new(DEFAULT_STATE_TTL));
        let mut settings =
            FlowSettings::new(Url::parse("https://admin.example.com/").expect("url"));
        settings.allowed_orgs = allowed_orgs.iter().map(|o| (*o).to_string()).collect();

        let flow = OAuthFlow::new(
            provider.clone(),
            sessions.clone(),
            states.clone(),
            settings,
        );
        Harness {
            flow,
            provider,
            sessions,
            states,
        }
    }

    #[tokio::test]
    async fn begin_login_stores_state_and_embeds_it() {
        let h = harness(FakeProvider::default(), &[]);
        let login = h
            .flow
            .begin_login(Some("https://admin.example.com/after"))
            .await
            .expect("login");

        assert!(login.authorization_url.contains(login.state.as_str()));
        let stored = h
            .states
            .get(login.state.as_str())
            .await
            .expect("get")
            .expect("state stored");
        assert_eq!(stored.redirect_uri(), Some("https://admin.example.com/after"));
        assert!(h.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn begin_login_rejects_relative_redirect() {
        let h = harness(FakeProvider::default(), &[]);
        let err = h.flow.begin_login(Some("/relative")).await.unwrap_err();
        assert!(matches!(err, FlowError::InvalidRedirectUri { .. }));
        assert!(h.states.is_empty().await);
    }

    #[tokio::test]
    async fn begin_login_rejects_redirect_to_another_origin() {
        let h = harness(FakeProvider::default(), &[]);
        for uri in [
            "https://evil.example.com/after",
            "http://admin.example.com/after",
            "https://admin.example.com:8443/after",
        ] {
            let err = h.flow.begin_login(Some(uri)).await.unwrap_err();
            assert!(matches!(err, FlowError::InvalidRedirectUri { .. }), "{uri}");
        }
        assert!(h.states.is_empty().await);
    }

    #[tokio::test]
    async fn callback_requires_code_and_state() {
        let h = harness(FakeProvider::default(), &[]);
        for (code, state) in [(None, Some("s")), (Some("c"), None), (Some(""), Some("s"))] {
            let err = h.flow.complete_callback(code, state).await.unwrap_err();
            assert_eq!(err, FlowError::MissingParameters);
        }
        assert_eq!(h.provider.exchanges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_state_is_rejected_without_a_session() {
        let h = harness(FakeProvider::default(), &[]);
        let err = h
            .flow
            .complete_callback(Some("code"), Some("forged"))
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::InvalidState { .. }));
        assert_eq!(h.provider.exchanges.load(Ordering::SeqCst), 0);
        assert!(h.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn state_can_only_be_used_once() {
        let h = harness(FakeProvider::default(), &[]);
        let login = h.flow.begin_login(None).await.expect("login");

        h.flow
            .complete_callback(Some("code"), Some(login.state.as_str()))
            .await
            .expect("first callback");
        let err = h
            .flow
            .complete_callback(Some("code"), Some(login.state.as_str()))
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::InvalidState { .. }));
        assert_eq!(h.sessions.len().await, 1);
    }

    #[tokio::test]
    async fn failed_code_exchange_writes_no_session() {
        let h = harness(
            FakeProvider {
                fail_exchange: true,
                ..FakeProvider::default()
            },
            &[],
        );
        let login = h.flow.begin_login(None).await.expect("login");
        let err = h
            .flow
            .complete_callback(Some("bad"), Some(login.state.as_str()))
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::CodeExchange { .. }));
        assert_eq!(h.provider.exchanges.load(Ordering::SeqCst), 1);
        assert!(h.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn user_outside_allowed_orgs_is_rejected() {
        let h = harness(
            FakeProvider {
                organizations: vec!["some-org"],
                ..FakeProvider::default()
            },
            &["tacokumo"],
        );
        let login = h.flow.begin_login(None).await.expect("login");
        let err = h
            .flow
            .complete_callback(Some("code"), Some(login.state.as_str()))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            FlowError::OrganizationNotAllowed {
                username: "octocat".to_string()
            }
        );
        assert!(h.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn team_lookup_failure_is_not_fatal() {
        let h = harness(
            FakeProvider {
                fail_teams: true,
                organizations: vec!["tacokumo"],
                ..FakeProvider::default()
            },
            &["tacokumo"],
        );
        let login = h.flow.begin_login(None).await.expect("login");
        let completed = h
            .flow
            .complete_callback(Some("code"), Some(login.state.as_str()))
            .await
            .expect("callback");

        assert!(completed.session.team_memberships().is_empty());
    }

    #[tokio::test]
    async fn successful_callback_creates_session_and_redirects() {
        let h = harness(
            FakeProvider {
                organizations: vec!["tacokumo"],
                ..FakeProvider::default()
            },
            &["tacokumo"],
        );
        let login = h
            .flow
            .begin_login(Some("https://admin.example.com/after?tab=1"))
            .await
            .expect("login");
        let completed = h
            .flow
            .complete_callback(Some("code"), Some(login.state.as_str()))
            .await
            .expect("callback");

        let session = &completed.session;
        assert_eq!(session.username(), "octocat");
        assert_eq!(session.team_memberships().len(), 1);
        let lifetime = session.expires_at() - session.created_at();
        assert_eq!(lifetime, Duration::hours(24));

        let stored = h
            .sessions
            .get(session.id().as_str())
            .await
            .expect("get")
            .expect("session stored");
        assert_eq!(&stored, session);

        let url = &completed.redirect_url;
        assert_eq!(url.path(), "/after");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("tab".to_string(), "1".to_string())));
        assert!(pairs.contains(&("token".to_string(), session.id().to_string())));
        assert!(pairs.contains(&("state".to_string(), login.state.to_string())));
    }

    #[tokio::test]
    async fn callback_without_redirect_uri_uses_frontend_url() {
        let h = harness(FakeProvider::default(), &[]);
        let login = h.flow.begin_login(None).await.expect("login");
        let completed = h
            .flow
            .complete_callback(Some("code"), Some(login.state.as_str()))
            .await
            .expect("callback");

        assert_eq!(completed.redirect_url.host_str(), Some("admin.example.com"));
    }
}
