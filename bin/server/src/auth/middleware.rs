//! Authentication middleware and extractors for Axum.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use std::sync::Arc;
use tacokumo_admin_authz::{Authorizer, AuthzError};
use tacokumo_admin_platform_access::{Session, SessionStore};

use super::AppState;
use super::jwt::{JwtValidator, TokenClaims, looks_like_jwt};
use crate::error::{ApiError, error_response};

/// Session cookie name.
pub const SESSION_COOKIE: &str = "session_id";

/// Paths served without a credential.
const PUBLIC_PATHS: &[&str] = &[
    "/v1alpha1/health/liveness",
    "/v1alpha1/health/readiness",
    "/v1alpha1/auth/login",
    "/v1alpha1/auth/callback",
    "/v1alpha1/auth/logout",
];

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub enum Principal {
    /// A browser session established through the sign-in flow.
    Session(Session),
    /// A validated access token.
    Token(TokenClaims),
}

impl Principal {
    /// Stable identifier of the caller.
    #[must_use]
    pub fn subject(&self) -> &str {
        match self {
            Self::Session(session) => session.user_id(),
            Self::Token(claims) => &claims.sub,
        }
    }
}

/// Resolves credentials to principals.
pub struct Authenticator {
    sessions: Arc<SessionStore>,
    jwt: Option<Arc<JwtValidator>>,
}

impl Authenticator {
    /// Creates an authenticator. Without a validator every credential is
    /// treated as a session id.
    pub fn new(sessions: Arc<SessionStore>, jwt: Option<Arc<JwtValidator>>) -> Self {
        Self { sessions, jwt }
    }

    /// Resolves a bearer value or cookie value.
    pub async fn resolve(&self, credential: &str) -> Result<Principal, AuthRejection> {
        if let Some(validator) = self.jwt.as_ref().filter(|_| looks_like_jwt(credential)) {
            return match validator.validate(credential).await {
                Ok(claims) => Ok(Principal::Token(claims)),
                Err(e) => {
                    tracing::debug!(error = %e, "rejected bearer token");
                    Err(AuthRejection::InvalidToken)
                }
            };
        }

        let session = self
            .sessions
            .get(credential)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "session lookup failed");
                AuthRejection::InternalError
            })?
            .ok_or(AuthRejection::InvalidSession)?;

        if session.is_expired() {
            return Err(AuthRejection::SessionExpired);
        }

        Ok(Principal::Session(session))
    }
}

/// Returns the credential a request presents: the bearer value first, then
/// the session cookie.
pub(crate) fn presented_credential(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Middleware that authenticates every non-public request and stores the
/// [`Principal`] in the request extensions.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let credential =
        presented_credential(request.headers()).ok_or(AuthRejection::MissingCredential)?;
    let principal = state.authenticator.resolve(&credential).await?;
    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}

/// Rejection type for the authentication middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    MissingCredential,
    InvalidSession,
    SessionExpired,
    InvalidToken,
    InternalError,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::MissingCredential => (StatusCode::UNAUTHORIZED, "missing authentication"),
            Self::InvalidSession => (StatusCode::UNAUTHORIZED, "invalid session"),
            Self::SessionExpired => (StatusCode::UNAUTHORIZED, "session expired"),
            Self::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid token"),
            Self::InternalError => (StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
        };
        error_response(status, message)
    }
}

/// Extractor for the request's [`Principal`].
pub struct CurrentPrincipal(pub Principal);

impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(CurrentPrincipal)
            .ok_or(ApiError::NotAuthenticated {
                message: "missing authentication",
            })
    }
}

/// Extractor for requiring a session principal.
pub struct CurrentSession(pub Session);

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match CurrentPrincipal::from_request_parts(parts, state).await?.0 {
            Principal::Session(session) => Ok(CurrentSession(session)),
            Principal::Token(_) => Err(ApiError::NotAuthenticated {
                message: "session required",
            }),
        }
    }
}

/// Extractor for a caller whose token carries permission grants.
///
/// Sessions carry no grants, so only token principals pass. A token
/// without a `permissions` claim is rejected rather than treated as an
/// empty grant set.
pub struct Authorized {
    /// The token subject; owner of personal projects.
    pub subject: String,
    pub authorizer: Authorizer,
}

impl<S> FromRequestParts<S> for Authorized
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentPrincipal(principal) = CurrentPrincipal::from_request_parts(parts, state).await?;
        let Principal::Token(claims) = principal else {
            return Err(AuthzError::NotAuthenticated.into());
        };
        let grants = claims.permissions.ok_or(AuthzError::NotAuthenticated)?;
        let authorizer = Authorizer::from_grants(&grants)?;

        Ok(Authorized {
            subject: claims.sub,
            authorizer,
        })
    }
}
