//! Authentication routes for login, callback, logout and the current session.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tacokumo_admin_platform_access::{Session, TeamMembership};
use time::Duration as TimeDuration;

use super::AppState;
use super::jwt::looks_like_jwt;
use super::middleware::{CurrentSession, SESSION_COOKIE, presented_credential};
use crate::config::SessionConfig;
use crate::error::ApiError;

/// Routes mounted under `/auth`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", get(login))
        .route("/callback", get(callback))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/refresh", post(refresh))
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    redirect_uri: Option<String>,
}

/// Query parameters for the OAuth callback. Both are checked by the flow.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
}

/// Profile fields of the signed-in user.
#[derive(Debug, Serialize)]
pub struct SessionUser {
    pub id: String,
    pub github_id: i64,
    pub username: String,
    pub email: String,
    pub name: String,
    pub avatar_url: String,
}

/// Body of `/auth/me` and `/auth/refresh`.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: SessionUser,
    /// The session id, usable as a bearer token.
    pub bearer_token: String,
    pub team_memberships: Vec<TeamMembership>,
    pub expires_at: DateTime<Utc>,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            user: SessionUser {
                id: session.user_id().to_string(),
                github_id: session.provider_user_id(),
                username: session.username().to_string(),
                email: session.email().to_string(),
                name: session.display_name().to_string(),
                avatar_url: session.avatar_url().to_string(),
            },
            bearer_token: session.id().as_str().to_string(),
            team_memberships: session.team_memberships().to_vec(),
            expires_at: session.expires_at(),
        }
    }
}

/// A 302 redirect; `Redirect::to` answers 303.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn session_cookie(config: &SessionConfig, session_id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .secure(config.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::minutes(config.ttl_minutes))
        .build()
}

/// Starts the sign-in flow by redirecting to GitHub.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
) -> Result<Response, ApiError> {
    let initiation = state.flow.begin_login(query.redirect_uri.as_deref()).await?;
    Ok(found(&initiation.authorization_url))
}

/// Handles GitHub's redirect back after the user authorizes the app.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let completed = state
        .flow
        .complete_callback(query.code.as_deref(), query.state.as_deref())
        .await?;

    let cookie = session_cookie(
        &state.session_config,
        completed.session.id().as_str().to_string(),
    );

    Ok((jar.add(cookie), found(completed.redirect_url.as_str())).into_response())
}

/// Ends the caller's session, if any, and clears the cookie.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> impl IntoResponse {
    if let Some(session_id) = presented_credential(&headers).filter(|c| !looks_like_jwt(c)) {
        if let Err(e) = state.sessions.delete(&session_id).await {
            tracing::warn!(error = %e, "failed to delete session on logout");
        }
    }

    let removal = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(TimeDuration::ZERO);

    (jar.add(removal), StatusCode::NO_CONTENT)
}

/// Returns the current session.
pub async fn me(CurrentSession(session): CurrentSession) -> Json<SessionResponse> {
    Json(SessionResponse::from(&session))
}

/// Extends the current session by the configured lifetime.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    CurrentSession(session): CurrentSession,
    jar: CookieJar,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let new_expiry = Utc::now() + state.session_config.ttl();
    let refreshed = state
        .sessions
        .refresh(session.id().as_str(), new_expiry)
        .await
        .map_err(|e| ApiError::Internal {
            message: "failed to refresh session",
            details: e.to_string(),
        })?;

    let cookie = session_cookie(&state.session_config, refreshed.id().as_str().to_string());
    Ok((jar.add(cookie), Json(SessionResponse::from(&refreshed))))
}
