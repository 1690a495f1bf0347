//! Authentication for the admin API.
//!
//! This module provides:
//! - The GitHub identity provider used by the sign-in flow
//! - Bearer JWT validation against a cached JWKS
//! - The middleware that resolves a request's credential to a [`Principal`]
//! - The login, callback, logout and session routes
//!
//! # Credentials
//!
//! Browsers authenticate with the opaque session id issued at sign-in,
//! sent either as the `session_id` cookie or as a bearer token. Machine
//! clients present an access token from the configured issuer; its
//! `permissions` claim is what resource handlers authorize against.

pub mod github;
pub mod jwks;
pub mod jwt;
pub mod middleware;
pub mod routes;

pub use middleware::{
    Authenticator, Authorized, CurrentPrincipal, CurrentSession, Principal, SESSION_COOKIE,
    authenticate,
};

use crate::config::SessionConfig;
use crate::db::Stores;
use std::sync::Arc;
use tacokumo_admin_platform_access::{OAuthFlow, SessionStore};

/// Shared application state.
pub struct AppState {
    /// Resolves request credentials.
    pub authenticator: Authenticator,
    /// Sign-in flow against the identity provider.
    pub flow: OAuthFlow,
    /// Session storage, shared with the flow and the authenticator.
    pub sessions: Arc<SessionStore>,
    /// Resource storage.
    pub stores: Stores,
    /// Session configuration.
    pub session_config: SessionConfig,
}
