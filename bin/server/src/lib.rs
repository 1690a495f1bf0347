//! tacokumo admin API server.
//!
//! REST endpoints for managing projects, roles, user groups and users,
//! with GitHub sign-in for browsers and bearer JWTs for machine clients.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;

#[cfg(test)]
mod test_support;

use axum::{Router, middleware::from_fn_with_state};
use std::sync::Arc;

use crate::auth::{AppState, authenticate};

/// Builds the router with authentication applied to every non-public route.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .nest(api::API_PREFIX, api::router())
        .layer(from_fn_with_state(state.clone(), authenticate))
        .with_state(state)
}
