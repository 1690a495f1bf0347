//! REST routes of the admin API, mounted under `/v1alpha1`.

pub mod health;
pub mod projects;
pub mod roles;
pub mod user_groups;
pub mod users;

use axum::{
    Router,
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tacokumo_admin_authz::{Action, Authorizer, ResourceType};

use crate::auth::{AppState, routes as auth_routes};
use crate::db::Page;
use crate::error::ApiError;

/// Route prefix of this API version.
pub const API_PREFIX: &str = "/v1alpha1";

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

/// Routes of the API, relative to [`API_PREFIX`].
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health/liveness", get(health::liveness))
        .route("/health/readiness", get(health::readiness))
        .nest("/auth", auth_routes::router())
        .route("/projects", get(projects::list).post(projects::create))
        .route(
            "/projects/{project_id}",
            get(projects::get).patch(projects::update),
        )
        .route(
            "/projects/{project_id}/roles",
            get(roles::list).post(roles::create),
        )
        .route(
            "/projects/{project_id}/roles/{role_id}",
            get(roles::get).patch(roles::update),
        )
        .route(
            "/projects/{project_id}/user-groups",
            get(user_groups::list).post(user_groups::create),
        )
        .route(
            "/projects/{project_id}/user-groups/{group_id}",
            get(user_groups::get).patch(user_groups::update),
        )
        .route("/users", get(users::list).post(users::create))
        .route("/users/{user_id}", get(users::get))
}

/// `limit` and `offset` query parameters of list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    /// Resolves defaults and clamps `limit` to `1..=100`.
    pub fn page(&self) -> Result<Page, ApiError> {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        let offset = self.offset.unwrap_or(0);
        if limit < 0 || offset < 0 {
            return Err(ApiError::invalid_input(
                "limit and offset must not be negative",
            ));
        }
        Ok(Page {
            limit: limit.clamp(1, MAX_LIMIT),
            offset,
        })
    }
}

/// Body of list responses.
#[derive(Debug, Serialize)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub limit: i64,
    pub offset: i64,
}

impl<T> Listing<T> {
    pub fn new(items: Vec<T>, page: Page) -> Self {
        Self {
            items,
            limit: page.limit,
            offset: page.offset,
        }
    }
}

/// Trims `value` and rejects it when empty.
pub(crate) fn required(value: &str, field: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::invalid_input(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}

/// Hides resources the caller may not read behind a 404.
pub(crate) fn ensure_readable(
    authorizer: &Authorizer,
    resource_type: ResourceType,
    resource_id: &str,
    resource: &'static str,
) -> Result<(), ApiError> {
    if authorizer.can(resource_type, resource_id, Action::Read) {
        Ok(())
    } else {
        Err(ApiError::NotFound { resource })
    }
}
