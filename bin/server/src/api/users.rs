//! User endpoints, authorized by `user:<email>:*`.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tacokumo_admin_authz::{Action, ResourceType};
use tacokumo_admin_core::{ProjectId, UserId};

use super::{Listing, Pagination, ensure_readable, required};
use crate::auth::{AppState, Authorized};
use crate::db::{RoleRecord, UserRecord};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub email: String,
}

/// A user with the roles assigned to them.
#[derive(Debug, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: UserRecord,
    pub roles: Vec<RoleRecord>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    caller: Authorized,
    payload: Result<Json<CreateUser>, JsonRejection>,
) -> Result<(StatusCode, Json<UserRecord>), ApiError> {
    let Json(body) = payload?;
    let email = required(&body.email, "email")?;
    if !email.contains('@') {
        return Err(ApiError::invalid_input("email must be an email address"));
    }
    caller
        .authorizer
        .require(ResourceType::User, &email, Action::Create)?;

    let user = UserRecord::new(email);
    state.stores.users.create(&user).await?;
    tracing::info!(user_id = %user.id, "created user");

    Ok((StatusCode::CREATED, Json(user)))
}

/// Lists the users whose email the caller holds read on.
pub async fn list(
    State(state): State<Arc<AppState>>,
    caller: Authorized,
    query: Result<Query<Pagination>, QueryRejection>,
) -> Result<Json<Listing<UserRecord>>, ApiError> {
    let Query(pagination) = query?;
    let page = pagination.page()?;
    let emails: Vec<String> = caller
        .authorizer
        .readable_identifiers(ResourceType::User)
        .into_iter()
        .collect();

    let users = state.stores.users.list_by_emails(&emails, page).await?;
    Ok(Json(Listing::new(users, page)))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    caller: Authorized,
    Path(user_id): Path<String>,
) -> Result<Json<UserDetail>, ApiError> {
    let id = UserId::from_str(&user_id)?;
    let user = state
        .stores
        .users
        .find_by_id(id)
        .await?
        .ok_or(ApiError::NotFound { resource: "user" })?;
    ensure_readable(&caller.authorizer, ResourceType::User, &user.email, "user")?;

    let assigned = state.stores.users.list_roles(user.id).await?;
    let roles = readable_roles(&state, &caller, assigned).await?;
    Ok(Json(UserDetail { user, roles }))
}

/// Keeps the roles whose owning project the caller holds `role:<project>:read` on.
async fn readable_roles(
    state: &AppState,
    caller: &Authorized,
    roles: Vec<RoleRecord>,
) -> Result<Vec<RoleRecord>, ApiError> {
    let mut project_names: HashMap<ProjectId, Option<String>> = HashMap::new();
    let mut readable = Vec::with_capacity(roles.len());
    for role in roles {
        if !project_names.contains_key(&role.project_id) {
            let name = state
                .stores
                .projects
                .find_by_id(role.project_id)
                .await?
                .map(|project| project.name);
            project_names.insert(role.project_id, name);
        }
        let visible = project_names
            .get(&role.project_id)
            .and_then(Option::as_deref)
            .is_some_and(|name| caller.authorizer.can(ResourceType::Role, name, Action::Read));
        if visible {
            readable.push(role);
        }
    }
    Ok(readable)
}
