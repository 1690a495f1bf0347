//! Role endpoints. Roles are authorized by `role:<project name>:*` grants.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tacokumo_admin_authz::{Action, ResourceType};
use tacokumo_admin_core::RoleId;

use super::{Listing, Pagination, ensure_readable, projects, required};
use crate::auth::{AppState, Authorized};
use crate::db::RoleRecord;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateRole {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRole {
    pub name: Option<String>,
    pub description: Option<String>,
}

async fn find_readable(
    state: &AppState,
    caller: &Authorized,
    project_id: &str,
    role_id: &str,
) -> Result<(String, RoleRecord), ApiError> {
    let project = projects::find(state, project_id).await?;
    ensure_readable(&caller.authorizer, ResourceType::Role, &project.name, "role")?;
    let role_id = RoleId::from_str(role_id)?;
    let role = state
        .stores
        .roles
        .find(project.id, role_id)
        .await?
        .ok_or(ApiError::NotFound { resource: "role" })?;
    Ok((project.name, role))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    caller: Authorized,
    Path(project_id): Path<String>,
    payload: Result<Json<CreateRole>, JsonRejection>,
) -> Result<(StatusCode, Json<RoleRecord>), ApiError> {
    let Json(body) = payload?;
    let name = required(&body.name, "name")?;
    let project = projects::find(&state, &project_id).await?;
    caller
        .authorizer
        .require(ResourceType::Role, &project.name, Action::Create)?;

    let role = RoleRecord::new(project.id, name, body.description);
    state.stores.roles.create(&role).await?;
    tracing::info!(project_id = %project.id, role_id = %role.id, "created role");

    Ok((StatusCode::CREATED, Json(role)))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    caller: Authorized,
    Path(project_id): Path<String>,
    query: Result<Query<Pagination>, QueryRejection>,
) -> Result<Json<Listing<RoleRecord>>, ApiError> {
    let Query(pagination) = query?;
    let page = pagination.page()?;
    let project = projects::find(&state, &project_id).await?;
    ensure_readable(&caller.authorizer, ResourceType::Role, &project.name, "project")?;

    let roles = state.stores.roles.list_by_project(project.id, page).await?;
    Ok(Json(Listing::new(roles, page)))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    caller: Authorized,
    Path((project_id, role_id)): Path<(String, String)>,
) -> Result<Json<RoleRecord>, ApiError> {
    let (_, role) = find_readable(&state, &caller, &project_id, &role_id).await?;
    Ok(Json(role))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    caller: Authorized,
    Path((project_id, role_id)): Path<(String, String)>,
    payload: Result<Json<UpdateRole>, JsonRejection>,
) -> Result<Json<RoleRecord>, ApiError> {
    let Json(body) = payload?;
    let (project_name, mut role) = find_readable(&state, &caller, &project_id, &role_id).await?;
    caller
        .authorizer
        .require(ResourceType::Role, &project_name, Action::Update)?;

    if let Some(name) = body.name {
        role.name = required(&name, "name")?;
    }
    if let Some(description) = body.description {
        role.description = description;
    }
    role.updated_at = Utc::now();

    state.stores.roles.update(&role).await?;
    Ok(Json(role))
}
