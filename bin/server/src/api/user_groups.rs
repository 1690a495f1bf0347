//! User group endpoints, authorized by `user_group:<project name>:*`.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tacokumo_admin_authz::{Action, ResourceType};
use tacokumo_admin_core::UserGroupId;

use super::{Listing, Pagination, ensure_readable, projects, required};
use crate::auth::{AppState, Authorized};
use crate::db::{UserGroupRecord, UserRecord};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateUserGroup {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserGroup {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// A user group with its members.
#[derive(Debug, Serialize)]
pub struct UserGroupDetail {
    #[serde(flatten)]
    pub group: UserGroupRecord,
    pub members: Vec<UserRecord>,
}

async fn find_readable(
    state: &AppState,
    caller: &Authorized,
    project_id: &str,
    group_id: &str,
) -> Result<(String, UserGroupRecord), ApiError> {
    let project = projects::find(state, project_id).await?;
    ensure_readable(
        &caller.authorizer,
        ResourceType::UserGroup,
        &project.name,
        "user group",
    )?;
    let group_id = UserGroupId::from_str(group_id)?;
    let group = state
        .stores
        .user_groups
        .find(project.id, group_id)
        .await?
        .ok_or(ApiError::NotFound {
            resource: "user group",
        })?;
    Ok((project.name, group))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    caller: Authorized,
    Path(project_id): Path<String>,
    payload: Result<Json<CreateUserGroup>, JsonRejection>,
) -> Result<(StatusCode, Json<UserGroupRecord>), ApiError> {
    let Json(body) = payload?;
    let name = required(&body.name, "name")?;
    let project = projects::find(&state, &project_id).await?;
    caller
        .authorizer
        .require(ResourceType::UserGroup, &project.name, Action::Create)?;

    let group = UserGroupRecord::new(project.id, name, body.description);
    state.stores.user_groups.create(&group).await?;
    tracing::info!(project_id = %project.id, user_group_id = %group.id, "created user group");

    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    caller: Authorized,
    Path(project_id): Path<String>,
    query: Result<Query<Pagination>, QueryRejection>,
) -> Result<Json<Listing<UserGroupRecord>>, ApiError> {
    let Query(pagination) = query?;
    let page = pagination.page()?;
    let project = projects::find(&state, &project_id).await?;
    ensure_readable(
        &caller.authorizer,
        ResourceType::UserGroup,
        &project.name,
        "project",
    )?;

    let groups = state
        .stores
        .user_groups
        .list_by_project(project.id, page)
        .await?;
    Ok(Json(Listing::new(groups, page)))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    caller: Authorized,
    Path((project_id, group_id)): Path<(String, String)>,
) -> Result<Json<UserGroupDetail>, ApiError> {
    let (_, group) = find_readable(&state, &caller, &project_id, &group_id).await?;
    let members = state
        .stores
        .user_groups
        .list_members(group.id)
        .await?
        .into_iter()
        .filter(|member| {
            caller
                .authorizer
                .can(ResourceType::User, &member.email, Action::Read)
        })
        .collect();
    Ok(Json(UserGroupDetail { group, members }))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    caller: Authorized,
    Path((project_id, group_id)): Path<(String, String)>,
    payload: Result<Json<UpdateUserGroup>, JsonRejection>,
) -> Result<Json<UserGroupRecord>, ApiError> {
    let Json(body) = payload?;
    let (project_name, mut group) =
        find_readable(&state, &caller, &project_id, &group_id).await?;
    caller
        .authorizer
        .require(ResourceType::UserGroup, &project_name, Action::Update)?;

    if let Some(name) = body.name {
        group.name = required(&name, "name")?;
    }
    if let Some(description) = body.description {
        group.description = description;
    }
    group.updated_at = Utc::now();

    state.stores.user_groups.update(&group).await?;
    Ok(Json(group))
}
