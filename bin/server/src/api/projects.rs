//! Project endpoints.
//!
//! Personal projects belong to the token subject that created them and are
//! governed by `personal_project:*` grants. Shared projects are governed by
//! `project:<name>:*` grants.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tacokumo_admin_authz::{Action, Authorizer, ResourceType};
use tacokumo_admin_core::ProjectId;

use super::{Listing, Pagination, required};
use crate::auth::{AppState, Authorized};
use crate::db::{ProjectKind, ProjectRecord};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateProject {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: ProjectKind,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Returns true if the caller holds `action` on `project`.
fn allows(authorizer: &Authorizer, subject: &str, project: &ProjectRecord, action: Action) -> bool {
    match project.kind {
        ProjectKind::Personal => {
            project.is_owned_by(subject) && authorizer.can_on_personal_project(action)
        }
        ProjectKind::Shared => authorizer.can(ResourceType::Project, &project.name, action),
    }
}

fn require(
    authorizer: &Authorizer,
    project: &ProjectRecord,
    action: Action,
) -> Result<(), ApiError> {
    match project.kind {
        ProjectKind::Personal => authorizer.require_personal_project(action)?,
        ProjectKind::Shared => authorizer.require(ResourceType::Project, &project.name, action)?,
    }
    Ok(())
}

/// Loads a project the caller may read.
pub(crate) async fn find_readable(
    state: &AppState,
    caller: &Authorized,
    project_id: &str,
) -> Result<ProjectRecord, ApiError> {
    let id = ProjectId::from_str(project_id)?;
    state
        .stores
        .projects
        .find_by_id(id)
        .await?
        .filter(|p| allows(&caller.authorizer, &caller.subject, p, Action::Read))
        .ok_or(ApiError::NotFound { resource: "project" })
}

/// Loads a project without a read check, for endpoints that authorize
/// against another resource type keyed by the project name.
pub(crate) async fn find(state: &AppState, project_id: &str) -> Result<ProjectRecord, ApiError> {
    let id = ProjectId::from_str(project_id)?;
    state
        .stores
        .projects
        .find_by_id(id)
        .await?
        .ok_or(ApiError::NotFound { resource: "project" })
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    caller: Authorized,
    payload: Result<Json<CreateProject>, JsonRejection>,
) -> Result<(StatusCode, Json<ProjectRecord>), ApiError> {
    let Json(body) = payload?;
    let name = required(&body.name, "name")?;

    let project = match body.kind {
        ProjectKind::Personal => {
            caller.authorizer.require_personal_project(Action::Create)?;
            ProjectRecord::personal(name, body.description, caller.subject.clone())
        }
        ProjectKind::Shared => {
            caller
                .authorizer
                .require(ResourceType::Project, &name, Action::Create)?;
            ProjectRecord::shared(name, body.description)
        }
    };

    state.stores.projects.create(&project).await?;
    tracing::info!(project_id = %project.id, kind = %project.kind, "created project");

    Ok((StatusCode::CREATED, Json(project)))
}

/// Lists the projects visible to the caller.
///
/// A caller restricted to personal projects sees only its own. Otherwise
/// the listing combines its own personal projects (when it may read them)
/// with the shared projects it holds read on.
pub async fn list(
    State(state): State<Arc<AppState>>,
    caller: Authorized,
    query: Result<Query<Pagination>, QueryRejection>,
) -> Result<Json<Listing<ProjectRecord>>, ApiError> {
    let Query(pagination) = query?;
    let page = pagination.page()?;
    let authorizer = &caller.authorizer;

    let shared_names: Vec<String> = if authorizer.is_restricted_to_own_personal_projects_only() {
        Vec::new()
    } else {
        authorizer.readable_project_identifiers().into_iter().collect()
    };
    let owner = authorizer
        .can_read_personal_project()
        .then_some(caller.subject.as_str());

    if owner.is_none() && shared_names.is_empty() {
        return Ok(Json(Listing::new(Vec::new(), page)));
    }

    let projects = state
        .stores
        .projects
        .list_visible(owner, &shared_names, page)
        .await?;
    Ok(Json(Listing::new(projects, page)))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    caller: Authorized,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectRecord>, ApiError> {
    find_readable(&state, &caller, &project_id).await.map(Json)
}

/// Renames or redescribes a project. Renaming a shared project also
/// requires create on the new name.
pub async fn update(
    State(state): State<Arc<AppState>>,
    caller: Authorized,
    Path(project_id): Path<String>,
    payload: Result<Json<UpdateProject>, JsonRejection>,
) -> Result<Json<ProjectRecord>, ApiError> {
    let Json(body) = payload?;
    let mut project = find_readable(&state, &caller, &project_id).await?;
    require(&caller.authorizer, &project, Action::Update)?;

    if let Some(name) = body.name {
        let name = required(&name, "name")?;
        if project.kind == ProjectKind::Shared && name != project.name {
            caller
                .authorizer
                .require(ResourceType::Project, &name, Action::Create)?;
        }
        project.name = name;
    }
    if let Some(description) = body.description {
        project.description = description;
    }
    project.updated_at = Utc::now();

    state.stores.projects.update(&project).await?;
    Ok(Json(project))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{TestApp, body_json, json_request};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use serde_json::json;

    #[tokio::test]
    async fn personal_create_grant_creates_only_personal_projects() {
        let app = TestApp::new().await;
        let token = app.token(&["personal_project:create"]);

        let response = app
            .send(json_request(
                "POST",
                "/v1alpha1/projects",
                &token,
                json!({ "name": "alice-sandbox", "kind": "personal" }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["kind"], "personal");
        assert_eq!(body["owner"], "auth0|alice");

        let response = app
            .send(json_request(
                "POST",
                "/v1alpha1/projects",
                &token,
                json!({ "name": "foo", "kind": "shared" }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(response).await["error"],
            "permission 'create' denied on resource 'project:foo'"
        );
    }

    #[tokio::test]
    async fn scoped_create_grant_allows_only_the_named_project() {
        let app = TestApp::new().await;
        let token = app.token(&["project:foo:create"]);

        let created = app
            .send(json_request(
                "POST",
                "/v1alpha1/projects",
                &token,
                json!({ "name": "foo", "kind": "shared" }),
            ))
            .await;
        assert_eq!(created.status(), StatusCode::CREATED);

        let denied = app
            .send(json_request(
                "POST",
                "/v1alpha1/projects",
                &token,
                json!({ "name": "bar", "kind": "shared" }),
            ))
            .await;
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let personal = app
            .send(json_request(
                "POST",
                "/v1alpha1/projects",
                &token,
                json!({ "name": "mine", "kind": "personal" }),
            ))
            .await;
        assert_eq!(personal.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn duplicate_names_conflict() {
        let app = TestApp::new().await;
        let token = app.token(&["project:foo:create"]);
        let create = || {
            json_request(
                "POST",
                "/v1alpha1/projects",
                &token,
                json!({ "name": "foo", "kind": "shared" }),
            )
        };

        assert_eq!(app.send(create()).await.status(), StatusCode::CREATED);
        assert_eq!(app.send(create()).await.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn restricted_listing_shows_only_own_personal_projects() {
        let app = TestApp::new().await;
        let mine = app.seed_personal_project("alice-sandbox", "auth0|alice").await;
        app.seed_personal_project("bob-sandbox", "auth0|bob").await;
        app.seed_shared_project("platform").await;

        let response = app
            .send(
                Request::get("/v1alpha1/projects")
                    .header(
                        header::AUTHORIZATION,
                        format!("Bearer {}", app.token(&["personal_project:read"])),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], mine.id.to_string());
    }

    #[tokio::test]
    async fn scoped_listing_shows_granted_shared_projects() {
        let app = TestApp::new().await;
        app.seed_personal_project("alice-sandbox", "auth0|alice").await;
        app.seed_shared_project("platform").await;
        app.seed_shared_project("billing").await;

        let response = app
            .send(
                Request::get("/v1alpha1/projects?limit=10")
                    .header(
                        header::AUTHORIZATION,
                        format!(
                            "Bearer {}",
                            app.token(&["personal_project:read", "project:platform:read"])
                        ),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        let body = body_json(response).await;
        let mut names: Vec<_> = body["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap().to_string())
            .collect();
        names.sort();
        assert_eq!(names, ["alice-sandbox", "platform"]);
        assert_eq!(body["limit"], 10);
    }

    #[tokio::test]
    async fn unreadable_project_is_not_found() {
        let app = TestApp::new().await;
        let billing = app.seed_shared_project("billing").await;
        let bobs = app.seed_personal_project("bob-sandbox", "auth0|bob").await;
        let token = app.token(&["personal_project:read", "project:platform:read"]);

        for id in [billing.id.to_string(), bobs.id.to_string()] {
            let response = app
                .send(
                    Request::get(format!("/v1alpha1/projects/{id}"))
                        .header(header::AUTHORIZATION, format!("Bearer {token}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(body_json(response).await["error"], "project not found");
        }
    }

    #[tokio::test]
    async fn malformed_project_id_is_a_bad_request() {
        let app = TestApp::new().await;
        let response = app
            .send(
                Request::get("/v1alpha1/projects/not-an-id")
                    .header(
                        header::AUTHORIZATION,
                        format!("Bearer {}", app.token(&["personal_project:read"])),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_requires_update_and_create_on_the_new_name() {
        let app = TestApp::new().await;
        let platform = app.seed_shared_project("platform").await;
        let path = format!("/v1alpha1/projects/{}", platform.id);

        let read_only = app.token(&["project:platform:read"]);
        let response = app
            .send(json_request("PATCH", &path, &read_only, json!({ "description": "x" })))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let updater = app.token(&["project:platform:read", "project:platform:update"]);
        let response = app
            .send(json_request("PATCH", &path, &updater, json!({ "name": "infra" })))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .send(json_request(
                "PATCH",
                &path,
                &updater,
                json!({ "description": "Shared platform services" }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await["description"],
            "Shared platform services"
        );

        let renamer = app.token(&[
            "project:platform:read",
            "project:platform:update",
            "project:infra:create",
        ]);
        let response = app
            .send(json_request("PATCH", &path, &renamer, json!({ "name": "infra" })))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["name"], "infra");
    }
}
