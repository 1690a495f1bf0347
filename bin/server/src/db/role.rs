//! Roles, scoped to a project.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use tacokumo_admin_core::{ProjectId, RoleId};

use super::{Page, invalid_column};

/// A role record from the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: RoleId,
    pub project_id: ProjectId,
    /// Unique within the project.
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoleRecord {
    #[must_use]
    pub fn new(project_id: ProjectId, name: String, description: String) -> Self {
        let now = Utc::now();
        Self {
            id: RoleId::new(),
            project_id,
            name,
            description,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Storage for roles.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn create(&self, role: &RoleRecord) -> Result<(), sqlx::Error>;

    async fn find(
        &self,
        project_id: ProjectId,
        role_id: RoleId,
    ) -> Result<Option<RoleRecord>, sqlx::Error>;

    async fn update(&self, role: &RoleRecord) -> Result<(), sqlx::Error>;

    async fn list_by_project(
        &self,
        project_id: ProjectId,
        page: Page,
    ) -> Result<Vec<RoleRecord>, sqlx::Error>;
}

/// Row type for role queries.
#[derive(FromRow)]
pub(super) struct RoleRow {
    id: String,
    project_id: String,
    name: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RoleRow {
    pub(super) fn try_into_record(self) -> Result<RoleRecord, sqlx::Error> {
        let id = RoleId::from_str(&self.id).map_err(|e| invalid_column("role id", &self.id, e))?;
        let project_id = ProjectId::from_str(&self.project_id)
            .map_err(|e| invalid_column("project id", &self.project_id, e))?;

        Ok(RoleRecord {
            id,
            project_id,
            name: self.name,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Repository for role operations.
pub struct RoleRepository {
    pool: PgPool,
}

impl RoleRepository {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleStore for RoleRepository {
    async fn create(&self, role: &RoleRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO roles (id, project_id, name, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(role.id.to_string())
        .bind(role.project_id.to_string())
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(
        &self,
        project_id: ProjectId,
        role_id: RoleId,
    ) -> Result<Option<RoleRecord>, sqlx::Error> {
        let row: Option<RoleRow> = sqlx::query_as(
            r#"
            SELECT id, project_id, name, description, created_at, updated_at
            FROM roles
            WHERE project_id = $1 AND id = $2
            "#,
        )
        .bind(project_id.to_string())
        .bind(role_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(RoleRow::try_into_record).transpose()
    }

    async fn update(&self, role: &RoleRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE roles
            SET name = $3, description = $4, updated_at = $5
            WHERE project_id = $1 AND id = $2
            "#,
        )
        .bind(role.project_id.to_string())
        .bind(role.id.to_string())
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_project(
        &self,
        project_id: ProjectId,
        page: Page,
    ) -> Result<Vec<RoleRecord>, sqlx::Error> {
        let rows: Vec<RoleRow> = sqlx::query_as(
            r#"
            SELECT id, project_id, name, description, created_at, updated_at
            FROM roles
            WHERE project_id = $1
            ORDER BY name
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(project_id.to_string())
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RoleRow::try_into_record).collect()
    }
}
