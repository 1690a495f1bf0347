//! User groups, scoped to a project.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use tacokumo_admin_core::{ProjectId, UserGroupId};

use super::user::{UserRecord, UserRow};
use super::{Page, invalid_column};

/// A user group record from the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroupRecord {
    pub id: UserGroupId,
    pub project_id: ProjectId,
    /// Unique within the project.
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserGroupRecord {
    #[must_use]
    pub fn new(project_id: ProjectId, name: String, description: String) -> Self {
        let now = Utc::now();
        Self {
            id: UserGroupId::new(),
            project_id,
            name,
            description,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Storage for user groups and their membership.
#[async_trait]
pub trait UserGroupStore: Send + Sync {
    async fn create(&self, group: &UserGroupRecord) -> Result<(), sqlx::Error>;

    async fn find(
        &self,
        project_id: ProjectId,
        group_id: UserGroupId,
    ) -> Result<Option<UserGroupRecord>, sqlx::Error>;

    async fn update(&self, group: &UserGroupRecord) -> Result<(), sqlx::Error>;

    async fn list_by_project(
        &self,
        project_id: ProjectId,
        page: Page,
    ) -> Result<Vec<UserGroupRecord>, sqlx::Error>;

    /// Lists the group's members ordered by email.
    async fn list_members(&self, group_id: UserGroupId) -> Result<Vec<UserRecord>, sqlx::Error>;
}

#[derive(FromRow)]
struct UserGroupRow {
    id: String,
    project_id: String,
    name: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserGroupRow {
    fn try_into_record(self) -> Result<UserGroupRecord, sqlx::Error> {
        let id = UserGroupId::from_str(&self.id)
            .map_err(|e| invalid_column("user group id", &self.id, e))?;
        let project_id = ProjectId::from_str(&self.project_id)
            .map_err(|e| invalid_column("project id", &self.project_id, e))?;

        Ok(UserGroupRecord {
            id,
            project_id,
            name: self.name,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Repository for user group operations.
pub struct UserGroupRepository {
    pool: PgPool,
}

impl UserGroupRepository {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserGroupStore for UserGroupRepository {
    async fn create(&self, group: &UserGroupRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO user_groups (id, project_id, name, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(group.id.to_string())
        .bind(group.project_id.to_string())
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.created_at)
        .bind(group.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(
        &self,
        project_id: ProjectId,
        group_id: UserGroupId,
    ) -> Result<Option<UserGroupRecord>, sqlx::Error> {
        let row: Option<UserGroupRow> = sqlx::query_as(
            r#"
            SELECT id, project_id, name, description, created_at, updated_at
            FROM user_groups
            WHERE project_id = $1 AND id = $2
            "#,
        )
        .bind(project_id.to_string())
        .bind(group_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserGroupRow::try_into_record).transpose()
    }

    async fn update(&self, group: &UserGroupRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE user_groups
            SET name = $3, description = $4, updated_at = $5
            WHERE project_id = $1 AND id = $2
            "#,
        )
        .bind(group.project_id.to_string())
        .bind(group.id.to_string())
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_project(
        &self,
        project_id: ProjectId,
        page: Page,
    ) -> Result<Vec<UserGroupRecord>, sqlx::Error> {
        let rows: Vec<UserGroupRow> = sqlx::query_as(
            r#"
            SELECT id, project_id, name, description, created_at, updated_at
            FROM user_groups
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

        rows.into_iter().map(UserGroupRow::try_into_record).collect()
    }

    async fn list_members(&self, group_id: UserGroupId) -> Result<Vec<UserRecord>, sqlx::Error> {
        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT u.id, u.email, u.created_at, u.updated_at
            FROM users u
            JOIN user_group_members m ON m.user_id = u.id
            WHERE m.user_group_id = $1
            ORDER BY u.email
            "#,
        )
        .bind(group_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UserRow::try_into_record).collect()
    }
}
