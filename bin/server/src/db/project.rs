//! Projects.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;
use std::str::FromStr;
use tacokumo_admin_core::ProjectId;

use super::{Page, invalid_column};

/// Whether a project belongs to one principal or is shared by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    /// Owned by the principal that created it.
    Personal,
    /// Governed by `project:<name>:*` grants.
    Shared,
}

impl ProjectKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Shared => "shared",
        }
    }
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(Self::Personal),
            "shared" => Ok(Self::Shared),
            other => Err(format!("unknown project kind '{other}'")),
        }
    }
}

/// A project record from the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: ProjectId,
    /// Unique across all projects.
    pub name: String,
    pub description: String,
    pub kind: ProjectKind,
    /// Subject of the owning principal. Set for personal projects only.
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectRecord {
    /// Creates a shared project.
    #[must_use]
    pub fn shared(name: String, description: String) -> Self {
        Self::new(name, description, ProjectKind::Shared, None)
    }

    /// Creates a personal project owned by `owner`.
    #[must_use]
    pub fn personal(name: String, description: String, owner: String) -> Self {
        Self::new(name, description, ProjectKind::Personal, Some(owner))
    }

    fn new(name: String, description: String, kind: ProjectKind, owner: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ProjectId::new(),
            name,
            description,
            kind,
            owner,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if this is a personal project owned by `subject`.
    #[must_use]
    pub fn is_owned_by(&self, subject: &str) -> bool {
        self.kind == ProjectKind::Personal && self.owner.as_deref() == Some(subject)
    }
}

/// Storage for projects.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn create(&self, project: &ProjectRecord) -> Result<(), sqlx::Error>;

    async fn find_by_id(&self, id: ProjectId) -> Result<Option<ProjectRecord>, sqlx::Error>;

    /// Writes the name, description and `updated_at` of `project`.
    async fn update(&self, project: &ProjectRecord) -> Result<(), sqlx::Error>;

    /// Lists the personal projects of `owner` together with the shared
    /// projects named in `shared_names`, oldest first.
    async fn list_visible(
        &self,
        owner: Option<&str>,
        shared_names: &[String],
        page: Page,
    ) -> Result<Vec<ProjectRecord>, sqlx::Error>;
}

/// Row type for project queries.
#[derive(FromRow)]
struct ProjectRow {
    id: String,
    name: String,
    description: String,
    kind: String,
    owner: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProjectRow {
    fn try_into_record(self) -> Result<ProjectRecord, sqlx::Error> {
        let id = ProjectId::from_str(&self.id)
            .map_err(|e| invalid_column("project id", &self.id, e))?;
        let kind = ProjectKind::from_str(&self.kind)
            .map_err(|e| invalid_column("project kind", &self.kind, e))?;

        Ok(ProjectRecord {
            id,
            name: self.name,
            description: self.description,
            kind,
            owner: self.owner,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Repository for project operations.
pub struct ProjectRepository {
    pool: PgPool,
}

impl ProjectRepository {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectStore for ProjectRepository {
    async fn create(&self, project: &ProjectRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, name, description, kind, owner, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(project.id.to_string())
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.kind.as_str())
        .bind(project.owner.as_deref())
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: ProjectId) -> Result<Option<ProjectRecord>, sqlx::Error> {
        let row: Option<ProjectRow> = sqlx::query_as(
            r#"
            SELECT id, name, description, kind, owner, created_at, updated_at
            FROM projects
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProjectRow::try_into_record).transpose()
    }

    async fn update(&self, project: &ProjectRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE projects
            SET name = $2, description = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(project.id.to_string())
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_visible(
        &self,
        owner: Option<&str>,
        shared_names: &[String],
        page: Page,
    ) -> Result<Vec<ProjectRecord>, sqlx::Error> {
        let rows: Vec<ProjectRow> = sqlx::query_as(
            r#"
            SELECT id, name, description, kind, owner, created_at, updated_at
            FROM projects
            WHERE (kind = 'personal' AND owner = $1)
               OR (kind = 'shared' AND name = ANY($2))
            ORDER BY created_at, id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(owner)
        .bind(shared_names)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ProjectRow::try_into_record).collect()
    }
}
