//! Users, identified by email.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use tacokumo_admin_core::UserId;

use super::role::{RoleRecord, RoleRow};
use super::{Page, invalid_column};

/// A user record from the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    /// Unique; also the identifier `user:<email>:*` grants refer to.
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    #[must_use]
    pub fn new(email: String) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            email,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Storage for users.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: &UserRecord) -> Result<(), sqlx::Error>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, sqlx::Error>;

    /// Lists the users whose email is in `emails`, ordered by email.
    async fn list_by_emails(
        &self,
        emails: &[String],
        page: Page,
    ) -> Result<Vec<UserRecord>, sqlx::Error>;

    /// Lists the roles assigned to the user, ordered by name.
    async fn list_roles(&self, id: UserId) -> Result<Vec<RoleRecord>, sqlx::Error>;
}

#[derive(FromRow)]
pub(super) struct UserRow {
    id: String,
    email: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    pub(super) fn try_into_record(self) -> Result<UserRecord, sqlx::Error> {
        let id = UserId::from_str(&self.id).map_err(|e| invalid_column("user id", &self.id, e))?;
        Ok(UserRecord {
            id,
            email: self.email,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Repository for user operations.
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn create(&self, user: &UserRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, email, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::try_into_record).transpose()
    }

    async fn list_by_emails(
        &self,
        emails: &[String],
        page: Page,
    ) -> Result<Vec<UserRecord>, sqlx::Error> {
        if emails.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT id, email, created_at, updated_at
            FROM users
            WHERE email = ANY($1)
            ORDER BY email
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(emails)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UserRow::try_into_record).collect()
    }

    async fn list_roles(&self, id: UserId) -> Result<Vec<RoleRecord>, sqlx::Error> {
        let rows: Vec<RoleRow> = sqlx::query_as(
            r#"
            SELECT r.id, r.project_id, r.name, r.description, r.created_at, r.updated_at
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RoleRow::try_into_record).collect()
    }
}
