//! Database repositories for the admin API.
//!
//! Each resource has a storage trait, implemented over PostgreSQL by a
//! `*Repository` type. Handlers depend only on the traits, collected in
//! [`Stores`].

pub mod project;
pub mod role;
pub mod user;
pub mod user_group;

pub use project::{ProjectKind, ProjectRecord, ProjectRepository, ProjectStore};
pub use role::{RoleRecord, RoleRepository, RoleStore};
pub use user::{UserRecord, UserRepository, UserStore};
pub use user_group::{UserGroupRecord, UserGroupRepository, UserGroupStore};

use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

/// A window over an ordered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

/// Connectivity check for readiness probes.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn ping(&self) -> Result<(), sqlx::Error>;
}

/// [`HealthProbe`] that runs `SELECT 1`.
pub struct PgHealthProbe {
    pool: PgPool,
}

impl PgHealthProbe {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HealthProbe for PgHealthProbe {
    async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// The storage handlers run against.
#[derive(Clone)]
pub struct Stores {
    pub projects: Arc<dyn ProjectStore>,
    pub roles: Arc<dyn RoleStore>,
    pub user_groups: Arc<dyn UserGroupStore>,
    pub users: Arc<dyn UserStore>,
    pub health: Arc<dyn HealthProbe>,
}

impl Stores {
    /// PostgreSQL-backed storage sharing one pool.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            projects: Arc::new(ProjectRepository::new(pool.clone())),
            roles: Arc::new(RoleRepository::new(pool.clone())),
            user_groups: Arc::new(UserGroupRepository::new(pool.clone())),
            users: Arc::new(UserRepository::new(pool.clone())),
            health: Arc::new(PgHealthProbe::new(pool)),
        }
    }
}

/// Error for a column value that does not decode into its domain type.
fn invalid_column(what: &str, value: &str, reason: impl std::fmt::Display) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("invalid {what} '{value}': {reason}"),
    )))
}
