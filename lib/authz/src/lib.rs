//! Permission grants and authorization decisions for the admin API.
//!
//! Callers present grants such as `project:foo:read` in their access-token
//! claims. [`parse_permissions`] turns them into a [`PermissionSet`] and
//! [`Authorizer`] answers questions about it. Nothing here performs I/O.

mod engine;
mod error;
mod permission;
mod types;

pub use engine::Authorizer;
pub use error::{AuthzError, PermissionError};
pub use permission::{CrudPermissions, PermissionSet, parse_permissions};
pub use types::{Action, PERSONAL_PROJECT_DOMAIN, ResourceType};
