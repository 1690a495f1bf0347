//! Core domain types shared by the tacokumo admin API crates.

pub mod id;

pub use id::{ParseIdError, ProjectId, RoleId, UserGroupId, UserId};
