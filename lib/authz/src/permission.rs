//! Parsing of permission grants into a [`PermissionSet`].
//!
//! Grants are colon-separated strings carried in access-token claims:
//!
//! - `personal_project:<action>` for the caller's own personal projects
//! - `<domain>:<resource-id>:<action>` for `project`, `user`, `user_group`,
//!   `application` and `role`
//!
//! where `<action>` is one of `create`, `read`, `update`, `delete`.

use crate::error::PermissionError;
use crate::types::{Action, PERSONAL_PROJECT_DOMAIN, ResourceType};
use std::collections::BTreeMap;

/// Allowed actions on a single resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrudPermissions {
    create: bool,
    read: bool,
    update: bool,
    delete: bool,
}

impl CrudPermissions {
    /// Returns true if `action` is allowed.
    #[must_use]
    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Create => self.create,
            Action::Read => self.read,
            Action::Update => self.update,
            Action::Delete => self.delete,
        }
    }

    /// Returns true if any action is allowed.
    #[must_use]
    pub fn any(&self) -> bool {
        self.create || self.read || self.update || self.delete
    }

    fn grant(&mut self, action: Action) {
        match action {
            Action::Create => self.create = true,
            Action::Read => self.read = true,
            Action::Update => self.update = true,
            Action::Delete => self.delete = true,
        }
    }
}

/// The full set of permissions derived from a caller's grants.
///
/// A resource identifier missing from a map means no permission on it.
/// Sets are built once per request and never modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    personal_project: CrudPermissions,
    projects: BTreeMap<String, CrudPermissions>,
    users: BTreeMap<String, CrudPermissions>,
    user_groups: BTreeMap<String, CrudPermissions>,
    applications: BTreeMap<String, CrudPermissions>,
    roles: BTreeMap<String, CrudPermissions>,
}

impl PermissionSet {
    /// Permissions over the caller's own personal projects.
    #[must_use]
    pub fn personal_project(&self) -> CrudPermissions {
        self.personal_project
    }

    /// Per-identifier permissions for a scoped resource type.
    #[must_use]
    pub fn scoped(&self, resource_type: ResourceType) -> &BTreeMap<String, CrudPermissions> {
        match resource_type {
            ResourceType::Project => &self.projects,
            ResourceType::User => &self.users,
            ResourceType::UserGroup => &self.user_groups,
            ResourceType::Application => &self.applications,
            ResourceType::Role => &self.roles,
        }
    }

    /// Permissions on one scoped resource; empty when nothing was granted.
    #[must_use]
    pub fn on(&self, resource_type: ResourceType, resource_id: &str) -> CrudPermissions {
        self.scoped(resource_type)
            .get(resource_id)
            .copied()
            .unwrap_or_default()
    }

    fn scoped_mut(&mut self, resource_type: ResourceType) -> &mut BTreeMap<String, CrudPermissions> {
        match resource_type {
            ResourceType::Project => &mut self.projects,
            ResourceType::User => &mut self.users,
            ResourceType::UserGroup => &mut self.user_groups,
            ResourceType::Application => &mut self.applications,
            ResourceType::Role => &mut self.roles,
        }
    }

    fn apply(&mut self, permission: &str) -> Result<(), PermissionError> {
        let segments: Vec<&str> = permission.split(':').collect();
        let malformed = || PermissionError::Malformed {
            permission: permission.to_string(),
        };

        let (domain, rest) = segments.split_first().ok_or_else(malformed)?;
        if rest.is_empty() {
            return Err(malformed());
        }

        if *domain == PERSONAL_PROJECT_DOMAIN {
            let [action] = rest else {
                return Err(malformed());
            };
            let action = parse_action(permission, domain, action)?;
            self.personal_project.grant(action);
            return Ok(());
        }

        let Some(resource_type) = ResourceType::from_domain(domain) else {
            return Err(PermissionError::UnknownDomain {
                permission: permission.to_string(),
                domain: (*domain).to_string(),
            });
        };

        let [resource_id, action] = rest else {
            return Err(malformed());
        };
        if resource_id.is_empty() {
            return Err(malformed());
        }
        let action = parse_action(permission, domain, action)?;
        self.scoped_mut(resource_type)
            .entry((*resource_id).to_string())
            .or_default()
            .grant(action);
        Ok(())
    }
}

fn parse_action(permission: &str, domain: &str, action: &str) -> Result<Action, PermissionError> {
    Action::from_segment(action).ok_or_else(|| PermissionError::UnknownAction {
        permission: permission.to_string(),
        domain: domain.to_string(),
        action: action.to_string(),
    })
}

/// Parses a list of grants into a [`PermissionSet`].
///
/// Parsing stops at the first invalid grant; no partial set is returned.
/// Grants only ever add permissions, so the result does not depend on
/// their order and repeating a grant has no further effect.
///
/// # Errors
///
/// Returns a [`PermissionError`] describing the first invalid grant.
pub fn parse_permissions<I, S>(grants: I) -> Result<PermissionSet, PermissionError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut set = PermissionSet::default();
    for grant in grants {
        set.apply(grant.as_ref())?;
    }
    Ok(set)
}
