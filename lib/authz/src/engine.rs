//! Authorization decisions over a parsed [`PermissionSet`].

use crate::error::{AuthzError, PermissionError};
use crate::permission::{PermissionSet, parse_permissions};
use crate::types::{Action, PERSONAL_PROJECT_DOMAIN, ResourceType};
use std::collections::BTreeSet;

/// Answers authorization questions for a single caller.
///
/// An `Authorizer` is built per request from the caller's grants and is
/// read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct Authorizer {
    permissions: PermissionSet,
}

impl Authorizer {
    /// Creates an authorizer over an already parsed permission set.
    #[must_use]
    pub fn new(permissions: PermissionSet) -> Self {
        Self { permissions }
    }

    /// Parses `grants` and wraps the result.
    ///
    /// # Errors
    ///
    /// Returns the first [`PermissionError`] found in `grants`.
    pub fn from_grants<I, S>(grants: I) -> Result<Self, PermissionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        parse_permissions(grants).map(Self::new)
    }

    /// Returns true if `action` is allowed on the caller's own personal projects.
    #[must_use]
    pub fn can_on_personal_project(&self, action: Action) -> bool {
        self.permissions.personal_project().allows(action)
    }

    #[must_use]
    pub fn can_create_personal_project(&self) -> bool {
        self.can_on_personal_project(Action::Create)
    }

    #[must_use]
    pub fn can_read_personal_project(&self) -> bool {
        self.can_on_personal_project(Action::Read)
    }

    #[must_use]
    pub fn can_update_personal_project(&self) -> bool {
        self.can_on_personal_project(Action::Update)
    }

    #[must_use]
    pub fn can_delete_personal_project(&self) -> bool {
        self.can_on_personal_project(Action::Delete)
    }

    /// Returns true if `action` is allowed on the scoped resource `resource_id`.
    #[must_use]
    pub fn can(&self, resource_type: ResourceType, resource_id: &str, action: Action) -> bool {
        self.permissions
            .on(resource_type, resource_id)
            .allows(action)
    }

    /// Returns true if the caller may create the shared project `name`.
    #[must_use]
    pub fn can_create_shared_project(&self, name: &str) -> bool {
        self.can(ResourceType::Project, name, Action::Create)
    }

    /// Returns true if the caller may read the shared project `name`.
    #[must_use]
    pub fn can_read_shared_project(&self, name: &str) -> bool {
        self.can(ResourceType::Project, name, Action::Read)
    }

    /// Returns true if the caller holds personal-project read and no grant
    /// of any kind on a shared project.
    ///
    /// Callers in this mode see only their own personal projects when
    /// listing.
    #[must_use]
    pub fn is_restricted_to_own_personal_projects_only(&self) -> bool {
        self.can_read_personal_project()
            && !self
                .permissions
                .scoped(ResourceType::Project)
                .values()
                .any(|p| p.any())
    }

    /// Names of the shared projects the caller may read.
    #[must_use]
    pub fn readable_project_identifiers(&self) -> BTreeSet<String> {
        self.readable_identifiers(ResourceType::Project)
    }

    /// Identifiers of the resources of `resource_type` the caller may read.
    #[must_use]
    pub fn readable_identifiers(&self, resource_type: ResourceType) -> BTreeSet<String> {
        self.permissions
            .scoped(resource_type)
            .iter()
            .filter(|(_, p)| p.allows(Action::Read))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Requires `action` on the caller's own personal projects.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::PermissionDenied`] when the action is not granted.
    pub fn require_personal_project(&self, action: Action) -> Result<(), AuthzError> {
        if self.can_on_personal_project(action) {
            Ok(())
        } else {
            Err(AuthzError::PermissionDenied {
                resource: PERSONAL_PROJECT_DOMAIN.to_string(),
                action,
            })
        }
    }

    /// Requires `action` on the scoped resource `resource_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::PermissionDenied`] naming `<type>:<id>` and the action.
    pub fn require(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
        action: Action,
    ) -> Result<(), AuthzError> {
        if self.can(resource_type, resource_id, action) {
            Ok(())
        } else {
            Err(AuthzError::PermissionDenied {
                resource: format!("{resource_type}:{resource_id}"),
                action,
            })
        }
    }
}
