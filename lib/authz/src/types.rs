//! Vocabulary of the permission grammar.

use std::fmt;

/// Resource types whose grants are scoped to a resource identifier.
///
/// Grants for these types take the form `<type>:<resource-id>:<action>`.
/// The personal-project domain is not listed here because its grants carry
/// no identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    /// A shared project, keyed by project name.
    Project,
    /// An administrative user.
    User,
    /// A user group.
    UserGroup,
    /// An application.
    Application,
    /// A role.
    Role,
}

impl ResourceType {
    /// Every scoped resource type, in declaration order.
    pub const ALL: [ResourceType; 5] = [
        Self::Project,
        Self::User,
        Self::UserGroup,
        Self::Application,
        Self::Role,
    ];

    /// Returns the domain segment used in permission strings.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::User => "user",
            Self::UserGroup => "user_group",
            Self::Application => "application",
            Self::Role => "role",
        }
    }

    /// Looks up a resource type by its domain segment.
    #[must_use]
    pub fn from_domain(domain: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == domain)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The domain segment for personal-project grants.
pub const PERSONAL_PROJECT_DOMAIN: &str = "personal_project";

/// Actions a grant can allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    /// Returns the action segment used in permission strings.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Parses an action segment. Matching is exact and case-sensitive.
    #[must_use]
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "create" => Some(Self::Create),
            "read" => Some(Self::Read),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
