//! Authorization error types.

use crate::types::Action;
use std::fmt;

/// Errors from parsing permission grants.
///
/// The parser stops at the first offending grant, so each variant names the
/// grant that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    /// The grant does not have the shape `<domain>:<action>` or
    /// `<domain>:<resource-id>:<action>`.
    Malformed {
        /// The offending grant.
        permission: String,
    },
    /// The domain segment is not a known domain.
    UnknownDomain {
        /// The offending grant.
        permission: String,
        /// The unrecognized domain segment.
        domain: String,
    },
    /// The action segment is not one of create, read, update or delete.
    UnknownAction {
        /// The offending grant.
        permission: String,
        /// The domain segment of the grant.
        domain: String,
        /// The unrecognized action segment.
        action: String,
    },
}

impl fmt::Display for PermissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { permission } => {
                write!(f, "invalid permission format: '{permission}'")
            }
            Self::UnknownDomain { permission, domain } => {
                write!(f, "unknown permission domain '{domain}' in '{permission}'")
            }
            Self::UnknownAction {
                permission,
                domain,
                action,
            } => {
                write!(
                    f,
                    "unknown action '{action}' for domain '{domain}' in '{permission}'"
                )
            }
        }
    }
}

impl std::error::Error for PermissionError {}

/// Errors from authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// No usable permission claims were attached to the request.
    NotAuthenticated,
    /// Permission denied.
    PermissionDenied {
        /// The resource that was accessed, e.g. `project:foo`.
        resource: String,
        /// The action that was requested.
        action: Action,
    },
}

impl fmt::Display for AuthzError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "not authenticated"),
            Self::PermissionDenied { resource, action } => {
                write!(f, "permission '{action}' denied on resource '{resource}'")
            }
        }
    }
}

impl std::error::Error for AuthzError {}
