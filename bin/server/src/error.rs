//! HTTP-facing error type for the admin API.
//!
//! Handlers return [`ApiError`]; it alone picks the status code and the
//! message callers see. Internal details are logged, never returned.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;
use tacokumo_admin_authz::{AuthzError, PermissionError};
use tacokumo_admin_core::ParseIdError;
use tacokumo_admin_platform_access::FlowError;

/// JSON error body: `{"error": "<message>"}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Builds a JSON error response.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Errors returned by API handlers.
#[derive(Debug)]
pub enum ApiError {
    /// No usable credential or permission claims.
    NotAuthenticated { message: &'static str },
    /// The caller lacks `action` on `resource`.
    PermissionDenied { resource: String, action: String },
    /// The request was malformed.
    InvalidInput { message: String },
    /// The resource does not exist or the caller cannot read it.
    NotFound { resource: &'static str },
    /// The write conflicts with an existing record.
    Conflict { message: String },
    /// An operational failure. `details` is logged only.
    Internal {
        message: &'static str,
        details: String,
    },
}

impl ApiError {
    /// An internal error with the generic public message.
    pub fn internal(details: impl Into<String>) -> Self {
        Self::Internal {
            message: "internal error",
            details: details.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotAuthenticated { .. } => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            Self::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::NotAuthenticated { message } => (*message).to_string(),
            Self::PermissionDenied { resource, action } => {
                format!("permission '{action}' denied on resource '{resource}'")
            }
            Self::InvalidInput { message } | Self::Conflict { message } => message.clone(),
            Self::NotFound { resource } => format!("{resource} not found"),
            Self::Internal { message, .. } => (*message).to_string(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal { message, details } => write!(f, "{message}: {details}"),
            other => write!(f, "{}", other.public_message()),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Internal { details, .. } => {
                tracing::error!(error = %details, "request failed");
            }
            Self::PermissionDenied { resource, action } => {
                tracing::debug!(%resource, %action, "permission denied");
            }
            _ => {}
        }
        error_response(self.status(), self.public_message())
    }
}

impl From<AuthzError> for ApiError {
    fn from(e: AuthzError) -> Self {
        match e {
            AuthzError::NotAuthenticated => Self::NotAuthenticated {
                message: "not authenticated",
            },
            AuthzError::PermissionDenied { resource, action } => Self::PermissionDenied {
                resource,
                action: action.to_string(),
            },
        }
    }
}

impl From<PermissionError> for ApiError {
    fn from(e: PermissionError) -> Self {
        Self::InvalidInput {
            message: e.to_string(),
        }
    }
}

impl From<ParseIdError> for ApiError {
    fn from(e: ParseIdError) -> Self {
        Self::InvalidInput {
            message: e.to_string(),
        }
    }
}

impl From<FlowError> for ApiError {
    fn from(e: FlowError) -> Self {
        let unauthorized = |message| {
            tracing::warn!(error = %e, "sign-in rejected");
            Self::NotAuthenticated { message }
        };
        match &e {
            FlowError::MissingParameters => Self::invalid_input("missing code or state"),
            FlowError::InvalidRedirectUri { .. } => Self::invalid_input("invalid redirect_uri"),
            FlowError::InvalidState { .. } => unauthorized("invalid state"),
            FlowError::CodeExchange { .. } => unauthorized("authentication failed"),
            FlowError::UserInfo { .. } => unauthorized("failed to get user info"),
            FlowError::Organizations { .. } => unauthorized("failed to get user orgs"),
            FlowError::OrganizationNotAllowed { .. } => {
                unauthorized("not authorized: not a member of allowed organizations")
            }
            FlowError::Storage { .. } | FlowError::TokenGeneration { .. } => {
                Self::internal(e.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::invalid_input(e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self::invalid_input(e.body_text())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict {
                message: "a record with that name already exists".to_string(),
            },
            _ => Self::internal(e.to_string()),
        }
    }
}
