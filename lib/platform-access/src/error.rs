//! Error types for the platform-access crate.
//!
//! - `StoreError`: session and state store failures
//! - `ProviderError`: identity provider calls
//! - `FlowError`: outcomes of the login and callback flow
//!
//! Store and provider errors travel as `rootcause::Report`s. `FlowError`
//! is a plain enum because the HTTP layer maps each variant to a status.

use std::fmt;

/// Errors from a record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The record does not exist (or its TTL has lapsed).
    NotFound { key: String },
    /// The record could not be encoded or decoded.
    Serialization { details: String },
    /// The backing store failed or could not be reached.
    Backend { details: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { key } => write!(f, "record '{key}' not found"),
            Self::Serialization { details } => {
                write!(f, "failed to (de)serialize record: {details}")
            }
            Self::Backend { details } => write!(f, "store backend error: {details}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The authorization code could not be exchanged for tokens.
    TokenExchange { details: String },
    /// The HTTP request did not complete.
    Request { endpoint: String, details: String },
    /// The provider answered with a non-success status.
    Status { endpoint: String, status: u16 },
    /// The response body did not have the expected shape.
    Decode { endpoint: String, details: String },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenExchange { details } => write!(f, "token exchange failed: {details}"),
            Self::Request { endpoint, details } => {
                write!(f, "request to '{endpoint}' failed: {details}")
            }
            Self::Status { endpoint, status } => {
                write!(f, "'{endpoint}' returned status {status}")
            }
            Self::Decode { endpoint, details } => {
                write!(f, "failed to decode response from '{endpoint}': {details}")
            }
        }
    }
}

impl std::error::Error for ProviderError {}

/// Errors from the login and callback flow.
///
/// `details` fields are for logs only and are never shown to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// The callback lacked `code` or `state`.
    MissingParameters,
    /// The caller-supplied redirect URI is not an absolute URL.
    InvalidRedirectUri { uri: String },
    /// No pending login matches `state`.
    InvalidState { details: String },
    /// The identity provider rejected the authorization code.
    CodeExchange { details: String },
    /// The user profile could not be fetched.
    UserInfo { details: String },
    /// The user's organizations could not be fetched.
    Organizations { details: String },
    /// The user is not a member of any allowed organization.
    OrganizationNotAllowed { username: String },
    /// Reading or writing the store failed.
    Storage { details: String },
    /// A token could not be generated.
    TokenGeneration { details: String },
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingParameters => write!(f, "missing code or state"),
            Self::InvalidRedirectUri { uri } => write!(f, "invalid redirect uri '{uri}'"),
            Self::InvalidState { details } => write!(f, "invalid state: {details}"),
            Self::CodeExchange { details } => write!(f, "authentication failed: {details}"),
            Self::UserInfo { details } => write!(f, "failed to get user info: {details}"),
            Self::Organizations { details } => write!(f, "failed to get user orgs: {details}"),
            Self::OrganizationNotAllowed { username } => {
                write!(f, "user '{username}' is not a member of an allowed organization")
            }
            Self::Storage { details } => write!(f, "store error: {details}"),
            Self::TokenGeneration { details } => {
                write!(f, "failed to generate token: {details}")
            }
        }
    }
}

impl std::error::Error for FlowError {}
