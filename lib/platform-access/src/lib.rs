//! Sign-in and session management for the tacokumo admin API.
//!
//! This crate provides:
//! - Sessions (`Session`, `SessionId`) and pending-login state (`CsrfState`)
//! - A generic expiring record store (`RecordStore`) with Redis and
//!   in-memory backends
//! - The identity provider contract (`IdentityProvider`)
//! - The OAuth authorization-code flow (`OAuthFlow`)
//! - GitHub OAuth application configuration (`GitHubConfig`)
//!
//! # Example
//!
//! ```
//! use chrono::Duration;
//! use tacokumo_admin_platform_access::{
//!     ProviderUser, Session, SessionId, UpstreamTokens,
//! };
//!
//! let user = ProviderUser {
//!     id: 42,
//!     login: "octocat".to_string(),
//!     name: "The Octocat".to_string(),
//!     email: "octocat@example.com".to_string(),
//!     avatar_url: String::new(),
//! };
//! let tokens = UpstreamTokens {
//!     access_token: "gho_example".to_string(),
//!     refresh_token: None,
//! };
//!
//! let session = Session::for_user(
//!     SessionId::generate().expect("OS random source"),
//!     &user,
//!     &tokens,
//!     Vec::new(),
//!     Duration::hours(24),
//! );
//!
//! assert_eq!(session.user_id(), "42");
//! assert!(!session.is_expired());
//! ```

pub mod error;
pub mod flow;
pub mod github;
pub mod provider;
pub mod session;
pub mod state;
pub mod store;

// Re-export main types at crate root
pub use error::{FlowError, ProviderError, StoreError};
pub use flow::{CompletedLogin, FlowSettings, LoginInitiation, OAuthFlow};
pub use github::{GitHubConfig, GitHubConfigBuilder};
pub use provider::{IdentityProvider, Organization, ProviderUser, UpstreamTokens};
pub use session::{Session, SessionId, TeamMembership};
pub use state::{CsrfState, StateToken};
pub use store::{MemoryStore, RecordStore, RedisStore, SessionStore, StateStore};
