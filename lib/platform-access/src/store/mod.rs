//! Key-value storage for sessions and CSRF state records.
//!
//! Both record types share one contract, [`RecordStore`], and one TTL
//! policy, [`record_ttl`]. Records are stored as JSON under
//! `<prefix><id>` and are never decoded partially.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rootcause::Report;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::StoreError;
use crate::session::Session;
use crate::state::CsrfState;

/// Default TTL for sessions without a usable expiry.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default TTL for state records without a usable expiry.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// A record kept in a [`RecordStore`].
pub trait StoredRecord: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Prefix prepended to the record id to form the store key.
    const KEY_PREFIX: &'static str;

    /// The record's id within its prefix.
    fn record_id(&self) -> &str;

    fn expires_at(&self) -> DateTime<Utc>;

    fn set_expires_at(&mut self, expires_at: DateTime<Utc>);

    /// Returns the full store key for `id`.
    #[must_use]
    fn store_key(id: &str) -> String {
        format!("{}{}", Self::KEY_PREFIX, id)
    }
}

impl StoredRecord for Session {
    const KEY_PREFIX: &'static str = "session:";

    fn record_id(&self) -> &str {
        self.id().as_str()
    }

    fn expires_at(&self) -> DateTime<Utc> {
        Session::expires_at(self)
    }

    fn set_expires_at(&mut self, expires_at: DateTime<Utc>) {
        Session::set_expires_at(self, expires_at);
    }
}

impl StoredRecord for CsrfState {
    const KEY_PREFIX: &'static str = "oauth_state:";

    fn record_id(&self) -> &str {
        self.state().as_str()
    }

    fn expires_at(&self) -> DateTime<Utc> {
        CsrfState::expires_at(self)
    }

    fn set_expires_at(&mut self, expires_at: DateTime<Utc>) {
        CsrfState::set_expires_at(self, expires_at);
    }
}

/// Storage for records that expire.
#[async_trait]
pub trait RecordStore<R: StoredRecord>: Send + Sync {
    /// Writes `record`, replacing any record with the same id.
    async fn create(&self, record: &R) -> Result<(), Report<StoreError>>;

    /// Reads a record. `Ok(None)` means no such record.
    async fn get(&self, id: &str) -> Result<Option<R>, Report<StoreError>>;

    /// Deletes a record. Deleting a missing record succeeds.
    async fn delete(&self, id: &str) -> Result<(), Report<StoreError>>;

    /// Moves a record's expiry to `new_expiry` and writes it back.
    ///
    /// This is a read followed by a write: concurrent refreshes of the same
    /// record are last-writer-wins.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the record does not exist.
    async fn refresh(
        &self,
        id: &str,
        new_expiry: DateTime<Utc>,
    ) -> Result<R, Report<StoreError>> {
        let mut record = self
            .get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                key: R::store_key(id),
            })?;
        record.set_expires_at(new_expiry);
        self.create(&record).await?;
        Ok(record)
    }
}

/// Session storage.
pub type SessionStore = dyn RecordStore<Session>;

/// CSRF state storage.
pub type StateStore = dyn RecordStore<CsrfState>;

/// Computes the store TTL for a record expiring at `expires_at`.
///
/// The TTL is the time remaining until expiry, capped at `default_ttl`. A
/// record already past its expiry is kept for `default_ttl`; readers reject
/// it by its `expires_at`.
#[must_use]
pub fn record_ttl(
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
    default_ttl: Duration,
) -> Duration {
    match (expires_at - now).to_std() {
        Ok(remaining) if !remaining.is_zero() => remaining.min(default_ttl),
        _ => default_ttl,
    }
}

fn encode<R: StoredRecord>(record: &R) -> Result<String, Report<StoreError>> {
    serde_json::to_string(record).map_err(|e| {
        StoreError::Serialization {
            details: e.to_string(),
        }
        .into()
    })
}

fn decode<R: StoredRecord>(payload: &str) -> Result<R, Report<StoreError>> {
    serde_json::from_str(payload).map_err(|e| {
        StoreError::Serialization {
            details: e.to_string(),
        }
        .into()
    })
}
