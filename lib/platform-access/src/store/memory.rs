//! In-process record store.

use async_trait::async_trait;
use chrono::Utc;
use rootcause::Report;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{RecordStore, StoredRecord, decode, encode, record_ttl};
use crate::error::StoreError;

struct Entry {
    payload: String,
    evict_at: Instant,
}

/// A [`RecordStore`] held in memory, with the same TTL policy as the
/// Redis store. Entries past their TTL are treated as absent and dropped
/// on the next write.
pub struct MemoryStore<R> {
    entries: RwLock<HashMap<String, Entry>>,
    default_ttl: Duration,
    _record: PhantomData<fn() -> R>,
}

impl<R: StoredRecord> MemoryStore<R> {
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            _record: PhantomData,
        }
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.evict_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stores a raw payload, bypassing serialization.
    #[cfg(test)]
    pub(crate) async fn insert_raw(&self, id: &str, payload: &str) {
        self.entries.write().await.insert(
            R::store_key(id),
            Entry {
                payload: payload.to_string(),
                evict_at: Instant::now() + self.default_ttl,
            },
        );
    }
}

#[async_trait]
impl<R: StoredRecord> RecordStore<R> for MemoryStore<R> {
    async fn create(&self, record: &R) -> Result<(), Report<StoreError>> {
        let payload = encode(record)?;
        let ttl = record_ttl(record.expires_at(), Utc::now(), self.default_ttl);
        let now = Instant::now();

        let mut entries = self.entries.write().await;
        entries.retain(|_, e| e.evict_at > now);
        entries.insert(
            R::store_key(record.record_id()),
            Entry {
                payload,
                evict_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<R>, Report<StoreError>> {
        let entries = self.entries.read().await;
        match entries.get(&R::store_key(id)) {
            Some(entry) if entry.evict_at > Instant::now() => decode(&entry.payload).map(Some),
            _ => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), Report<StoreError>> {
        self.entries.write().await.remove(&R::store_key(id));
        Ok(())
    }
}
