//! Redis-backed record store.

use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::Pool;
use deadpool_redis::redis::AsyncCommands;
use rootcause::Report;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{RecordStore, StoredRecord, decode, encode, record_ttl};
use crate::error::StoreError;

/// A [`RecordStore`] over a Redis connection pool.
///
/// Each record is a single string value written with `SET .. EX`, so Redis
/// evicts it once its TTL lapses.
pub struct RedisStore<R> {
    pool: Pool,
    default_ttl: Duration,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for RedisStore<R> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            default_ttl: self.default_ttl,
            _record: PhantomData,
        }
    }
}

impl<R: StoredRecord> RedisStore<R> {
    #[must_use]
    pub fn new(pool: Pool, default_ttl: Duration) -> Self {
        Self {
            pool,
            default_ttl,
            _record: PhantomData,
        }
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, Report<StoreError>> {
        self.pool.get().await.map_err(|e| {
            StoreError::Backend {
                details: e.to_string(),
            }
            .into()
        })
    }
}

fn backend_error(e: deadpool_redis::redis::RedisError) -> Report<StoreError> {
    StoreError::Backend {
        details: e.to_string(),
    }
    .into()
}

#[async_trait]
impl<R: StoredRecord> RecordStore<R> for RedisStore<R> {
    #[instrument(skip_all, fields(prefix = R::KEY_PREFIX))]
    async fn create(&self, record: &R) -> Result<(), Report<StoreError>> {
        let payload = encode(record)?;
        let ttl = record_ttl(record.expires_at(), Utc::now(), self.default_ttl);
        // SET EX rejects a zero TTL.
        let ttl_secs = ttl.as_secs().max(1);

        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(R::store_key(record.record_id()), payload, ttl_secs)
            .await
            .map_err(backend_error)?;
        debug!(ttl_secs, "record stored");
        Ok(())
    }

    #[instrument(skip_all, fields(prefix = R::KEY_PREFIX))]
    async fn get(&self, id: &str) -> Result<Option<R>, Report<StoreError>> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn
            .get(R::store_key(id))
            .await
            .map_err(backend_error)?;
        payload.as_deref().map(decode::<R>).transpose()
    }

    #[instrument(skip_all, fields(prefix = R::KEY_PREFIX))]
    async fn delete(&self, id: &str) -> Result<(), Report<StoreError>> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(R::store_key(id))
            .await
            .map_err(backend_error)?;
        Ok(())
    }
}
