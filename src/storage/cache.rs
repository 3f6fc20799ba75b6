//! Cache Repository
//!
//! TTL-scoped cache over the storage facade. Keys are namespaced by source
//! label; values are JSON, compressed transparently past the threshold.
//! Hit/miss counters feed the storage statistics surface.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::{decode_value, encode_value, Backend, Storage};
use crate::utils::error::AppResult;

/// Cache space statistics for `/utility/stats/storage`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheSpaceStats {
    pub live_entries: u64,
    pub by_source: Vec<(String, u64)>,
}

#[derive(Clone)]
pub struct CacheRepository {
    storage: Arc<Storage>,
}

impl CacheRepository {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Deterministic cache key for a source call: `{source}:{sha256(args)}`.
    pub fn key_for(source: &str, canonical_args: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(canonical_args.as_bytes());
        let digest = hasher.finalize();
        // 16 hex chars is plenty for key dispersion and keeps keys readable.
        let short: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();
        format!("{}:{}", source, short)
    }

    /// Store a JSON value with a TTL in seconds from now.
    pub fn set_with_ttl(&self, key: &str, value: &Value, source: &str, ttl_secs: u64) -> AppResult<()> {
        let now = Utc::now().timestamp();
        let ttl_epoch = now + ttl_secs as i64;
        let bytes = serde_json::to_vec(value)?;
        let encoded = encode_value(bytes, &self.storage.stats);

        match &self.storage.backend {
            Backend::Sqlite(db) => db.cache_put(key, &encoded, source, ttl_epoch, now)?,
            Backend::Memory(mem) => mem.cache_put(key, &encoded, source, ttl_epoch, now),
        }
        Ok(())
    }

    /// Fetch a live entry; expired entries are unobservable.
    pub fn get(&self, key: &str) -> AppResult<Option<Value>> {
        let now = Utc::now().timestamp();
        let raw = match &self.storage.backend {
            Backend::Sqlite(db) => db.cache_get(key, now)?,
            Backend::Memory(mem) => mem.cache_get(key, now),
        };
        match raw {
            Some(bytes) => {
                self.storage.stats.record_hit();
                let decoded = decode_value(bytes)?;
                Ok(Some(serde_json::from_slice(&decoded)?))
            }
            None => {
                self.storage.stats.record_miss();
                Ok(None)
            }
        }
    }

    pub fn delete(&self, key: &str) -> AppResult<bool> {
        match &self.storage.backend {
            Backend::Sqlite(db) => db.cache_delete(key),
            Backend::Memory(mem) => Ok(mem.cache_delete(key)),
        }
    }

    /// Clear all keys under a prefix (e.g. `"dadata:"`). Uses the key index.
    pub fn clear_prefix(&self, prefix: &str) -> AppResult<u64> {
        match &self.storage.backend {
            Backend::Sqlite(db) => db.cache_clear_prefix(prefix),
            Backend::Memory(mem) => Ok(mem.cache_clear_prefix(prefix)),
        }
    }

    pub fn space_stats(&self) -> AppResult<CacheSpaceStats> {
        let now = Utc::now().timestamp();
        let (live_entries, by_source) = match &self.storage.backend {
            Backend::Sqlite(db) => (db.cache_count(now)?, db.cache_counts_by_source(now)?),
            Backend::Memory(mem) => (mem.cache_count(now), mem.cache_counts_by_source(now)),
        };
        Ok(CacheSpaceStats {
            live_entries,
            by_source,
        })
    }
}

/// Read-through helper: check the cache under a deterministic key, invoke
/// the loader on a miss, write back on success. One explicit call site per
/// provider; no hidden per-function TTL tables.
pub async fn cached_call<F, Fut>(
    cache: &CacheRepository,
    source: &str,
    canonical_args: &str,
    ttl_secs: u64,
    loader: F,
) -> AppResult<Value>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = AppResult<Value>>,
{
    let key = CacheRepository::key_for(source, canonical_args);
    if let Some(hit) = cache.get(&key)? {
        return Ok(hit);
    }
    let value = loader().await?;
    cache.set_with_ttl(&key, &value, source, ttl_secs)?;
    Ok(value)
}
