//! Storage Layer
//!
//! Three named spaces (cache, reports, threads) behind typed repositories.
//! The primary backend is embedded SQLite; when it cannot be opened the
//! service degrades to an in-process map store with the same interface and
//! best-effort durability. Values at or above 1 KiB are gzip-compressed
//! transparently on write and sniffed by magic marker on read.

pub mod cache;
pub mod database;
pub mod memory;
pub mod reports;
pub mod threads;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::utils::error::{AppError, AppResult};
use database::Database;
use memory::MemoryStore;

pub use cache::CacheRepository;
pub use reports::{ReportFilter, ReportsRepository};
pub use threads::ThreadsRepository;

/// Values at or above this size are compressed on write.
pub const COMPRESSION_THRESHOLD: usize = 1024;
/// gzip magic marker, used to sniff compressed values on read.
const GZIP_MARKER: [u8; 2] = [0x1f, 0x8b];

/// Atomic counters shared by all repositories.
#[derive(Debug, Default)]
pub struct StorageStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub compressed_saves: AtomicU64,
    pub bytes_saved: AtomicU64,
}

/// Serializable view of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct StorageStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate_percent: f64,
    pub compressed_saves: u64,
    pub bytes_saved: u64,
}

impl StorageStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StorageStatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64 * 10_000.0).round() / 100.0
        };
        StorageStatsSnapshot {
            hits,
            misses,
            hit_rate_percent: hit_rate,
            compressed_saves: self.compressed_saves.load(Ordering::Relaxed),
            bytes_saved: self.bytes_saved.load(Ordering::Relaxed),
        }
    }
}

/// Compress a value when it crosses the threshold and compression actually
/// shrinks it.
pub fn encode_value(bytes: Vec<u8>, stats: &StorageStats) -> Vec<u8> {
    if bytes.len() < COMPRESSION_THRESHOLD {
        return bytes;
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(6));
    if encoder.write_all(&bytes).is_err() {
        return bytes;
    }
    match encoder.finish() {
        Ok(compressed) if compressed.len() < bytes.len() => {
            stats.compressed_saves.fetch_add(1, Ordering::Relaxed);
            stats
                .bytes_saved
                .fetch_add((bytes.len() - compressed.len()) as u64, Ordering::Relaxed);
            compressed
        }
        _ => bytes,
    }
}

/// Reverse of `encode_value`: gzip marker means decompress, anything else
/// is returned as-is.
pub fn decode_value(bytes: Vec<u8>) -> AppResult<Vec<u8>> {
    if bytes.len() >= 2 && bytes[..2] == GZIP_MARKER {
        let mut decoder = GzDecoder::new(&bytes[..]);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| AppError::storage(format!("decompression failed: {}", e)))?;
        Ok(out)
    } else {
        Ok(bytes)
    }
}

/// Which backend is live.
pub enum Backend {
    Sqlite(Database),
    Memory(MemoryStore),
}

/// The storage facade handed to repositories. Owns the backend selection
/// and the shared counters.
pub struct Storage {
    pub(crate) backend: Backend,
    pub stats: StorageStats,
}

impl Storage {
    /// Open the primary store; fall back to the in-memory store when the
    /// primary is unreachable. The transition is logged and visible in
    /// health output.
    pub fn open(config: &Config) -> Arc<Self> {
        match Database::open(&config.database_path) {
            Ok(db) => {
                info!(path = %config.database_path, "storage: SQLite primary online");
                Arc::new(Self {
                    backend: Backend::Sqlite(db),
                    stats: StorageStats::default(),
                })
            }
            Err(err) => {
                error!(error = %err, "storage: primary unavailable, using in-memory fallback");
                Arc::new(Self {
                    backend: Backend::Memory(MemoryStore::new()),
                    stats: StorageStats::default(),
                })
            }
        }
    }

    /// In-memory storage for tests and explicit ephemeral deployments.
    pub fn in_memory() -> Arc<Self> {
        Arc::new(Self {
            backend: Backend::Memory(MemoryStore::new()),
            stats: StorageStats::default(),
        })
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.backend, Backend::Memory(_))
    }

    pub fn ping(&self) -> bool {
        match &self.backend {
            Backend::Sqlite(db) => db.ping(),
            Backend::Memory(_) => true,
        }
    }

    /// One-shot migration from the legacy unified space: rows keyed
    /// `thread:{id}` move into the threads space. Reads afterwards go
    /// strictly to threads.
    pub fn migrate_legacy_threads(&self) -> AppResult<u64> {
        let migrated = match &self.backend {
            Backend::Sqlite(db) => db.migrate_legacy_threads()?,
            Backend::Memory(_) => 0,
        };
        if migrated > 0 {
            warn!(migrated, "storage: migrated legacy thread rows");
        }
        Ok(migrated)
    }

    /// Sweep expired cache entries and reports. Idempotent; returns counts.
    pub fn evict_expired(&self, now_epoch: i64) -> AppResult<(u64, u64)> {
        let (cache_evicted, reports_evicted) = match &self.backend {
            Backend::Sqlite(db) => (db.cache_evict_expired(now_epoch)?, db.report_evict_expired(now_epoch)?),
            Backend::Memory(mem) => (
                mem.cache_evict_expired(now_epoch),
                mem.report_evict_expired(now_epoch),
            ),
        };
        if cache_evicted > 0 || reports_evicted > 0 {
            info!(cache_evicted, reports_evicted, "storage: eviction sweep");
        }
        Ok((cache_evicted, reports_evicted))
    }
}
