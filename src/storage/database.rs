//! SQLite Backend
//!
//! Embedded database for the three spaces using rusqlite with r2d2
//! connection pooling. Each space is a table with the secondary indexes
//! the repositories query through; indexed lookups never degrade to full
//! scans.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

use crate::utils::error::{AppError, AppResult};

/// Type alias for the connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// A raw report row; conversion to `StoredReport` lives in the repository.
#[derive(Debug, Clone)]
pub struct ReportRow {
    pub report_id: String,
    pub inn: Option<String>,
    pub client_name: String,
    pub report_data: Vec<u8>,
    pub risk_level: String,
    pub risk_score: u32,
    pub created_at: i64,
    pub expires_at: i64,
}

/// A raw thread row.
#[derive(Debug, Clone)]
pub struct ThreadRow {
    pub thread_id: String,
    pub thread_data: Vec<u8>,
    pub client_name: String,
    pub inn: Option<String>,
    pub report_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Filter pushed down to the reports space; every field maps to an indexed
/// column except the substring match on `client_name`.
#[derive(Debug, Clone, Default)]
pub struct ReportQuery {
    pub inn: Option<String>,
    pub risk_level: Option<String>,
    pub client_name: Option<String>,
    pub created_from: Option<i64>,
    pub created_to: Option<i64>,
    pub min_risk_score: Option<u32>,
    pub max_risk_score: Option<u32>,
    pub limit: u32,
    pub offset: u32,
}

pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the database file and initialize the schema.
    pub fn open(path: &str) -> AppResult<Self> {
        let manager = if path == ":memory:" {
            SqliteConnectionManager::memory()
        } else {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            SqliteConnectionManager::file(path)
        };

        // A single connection for :memory: so every checkout sees one schema.
        let max_size = if path == ":memory:" { 1 } else { 10 };
        let pool = Pool::builder()
            .max_size(max_size)
            .build(manager)
            .map_err(|e| AppError::storage(format!("failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> AppResult<()> {
        let conn = self.conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS cache (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                ttl_epoch INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_cache_ttl ON cache(ttl_epoch)", [])?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_cache_source ON cache(source)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS reports (
                report_id TEXT PRIMARY KEY,
                inn TEXT,
                client_name TEXT NOT NULL,
                report_data BLOB NOT NULL,
                risk_level TEXT NOT NULL,
                risk_score INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_reports_inn ON reports(inn)", [])?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_reports_expires ON reports(expires_at)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_reports_created ON reports(created_at DESC)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_reports_risk ON reports(risk_level)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS threads (
                thread_id TEXT PRIMARY KEY,
                thread_data BLOB NOT NULL,
                client_name TEXT NOT NULL,
                inn TEXT,
                report_id TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_threads_created ON threads(created_at DESC)",
            [],
        )?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_threads_inn ON threads(inn)", [])?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_threads_client ON threads(client_name)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_threads_report ON threads(report_id)",
            [],
        )?;

        // Legacy unified space kept only as a migration source.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS persistent (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                created_at INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        Ok(())
    }

    fn conn(&self) -> AppResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::storage(format!("failed to get connection: {}", e)))
    }

    pub fn ping(&self) -> bool {
        match self.pool.get() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => false,
        }
    }

    // ========================================================================
    // cache space
    // ========================================================================

    pub fn cache_put(
        &self,
        key: &str,
        value: &[u8],
        source: &str,
        ttl_epoch: i64,
        created_at: i64,
    ) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO cache (key, value, source, ttl_epoch, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(key) DO UPDATE SET
                value = ?2, source = ?3, ttl_epoch = ?4, created_at = ?5",
            params![key, value, source, ttl_epoch, created_at],
        )?;
        Ok(())
    }

    /// Only rows with `ttl_epoch > now` are observable.
    pub fn cache_get(&self, key: &str, now: i64) -> AppResult<Option<Vec<u8>>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT value FROM cache WHERE key = ?1 AND ttl_epoch > ?2",
                params![key, now],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(row)
    }

    pub fn cache_delete(&self, key: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM cache WHERE key = ?1", params![key])?;
        Ok(n > 0)
    }

    pub fn cache_clear_prefix(&self, prefix: &str) -> AppResult<u64> {
        let conn = self.conn()?;
        // Range scan over the primary key, not LIKE, so the index is used.
        let upper = format!("{}\u{10FFFF}", prefix);
        let n = conn.execute(
            "DELETE FROM cache WHERE key >= ?1 AND key < ?2",
            params![prefix, upper],
        )?;
        Ok(n as u64)
    }

    pub fn cache_evict_expired(&self, now: i64) -> AppResult<u64> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM cache WHERE ttl_epoch <= ?1", params![now])?;
        Ok(n as u64)
    }

    pub fn cache_count(&self, now: i64) -> AppResult<u64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cache WHERE ttl_epoch > ?1",
            params![now],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    pub fn cache_counts_by_source(&self, now: i64) -> AppResult<Vec<(String, u64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source, COUNT(*) FROM cache WHERE ttl_epoch > ?1 GROUP BY source",
        )?;
        let rows = stmt
            .query_map(params![now], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // ========================================================================
    // reports space
    // ========================================================================

    pub fn report_put(&self, row: &ReportRow) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO reports
                (report_id, inn, client_name, report_data, risk_level, risk_score, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(report_id) DO UPDATE SET
                inn = ?2, client_name = ?3, report_data = ?4,
                risk_level = ?5, risk_score = ?6, created_at = ?7, expires_at = ?8",
            params![
                row.report_id,
                row.inn,
                row.client_name,
                row.report_data,
                row.risk_level,
                row.risk_score,
                row.created_at,
                row.expires_at,
            ],
        )?;
        Ok(())
    }

    pub fn report_get(&self, report_id: &str, now: i64) -> AppResult<Option<ReportRow>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT report_id, inn, client_name, report_data, risk_level, risk_score,
                        created_at, expires_at
                 FROM reports WHERE report_id = ?1 AND expires_at > ?2",
                params![report_id, now],
                Self::row_to_report,
            )
            .optional()?;
        Ok(row)
    }

    pub fn report_delete(&self, report_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM reports WHERE report_id = ?1", params![report_id])?;
        Ok(n > 0)
    }

    pub fn report_list(&self, query: &ReportQuery, now: i64) -> AppResult<Vec<ReportRow>> {
        let conn = self.conn()?;

        let mut sql = String::from(
            "SELECT report_id, inn, client_name, report_data, risk_level, risk_score,
                    created_at, expires_at
             FROM reports WHERE expires_at > ?",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now)];

        if let Some(inn) = &query.inn {
            sql.push_str(" AND inn = ?");
            args.push(Box::new(inn.clone()));
        }
        if let Some(level) = &query.risk_level {
            sql.push_str(" AND risk_level = ?");
            args.push(Box::new(level.clone()));
        }
        if let Some(name) = &query.client_name {
            sql.push_str(" AND client_name LIKE ? COLLATE NOCASE");
            args.push(Box::new(format!("%{}%", name)));
        }
        if let Some(from) = query.created_from {
            sql.push_str(" AND created_at >= ?");
            args.push(Box::new(from));
        }
        if let Some(to) = query.created_to {
            sql.push_str(" AND created_at <= ?");
            args.push(Box::new(to));
        }
        if let Some(min) = query.min_risk_score {
            sql.push_str(" AND risk_score >= ?");
            args.push(Box::new(min));
        }
        if let Some(max) = query.max_risk_score {
            sql.push_str(" AND risk_score <= ?");
            args.push(Box::new(max));
        }

        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");
        args.push(Box::new(query.limit));
        args.push(Box::new(query.offset));

        let mut stmt = conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt
            .query_map(params_ref.as_slice(), Self::row_to_report)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn report_count(&self, now: i64) -> AppResult<u64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM reports WHERE expires_at > ?1",
            params![now],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    pub fn report_evict_expired(&self, now: i64) -> AppResult<u64> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM reports WHERE expires_at <= ?1", params![now])?;
        Ok(n as u64)
    }

    /// Per-level counts plus mean score, via the risk_level index.
    pub fn report_level_stats(&self, now: i64) -> AppResult<Vec<(String, u64, f64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT risk_level, COUNT(*), AVG(risk_score)
             FROM reports WHERE expires_at > ?1 GROUP BY risk_level",
        )?;
        let rows = stmt
            .query_map(params![now], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)? as u64,
                    row.get::<_, f64>(2)?,
                ))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn row_to_report(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReportRow> {
        Ok(ReportRow {
            report_id: row.get(0)?,
            inn: row.get(1)?,
            client_name: row.get(2)?,
            report_data: row.get(3)?,
            risk_level: row.get(4)?,
            risk_score: row.get::<_, i64>(5)? as u32,
            created_at: row.get(6)?,
            expires_at: row.get(7)?,
        })
    }

    // ========================================================================
    // threads space
    // ========================================================================

    pub fn thread_upsert(&self, row: &ThreadRow) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO threads
                (thread_id, thread_data, client_name, inn, report_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(thread_id) DO UPDATE SET
                thread_data = ?2, client_name = ?3, inn = ?4,
                report_id = ?5, updated_at = ?7",
            params![
                row.thread_id,
                row.thread_data,
                row.client_name,
                row.inn,
                row.report_id,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn thread_get(&self, thread_id: &str) -> AppResult<Option<ThreadRow>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT thread_id, thread_data, client_name, inn, report_id, created_at, updated_at
                 FROM threads WHERE thread_id = ?1",
                params![thread_id],
                Self::row_to_thread,
            )
            .optional()?;
        Ok(row)
    }

    pub fn thread_list(&self, limit: u32, offset: u32) -> AppResult<Vec<ThreadRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT thread_id, thread_data, client_name, inn, report_id, created_at, updated_at
             FROM threads ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt
            .query_map(params![limit, offset], Self::row_to_thread)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn thread_list_by_inn(&self, inn: &str, limit: u32) -> AppResult<Vec<ThreadRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT thread_id, thread_data, client_name, inn, report_id, created_at, updated_at
             FROM threads WHERE inn = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![inn, limit], Self::row_to_thread)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn thread_find_by_report(&self, report_id: &str) -> AppResult<Option<ThreadRow>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT thread_id, thread_data, client_name, inn, report_id, created_at, updated_at
                 FROM threads WHERE report_id = ?1 ORDER BY updated_at DESC LIMIT 1",
                params![report_id],
                Self::row_to_thread,
            )
            .optional()?;
        Ok(row)
    }

    pub fn thread_count(&self) -> AppResult<u64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM threads", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    fn row_to_thread(row: &rusqlite::Row<'_>) -> rusqlite::Result<ThreadRow> {
        Ok(ThreadRow {
            thread_id: row.get(0)?,
            thread_data: row.get(1)?,
            client_name: row.get(2)?,
            inn: row.get(3)?,
            report_id: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    // ========================================================================
    // legacy migration
    // ========================================================================

    /// Copy `thread:{id}` rows from the legacy unified space into the
    /// threads space, then drop them from the source. Runs once at startup;
    /// re-running is a no-op.
    pub fn migrate_legacy_threads(&self) -> AppResult<u64> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT key, value, created_at FROM persistent WHERE key >= 'thread:' AND key < 'thread;'")?;
        let legacy: Vec<(String, Vec<u8>, i64)> = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);

        let mut migrated = 0u64;
        for (key, value, created_at) in legacy {
            let thread_id = key.trim_start_matches("thread:").to_string();
            if thread_id.is_empty() {
                continue;
            }
            let parsed: serde_json::Value =
                serde_json::from_slice(&value).unwrap_or(serde_json::Value::Null);
            let client_name = parsed
                .get("client_name")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let inn = parsed
                .get("inn")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string());

            self.thread_upsert(&ThreadRow {
                thread_id,
                thread_data: value,
                client_name,
                inn,
                report_id: None,
                created_at,
                updated_at: created_at,
            })?;
            conn.execute("DELETE FROM persistent WHERE key = ?1", params![key])?;
            migrated += 1;
        }
        Ok(migrated)
    }

    /// Insert a row into the legacy unified space. The service never
    /// writes here; backfill tooling and migration tests do.
    pub fn seed_legacy(&self, key: &str, value: &[u8], created_at: i64) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO persistent (key, value, created_at) VALUES (?1, ?2, ?3)",
            params![key, value, created_at],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open(":memory:").unwrap()
    }

    #[test]
    fn test_cache_ttl_visibility() {
        let db = db();
        db.cache_put("k", b"v", "dadata", 1000, 900).unwrap();
        assert_eq!(db.cache_get("k", 999).unwrap(), Some(b"v".to_vec()));
        assert_eq!(db.cache_get("k", 1000).unwrap(), None);
        assert_eq!(db.cache_get("k", 2000).unwrap(), None);
    }

    #[test]
    fn test_cache_prefix_clear() {
        let db = db();
        db.cache_put("dadata:1", b"a", "dadata", 10_000, 0).unwrap();
        db.cache_put("dadata:2", b"b", "dadata", 10_000, 0).unwrap();
        db.cache_put("tavily:1", b"c", "tavily", 10_000, 0).unwrap();
        assert_eq!(db.cache_clear_prefix("dadata:").unwrap(), 2);
        assert_eq!(db.cache_count(0).unwrap(), 1);
    }

    #[test]
    fn test_cache_eviction_idempotent() {
        let db = db();
        db.cache_put("old", b"a", "s", 100, 0).unwrap();
        db.cache_put("new", b"b", "s", 10_000, 0).unwrap();
        assert_eq!(db.cache_evict_expired(500).unwrap(), 1);
        assert_eq!(db.cache_evict_expired(500).unwrap(), 0);
        assert_eq!(db.cache_count(500).unwrap(), 1);
    }

    fn report_row(id: &str, inn: Option<&str>, level: &str, score: u32, created: i64) -> ReportRow {
        ReportRow {
            report_id: id.into(),
            inn: inn.map(String::from),
            client_name: format!("Company {}", id),
            report_data: b"{}".to_vec(),
            risk_level: level.into(),
            risk_score: score,
            created_at: created,
            expires_at: created + 2_592_000,
        }
    }

    #[test]
    fn test_report_filters() {
        let db = db();
        db.report_put(&report_row("r1", Some("7736050003"), "low", 10, 100))
            .unwrap();
        db.report_put(&report_row("r2", Some("7736050003"), "high", 60, 200))
            .unwrap();
        db.report_put(&report_row("r3", None, "critical", 90, 300)).unwrap();

        let by_inn = db
            .report_list(
                &ReportQuery {
                    inn: Some("7736050003".into()),
                    limit: 50,
                    ..Default::default()
                },
                0,
            )
            .unwrap();
        assert_eq!(by_inn.len(), 2);
        // Newest first
        assert_eq!(by_inn[0].report_id, "r2");

        let by_score = db
            .report_list(
                &ReportQuery {
                    min_risk_score: Some(50),
                    max_risk_score: Some(80),
                    limit: 50,
                    ..Default::default()
                },
                0,
            )
            .unwrap();
        assert_eq!(by_score.len(), 1);
        assert_eq!(by_score[0].report_id, "r2");

        let by_name = db
            .report_list(
                &ReportQuery {
                    client_name: Some("company r3".into()),
                    limit: 50,
                    ..Default::default()
                },
                0,
            )
            .unwrap();
        assert_eq!(by_name.len(), 1, "substring match is case-insensitive");
    }

    #[test]
    fn test_report_expiry_hides_rows() {
        let db = db();
        db.report_put(&report_row("r1", None, "low", 5, 0)).unwrap();
        assert!(db.report_get("r1", 100).unwrap().is_some());
        assert!(db.report_get("r1", 2_592_000).unwrap().is_none());
        assert_eq!(db.report_evict_expired(2_592_000).unwrap(), 1);
        assert_eq!(db.report_count(2_592_000).unwrap(), 0);
    }

    #[test]
    fn test_thread_upsert_and_lookup() {
        let db = db();
        let row = ThreadRow {
            thread_id: "t1".into(),
            thread_data: b"{}".to_vec(),
            client_name: "Acme".into(),
            inn: Some("7736050003".into()),
            report_id: Some("r9".into()),
            created_at: 100,
            updated_at: 100,
        };
        db.thread_upsert(&row).unwrap();

        let mut updated = row.clone();
        updated.updated_at = 200;
        db.thread_upsert(&updated).unwrap();

        assert_eq!(db.thread_count().unwrap(), 1);
        let fetched = db.thread_get("t1").unwrap().unwrap();
        assert_eq!(fetched.updated_at, 200);
        assert_eq!(fetched.created_at, 100, "created_at survives upsert");

        assert!(db.thread_find_by_report("r9").unwrap().is_some());
        assert_eq!(db.thread_list_by_inn("7736050003", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_legacy_migration() {
        let db = db();
        let payload = serde_json::json!({"client_name": "Old Co", "inn": "7736050003"});
        db.seed_legacy("thread:legacy-1", payload.to_string().as_bytes(), 42)
            .unwrap();
        db.seed_legacy("other:x", b"{}", 42).unwrap();

        assert_eq!(db.migrate_legacy_threads().unwrap(), 1);
        let migrated = db.thread_get("legacy-1").unwrap().unwrap();
        assert_eq!(migrated.client_name, "Old Co");
        assert_eq!(migrated.created_at, 42);

        // Idempotent: the source row is gone.
        assert_eq!(db.migrate_legacy_threads().unwrap(), 0);
    }
}
