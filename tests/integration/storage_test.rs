//! Storage Integration Tests
//!
//! Properties exercised over a real SQLite file in a temp directory:
//! TTL visibility, background eviction, transparent compression, and the
//! legacy thread migration.

use serde_json::json;
use tempfile::TempDir;

use counterscope::storage::database::{Database, ReportRow};
use counterscope::storage::{CacheRepository, ReportsRepository, Storage, ThreadsRepository};
use counterscope::Config;

fn file_storage(temp: &TempDir) -> std::sync::Arc<Storage> {
    let config = Config {
        database_path: temp
            .path()
            .join("counterscope.db")
            .to_string_lossy()
            .into_owned(),
        ..Config::default()
    };
    let storage = Storage::open(&config);
    assert!(!storage.is_fallback(), "file-backed primary expected");
    storage
}

#[test]
fn test_cache_ttl_visibility_on_disk() {
    let temp = tempfile::tempdir().unwrap();
    let storage = file_storage(&temp);
    let cache = CacheRepository::new(storage.clone());

    cache.set_with_ttl("k1", &json!({"v": 1}), "dadata", 3600).unwrap();
    cache.set_with_ttl("k2", &json!({"v": 2}), "dadata", 0).unwrap();

    assert!(cache.get("k1").unwrap().is_some());
    assert!(cache.get("k2").unwrap().is_none(), "ttl=0 is already expired");

    // A write never resurrects an evicted key except an explicit re-write.
    let now = chrono::Utc::now().timestamp();
    storage.evict_expired(now).unwrap();
    assert!(cache.get("k2").unwrap().is_none());
    cache.set_with_ttl("k2", &json!({"v": 3}), "dadata", 3600).unwrap();
    assert_eq!(cache.get("k2").unwrap().unwrap()["v"], 3);
}

#[test]
fn test_eviction_sweep_removes_all_expired_rows() {
    let temp = tempfile::tempdir().unwrap();
    let storage = file_storage(&temp);
    let cache = CacheRepository::new(storage.clone());
    let now = chrono::Utc::now().timestamp();

    cache.set_with_ttl("live", &json!(1), "s", 3600).unwrap();
    cache.set_with_ttl("dead", &json!(2), "s", 0).unwrap();

    // An expired report row, seeded directly at the space level.
    let db = Database::open(
        temp.path()
            .join("counterscope.db")
            .to_string_lossy()
            .as_ref(),
    )
    .unwrap();
    db.report_put(&ReportRow {
        report_id: "expired".into(),
        inn: None,
        client_name: "Old".into(),
        report_data: b"{}".to_vec(),
        risk_level: "low".into(),
        risk_score: 1,
        created_at: now - 40 * 86_400,
        expires_at: now - 10 * 86_400,
    })
    .unwrap();
    db.report_put(&ReportRow {
        report_id: "live".into(),
        inn: None,
        client_name: "New".into(),
        report_data: b"{}".to_vec(),
        risk_level: "low".into(),
        risk_score: 1,
        created_at: now,
        expires_at: now + 86_400,
    })
    .unwrap();

    let (cache_evicted, reports_evicted) = storage.evict_expired(now).unwrap();
    assert_eq!(cache_evicted, 1);
    assert_eq!(reports_evicted, 1);

    // Nothing expired remains; the sweep is idempotent.
    assert_eq!(storage.evict_expired(now).unwrap(), (0, 0));
    assert!(db.report_get("expired", now).unwrap().is_none());
    assert!(db.report_get("live", now).unwrap().is_some());
}

#[test]
fn test_large_values_compressed_through_sqlite() {
    let temp = tempfile::tempdir().unwrap();
    let storage = file_storage(&temp);
    let cache = CacheRepository::new(storage.clone());

    let big = json!({"text": "дело о банкротстве ".repeat(500)});
    cache.set_with_ttl("big", &big, "casebook", 3600).unwrap();

    assert_eq!(cache.get("big").unwrap().unwrap(), big);
    let counters = storage.stats.snapshot();
    assert_eq!(counters.compressed_saves, 1);
    assert!(counters.bytes_saved > 0);
}

#[test]
fn test_legacy_threads_migrate_once() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("counterscope.db");
    {
        let db = Database::open(path.to_string_lossy().as_ref()).unwrap();
        db.seed_legacy(
            "thread:sess-legacy",
            json!({"client_name": "Legacy Co", "inn": "7736050003"})
                .to_string()
                .as_bytes(),
            1_700_000_000,
        )
        .unwrap();
    }

    let config = Config {
        database_path: path.to_string_lossy().into_owned(),
        ..Config::default()
    };
    let storage = Storage::open(&config);
    assert_eq!(storage.migrate_legacy_threads().unwrap(), 1);

    let threads = ThreadsRepository::new(storage.clone());
    let record = threads.get("sess-legacy").unwrap().unwrap();
    assert_eq!(record.client_name, "Legacy Co");
    assert_eq!(record.inn.as_deref(), Some("7736050003"));

    // Reads go strictly to the threads space; re-running is a no-op.
    assert_eq!(storage.migrate_legacy_threads().unwrap(), 0);
}

#[test]
fn test_reports_survive_reopen() {
    let temp = tempfile::tempdir().unwrap();
    let report_id;
    {
        let storage = file_storage(&temp);
        let repo = ReportsRepository::new(storage);
        let report = counterscope::models::ClientAnalysisReport {
            metadata: counterscope::models::ReportMetadata {
                client_name: "Durable LLC".into(),
                inn: Some("7736050003".into()),
                analysis_date: chrono::Utc::now(),
                sources_used: vec!["dadata".into()],
            },
            company_info: json!({}),
            legal_cases_count: 0,
            risk_assessment: counterscope::models::RiskAssessment::new(33, vec![]),
            findings: vec![],
            summary: "s".into(),
            citations: vec![],
            recommendations: vec![],
            degraded: false,
        };
        let stored =
            counterscope::models::StoredReport::from_report(report, chrono::Utc::now());
        report_id = repo.create(&stored).unwrap();
    }

    let storage = file_storage(&temp);
    let repo = ReportsRepository::new(storage);
    let fetched = repo.get(&report_id).unwrap().unwrap();
    assert_eq!(fetched.client_name, "Durable LLC");
    assert_eq!(fetched.risk_score, 33);
}
