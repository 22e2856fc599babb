//! Persistence round-trip and edge case tests.
//!
//! Covers JSON helpers, the configuration document, and the SQLite snapshot.

use std::path::PathBuf;
use std::time::Duration;

use cloudmon_core::{
    AccountContext, AccountKey, CacheKey, FailureKind, FetchFailure, FetchResult, Metric, Payload,
    ProviderId, QueryKind,
};
use tempfile::TempDir;

use crate::config::{ConfigFile, ManagerConfig};
use crate::persistence::{ensure_dir, load_json, load_json_or_default, save_json};
use crate::snapshot::SnapshotStore;

fn success(provider: &str, account: &str, query: QueryKind, amount: f64) -> FetchResult {
    let payload: Payload = vec![Metric::amount("Month to date", amount, Some("USD"))]
        .into_iter()
        .collect();
    FetchResult::success(CacheKey::new(provider, account, query), payload)
}

// ============================================================================
// JSON Persistence Tests
// ============================================================================

#[tokio::test]
async fn test_save_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let nested = temp_dir.path().join("deeply").join("nested").join("test.json");

    save_json(&nested, &serde_json::json!({"key": "value"}))
        .await
        .unwrap();
    assert!(nested.exists());
    assert!(!nested.with_extension("json.tmp").exists());
}

#[tokio::test]
async fn test_load_nonexistent_file() {
    let path = PathBuf::from("/nonexistent/path/config.json");
    let result: Result<ConfigFile, _> = load_json(&path).await;
    assert!(result.unwrap_err().is_not_found());

    let fallback: ManagerConfig = load_json_or_default(&path).await;
    assert_eq!(fallback, ManagerConfig::default());
}

#[tokio::test]
async fn test_load_corrupt_json_falls_back_to_default() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    tokio::fs::write(&path, "{ not json").await.unwrap();

    let fallback: ConfigFile = load_json_or_default(&path).await;
    assert!(fallback.accounts.is_empty());
}

#[tokio::test]
async fn test_ensure_dir_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("cache");
    ensure_dir(&dir).await.unwrap();
    ensure_dir(&dir).await.unwrap();
    assert!(dir.is_dir());
}

// ============================================================================
// Config File Tests
// ============================================================================

#[tokio::test]
async fn test_config_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");

    let mut config = ConfigFile::default();
    config.manager.publish_on_cache_hit = true;
    config.manager.retry.max_retries = 5;
    config.upsert_account(
        AccountContext::new("aws", "prod")
            .with_region("eu-west-1")
            .with_poll_interval(Duration::from_secs(300)),
    );
    config.upsert_account(AccountContext::new("gemini", "default").with_label("Personal"));
    config.save(&path).await.unwrap();

    let loaded = ConfigFile::load(&path).await.unwrap();
    assert_eq!(loaded, config);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}

#[tokio::test]
async fn test_config_missing_file_is_default() {
    let temp_dir = TempDir::new().unwrap();
    let loaded = ConfigFile::load(&temp_dir.path().join("absent.json"))
        .await
        .unwrap();
    assert_eq!(loaded, ConfigFile::default());
}

#[tokio::test]
async fn test_config_partial_document_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    tokio::fs::write(
        &path,
        r#"{"manager": {"default_ttl_secs": 120}, "accounts": [{"provider_id": "digitalocean", "account_id": "team"}]}"#,
    )
    .await
    .unwrap();

    let loaded = ConfigFile::load(&path).await.unwrap();
    assert_eq!(loaded.manager.default_ttl(), Duration::from_secs(120));
    assert_eq!(loaded.manager.fetch_timeout(), Duration::from_secs(30));
    assert_eq!(loaded.manager.retry.max_retries, 3);
    assert!(loaded.accounts[0].enabled);
}

#[tokio::test]
async fn test_config_rejects_invalid_values() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");

    tokio::fs::write(&path, r#"{"accounts": [{"provider_id": "aws", "account_id": "a:b"}]}"#)
        .await
        .unwrap();
    assert!(ConfigFile::load(&path).await.is_err());

    tokio::fs::write(&path, r#"{"manager": {"event_capacity": 0}}"#)
        .await
        .unwrap();
    assert!(ConfigFile::load(&path).await.is_err());
}

#[test]
fn test_upsert_and_remove_account() {
    let mut config = ConfigFile::default();
    config.upsert_account(AccountContext::new("aws", "prod"));
    config.upsert_account(AccountContext::new("aws", "prod").with_label("Prod"));
    assert_eq!(config.accounts.len(), 1);

    let key = AccountKey::new("aws", "prod");
    assert_eq!(config.account(&key).unwrap().display_name(), "Prod");
    assert!(config.remove_account(&key).is_some());
    assert!(config.remove_account(&key).is_none());
}

// ============================================================================
// Snapshot Tests
// ============================================================================

#[tokio::test]
async fn test_snapshot_upserts_successful_results_only() {
    let store = SnapshotStore::open_in_memory().unwrap();
    let failed = FetchResult::failure(
        CacheKey::new("aws", "prod", QueryKind::InstanceList),
        FetchFailure::new(FailureKind::Transient, "HTTP 503"),
    );

    let written = store
        .save(vec![
            success("aws", "prod", QueryKind::Cost, 1.0),
            failed,
        ])
        .await
        .unwrap();
    assert_eq!(written, 1);

    store
        .save(vec![success("aws", "prod", QueryKind::Cost, 2.0)])
        .await
        .unwrap();

    let loaded = store.load_all().await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].payload.metrics[0].amount, Some(2.0));
}

#[tokio::test]
async fn test_snapshot_delete_account() {
    let store = SnapshotStore::open_in_memory().unwrap();
    store
        .save(vec![
            success("aws", "prod", QueryKind::Cost, 1.0),
            success("aws", "prod", QueryKind::InstanceList, 1.0),
            success("aws", "dev", QueryKind::Cost, 1.0),
        ])
        .await
        .unwrap();

    let removed = store
        .delete_account(&ProviderId::new("aws"), "prod")
        .await
        .unwrap();
    assert_eq!(removed, 2);

    let left = store.load_all().await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].key.account_id, "dev");
}

#[tokio::test]
async fn test_snapshot_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("cache").join("cache.db");

    {
        let store = SnapshotStore::open(&path).await.unwrap();
        store
            .save(vec![success("digitalocean", "team", QueryKind::Cost, 42.0)])
            .await
            .unwrap();
    }

    let store = SnapshotStore::open(&path).await.unwrap();
    assert_eq!(store.path(), Some(path.as_path()));
    let loaded = store.load_all().await.unwrap();
    assert_eq!(loaded[0].key, CacheKey::new("digitalocean", "team", QueryKind::Cost));
}
