//! Integration Tests for Persistence
//!
//! Writes through one cache instance, reopens the backend in a fresh one and
//! checks what survived.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dash_cache::cache::{Cache, JsonCodec, ManualClock};
use dash_cache::persistence::{PersistenceAdapter, PersistenceKind};
use dash_cache::{CacheConfig, SetOptions};
use serde_json::{json, Value};

const START: u64 = 1_700_000_000_000;

// == Helper Functions ==

fn scratch_path(label: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "dash_cache-it-{}-{}-{}",
        label,
        std::process::id(),
        dash_cache::cache::current_timestamp_ms()
    ));
    let _ = std::fs::remove_dir_all(&path);
    let _ = std::fs::remove_file(&path);
    path
}

async fn open(kind: PersistenceKind, path: &Path, clock: &ManualClock) -> Cache<Value> {
    let adapter = PersistenceAdapter::from_kind(kind, path)
        .unwrap()
        .expect("persistence enabled");
    Cache::open(
        CacheConfig::default(),
        JsonCodec,
        Arc::new(clock.clone()),
        adapter,
        64,
    )
    .await
}

async fn reload_round_trip(kind: PersistenceKind, path: PathBuf) {
    let clock = ManualClock::new(START);

    {
        let mut cache = open(kind, &path, &clock).await;
        cache.set(
            "chart:ES",
            &json!({"bars": [1, 2, 3]}),
            SetOptions::new().with_tag("charts"),
        );
        cache.set("short", &json!("gone soon"), SetOptions::new().with_ttl_ms(1_000));
        cache.set("scratch", &json!("memory only"), SetOptions::new().memory_only());
        cache.set("deleted", &json!(0), SetOptions::default());
        cache.delete("deleted");
        cache.flush().await;

        let status = cache.persistence_status().unwrap();
        assert_eq!(status.failed, 0);
        assert!(status.last_sync_error.is_none());
    }

    clock.advance(5_000);
    let mut reopened = open(kind, &path, &clock).await;

    assert_eq!(reopened.get("chart:ES"), Some(json!({"bars": [1, 2, 3]})));
    assert_eq!(reopened.get("short"), None);
    assert_eq!(reopened.get("scratch"), None);
    assert_eq!(reopened.get("deleted"), None);

    // Tags survive the reload
    assert_eq!(reopened.delete_by_tags(["charts"]), 1);
    reopened.flush().await;

    let _ = std::fs::remove_dir_all(&path);
    let _ = std::fs::remove_file(&path);
}

// == File Backend ==

#[tokio::test]
async fn test_file_backend_reload() {
    reload_round_trip(PersistenceKind::File, scratch_path("file")).await;
}

// == Sqlite Backend ==

#[tokio::test]
async fn test_sqlite_backend_reload() {
    let dir = scratch_path("sqlite");
    reload_round_trip(PersistenceKind::Sqlite, dir.join("cache.db")).await;
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_clear_empties_backend() {
    let path = scratch_path("clear");
    let clock = ManualClock::new(START);

    {
        let mut cache = open(PersistenceKind::File, &path, &clock).await;
        cache.set("a", &json!(1), SetOptions::default());
        cache.set("b", &json!(2), SetOptions::default());
        cache.clear();
        cache.flush().await;
    }

    let reopened = open(PersistenceKind::File, &path, &clock).await;
    assert!(reopened.is_empty());

    let _ = std::fs::remove_dir_all(&path);
}
