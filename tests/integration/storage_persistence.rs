//! Integration tests for the SQLite record store
//!
//! These tests verify that:
//! - Records persist across store instances (process restarts)
//! - Schema setup is idempotent and never drops data
//! - A session snapshot carries the persisted records

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use snapshot_node::config::StorageConfig;
use snapshot_node::session::{self, MemoryStream};
use snapshot_node::storage::sqlite::SqliteStore;
use snapshot_node::storage::{self, RecordStore};
use snapshot_node::Record;
use tempfile::tempdir;

use crate::helpers::*;

#[tokio::test]
async fn test_records_survive_reopen() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("records.db");

    {
        let store = SqliteStore::open(&db_path).await.unwrap();
        store.ensure_schema().await.unwrap();
        store.upsert(Record::new(2, "Eirc")).await.unwrap();
        store.upsert(Record::new(1, "first")).await.unwrap();
        store.close().await.unwrap();
    }

    let store = SqliteStore::open(&db_path).await.unwrap();
    store.ensure_schema().await.unwrap();
    store.ensure_schema().await.unwrap();

    assert_eq!(
        store.list_all().await.unwrap(),
        vec![Record::new(1, "first"), Record::new(2, "Eirc")]
    );
}

#[tokio::test]
async fn test_open_from_config() {
    let temp_dir = tempdir().unwrap();
    let config = StorageConfig::Sqlite {
        path: temp_dir.path().join("configured.db"),
    };

    let store = storage::open(&config).await.unwrap();
    store.ensure_schema().await.unwrap();
    store.upsert(Record::new(5, "five")).await.unwrap();

    let health = store.health_check().await.unwrap();
    assert!(health.healthy);
    assert_eq!(health.metadata.get("backend").map(String::as_str), Some("sqlite"));

    assert_eq!(store.list_all().await.unwrap(), vec![Record::new(5, "five")]);
}

#[tokio::test]
async fn test_session_sends_persisted_records() {
    let temp_dir = tempdir().unwrap();
    let store = SqliteStore::open(temp_dir.path().join("records.db"))
        .await
        .unwrap();
    store.ensure_schema().await.unwrap();
    store.upsert(Record::new(1, "a")).await.unwrap();
    store.upsert(Record::new(2, "b")).await.unwrap();
    let store: Arc<dyn RecordStore> = Arc::new(store);

    let ctx_a = create_context("/ip4/10.0.0.1/tcp/4001", FakeMetrics::default(), store);
    let ctx_b = create_context(
        "/ip4/10.0.0.2/tcp/4002",
        FakeMetrics::default(),
        store_with(&[]).await,
    );
    let mut events_b = ctx_b.subscribe();

    let (b_end, a_end) = MemoryStream::pair("node-b", "node-a");
    let session_a = session::start(a_end, ctx_a);
    let session_b = session::start(b_end, ctx_b);

    let event = tokio::time::timeout(Duration::from_secs(5), events_b.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        event.snapshot.records,
        vec![Record::new(1, "a"), Record::new(2, "b")]
    );

    session_a.join().await.unwrap();
    session_b.join().await.unwrap();
}
