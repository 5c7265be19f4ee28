//! In-memory record store (no persistence)
//!
//! Useful for tests, embedding, and nodes that only need to share records
//! configured at start-up.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, RecordStore};
use super::error::{StorageError, StorageResult};
use crate::Record;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<i64, String>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn ensure_schema(&self) -> StorageResult<()> {
        self.ensure_open()
    }

    async fn upsert(&self, record: Record) -> StorageResult<()> {
        self.ensure_open()?;
        debug!("upserting record {} in memory", record.id);
        self.records.write().await.insert(record.id, record.name);
        Ok(())
    }

    async fn list_all(&self) -> StorageResult<Vec<Record>> {
        self.ensure_open()?;
        let records = self.records.read().await;
        Ok(records
            .iter()
            .map(|(id, name)| Record::new(*id, name.clone()))
            .collect())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let healthy = !self.closed.load(Ordering::Acquire);
        Ok(HealthStatus {
            healthy,
            message: if healthy {
                "In-memory store operational".to_string()
            } else {
                "In-memory store closed".to_string()
            },
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                (
                    "records".to_string(),
                    self.records.read().await.len().to_string(),
                ),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory store");
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
