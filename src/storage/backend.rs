//! Record store trait definition

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::StorageResult;
use crate::Record;

/// Health status of the record store
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the store operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Durable id → name mapping
///
/// One store instance lives for the whole process and is shared by every
/// session, so `list_all` must not have side effects.
///
/// ## Error Handling
///
/// Methods return `StorageResult<T>`; callers decide whether a failure is
/// fatal. The session collector logs it and carries on without records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create the backing table if it does not exist
    ///
    /// Idempotent. Implementations run the schema setup at most once per
    /// instance; later calls return immediately.
    async fn ensure_schema(&self) -> StorageResult<()>;

    /// Insert a record or replace the name of the record with the same id
    async fn upsert(&self, record: Record) -> StorageResult<()>;

    /// Every stored record, ordered by id
    async fn list_all(&self) -> StorageResult<Vec<Record>>;

    /// Lightweight check that the store is usable
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Release resources; later operations fail with `StorageError::Closed`
    async fn close(&self) -> StorageResult<()>;
}
