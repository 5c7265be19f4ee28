//! Record store backends
//!
//! ## Design
//!
//! - **Trait-based**: `RecordStore` allows swapping implementations
//! - **Async**: all operations are async for use from session tasks
//! - **Process lifetime**: a store is opened once at start-up and shared by
//!   every session through an `Arc`
//!
//! ## Backends
//!
//! - **SQLite** (default): single-file database
//! - **In-Memory**: no persistence, for tests and embedding
//!
//! ## Usage
//!
//! ```no_run
//! use snapshot_node::{config::StorageConfig, storage};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = storage::open(&StorageConfig::default()).await?;
//!     store.ensure_schema().await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::sync::Arc;

pub use backend::{HealthStatus, RecordStore};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;

use crate::config::StorageConfig;

/// Build the configured backend
pub async fn open(config: &StorageConfig) -> StorageResult<Arc<dyn RecordStore>> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => Ok(Arc::new(sqlite::SqliteStore::open(path).await?)),
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::ConnectionFailed(
            "built without the storage-sqlite feature".to_string(),
        )),
    }
}
