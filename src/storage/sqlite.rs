//! SQLite record store
//!
//! Records live in a single table of a local database file. The file is
//! opened once per process and kept across sessions; nothing here ever
//! drops or recreates it.
//!
//! ## Features
//!
//! - **WAL mode**: readers do not block the writer
//! - **Connection pooling**: sessions query concurrently
//! - **Migrations**: schema versioning with sqlx, applied by `ensure_schema`

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, RecordStore};
use super::error::{StorageError, StorageResult};
use crate::Record;

pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
    schema: OnceCell<()>,
}

impl SqliteStore {
    /// Open (or create) the database file
    ///
    /// The schema is not touched here; call [`RecordStore::ensure_schema`]
    /// once after opening.
    #[instrument(skip_all)]
    pub async fn open(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("opening SQLite record store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("SQLite connection pool created");

        Ok(Self {
            pool,
            db_path: db_path_str,
            schema: OnceCell::new(),
        })
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    #[instrument(skip(self))]
    async fn ensure_schema(&self) -> StorageResult<()> {
        self.schema
            .get_or_try_init(|| async {
                debug!("running database migrations");
                sqlx::migrate!("./migrations").run(&self.pool).await?;
                info!("database migrations complete");
                Ok::<(), StorageError>(())
            })
            .await?;
        Ok(())
    }

    #[instrument(skip(self, record), fields(id = record.id))]
    async fn upsert(&self, record: Record) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO records (id, name)
            VALUES (?, ?)
            ON CONFLICT (id) DO UPDATE SET name = excluded.name
            "#,
        )
        .bind(record.id)
        .bind(&record.name)
        .execute(&self.pool)
        .await?;

        debug!("upserted record");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_all(&self) -> StorageResult<Vec<Record>> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM records ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await?;

        debug!("query returned {} records", rows.len());
        Ok(rows
            .into_iter()
            .map(|(id, name)| Record { id, name })
            .collect())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite store operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite record store");
        self.pool.close().await;
        Ok(())
    }
}
