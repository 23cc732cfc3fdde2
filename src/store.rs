use crate::error::StoreError;
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// One row of the `PHOTOS` table: precomputed detections for a single photo.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotoRecord {
    pub filename: String,
    pub detections: Option<Value>,
    pub faces: Option<Value>,
    pub metadata: Option<Value>,
}

impl PhotoRecord {
    /// Object labels in detection order. Empty when nothing was detected.
    pub fn object_labels(&self) -> Vec<String> {
        let Some(Value::Array(items)) = &self.detections else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| match item.get("label").and_then(Value::as_str) {
                Some(label) => Some(label.to_string()),
                None => {
                    warn!("Skipping detection without a label in {}", self.filename);
                    None
                }
            })
            .collect()
    }

    /// Face/emotion entries in detection order. Empty when nothing was detected.
    pub fn emotions(&self) -> Vec<Value> {
        match &self.faces {
            None | Some(Value::Null) | Some(Value::Bool(false)) => Vec::new(),
            Some(Value::Object(map)) if map.is_empty() => Vec::new(),
            Some(Value::String(text)) if text.is_empty() => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
        }
    }
}

#[async_trait]
pub trait PhotoStore: Send + Sync {
    async fn fetch_photo(&self, filename: &str) -> Result<Option<PhotoRecord>, StoreError>;
}

pub struct SqlitePhotoStore {
    pool: Pool<SqliteConnectionManager>,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS PHOTOS (
    FILENAME TEXT PRIMARY KEY,
    YOLO_DATA TEXT,
    DEEPFACE_DATA TEXT,
    METADATA TEXT
)";

impl SqlitePhotoStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        Self::with_manager(SqliteConnectionManager::file(path), 8)
    }

    #[cfg(test)]
    /// Single-connection pool so every checkout sees the same in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_manager(SqliteConnectionManager::memory(), 1)
    }

    fn with_manager(manager: SqliteConnectionManager, size: u32) -> Result<Self, StoreError> {
        let pool = Pool::builder()
            .max_size(size)
            .connection_timeout(Duration::from_secs(5))
            .build(manager)?;
        pool.get()?.execute_batch(SCHEMA)?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn pool(&self) -> &Pool<SqliteConnectionManager> {
        &self.pool
    }
}

fn decode_column(column: &'static str, raw: Option<String>) -> Result<Option<Value>, StoreError> {
    match raw {
        None => Ok(None),
        Some(text) if text.trim().is_empty() => Ok(None),
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StoreError::Decode { column, source }),
    }
}

#[async_trait]
impl PhotoStore for SqlitePhotoStore {
    async fn fetch_photo(&self, filename: &str) -> Result<Option<PhotoRecord>, StoreError> {
        let pool = self.pool.clone();
        let filename = filename.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<PhotoRecord>, StoreError> {
            // Released back to the pool when dropped, whatever the query outcome.
            let conn = pool.get()?;
            debug!("Querying PHOTOS for {}", filename);
            let row = conn
                .query_row(
                    "SELECT YOLO_DATA, DEEPFACE_DATA, METADATA FROM PHOTOS WHERE FILENAME = ?1",
                    params![filename],
                    |row| {
                        Ok((
                            row.get::<_, Option<String>>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, Option<String>>(2)?,
                        ))
                    },
                )
                .optional()?;
            let Some((yolo, deepface, metadata)) = row else {
                return Ok(None);
            };
            Ok(Some(PhotoRecord {
                detections: decode_column("YOLO_DATA", yolo)?,
                faces: decode_column("DEEPFACE_DATA", deepface)?,
                metadata: decode_column("METADATA", metadata)?,
                filename,
            }))
        })
        .await?
    }
}
