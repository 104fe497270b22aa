//! Primary SQLite store
//!
//! Owns a single database connection, opened lazily on first use and
//! shared for the lifetime of the store. Concurrent first callers wait on
//! the same in-flight open instead of racing to create a second
//! connection. A failed open is not cached, so the next call retries.
//!
//! All SQLite work runs on tokio's blocking pool.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::error::{StoreError, StoreResult};
use super::schema::{
    get_schema_version, init_schema, needs_init, Collection, VERSION_RECORD_ID,
};
use super::tier::{record_key, Tier, VersionInit};
use crate::config::Config;
use crate::models::AppVersionRecord;

type Handle = Arc<Mutex<Connection>>;

/// Where the database lives
#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
    /// No structured storage in this environment
    Disabled,
}

/// SQLite-backed primary tier
pub struct PrimaryStore {
    location: Location,
    handle: OnceCell<Handle>,
    opens: Arc<AtomicUsize>,
}

impl PrimaryStore {
    /// Store backed by a database file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_location(Location::File(path.into()))
    }

    /// Store backed by an in-memory database (for testing)
    pub fn in_memory() -> Self {
        Self::with_location(Location::Memory)
    }

    /// Store that refuses to open, as if structured storage did not exist
    pub fn disabled() -> Self {
        Self::with_location(Location::Disabled)
    }

    /// Build the store described by the configuration
    pub fn from_config(config: &Config) -> Self {
        if config.primary_enabled {
            Self::new(config.database_path())
        } else {
            Self::disabled()
        }
    }

    fn with_location(location: Location) -> Self {
        Self {
            location,
            handle: OnceCell::new(),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of connections actually opened so far
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Whether the connection has been opened
    pub fn is_open(&self) -> bool {
        self.handle.initialized()
    }

    /// Open the database if needed and return the shared handle
    pub async fn open(&self) -> StoreResult<Handle> {
        let handle = self
            .handle
            .get_or_try_init(|| async {
                let location = self.location.clone();
                let opens = Arc::clone(&self.opens);
                tokio::task::spawn_blocking(move || -> StoreResult<Handle> {
                    let conn = open_connection(&location)?;
                    opens.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(Mutex::new(conn)))
                })
                .await
                .map_err(|e| StoreError::StoreUnavailable {
                    details: format!("open task failed: {}", e),
                })?
            })
            .await?;

        Ok(Arc::clone(handle))
    }

    /// Replace every record in a collection within one transaction
    pub async fn replace_all(&self, collection: Collection, records: &[Value]) -> StoreResult<()> {
        let key = collection.name();
        let rows = encode_rows(key, records)?;

        self.with_conn(move |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| StoreError::write_sql(key, e))?;

            tx.execute(&format!("DELETE FROM {}", key), [])
                .map_err(|e| StoreError::write_sql(key, e))?;

            {
                let mut stmt = tx
                    .prepare(&format!("INSERT INTO {} (id, data) VALUES (?1, ?2)", key))
                    .map_err(|e| StoreError::write_sql(key, e))?;
                for (id, data) in &rows {
                    stmt.execute(params![id, data])
                        .map_err(|e| StoreError::write_sql(key, e))?;
                }
            }

            // Dropping an uncommitted transaction rolls it back
            tx.commit().map_err(|e| StoreError::write_sql(key, e))?;
            debug!("Replaced {} with {} records", key, rows.len());
            Ok(())
        })
        .await
    }

    /// Read every record in a collection, in insertion order
    pub async fn read_all(&self, collection: Collection) -> StoreResult<Vec<Value>> {
        let key = collection.name();

        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT data FROM {} ORDER BY rowid", key))
                .map_err(|e| StoreError::read_sql(key, e))?;
            let rows: Vec<String> = stmt
                .query_map([], |row| row.get(0))
                .map_err(|e| StoreError::read_sql(key, e))?
                .collect::<rusqlite::Result<_>>()
                .map_err(|e| StoreError::read_sql(key, e))?;

            rows.iter()
                .map(|data| {
                    serde_json::from_str(data).map_err(|e| StoreError::ReadFailed {
                        key: key.to_string(),
                        details: format!("corrupt row: {}", e),
                    })
                })
                .collect()
        })
        .await
    }

    /// Delete every record in a collection
    pub async fn clear(&self, collection: Collection) -> StoreResult<()> {
        let key = collection.name();

        self.with_conn(move |conn| {
            conn.execute(&format!("DELETE FROM {}", key), [])
                .map_err(|e| StoreError::write_sql(key, e))?;
            Ok(())
        })
        .await
    }

    /// Schema version recorded in the database
    pub async fn schema_version(&self) -> StoreResult<Option<i32>> {
        self.with_conn(|conn| {
            get_schema_version(conn).map_err(|e| StoreError::read_sql("schema_info", e))
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let handle = self.open().await?;

        tokio::task::spawn_blocking(move || {
            let mut conn = handle.lock().map_err(|_| StoreError::StoreUnavailable {
                details: "connection lock poisoned".to_string(),
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::StoreUnavailable {
            details: format!("storage task failed: {}", e),
        })?
    }
}

impl Tier for PrimaryStore {
    fn name(&self) -> &'static str {
        "primary"
    }

    async fn write(&self, collection: Collection, records: &[Value]) -> StoreResult<()> {
        self.replace_all(collection, records).await
    }

    async fn read(&self, collection: Collection) -> StoreResult<Option<Vec<Value>>> {
        self.read_all(collection).await.map(Some)
    }

    async fn remove(&self, collection: Collection) -> StoreResult<()> {
        self.clear(collection).await
    }

    async fn init_version(&self, version: &str) -> StoreResult<VersionInit> {
        let key = Collection::AppVersion.name();
        let record = serde_json::to_string(&AppVersionRecord::new(version))
            .map_err(|e| StoreError::EncodingError {
                key: key.to_string(),
                source: e,
            })?;

        self.with_conn(move |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| StoreError::write_sql(key, e))?;

            if let Some(existing) = select_version(&tx)? {
                return Ok(VersionInit::AlreadyPresent(existing));
            }

            tx.execute(
                &format!("INSERT INTO {} (id, data) VALUES (?1, ?2)", key),
                params![VERSION_RECORD_ID, record],
            )
            .map_err(|e| StoreError::write_sql(key, e))?;
            tx.commit().map_err(|e| StoreError::write_sql(key, e))?;

            Ok(VersionInit::Created)
        })
        .await
    }

    async fn read_version(&self) -> StoreResult<Option<String>> {
        self.with_conn(|conn| select_version(conn)).await
    }
}

/// Open a connection and bring its schema up to date
fn open_connection(location: &Location) -> StoreResult<Connection> {
    let conn = match location {
        Location::Disabled => {
            return Err(StoreError::StoreUnavailable {
                details: "structured storage is disabled".to_string(),
            })
        }
        Location::Memory => {
            Connection::open_in_memory().map_err(|e| StoreError::StoreUnavailable {
                details: e.to_string(),
            })?
        }
        Location::File(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::StoreUnavailable {
                    details: format!("cannot create {:?}: {}", parent, e),
                })?;
            }
            Connection::open(path).map_err(|e| StoreError::StoreUnavailable {
                details: format!("cannot open {:?}: {}", path, e),
            })?
        }
    };

    ensure_schema(&conn)?;
    info!("Opened primary store ({:?})", location);
    Ok(conn)
}

/// Create any missing collections when the stored schema is older than ours
fn ensure_schema(conn: &Connection) -> StoreResult<()> {
    if needs_init(conn) {
        init_schema(conn).map_err(|e| StoreError::SchemaError {
            details: "failed to create collections".to_string(),
            source: e,
        })?;
    }
    Ok(())
}

fn select_version(conn: &Connection) -> StoreResult<Option<String>> {
    let key = Collection::AppVersion.name();
    let data: Option<String> = conn
        .query_row(
            &format!("SELECT data FROM {} WHERE id = ?1", key),
            [VERSION_RECORD_ID],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| StoreError::read_sql(key, e))?;

    data.map(|data| {
        serde_json::from_str::<AppVersionRecord>(&data)
            .map(|record| record.value)
            .map_err(|e| StoreError::ReadFailed {
                key: key.to_string(),
                details: format!("corrupt version record: {}", e),
            })
    })
    .transpose()
}

/// Pair each record with its key and JSON text
fn encode_rows(key: &str, records: &[Value]) -> StoreResult<Vec<(String, String)>> {
    records
        .iter()
        .map(|record| {
            let id = record_key(record).ok_or_else(|| StoreError::WriteFailed {
                key: key.to_string(),
                details: "record has no primary key".to_string(),
                quota_exceeded: false,
            })?;
            let data = serde_json::to_string(record).map_err(|e| StoreError::WriteFailed {
                key: key.to_string(),
                details: e.to_string(),
                quota_exceeded: false,
            })?;
            Ok((id, data))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_replace_and_read() {
        let store = PrimaryStore::in_memory();
        let records = vec![json!({"id": "1", "customer": "Ana"}), json!({"id": "2"})];

        store.replace_all(Collection::Orders, &records).await.unwrap();
        let loaded = store.read_all(Collection::Orders).await.unwrap();

        assert_eq!(loaded, records);
    }

    #[tokio::test]
    async fn test_read_empty_collection() {
        let store = PrimaryStore::in_memory();
        let loaded = store.read_all(Collection::Contacts).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_replace_does_not_merge() {
        let store = PrimaryStore::in_memory();
        store
            .replace_all(Collection::Orders, &[json!({"id": "1"}), json!({"id": "2"})])
            .await
            .unwrap();
        store
            .replace_all(Collection::Orders, &[json!({"id": "3"})])
            .await
            .unwrap();

        let loaded = store.read_all(Collection::Orders).await.unwrap();
        assert_eq!(loaded, vec![json!({"id": "3"})]);
    }

    #[tokio::test]
    async fn test_duplicate_key_rolls_back() {
        let store = PrimaryStore::in_memory();
        let original = vec![json!({"id": "keep"})];
        store.replace_all(Collection::Orders, &original).await.unwrap();

        let err = store
            .replace_all(
                Collection::Orders,
                &[json!({"id": "a"}), json!({"id": "a"})],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::WriteFailed { .. }));

        // The delete and the first insert were rolled back
        let loaded = store.read_all(Collection::Orders).await.unwrap();
        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn test_missing_key_fails_write() {
        let store = PrimaryStore::in_memory();
        let err = store
            .replace_all(Collection::Contacts, &[json!({"name": "no id"})])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::WriteFailed { .. }));
    }

    #[tokio::test]
    async fn test_disabled_store_is_unavailable() {
        let store = PrimaryStore::disabled();
        let err = store.read_all(Collection::Orders).await.unwrap_err();

        assert!(matches!(err, StoreError::StoreUnavailable { .. }));
        assert!(!store.is_open());
        assert_eq!(store.open_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_opens_coalesce() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(PrimaryStore::new(temp_dir.path().join("db.sqlite3")));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move { store.open().await.map(|_| ()) }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.open_count(), 1);
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("db.sqlite3");

        {
            let store = PrimaryStore::new(&path);
            store
                .replace_all(Collection::Transactions, &[json!({"id": "t1"})])
                .await
                .unwrap();
        }

        let store = PrimaryStore::new(&path);
        let loaded = store.read_all(Collection::Transactions).await.unwrap();
        assert_eq!(loaded, vec![json!({"id": "t1"})]);
        assert_eq!(store.schema_version().await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_unopenable_path_is_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        // A directory cannot be opened as a database file
        let store = PrimaryStore::new(temp_dir.path());

        let err = store.open().await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::StoreUnavailable { .. } | StoreError::SchemaError { .. }
        ));
        assert!(!store.is_open());
    }

    #[tokio::test]
    async fn test_init_version_once() {
        let store = PrimaryStore::in_memory();

        assert_eq!(store.init_version("1.0.0").await.unwrap(), VersionInit::Created);
        assert_eq!(
            store.init_version("2.0.0").await.unwrap(),
            VersionInit::AlreadyPresent("1.0.0".to_string())
        );

        let records = store.read_all(Collection::AppVersion).await.unwrap();
        assert_eq!(records, vec![json!({"id": "version", "value": "1.0.0"})]);
        assert_eq!(store.read_version().await.unwrap(), Some("1.0.0".to_string()));
    }
}
