//! Fallback key-value store
//!
//! A string-keyed store with one file per key under a single directory.
//! Collections are stored as a JSON array of records; the version marker
//! is stored as a plain string. Every write replaces the whole value using
//! an atomic rename, so readers never see a half-written file.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::error::{StoreError, StoreResult};
use super::schema::Collection;
use super::tier::{Tier, VersionInit};
use crate::config::Config;
use crate::models::{AppVersionRecord, Record};

/// File-backed fallback tier
#[derive(Debug, Clone)]
pub struct FallbackStore {
    dir: PathBuf,
}

impl FallbackStore {
    /// Create a store rooted at `dir` (created on first write)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Build the store described by the configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.fallback_dir())
    }

    /// Directory holding the stored keys
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a value is stored under `key`
    pub fn contains(&self, key: &str) -> bool {
        self.key_path(key).exists()
    }

    /// Encode `records` as JSON and store them under `key`
    pub fn put<T: Serialize + ?Sized>(&self, key: &str, records: &T) -> StoreResult<()> {
        let encoded = serde_json::to_string(records).map_err(|e| StoreError::EncodingError {
            key: key.to_string(),
            source: e,
        })?;
        self.put_string(key, &encoded)
    }

    /// Decode the value under `key`, or return `default` when absent
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> StoreResult<T> {
        Ok(self.get_opt(key)?.unwrap_or(default))
    }

    /// Decode the value under `key`, if present
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let Some(raw) = self.get_string(key)? else {
            return Ok(None);
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::DecodingError {
                key: key.to_string(),
                source: e,
            })
    }

    /// Store a raw string under `key`
    pub fn put_string(&self, key: &str, value: &str) -> StoreResult<()> {
        atomic_write(&self.key_path(key), value.as_bytes())
            .map_err(|e| StoreError::write_io(key, e))
    }

    /// Read the raw string under `key`, if present
    pub fn get_string(&self, key: &str) -> StoreResult<Option<String>> {
        match fs::read_to_string(self.key_path(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::read_io(key, e)),
        }
    }

    /// Delete the value under `key`; no-op if absent
    pub fn remove(&self, key: &str) -> StoreResult<()> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::write_io(key, e)),
        }
    }

    /// Synchronous read of a collection straight from this tier
    ///
    /// For callers that cannot await. Any problem yields an empty list.
    pub fn load_blocking<R: Record>(&self) -> Vec<R> {
        let key = R::COLLECTION.name();
        match self.get(key, Vec::new()) {
            Ok(records) => records,
            Err(e) => {
                warn!("Ignoring unreadable fallback value: {}", e);
                Vec::new()
            }
        }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    async fn blocking<T, F>(&self, key: &str, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(FallbackStore) -> StoreResult<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(store))
            .await
            .map_err(|e| StoreError::ReadFailed {
                key: key.to_string(),
                details: format!("storage task failed: {}", e),
            })?
    }
}

impl Tier for FallbackStore {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn write(&self, collection: Collection, records: &[Value]) -> StoreResult<()> {
        let key = collection.name();

        if collection == Collection::AppVersion {
            // The marker is kept as a bare version string
            if records.len() > 1 {
                warn!("Refusing {} version records in fallback store", records.len());
                return Err(StoreError::WriteFailed {
                    key: key.to_string(),
                    details: format!("expected one version record, got {}", records.len()),
                    quota_exceeded: false,
                });
            }
            return match records.first() {
                Some(record) => {
                    let marker: AppVersionRecord = serde_json::from_value(record.clone())
                        .map_err(|e| StoreError::EncodingError {
                            key: key.to_string(),
                            source: e,
                        })?;
                    self.blocking(key, move |store| store.put_string(key, &marker.value))
                        .await
                }
                None => self.blocking(key, move |store| store.remove(key)).await,
            };
        }

        let records = records.to_vec();
        self.blocking(key, move |store| store.put(key, &records))
            .await
    }

    async fn read(&self, collection: Collection) -> StoreResult<Option<Vec<Value>>> {
        let key = collection.name();

        if collection == Collection::AppVersion {
            let version = self.read_version().await?;
            return Ok(version.map(|v| {
                vec![serde_json::to_value(AppVersionRecord::new(v)).unwrap_or(Value::Null)]
            }));
        }

        self.blocking(key, move |store| store.get_opt(key)).await
    }

    async fn remove(&self, collection: Collection) -> StoreResult<()> {
        let key = collection.name();
        self.blocking(key, move |store| FallbackStore::remove(&store, key))
            .await
    }

    async fn init_version(&self, version: &str) -> StoreResult<VersionInit> {
        let key = Collection::AppVersion.name();
        let version = version.to_string();

        self.blocking(key, move |store| match store.get_string(key)? {
            Some(existing) => Ok(VersionInit::AlreadyPresent(existing)),
            None => {
                store.put_string(key, &version)?;
                Ok(VersionInit::Created)
            }
        })
        .await
    }

    async fn read_version(&self) -> StoreResult<Option<String>> {
        let key = Collection::AppVersion.name();
        self.blocking(key, move |store| store.get_string(key)).await
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;

    fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Contact;
    use serde_json::json;
    use tempfile::TempDir;

    fn store(temp_dir: &TempDir) -> FallbackStore {
        FallbackStore::new(temp_dir.path().join("local-storage"))
    }

    #[test]
    fn test_put_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let records = vec![json!({"id": "1"}), json!({"id": "2"})];
        store.put("pedidos", &records).unwrap();

        let loaded: Vec<Value> = store.get("pedidos", Vec::new()).unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_get_absent_returns_default() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let default = vec![json!({"id": "default"})];
        let loaded: Vec<Value> = store.get("contatos", default.clone()).unwrap();
        assert_eq!(loaded, default);
    }

    #[test]
    fn test_put_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        store.put("pedidos", &[json!({"id": "old"})]).unwrap();
        store.put("pedidos", &[json!({"id": "new"})]).unwrap();

        let loaded: Vec<Value> = store.get("pedidos", Vec::new()).unwrap();
        assert_eq!(loaded, vec![json!({"id": "new"})]);
        assert!(!store.dir().join("pedidos.tmp").exists());
    }

    #[test]
    fn test_corrupt_value_is_decoding_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        store.put_string("transacoes", "[{broken").unwrap();

        let err = store.get::<Vec<Value>>("transacoes", Vec::new()).unwrap_err();
        assert!(matches!(err, StoreError::DecodingError { .. }));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        store.put("contatos", &[json!({"id": "1"})]).unwrap();
        assert!(store.contains("contatos"));

        store.remove("contatos").unwrap();
        assert!(!store.contains("contatos"));
        store.remove("contatos").unwrap();
    }

    #[test]
    fn test_load_blocking() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let contact = Contact::new("Ana");
        store.put("contatos", &[&contact]).unwrap();
        assert_eq!(store.load_blocking::<Contact>(), vec![contact]);

        store.put_string("contatos", "garbage").unwrap();
        assert!(store.load_blocking::<Contact>().is_empty());
    }

    #[tokio::test]
    async fn test_tier_read_absent_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        assert_eq!(store.read(Collection::Orders).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_version_kept_as_plain_string() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        assert_eq!(store.init_version("1.0.0").await.unwrap(), VersionInit::Created);
        assert_eq!(
            store.init_version("1.0.0").await.unwrap(),
            VersionInit::AlreadyPresent("1.0.0".to_string())
        );
        assert_eq!(
            store.get_string("app_version").unwrap(),
            Some("1.0.0".to_string())
        );

        let records = store.read(Collection::AppVersion).await.unwrap().unwrap();
        assert_eq!(records, vec![json!({"id": "version", "value": "1.0.0"})]);
    }

    #[tokio::test]
    async fn test_version_written_as_collection() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        store
            .write(
                Collection::AppVersion,
                &[json!({"id": "version", "value": "1.2.0"})],
            )
            .await
            .unwrap();
        assert_eq!(store.read_version().await.unwrap(), Some("1.2.0".to_string()));
    }

    #[tokio::test]
    async fn test_multiple_version_records_are_refused() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let result = store
            .write(
                Collection::AppVersion,
                &[
                    json!({"id": "version", "value": "1.2.0"}),
                    json!({"id": "other", "value": "9.9.9"}),
                ],
            )
            .await;

        assert!(matches!(result, Err(StoreError::WriteFailed { .. })));
        assert_eq!(store.read_version().await.unwrap(), None);
    }
}
