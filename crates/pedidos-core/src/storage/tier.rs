//! Storage tier abstraction
//!
//! A tier stores whole collections as sequences of JSON records. The
//! SQLite store and the file-backed key-value store both implement [`Tier`],
//! and `Persistence` composes one of each.

use std::future::Future;

use serde_json::Value;

use super::error::StoreResult;
use super::schema::{Collection, PRIMARY_KEY};

/// Result of ensuring the version marker exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionInit {
    /// No marker existed; one was written
    Created,
    /// A marker was already present with this version
    AlreadyPresent(String),
    /// Neither tier could check or write the marker
    Failed,
}

/// One storage tier
pub trait Tier: Send + Sync {
    /// Short name used in logs and reports
    fn name(&self) -> &'static str;

    /// Replace the full contents of a collection
    fn write(
        &self,
        collection: Collection,
        records: &[Value],
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Read the full contents of a collection
    ///
    /// `Ok(None)` means the tier holds nothing for this collection.
    fn read(
        &self,
        collection: Collection,
    ) -> impl Future<Output = StoreResult<Option<Vec<Value>>>> + Send;

    /// Drop everything stored for a collection
    fn remove(&self, collection: Collection) -> impl Future<Output = StoreResult<()>> + Send;

    /// Write the version marker unless one already exists
    fn init_version(&self, version: &str) -> impl Future<Output = StoreResult<VersionInit>> + Send;

    /// Read the stored version marker, if any
    fn read_version(&self) -> impl Future<Output = StoreResult<Option<String>>> + Send;
}

/// Extract a record's primary key
///
/// Strings must be non-empty; numbers are keyed by their decimal form.
/// Anything else (missing, null, objects) has no usable key.
pub fn record_key(record: &Value) -> Option<String> {
    match record.get(PRIMARY_KEY)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_key() {
        assert_eq!(record_key(&json!({"id": "abc"})), Some("abc".to_string()));
        assert_eq!(record_key(&json!({"id": 42})), Some("42".to_string()));
        assert_eq!(record_key(&json!({"id": ""})), None);
        assert_eq!(record_key(&json!({"id": null})), None);
        assert_eq!(record_key(&json!({"name": "no id"})), None);
        assert_eq!(record_key(&json!(["not", "an", "object"])), None);
    }
}
