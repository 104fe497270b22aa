//! Storage error handling
//!
//! Typed errors for both storage tiers. Every variant is recoverable at the
//! `Persistence` boundary: primary errors trigger a fallback attempt, and
//! fallback errors are logged and turned into a default value.

use std::io;

use thiserror::Error;

/// Errors that can occur in either storage tier
#[derive(Error, Debug)]
pub enum StoreError {
    /// The structured store could not be opened at all
    #[error("Primary store unavailable: {details}")]
    StoreUnavailable { details: String },

    /// Creating or upgrading the schema failed
    #[error("Schema upgrade failed: {details}: {source}")]
    SchemaError {
        details: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Writing a collection failed
    #[error("Failed to write '{key}': {details}")]
    WriteFailed {
        key: String,
        details: String,
        /// Set when the underlying storage reported it is out of space
        quota_exceeded: bool,
    },

    /// Reading a collection failed
    #[error("Failed to read '{key}': {details}")]
    ReadFailed { key: String, details: String },

    /// Records could not be serialized for the fallback tier
    #[error("Failed to encode '{key}': {source}")]
    EncodingError {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A stored value exists but cannot be decoded
    #[error("Stored value for '{key}' is corrupt: {source}")]
    DecodingError {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Build a `WriteFailed` from a SQLite error
    pub fn write_sql(key: &str, error: rusqlite::Error) -> Self {
        StoreError::WriteFailed {
            key: key.to_string(),
            details: error.to_string(),
            quota_exceeded: matches!(
                error.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DiskFull)
            ),
        }
    }

    /// Build a `ReadFailed` from a SQLite error
    pub fn read_sql(key: &str, error: rusqlite::Error) -> Self {
        StoreError::ReadFailed {
            key: key.to_string(),
            details: error.to_string(),
        }
    }

    /// Build a `WriteFailed` from an I/O error, flagging full disks
    pub fn write_io(key: &str, error: io::Error) -> Self {
        StoreError::WriteFailed {
            key: key.to_string(),
            quota_exceeded: is_disk_full_error(&error),
            details: error.to_string(),
        }
    }

    /// Build a `ReadFailed` from an I/O error
    pub fn read_io(key: &str, error: io::Error) -> Self {
        StoreError::ReadFailed {
            key: key.to_string(),
            details: error.to_string(),
        }
    }

    /// Whether the write failed because storage is full
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(
            self,
            StoreError::WriteFailed {
                quota_exceeded: true,
                ..
            }
        )
    }
}

/// Check if an I/O error indicates disk full condition
fn is_disk_full_error(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left")
        || msg.contains("disk full")
        || msg.contains("quota exceeded")
        || msg.contains("not enough space")
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_full_detection() {
        let io_err = io::Error::new(io::ErrorKind::Other, "No space left on device");
        let err = StoreError::write_io("pedidos", io_err);

        assert!(matches!(err, StoreError::WriteFailed { .. }));
        assert!(err.is_quota_exceeded());
    }

    #[test]
    fn test_plain_write_error_is_not_quota() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err = StoreError::write_io("contatos", io_err);

        assert!(!err.is_quota_exceeded());
        assert!(err.to_string().contains("contatos"));
    }

    #[test]
    fn test_read_error_display() {
        let io_err = io::Error::new(io::ErrorKind::Other, "bad sector");
        let err = StoreError::read_io("transacoes", io_err);

        let msg = err.to_string();
        assert!(msg.contains("Failed to read"));
        assert!(msg.contains("transacoes"));
        assert!(!err.is_quota_exceeded());
    }

    #[test]
    fn test_decoding_error_display() {
        let source = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = StoreError::DecodingError {
            key: "pedidos".to_string(),
            source,
        };

        assert!(err.to_string().contains("corrupt"));
    }
}
