//! Schema definition for both storage tiers
//!
//! Every collection is a table keyed by the record's `id` field. The record
//! body is kept as the same JSON text the fallback tier stores, so the two
//! tiers stay interchangeable.

use std::fmt;
use std::str::FromStr;

use rusqlite::{Connection, Result};
use serde::{Deserialize, Serialize};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Name of the primary database
pub const DB_NAME: &str = "pedidos-app-db";

/// App version written into the version marker
pub const CURRENT_APP_VERSION: &str = "1.0.0";

/// Field used as primary key in every collection
pub const PRIMARY_KEY: &str = "id";

/// Id of the single record in the `app_version` collection
pub const VERSION_RECORD_ID: &str = "version";

/// A named collection of records of one kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Orders,
    Transactions,
    Contacts,
    AppVersion,
}

impl Collection {
    /// Every declared collection, in schema order
    pub const ALL: [Collection; 4] = [
        Collection::Orders,
        Collection::Transactions,
        Collection::Contacts,
        Collection::AppVersion,
    ];

    /// Storage name: table name in the primary tier, key in the fallback tier
    pub fn name(self) -> &'static str {
        match self {
            Collection::Orders => "pedidos",
            Collection::Transactions => "transacoes",
            Collection::Contacts => "contatos",
            Collection::AppVersion => "app_version",
        }
    }

    /// Position in [`Collection::ALL`]
    pub fn index(self) -> usize {
        match self {
            Collection::Orders => 0,
            Collection::Transactions => 1,
            Collection::Contacts => 2,
            Collection::AppVersion => 3,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = String;

    /// Accepts the storage name or the English kind name
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pedidos" | "orders" => Ok(Collection::Orders),
            "transacoes" | "transactions" => Ok(Collection::Transactions),
            "contatos" | "contacts" => Ok(Collection::Contacts),
            "app_version" | "version" => Ok(Collection::AppVersion),
            other => Err(format!("Unknown collection: {}", other)),
        }
    }
}

/// Initialize the database schema
///
/// Creates every missing collection table. Safe to run on every open.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;

    for collection in Collection::ALL {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                {} TEXT PRIMARY KEY NOT NULL,
                data TEXT NOT NULL
            );",
            collection.name(),
            PRIMARY_KEY
        ))?;
    }

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables = table_names(&conn);
        for collection in Collection::ALL {
            assert!(tables.contains(&collection.name().to_string()));
        }
    }

    #[test]
    fn test_schema_version() {
        let conn = Connection::open_in_memory().unwrap();

        assert!(needs_init(&conn));

        init_schema(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
        assert!(!needs_init(&conn));
    }

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO pedidos (id, data) VALUES ('1', '{\"id\":\"1\"}')",
            [],
        )
        .unwrap();

        // Re-running must keep existing rows
        init_schema(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM pedidos", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_older_version_needs_init() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "UPDATE schema_info SET value = '0' WHERE key = 'version'",
            [],
        )
        .unwrap();

        assert!(needs_init(&conn));
    }

    #[test]
    fn test_collection_names() {
        assert_eq!(Collection::Orders.name(), "pedidos");
        assert_eq!(Collection::AppVersion.to_string(), "app_version");
        assert_eq!("orders".parse::<Collection>(), Ok(Collection::Orders));
        assert_eq!("CONTATOS".parse::<Collection>(), Ok(Collection::Contacts));
        assert!("widgets".parse::<Collection>().is_err());

        for (i, collection) in Collection::ALL.iter().enumerate() {
            assert_eq!(collection.index(), i);
        }
    }
}
