//! Storage layer
//!
//! Two interchangeable tiers holding whole collections of JSON records.
//!
//! ## Architecture
//!
//! - **Primary**: SQLite database, one table per collection, schema-versioned
//! - **Fallback**: one file per key holding the JSON-encoded collection
//!
//! Both implement [`Tier`]; `Persistence` decides which one answers a call.

pub mod error;
pub mod fallback;
pub mod primary;
pub mod schema;
pub mod tier;

pub use error::{StoreError, StoreResult};
pub use fallback::FallbackStore;
pub use primary::PrimaryStore;
pub use schema::{Collection, CURRENT_APP_VERSION, DB_NAME, SCHEMA_VERSION};
pub use tier::{record_key, Tier, VersionInit};
