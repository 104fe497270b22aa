//! Pedidos Core Library
//!
//! Client-side persistence for the pedidos app: orders, financial
//! transactions, contacts and an app-version marker, each stored as a
//! whole collection.
//!
//! # Architecture
//!
//! - **Primary tier**: SQLite database with a versioned schema
//! - **Fallback tier**: JSON files keyed by collection name
//!
//! Callers only see [`Persistence`], which tries the primary tier and
//! transparently falls back when it fails.
//!
//! # Quick Start
//!
//! ```text
//! let persistence = Persistence::open(&Config::load()?);
//! persistence.initialize_version_marker().await;
//!
//! persistence.save_orders(&[Order::new("Ana", "Torta", 3800)]).await;
//! let orders = persistence.load_orders().await;
//! ```
//!
//! # Modules
//!
//! - `persistence`: the facade (main entry point)
//! - `models`: record kinds stored in each collection
//! - `storage`: schema, both tiers and the error taxonomy
//! - `config`: application configuration

pub mod config;
pub mod models;
pub mod persistence;
pub mod storage;

pub use config::Config;
pub use models::{
    AppVersionRecord, Contact, Order, OrderStatus, Record, Transaction, TransactionKind,
};
pub use persistence::{ClearReport, Persistence, SaveOutcome, TierState};
pub use storage::{
    Collection, FallbackStore, PrimaryStore, StoreError, StoreResult, Tier, VersionInit,
};
