//! Data models for the pedidos app
//!
//! Each record kind lives in exactly one [`Collection`] and carries a
//! string `id` used as its primary key there.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::schema::{Collection, VERSION_RECORD_ID};

/// A record that can be persisted as part of a collection
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The collection this record kind is stored in
    const COLLECTION: Collection;
}

/// Lifecycle of an order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Delivered,
    Cancelled,
}

/// A customer order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// Unique identifier
    pub id: String,
    /// Customer name
    pub customer: String,
    /// What was ordered
    pub description: String,
    /// Order total in cents
    pub total_cents: i64,
    /// Current status
    #[serde(default)]
    pub status: OrderStatus,
    /// When this order was created
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Create a new pending order
    pub fn new(
        customer: impl Into<String>,
        description: impl Into<String>,
        total_cents: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            customer: customer.into(),
            description: description.into(),
            total_cents,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Update the status
    pub fn set_status(&mut self, status: OrderStatus) {
        self.status = status;
    }
}

impl Record for Order {
    const COLLECTION: Collection = Collection::Orders;
}

/// Direction of a financial transaction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Income,
    Expense,
}

/// A financial transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: String,
    pub description: String,
    /// Amount in cents, always positive; `kind` gives the direction
    pub amount_cents: i64,
    pub kind: TransactionKind,
    #[serde(default)]
    pub category: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(description: impl Into<String>, amount_cents: i64, kind: TransactionKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            amount_cents,
            kind,
            category: None,
            occurred_at: Utc::now(),
        }
    }

    /// Signed amount: positive for income, negative for expenses
    ///
    /// Saturates instead of overflowing at the edges of `i64`.
    pub fn signed_amount(&self) -> i64 {
        match self.kind {
            TransactionKind::Income => self.amount_cents,
            TransactionKind::Expense => self.amount_cents.saturating_neg(),
        }
    }
}

impl Record for Transaction {
    const COLLECTION: Collection = Collection::Transactions;
}

/// A contact in the address book
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Contact {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            phone: None,
            email: None,
        }
    }
}

impl Record for Contact {
    const COLLECTION: Collection = Collection::Contacts;
}

/// The single record of the `app_version` collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppVersionRecord {
    /// Always [`VERSION_RECORD_ID`]
    pub id: String,
    /// Installed app version
    pub value: String,
}

impl AppVersionRecord {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            id: VERSION_RECORD_ID.to_string(),
            value: value.into(),
        }
    }
}

impl Record for AppVersionRecord {
    const COLLECTION: Collection = Collection::AppVersion;
}
