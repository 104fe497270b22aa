//! Persistence facade
//!
//! The single entry point the application uses to save and load
//! collections. Every call tries the primary tier first and quietly falls
//! back to the secondary tier when the primary fails. Nothing here returns
//! an error to the caller: a failed save is reported as
//! [`SaveOutcome::Lost`] and logged, a failed load yields the caller's
//! default.
//!
//! ## Usage
//!
//! ```ignore
//! let persistence = Persistence::open(&Config::load()?);
//! persistence.initialize_version_marker().await;
//!
//! persistence.save_orders(&orders).await;
//! let orders = persistence.load_orders().await;
//! ```
//!
//! Calls on the same collection are serialized; calls on different
//! collections run concurrently.

use std::collections::HashSet;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::models::{Contact, Order, Record, Transaction};
use crate::storage::{
    record_key, Collection, FallbackStore, PrimaryStore, StoreError, StoreResult, Tier,
    VersionInit, CURRENT_APP_VERSION,
};

/// Which tier last answered for a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TierState {
    /// No call has completed yet
    #[default]
    Uninitialized,
    /// The primary tier answered the last call
    PrimaryActive,
    /// The primary tier failed on the last call
    FallbackActive,
}

/// Where a save ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Written to the primary tier
    Primary,
    /// Primary failed; written to the fallback tier
    Fallback,
    /// Both tiers failed; the data was not persisted
    Lost,
    /// The records were invalid and no tier was touched
    Rejected,
}

impl SaveOutcome {
    /// Whether the records were persisted in some tier
    pub fn is_persisted(self) -> bool {
        matches!(self, SaveOutcome::Primary | SaveOutcome::Fallback)
    }
}

/// A failed step during [`Persistence::clear_all`]
#[derive(Debug)]
pub struct ClearFailure {
    pub collection: Collection,
    pub tier: &'static str,
    pub error: StoreError,
}

/// Result of [`Persistence::clear_all`]
#[derive(Debug, Default)]
pub struct ClearReport {
    pub failures: Vec<ClearFailure>,
}

impl ClearReport {
    /// Whether every collection was cleared in both tiers
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Two-tier persistence facade
pub struct Persistence<P = PrimaryStore, F = FallbackStore> {
    primary: P,
    fallback: F,
    /// One slot per collection; holding it serializes calls on that collection
    slots: [Mutex<TierState>; 4],
}

impl Persistence {
    /// Build the SQLite and file tiers described by the configuration
    ///
    /// Nothing is opened until the first call.
    pub fn open(config: &Config) -> Self {
        Self::new(
            PrimaryStore::from_config(config),
            FallbackStore::from_config(config),
        )
    }
}

impl<P: Tier, F: Tier> Persistence<P, F> {
    /// Compose a facade from two tiers
    pub fn new(primary: P, fallback: F) -> Self {
        Self {
            primary,
            fallback,
            slots: Default::default(),
        }
    }

    /// The primary tier
    pub fn primary(&self) -> &P {
        &self.primary
    }

    /// The fallback tier
    pub fn fallback(&self) -> &F {
        &self.fallback
    }

    /// Which tier answered the last call for a collection
    pub async fn tier_state(&self, collection: Collection) -> TierState {
        *self.slot(collection).lock().await
    }

    /// Replace a collection with `records`
    pub async fn save<R: Record>(&self, records: &[R]) -> SaveOutcome {
        let collection = R::COLLECTION;
        match encode_records(collection, records) {
            Ok(values) => self.save_values(collection, &values).await,
            Err(e) => {
                error!("Refusing to save {}: {}", collection, e);
                SaveOutcome::Rejected
            }
        }
    }

    /// Replace a collection with already-encoded records
    pub async fn save_values(&self, collection: Collection, records: &[Value]) -> SaveOutcome {
        if let Err(reason) = validate_keys(records) {
            error!("Refusing to save {}: {}", collection, reason);
            return SaveOutcome::Rejected;
        }

        let mut state = self.slot(collection).lock().await;

        match self.primary.write(collection, records).await {
            Ok(()) => {
                *state = TierState::PrimaryActive;
                debug!(
                    "Saved {} records to {} ({})",
                    records.len(),
                    collection,
                    self.primary.name()
                );
                // An outage-era copy must not outlive a newer primary save
                if let Err(e) = self.fallback.remove(collection).await {
                    warn!("Could not drop stale fallback copy of {}: {}", collection, e);
                }
                return SaveOutcome::Primary;
            }
            Err(e) => {
                warn!("Primary save of {} failed, falling back: {}", collection, e);
                *state = TierState::FallbackActive;
            }
        }

        match self.fallback.write(collection, records).await {
            Ok(()) => SaveOutcome::Fallback,
            Err(e) if e.is_quota_exceeded() => {
                error!("Fallback store full, {} not persisted: {}", collection, e);
                SaveOutcome::Lost
            }
            Err(e) => {
                error!("Fallback save of {} failed, data not persisted: {}", collection, e);
                SaveOutcome::Lost
            }
        }
    }

    /// Load a collection, or `default` when nothing usable is stored
    pub async fn load<R: Record>(&self, default: Vec<R>) -> Vec<R> {
        self.load_with(R::COLLECTION, default, decode_records::<R>)
            .await
    }

    /// Load a collection as raw JSON records
    pub async fn load_values(&self, collection: Collection, default: Vec<Value>) -> Vec<Value> {
        self.load_with(collection, default, |_, values| Ok(values))
            .await
    }

    async fn load_with<T, D>(&self, collection: Collection, default: Vec<T>, decode: D) -> Vec<T>
    where
        D: Fn(Collection, Vec<Value>) -> StoreResult<Vec<T>>,
    {
        let mut state = self.slot(collection).lock().await;

        let primary = self
            .primary
            .read(collection)
            .await
            .and_then(|values| decode(collection, values.unwrap_or_default()));

        match primary {
            Ok(records) => {
                *state = TierState::PrimaryActive;
                // Primary is authoritative once reachable, even when empty
                if let Err(e) = self.fallback.remove(collection).await {
                    warn!("Could not drop stale fallback copy of {}: {}", collection, e);
                }
                if records.is_empty() {
                    default
                } else {
                    records
                }
            }
            Err(e) => {
                warn!("Primary load of {} failed, falling back: {}", collection, e);
                *state = TierState::FallbackActive;

                let fallback = self
                    .fallback
                    .read(collection)
                    .await
                    .and_then(|values| values.map(|v| decode(collection, v)).transpose());

                match fallback {
                    Ok(Some(records)) => records,
                    Ok(None) => default,
                    Err(e) => {
                        error!("Fallback load of {} failed, using default: {}", collection, e);
                        default
                    }
                }
            }
        }
    }

    /// Write the app version marker unless one already exists
    pub async fn initialize_version_marker(&self) -> VersionInit {
        let collection = Collection::AppVersion;
        let mut state = self.slot(collection).lock().await;

        match self.primary.init_version(CURRENT_APP_VERSION).await {
            Ok(init) => {
                *state = TierState::PrimaryActive;
                return init;
            }
            Err(e) => {
                warn!("Could not initialize version marker in primary store: {}", e);
                *state = TierState::FallbackActive;
            }
        }

        match self.fallback.init_version(CURRENT_APP_VERSION).await {
            Ok(init) => init,
            Err(e) => {
                error!("Could not initialize version marker: {}", e);
                VersionInit::Failed
            }
        }
    }

    /// Installed app version, if a marker has been written
    pub async fn app_version(&self) -> Option<String> {
        let _state = self.slot(Collection::AppVersion).lock().await;

        match self.primary.read_version().await {
            Ok(version) => version,
            Err(e) => {
                debug!("Reading version from fallback: {}", e);
                self.fallback.read_version().await.unwrap_or_else(|e| {
                    warn!("Could not read version marker: {}", e);
                    None
                })
            }
        }
    }

    /// Clear every collection in both tiers
    ///
    /// A failure on one collection or tier does not stop the sweep.
    pub async fn clear_all(&self) -> ClearReport {
        let mut report = ClearReport::default();

        for collection in Collection::ALL {
            let _state = self.slot(collection).lock().await;

            for (tier, result) in [
                (self.primary.name(), self.primary.remove(collection).await),
                (self.fallback.name(), self.fallback.remove(collection).await),
            ] {
                if let Err(error) = result {
                    warn!("Could not clear {} in {} tier: {}", collection, tier, error);
                    report.failures.push(ClearFailure {
                        collection,
                        tier,
                        error,
                    });
                }
            }
        }

        report
    }

    // ==================== Per-collection shortcuts ====================

    pub async fn save_orders(&self, orders: &[Order]) -> SaveOutcome {
        self.save(orders).await
    }

    pub async fn load_orders(&self) -> Vec<Order> {
        self.load(Vec::new()).await
    }

    pub async fn save_transactions(&self, transactions: &[Transaction]) -> SaveOutcome {
        self.save(transactions).await
    }

    pub async fn load_transactions(&self) -> Vec<Transaction> {
        self.load(Vec::new()).await
    }

    pub async fn save_contacts(&self, contacts: &[Contact]) -> SaveOutcome {
        self.save(contacts).await
    }

    pub async fn load_contacts(&self) -> Vec<Contact> {
        self.load(Vec::new()).await
    }

    fn slot(&self, collection: Collection) -> &Mutex<TierState> {
        &self.slots[collection.index()]
    }
}

/// Every record needs a non-empty key, unique within the collection
fn validate_keys(records: &[Value]) -> Result<(), String> {
    let mut seen = HashSet::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        let key = record_key(record).ok_or_else(|| format!("record {} has no id", i))?;
        if !seen.insert(key.clone()) {
            return Err(format!("duplicate id '{}'", key));
        }
    }
    Ok(())
}

fn encode_records<R: Record>(collection: Collection, records: &[R]) -> StoreResult<Vec<Value>> {
    records
        .iter()
        .map(|record| {
            serde_json::to_value(record).map_err(|e| StoreError::EncodingError {
                key: collection.name().to_string(),
                source: e,
            })
        })
        .collect()
}

fn decode_records<R: Record>(collection: Collection, values: Vec<Value>) -> StoreResult<Vec<R>> {
    values
        .into_iter()
        .map(|value| {
            serde_json::from_value(value).map_err(|e| StoreError::DecodingError {
                key: collection.name().to_string(),
                source: e,
            })
        })
        .collect()
}
