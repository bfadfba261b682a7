//! Persistence boundary for the ledger core.
//!
//! A [`LedgerStore`] hands out two kinds of units:
//! - [`LedgerTx`]: one serializable read-write unit. Every `lock_*` call takes
//!   a row-level lock on the specific lot or carrier and holds it until
//!   `commit` or `rollback`. Dropping an uncommitted unit discards its writes.
//! - [`LedgerSnapshot`]: one read-only, lock-free view. Every read through a
//!   snapshot observes the same committed state.
//!
//! Engines receive the store as an explicit `Arc<S>`; there is no global
//! handle and no cache of quantities or balances outside the store.

pub mod memory;

use async_trait::async_trait;
use rust_decimal::Decimal;
use stockledger_shared::types::{BatchId, CarrierId, LotId, OwnerId, ProductVariantId};

use crate::ledger::{
    Batch, Carrier, CarrierKind, CarrierStatus, LedgerError, LedgerTransaction, Lot, Subject,
};

pub use memory::InMemoryLedgerStore;

/// Filter for listing carriers from a snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct CarrierFilter {
    /// Only carriers of this owner.
    pub owner_id: Option<OwnerId>,
    /// Only carriers of this kind.
    pub kind: Option<CarrierKind>,
    /// Only carriers in this status.
    pub status: Option<CarrierStatus>,
}

impl CarrierFilter {
    /// Returns true if the carrier passes the filter.
    #[must_use]
    pub fn matches(&self, carrier: &Carrier) -> bool {
        self.owner_id.is_none_or(|owner| carrier.owner_id == owner)
            && self.kind.is_none_or(|kind| carrier.kind == kind)
            && self.status.is_none_or(|status| carrier.status == status)
    }
}

/// Source of transactional units.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Read-write unit type.
    type Tx: LedgerTx;
    /// Read-only snapshot type.
    type Snapshot: LedgerSnapshot;

    /// Opens a serializable read-write unit.
    async fn begin(&self) -> Result<Self::Tx, LedgerError>;

    /// Opens a consistent read-only snapshot.
    async fn snapshot(&self) -> Result<Self::Snapshot, LedgerError>;
}

/// One atomic read-modify-write unit.
#[async_trait]
pub trait LedgerTx: Send {
    /// Returns the batch with this name, creating it if unseen.
    async fn get_or_create_batch(&mut self, name: &str) -> Result<Batch, LedgerError>;

    /// Locks and reads a lot.
    async fn lock_lot(&mut self, id: LotId) -> Result<Option<Lot>, LedgerError>;

    /// Locks the lot identified by variant and batch, reading it if it exists.
    ///
    /// The key stays locked even when no lot exists yet, so two intakes of
    /// the same unseen key cannot both create it.
    async fn lock_lot_by_key(
        &mut self,
        product_variant_id: ProductVariantId,
        batch_id: BatchId,
    ) -> Result<Option<Lot>, LedgerError>;

    /// Inserts a new lot.
    async fn insert_lot(&mut self, lot: &Lot) -> Result<(), LedgerError>;

    /// Writes a lot previously locked in this unit.
    async fn update_lot(&mut self, lot: &Lot) -> Result<(), LedgerError>;

    /// Inserts a new carrier.
    async fn insert_carrier(&mut self, carrier: &Carrier) -> Result<(), LedgerError>;

    /// Locks and reads a carrier.
    async fn lock_carrier(&mut self, id: CarrierId) -> Result<Option<Carrier>, LedgerError>;

    /// Locks and reads every open carrier of an owner, oldest created first.
    async fn lock_open_carriers(
        &mut self,
        owner_id: OwnerId,
        kind: CarrierKind,
    ) -> Result<Vec<Carrier>, LedgerError>;

    /// Returns true if the owner has any carrier of `kind`, whatever its
    /// status. Takes no lock.
    async fn has_carriers(
        &mut self,
        owner_id: OwnerId,
        kind: CarrierKind,
    ) -> Result<bool, LedgerError>;

    /// Writes a carrier previously locked in this unit.
    async fn update_carrier(&mut self, carrier: &Carrier) -> Result<(), LedgerError>;

    /// Appends an audit transaction.
    async fn append_transaction(&mut self, txn: &LedgerTransaction) -> Result<(), LedgerError>;

    /// Commits all writes and releases every lock.
    async fn commit(self) -> Result<(), LedgerError>;

    /// Discards all writes and releases every lock.
    async fn rollback(self) -> Result<(), LedgerError>;
}

/// Commits `tx` if `result` is `Ok`, rolls it back otherwise.
///
/// A failed rollback is logged; the original error is returned either way.
///
/// # Errors
///
/// Returns the error in `result`, or the commit error.
pub async fn conclude<X: LedgerTx, T>(
    tx: X,
    result: Result<T, LedgerError>,
) -> Result<T, LedgerError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}

/// A consistent read-only view.
#[async_trait]
pub trait LedgerSnapshot: Send + Sync {
    /// Every lot.
    async fn lots(&self) -> Result<Vec<Lot>, LedgerError>;

    /// Lots with `quantity_on_hand < threshold`, ascending by quantity then id.
    async fn lots_below(&self, threshold: Decimal) -> Result<Vec<Lot>, LedgerError>;

    /// One lot.
    async fn lot(&self, id: LotId) -> Result<Option<Lot>, LedgerError>;

    /// One carrier.
    async fn carrier(&self, id: CarrierId) -> Result<Option<Carrier>, LedgerError>;

    /// Carriers passing the filter, oldest created first.
    async fn carriers(&self, filter: CarrierFilter) -> Result<Vec<Carrier>, LedgerError>;

    /// Every transaction of a subject, in recording order.
    async fn transactions(&self, subject: Subject) -> Result<Vec<LedgerTransaction>, LedgerError>;

    /// Ends the snapshot.
    async fn finish(self) -> Result<(), LedgerError>;
}
