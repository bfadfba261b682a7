//! In-memory ledger store.
//!
//! Row locks are per-row async mutexes held by the unit until it commits or
//! rolls back. A lock entry is removed once no unit holds or awaits it. Writes are staged in the unit and applied to the committed
//! state in one step at commit, where the same invariants the PostgreSQL
//! schema enforces with CHECK constraints are checked again.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use stockledger_shared::config::LedgerConfig;
use stockledger_shared::types::{BatchId, CarrierId, LotId, OwnerId, ProductVariantId};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::{CarrierFilter, LedgerSnapshot, LedgerStore, LedgerTx};
use crate::ledger::{
    Batch, Carrier, CarrierKind, LedgerError, LedgerTransaction, Lot, Subject,
};

/// Lockable row identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    Lot(LotId),
    LotKey(ProductVariantId, BatchId),
    Carrier(CarrierId),
    BatchName(String),
}

/// Committed state.
#[derive(Debug, Clone, Default)]
struct LedgerState {
    batches: HashMap<BatchId, Batch>,
    batch_names: HashMap<String, BatchId>,
    lots: HashMap<LotId, Lot>,
    lot_keys: HashMap<(ProductVariantId, BatchId), LotId>,
    carriers: HashMap<CarrierId, Carrier>,
    /// Commit order of carriers; breaks ties between equal `created_at`.
    carrier_seq: HashMap<CarrierId, u64>,
    next_seq: u64,
    transactions: Vec<LedgerTransaction>,
}

impl LedgerState {
    fn carriers_sorted(&self, filter: CarrierFilter) -> Vec<Carrier> {
        let mut carriers: Vec<&Carrier> =
            self.carriers.values().filter(|c| filter.matches(c)).collect();
        carriers.sort_by_key(|c| (c.created_at, self.carrier_seq.get(&c.id).copied()));
        carriers.into_iter().cloned().collect()
    }
}

#[derive(Debug)]
struct Shared {
    state: RwLock<LedgerState>,
    locks: DashMap<RowKey, Arc<Mutex<()>>>,
    lock_timeout: Duration,
}

/// Ledger store keeping everything in process memory.
///
/// Cloning the store yields another handle to the same data.
#[derive(Debug, Clone)]
pub struct InMemoryLedgerStore {
    shared: Arc<Shared>,
}

impl InMemoryLedgerStore {
    /// Creates an empty store with the default lock timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(&LedgerConfig::default())
    }

    /// Creates an empty store using the configured lock timeout.
    #[must_use]
    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::with_lock_timeout(Duration::from_millis(config.lock_timeout_ms))
    }

    /// Creates an empty store with an explicit lock timeout.
    #[must_use]
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(LedgerState::default()),
                locks: DashMap::new(),
                lock_timeout,
            }),
        }
    }
}

#[cfg(test)]
impl InMemoryLedgerStore {
    fn lock_entries(&self) -> usize {
        self.shared.locks.len()
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Tx = InMemoryTx;
    type Snapshot = InMemorySnapshot;

    async fn begin(&self) -> Result<Self::Tx, LedgerError> {
        Ok(InMemoryTx {
            shared: Arc::clone(&self.shared),
            held: HashMap::new(),
            batches: Vec::new(),
            lots: HashMap::new(),
            new_lots: HashSet::new(),
            carriers: HashMap::new(),
            new_carriers: Vec::new(),
            transactions: Vec::new(),
        })
    }

    async fn snapshot(&self) -> Result<Self::Snapshot, LedgerError> {
        let state = self.shared.state.read().await.clone();
        Ok(InMemorySnapshot { state })
    }
}

/// Read-write unit of [`InMemoryLedgerStore`].
#[derive(Debug)]
pub struct InMemoryTx {
    shared: Arc<Shared>,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    batches: Vec<Batch>,
    lots: HashMap<LotId, Lot>,
    new_lots: HashSet<LotId>,
    carriers: HashMap<CarrierId, Carrier>,
    new_carriers: Vec<CarrierId>,
    transactions: Vec<LedgerTransaction>,
}

impl InMemoryTx {
    async fn acquire(&mut self, key: RowKey) -> Result<(), LedgerError> {
        if self.held.contains_key(&key) {
            return Ok(());
        }

        let mutex = self
            .shared
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = tokio::time::timeout(self.shared.lock_timeout, mutex.lock_owned())
            .await
            .map_err(|_| {
                LedgerError::ConcurrencyConflict(format!("timed out waiting for lock on {key:?}"))
            })?;

        self.held.insert(key, guard);
        Ok(())
    }

    /// Drops every held guard, then removes lock entries nobody else holds
    /// or waits on.
    fn release(&mut self) {
        for (key, guard) in self.held.drain() {
            drop(guard);
            self.shared
                .locks
                .remove_if(&key, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }

    async fn read_lot(&self, id: LotId) -> Option<Lot> {
        if let Some(lot) = self.lots.get(&id) {
            return Some(lot.clone());
        }
        self.shared.state.read().await.lots.get(&id).cloned()
    }

    async fn read_carrier(&self, id: CarrierId) -> Option<Carrier> {
        if let Some(carrier) = self.carriers.get(&id) {
            return Some(carrier.clone());
        }
        self.shared.state.read().await.carriers.get(&id).cloned()
    }

    fn check_invariants(&self) -> Result<(), LedgerError> {
        for lot in self.lots.values() {
            if lot.quantity_on_hand < Decimal::ZERO {
                return Err(LedgerError::Storage(format!(
                    "lot {} would commit negative quantity {}",
                    lot.id, lot.quantity_on_hand
                )));
            }
        }
        for carrier in self.carriers.values() {
            if carrier.settled.is_negative() || carrier.settled > carrier.limit() {
                return Err(LedgerError::Storage(format!(
                    "carrier {} would commit settled {} outside 0..={}",
                    carrier.id,
                    carrier.settled,
                    carrier.limit()
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for InMemoryTx {
    async fn get_or_create_batch(&mut self, name: &str) -> Result<Batch, LedgerError> {
        self.acquire(RowKey::BatchName(name.to_string())).await?;

        if let Some(batch) = self.batches.iter().find(|b| b.name == name) {
            return Ok(batch.clone());
        }
        {
            let state = self.shared.state.read().await;
            if let Some(batch) = state.batch_names.get(name).and_then(|id| state.batches.get(id)) {
                return Ok(batch.clone());
            }
        }

        let batch = Batch {
            id: BatchId::new(),
            name: name.to_string(),
            created_at: chrono::Utc::now(),
        };
        self.batches.push(batch.clone());
        Ok(batch)
    }

    async fn lock_lot(&mut self, id: LotId) -> Result<Option<Lot>, LedgerError> {
        self.acquire(RowKey::Lot(id)).await?;
        Ok(self.read_lot(id).await)
    }

    async fn lock_lot_by_key(
        &mut self,
        product_variant_id: ProductVariantId,
        batch_id: BatchId,
    ) -> Result<Option<Lot>, LedgerError> {
        self.acquire(RowKey::LotKey(product_variant_id, batch_id)).await?;

        let staged = self
            .lots
            .values()
            .find(|l| l.product_variant_id == product_variant_id && l.batch_id == batch_id)
            .map(|l| l.id);
        let existing = match staged {
            Some(id) => Some(id),
            None => self
                .shared
                .state
                .read()
                .await
                .lot_keys
                .get(&(product_variant_id, batch_id))
                .copied(),
        };

        match existing {
            Some(id) => self.lock_lot(id).await,
            None => Ok(None),
        }
    }

    async fn insert_lot(&mut self, lot: &Lot) -> Result<(), LedgerError> {
        self.acquire(RowKey::Lot(lot.id)).await?;
        self.new_lots.insert(lot.id);
        self.lots.insert(lot.id, lot.clone());
        Ok(())
    }

    async fn update_lot(&mut self, lot: &Lot) -> Result<(), LedgerError> {
        if !self.held.contains_key(&RowKey::Lot(lot.id)) {
            return Err(LedgerError::Storage(format!(
                "lot {} written without holding its lock",
                lot.id
            )));
        }
        self.lots.insert(lot.id, lot.clone());
        Ok(())
    }

    async fn insert_carrier(&mut self, carrier: &Carrier) -> Result<(), LedgerError> {
        self.acquire(RowKey::Carrier(carrier.id)).await?;
        self.new_carriers.push(carrier.id);
        self.carriers.insert(carrier.id, carrier.clone());
        Ok(())
    }

    async fn lock_carrier(&mut self, id: CarrierId) -> Result<Option<Carrier>, LedgerError> {
        self.acquire(RowKey::Carrier(id)).await?;
        Ok(self.read_carrier(id).await)
    }

    async fn lock_open_carriers(
        &mut self,
        owner_id: OwnerId,
        kind: CarrierKind,
    ) -> Result<Vec<Carrier>, LedgerError> {
        let filter = CarrierFilter {
            owner_id: Some(owner_id),
            kind: Some(kind),
            status: None,
        };
        let mut ids: Vec<CarrierId> = self
            .shared
            .state
            .read()
            .await
            .carriers_sorted(filter)
            .into_iter()
            .filter(Carrier::is_open)
            .map(|c| c.id)
            .collect();
        ids.extend(
            self.new_carriers
                .iter()
                .filter(|id| self.carriers.get(id).is_some_and(|c| filter.matches(c)))
                .copied(),
        );

        let mut locked = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(carrier) = self.lock_carrier(id).await? {
                // Status may have changed while waiting for the lock.
                if carrier.is_open() {
                    locked.push(carrier);
                }
            }
        }
        Ok(locked)
    }

    async fn has_carriers(
        &mut self,
        owner_id: OwnerId,
        kind: CarrierKind,
    ) -> Result<bool, LedgerError> {
        let filter = CarrierFilter {
            owner_id: Some(owner_id),
            kind: Some(kind),
            status: None,
        };
        if self.carriers.values().any(|c| filter.matches(c)) {
            return Ok(true);
        }
        let state = self.shared.state.read().await;
        Ok(state.carriers.values().any(|c| filter.matches(c)))
    }

    async fn update_carrier(&mut self, carrier: &Carrier) -> Result<(), LedgerError> {
        if !self.held.contains_key(&RowKey::Carrier(carrier.id)) {
            return Err(LedgerError::Storage(format!(
                "carrier {} written without holding its lock",
                carrier.id
            )));
        }
        self.carriers.insert(carrier.id, carrier.clone());
        Ok(())
    }

    async fn append_transaction(&mut self, txn: &LedgerTransaction) -> Result<(), LedgerError> {
        self.transactions.push(txn.clone());
        Ok(())
    }

    async fn commit(self) -> Result<(), LedgerError> {
        self.check_invariants()?;

        let mut state = self.shared.state.write().await;

        for batch in &self.batches {
            state.batch_names.insert(batch.name.clone(), batch.id);
            state.batches.insert(batch.id, batch.clone());
        }
        for lot in self.lots.values() {
            state
                .lot_keys
                .insert((lot.product_variant_id, lot.batch_id), lot.id);
            state.lots.insert(lot.id, lot.clone());
        }
        for id in &self.new_carriers {
            let seq = state.next_seq;
            state.next_seq += 1;
            state.carrier_seq.insert(*id, seq);
        }
        for carrier in self.carriers.values() {
            state.carriers.insert(carrier.id, carrier.clone());
        }
        state.transactions.extend(self.transactions.iter().cloned());

        tracing::debug!(
            lots = self.lots.len(),
            carriers = self.carriers.len(),
            transactions = self.transactions.len(),
            "Committed in-memory ledger unit"
        );

        drop(state);
        Ok(())
    }

    async fn rollback(self) -> Result<(), LedgerError> {
        tracing::debug!(
            discarded = self.transactions.len(),
            "Rolled back in-memory ledger unit"
        );
        Ok(())
    }
}

impl Drop for InMemoryTx {
    fn drop(&mut self) {
        self.release();
    }
}

/// Read-only snapshot of [`InMemoryLedgerStore`].
#[derive(Debug)]
pub struct InMemorySnapshot {
    state: LedgerState,
}

#[async_trait]
impl LedgerSnapshot for InMemorySnapshot {
    async fn lots(&self) -> Result<Vec<Lot>, LedgerError> {
        let mut lots: Vec<Lot> = self.state.lots.values().cloned().collect();
        lots.sort_by_key(|l| (l.created_at, l.id));
        Ok(lots)
    }

    async fn lots_below(&self, threshold: Decimal) -> Result<Vec<Lot>, LedgerError> {
        let mut lots: Vec<Lot> = self
            .state
            .lots
            .values()
            .filter(|l| l.quantity_on_hand < threshold)
            .cloned()
            .collect();
        lots.sort_by_key(|l| (l.quantity_on_hand, l.id));
        Ok(lots)
    }

    async fn lot(&self, id: LotId) -> Result<Option<Lot>, LedgerError> {
        Ok(self.state.lots.get(&id).cloned())
    }

    async fn carrier(&self, id: CarrierId) -> Result<Option<Carrier>, LedgerError> {
        Ok(self.state.carriers.get(&id).cloned())
    }

    async fn carriers(&self, filter: CarrierFilter) -> Result<Vec<Carrier>, LedgerError> {
        Ok(self.state.carriers_sorted(filter))
    }

    async fn transactions(&self, subject: Subject) -> Result<Vec<LedgerTransaction>, LedgerError> {
        Ok(self
            .state
            .transactions
            .iter()
            .filter(|t| t.subject == subject)
            .cloned()
            .collect())
    }

    async fn finish(self) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{CarrierStatus, ReasonCode, UnitCosts};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use stockledger_shared::types::{ActorId, Money};

    fn lot(quantity: Decimal) -> Lot {
        let now = Utc::now();
        Lot {
            id: LotId::new(),
            product_variant_id: ProductVariantId::new(),
            batch_id: BatchId::new(),
            quantity_on_hand: quantity,
            costs: UnitCosts::default(),
            manufactured_on: None,
            expires_on: None,
            supplier_id: None,
            grn_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn carrier(owner_id: OwnerId, opening: Decimal) -> Carrier {
        let now = Utc::now();
        Carrier {
            id: CarrierId::new(),
            kind: CarrierKind::CustomerCredit,
            owner_id,
            reference: "INV".to_string(),
            opening: Money::new(opening),
            accrued: Money::ZERO,
            settled: Money::ZERO,
            status: CarrierStatus::Open,
            created_at: now,
            updated_at: now,
        }
    }

    async fn seed_lot(store: &InMemoryLedgerStore, quantity: Decimal) -> Lot {
        let lot = lot(quantity);
        let mut tx = store.begin().await.unwrap();
        tx.insert_lot(&lot).await.unwrap();
        tx.commit().await.unwrap();
        lot
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = InMemoryLedgerStore::new();
        let lot = lot(dec!(5));

        let mut tx = store.begin().await.unwrap();
        tx.insert_lot(&lot).await.unwrap();

        let snapshot = store.snapshot().await.unwrap();
        assert!(snapshot.lot(lot.id).await.unwrap().is_none());

        tx.commit().await.unwrap();
        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(snapshot.lot(lot.id).await.unwrap().unwrap().quantity_on_hand, dec!(5));
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard_writes() {
        let store = InMemoryLedgerStore::new();
        let seeded = seed_lot(&store, dec!(5)).await;

        let mut tx = store.begin().await.unwrap();
        let mut locked = tx.lock_lot(seeded.id).await.unwrap().unwrap();
        locked.quantity_on_hand = dec!(1);
        tx.update_lot(&locked).await.unwrap();
        tx.rollback().await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            let mut locked = tx.lock_lot(seeded.id).await.unwrap().unwrap();
            locked.quantity_on_hand = dec!(2);
            tx.update_lot(&locked).await.unwrap();
        }

        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(snapshot.lot(seeded.id).await.unwrap().unwrap().quantity_on_hand, dec!(5));
    }

    #[tokio::test]
    async fn test_lock_table_is_pruned_on_release() {
        let store = InMemoryLedgerStore::with_lock_timeout(Duration::from_millis(20));
        let seeded = seed_lot(&store, dec!(5)).await;
        assert_eq!(store.lock_entries(), 0);

        let mut tx = store.begin().await.unwrap();
        tx.lock_lot(seeded.id).await.unwrap();
        assert_eq!(store.lock_entries(), 1);
        tx.rollback().await.unwrap();
        assert_eq!(store.lock_entries(), 0);

        {
            let mut tx = store.begin().await.unwrap();
            tx.lock_lot(seeded.id).await.unwrap();
        }
        assert_eq!(store.lock_entries(), 0);

        let mut holder = store.begin().await.unwrap();
        holder.lock_lot(seeded.id).await.unwrap();
        let mut waiter = store.begin().await.unwrap();
        let timed_out = waiter.lock_lot(seeded.id).await;
        assert!(matches!(timed_out, Err(LedgerError::ConcurrencyConflict(_))));
        drop(waiter);
        assert_eq!(store.lock_entries(), 1, "the holder keeps its entry");
        holder.commit().await.unwrap();
        assert_eq!(store.lock_entries(), 0);
    }

    #[tokio::test]
    async fn test_has_carriers_sees_any_status() {
        let store = InMemoryLedgerStore::new();
        let owner = OwnerId::new();
        let mut settled = carrier(owner, dec!(10));
        settled.settled = Money::new(dec!(10));
        settled.status = CarrierStatus::Settled;

        let mut tx = store.begin().await.unwrap();
        assert!(!tx.has_carriers(owner, CarrierKind::CustomerCredit).await.unwrap());
        tx.insert_carrier(&settled).await.unwrap();
        assert!(tx.has_carriers(owner, CarrierKind::CustomerCredit).await.unwrap());
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.has_carriers(owner, CarrierKind::CustomerCredit).await.unwrap());
        assert!(!tx.has_carriers(owner, CarrierKind::Grn).await.unwrap());
        let open = tx
            .lock_open_carriers(owner, CarrierKind::CustomerCredit)
            .await
            .unwrap();
        assert!(open.is_empty());
    }

    #[tokio::test]
    async fn test_held_lock_times_out_second_unit() {
        let store = InMemoryLedgerStore::with_lock_timeout(Duration::from_millis(20));
        let seeded = seed_lot(&store, dec!(5)).await;

        let mut first = store.begin().await.unwrap();
        first.lock_lot(seeded.id).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let result = second.lock_lot(seeded.id).await;
        assert!(matches!(result, Err(LedgerError::ConcurrencyConflict(_))));

        first.commit().await.unwrap();
        assert!(second.lock_lot(seeded.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unrelated_rows_do_not_block() {
        let store = InMemoryLedgerStore::with_lock_timeout(Duration::from_millis(20));
        let a = seed_lot(&store, dec!(5)).await;
        let b = seed_lot(&store, dec!(7)).await;

        let mut first = store.begin().await.unwrap();
        first.lock_lot(a.id).await.unwrap();
        let mut second = store.begin().await.unwrap();
        assert!(second.lock_lot(b.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_without_lock_is_rejected() {
        let store = InMemoryLedgerStore::new();
        let seeded = seed_lot(&store, dec!(5)).await;

        let mut tx = store.begin().await.unwrap();
        let result = tx.update_lot(&seeded).await;
        assert!(matches!(result, Err(LedgerError::Storage(_))));
    }

    #[tokio::test]
    async fn test_commit_rejects_negative_quantity() {
        let store = InMemoryLedgerStore::new();
        let seeded = seed_lot(&store, dec!(5)).await;

        let mut tx = store.begin().await.unwrap();
        let mut locked = tx.lock_lot(seeded.id).await.unwrap().unwrap();
        locked.quantity_on_hand = dec!(-1);
        tx.update_lot(&locked).await.unwrap();
        assert!(matches!(tx.commit().await, Err(LedgerError::Storage(_))));

        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(snapshot.lot(seeded.id).await.unwrap().unwrap().quantity_on_hand, dec!(5));
    }

    #[tokio::test]
    async fn test_batch_is_created_once() {
        let store = InMemoryLedgerStore::new();

        let mut tx = store.begin().await.unwrap();
        let first = tx.get_or_create_batch("B-2026-10").await.unwrap();
        let again = tx.get_or_create_batch("B-2026-10").await.unwrap();
        assert_eq!(first.id, again.id);
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let reused = tx.get_or_create_batch("B-2026-10").await.unwrap();
        assert_eq!(reused.id, first.id);
    }

    #[tokio::test]
    async fn test_lock_by_key_finds_committed_lot() {
        let store = InMemoryLedgerStore::new();
        let seeded = seed_lot(&store, dec!(3)).await;

        let mut tx = store.begin().await.unwrap();
        let found = tx
            .lock_lot_by_key(seeded.product_variant_id, seeded.batch_id)
            .await
            .unwrap();
        assert_eq!(found.map(|l| l.id), Some(seeded.id));
        let missing = tx
            .lock_lot_by_key(ProductVariantId::new(), seeded.batch_id)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_open_carriers_in_creation_order() {
        let store = InMemoryLedgerStore::new();
        let owner = OwnerId::new();
        let older = carrier(owner, dec!(300));
        let newer = carrier(owner, dec!(200));
        let mut settled = carrier(owner, dec!(50));
        settled.status = CarrierStatus::Settled;
        settled.settled = Money::new(dec!(50));

        let mut tx = store.begin().await.unwrap();
        tx.insert_carrier(&older).await.unwrap();
        tx.insert_carrier(&newer).await.unwrap();
        tx.insert_carrier(&settled).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let open = tx
            .lock_open_carriers(owner, CarrierKind::CustomerCredit)
            .await
            .unwrap();
        let ids: Vec<CarrierId> = open.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![older.id, newer.id]);
    }

    #[tokio::test]
    async fn test_snapshot_lists_transactions_per_subject() {
        let store = InMemoryLedgerStore::new();
        let seeded = seed_lot(&store, dec!(0)).await;
        let other = LotId::new();

        let mut tx = store.begin().await.unwrap();
        for (subject, delta) in [(seeded.id, dec!(4)), (other, dec!(9)), (seeded.id, dec!(-1))] {
            let txn = LedgerTransaction::record(
                Subject::Lot(subject),
                delta,
                ReasonCode::Intake,
                None,
                ActorId::new(),
            );
            tx.append_transaction(&txn).await.unwrap();
        }
        tx.commit().await.unwrap();

        let snapshot = store.snapshot().await.unwrap();
        let deltas: Vec<Decimal> = snapshot
            .transactions(Subject::Lot(seeded.id))
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.delta)
            .collect();
        assert_eq!(deltas, vec![dec!(4), dec!(-1)]);
    }
}
