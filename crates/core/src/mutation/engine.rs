//! The mutation engine.
//!
//! Every public operation runs in exactly one [`LedgerTx`]: lock the row, read
//! it, check the rule, write the row and its audit transaction, commit. The
//! `*_locked` functions are the bodies of those units and are reused by the
//! reconciliation service inside its own multi-carrier unit.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use stockledger_shared::types::{ActorId, CarrierId, LotId, Money};

use super::rules;
use crate::ledger::{
    Carrier, CarrierStatus, ConsumptionLine, IntakeInput, LedgerError, LedgerTransaction, Lot,
    OpenCarrierInput, PaymentMethod, ReasonCode, RemainingBalance, RetryPolicy, StockMovement,
    Subject,
};
use crate::store::{LedgerStore, LedgerTx, conclude};

/// Applies intake, consumption, carrier, accrual and settlement mutations.
pub struct MutationEngine<S: LedgerStore> {
    store: Arc<S>,
    retry: RetryPolicy,
}

impl<S: LedgerStore> Clone for MutationEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            retry: self.retry,
        }
    }
}

impl<S: LedgerStore> MutationEngine<S> {
    /// Creates an engine over `store` with the default retry policy.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The store this engine writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The retry policy in use.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    // ========================================================================
    // Stock
    // ========================================================================

    /// Receives goods into the lot identified by `input.key`.
    ///
    /// Creates the batch and the lot on first use; otherwise adds to the
    /// existing lot and refreshes its prices, dates and provenance.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for malformed input, or a store error.
    pub async fn apply_intake(
        &self,
        input: &IntakeInput,
        actor: ActorId,
    ) -> Result<LotId, LedgerError> {
        rules::check_intake(input)?;

        let lot_id = self
            .retry
            .run(|| async move {
                let mut tx = self.store.begin().await?;
                let result = Self::intake_locked(&mut tx, input, actor).await;
                conclude(tx, result).await
            })
            .await?;

        tracing::info!(
            %lot_id,
            product_variant_id = %input.key.product_variant_id,
            batch = %input.key.batch_name,
            delta = %input.quantity,
            reason = ReasonCode::Intake.as_str(),
            "Stock received"
        );
        Ok(lot_id)
    }

    /// Deducts `quantity` from a lot for a sale or write-off.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a non-positive quantity or a non-consumption
    /// reason, `LotNotFound`, or `InsufficientStock` when the lot holds less
    /// than requested at the time of the locked read.
    pub async fn apply_consumption(
        &self,
        lot_id: LotId,
        quantity: Decimal,
        reason: ReasonCode,
        actor: ActorId,
    ) -> Result<StockMovement, LedgerError> {
        rules::check_consumption_request(quantity, reason)?;

        let result = self
            .retry
            .run(|| async move {
                let mut tx = self.store.begin().await?;
                let result = Self::consume_locked(&mut tx, lot_id, quantity, reason, actor).await;
                conclude(tx, result).await
            })
            .await;

        log_consumption(&result, reason);
        result
    }

    /// Deducts every line of a basket in one unit.
    ///
    /// Lots are locked in id order before any line is applied; either all
    /// lines commit or none do. Movements are returned in line order.
    ///
    /// # Errors
    ///
    /// Returns the first failing line's error; nothing is committed.
    pub async fn apply_consumption_lines(
        &self,
        lines: &[ConsumptionLine],
        reason: ReasonCode,
        actor: ActorId,
    ) -> Result<Vec<StockMovement>, LedgerError> {
        rules::check_consumption_lines(lines, reason)?;

        let result = self
            .retry
            .run(|| async move {
                let mut tx = self.store.begin().await?;
                let result = Self::consume_lines_locked(&mut tx, lines, reason, actor).await;
                conclude(tx, result).await
            })
            .await;

        match &result {
            Ok(movements) => {
                for movement in movements {
                    tracing::info!(
                        lot_id = %movement.lot_id,
                        delta = %movement.delta,
                        quantity_on_hand = %movement.quantity_on_hand,
                        reason = reason.as_str(),
                        "Stock consumed"
                    );
                }
            }
            Err(err) => {
                tracing::warn!(lines = lines.len(), error = %err, "Basket consumption rejected");
            }
        }
        result
    }

    async fn intake_locked(
        tx: &mut S::Tx,
        input: &IntakeInput,
        actor: ActorId,
    ) -> Result<LotId, LedgerError> {
        let batch = tx.get_or_create_batch(&input.key.batch_name).await?;
        let now = Utc::now();

        let lot = match tx
            .lock_lot_by_key(input.key.product_variant_id, batch.id)
            .await?
        {
            Some(mut lot) => {
                lot.quantity_on_hand += input.quantity;
                lot.costs = input.costs;
                lot.manufactured_on = input.manufactured_on.or(lot.manufactured_on);
                lot.expires_on = input.expires_on.or(lot.expires_on);
                lot.supplier_id = input.supplier_id.or(lot.supplier_id);
                lot.grn_id = input.grn_id.or(lot.grn_id);
                lot.updated_at = now;
                tx.update_lot(&lot).await?;
                lot
            }
            None => {
                let lot = Lot {
                    id: LotId::new(),
                    product_variant_id: input.key.product_variant_id,
                    batch_id: batch.id,
                    quantity_on_hand: input.quantity,
                    costs: input.costs,
                    manufactured_on: input.manufactured_on,
                    expires_on: input.expires_on,
                    supplier_id: input.supplier_id,
                    grn_id: input.grn_id,
                    created_at: now,
                    updated_at: now,
                };
                tx.insert_lot(&lot).await?;
                lot
            }
        };

        let txn = LedgerTransaction::record(
            Subject::Lot(lot.id),
            input.quantity,
            ReasonCode::Intake,
            None,
            actor,
        );
        tx.append_transaction(&txn).await?;
        Ok(lot.id)
    }

    async fn consume_locked(
        tx: &mut S::Tx,
        lot_id: LotId,
        quantity: Decimal,
        reason: ReasonCode,
        actor: ActorId,
    ) -> Result<StockMovement, LedgerError> {
        let mut lot = tx
            .lock_lot(lot_id)
            .await?
            .ok_or(LedgerError::LotNotFound(lot_id))?;

        lot.quantity_on_hand = rules::check_stock(&lot, quantity)?;
        lot.updated_at = Utc::now();
        tx.update_lot(&lot).await?;

        let txn = LedgerTransaction::record(Subject::Lot(lot_id), -quantity, reason, None, actor);
        tx.append_transaction(&txn).await?;

        Ok(StockMovement {
            lot_id,
            delta: -quantity,
            quantity_on_hand: lot.quantity_on_hand,
        })
    }

    async fn consume_lines_locked(
        tx: &mut S::Tx,
        lines: &[ConsumptionLine],
        reason: ReasonCode,
        actor: ActorId,
    ) -> Result<Vec<StockMovement>, LedgerError> {
        let ordered: BTreeSet<LotId> = lines.iter().map(|line| line.lot_id).collect();
        for lot_id in ordered {
            tx.lock_lot(lot_id)
                .await?
                .ok_or(LedgerError::LotNotFound(lot_id))?;
        }

        let mut movements = Vec::with_capacity(lines.len());
        for line in lines {
            movements
                .push(Self::consume_locked(tx, line.lot_id, line.quantity, reason, actor).await?);
        }
        Ok(movements)
    }

    // ========================================================================
    // Carriers
    // ========================================================================

    /// Opens a carrier and records its opening value.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an opening the kind does not accept.
    pub async fn open_carrier(
        &self,
        input: &OpenCarrierInput,
        actor: ActorId,
    ) -> Result<CarrierId, LedgerError> {
        rules::check_opening(input)?;

        let carrier_id = self
            .retry
            .run(|| async move {
                let mut tx = self.store.begin().await?;
                let result = Self::open_locked(&mut tx, input, actor).await;
                conclude(tx, result).await
            })
            .await?;

        tracing::info!(
            %carrier_id,
            kind = input.kind.as_str(),
            owner_id = %input.owner_id,
            reference = %input.reference,
            delta = %input.opening,
            reason = ReasonCode::CarrierOpened.as_str(),
            "Carrier opened"
        );
        Ok(carrier_id)
    }

    async fn open_locked(
        tx: &mut S::Tx,
        input: &OpenCarrierInput,
        actor: ActorId,
    ) -> Result<CarrierId, LedgerError> {
        let now = Utc::now();
        let carrier = Carrier {
            id: CarrierId::new(),
            kind: input.kind,
            owner_id: input.owner_id,
            reference: input.reference.clone(),
            opening: input.opening,
            accrued: Money::ZERO,
            settled: Money::ZERO,
            status: CarrierStatus::Open,
            created_at: now,
            updated_at: now,
        };
        tx.insert_carrier(&carrier).await?;

        let txn = LedgerTransaction::record(
            Subject::Carrier(carrier.id),
            input.opening.amount(),
            ReasonCode::CarrierOpened,
            None,
            actor,
        );
        tx.append_transaction(&txn).await?;
        Ok(carrier.id)
    }

    /// Adds value to an open carrier whose kind accrues.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a non-positive amount, a kind that does not
    /// accrue or a non-accrual reason; `CarrierClosed` if the carrier is not
    /// open; `CarrierNotFound`.
    pub async fn apply_accrual(
        &self,
        carrier_id: CarrierId,
        amount: Money,
        reason: ReasonCode,
        method: Option<PaymentMethod>,
        actor: ActorId,
    ) -> Result<RemainingBalance, LedgerError> {
        rules::check_amount(amount)?;

        let balance = self
            .retry
            .run(|| async move {
                let mut tx = self.store.begin().await?;
                let result =
                    Self::accrue_locked(&mut tx, carrier_id, amount, reason, method, actor).await;
                conclude(tx, result).await
            })
            .await?;

        tracing::info!(
            %carrier_id,
            delta = %amount,
            outstanding = %balance.outstanding,
            reason = reason.as_str(),
            "Carrier accrued"
        );
        Ok(balance)
    }

    async fn accrue_locked(
        tx: &mut S::Tx,
        carrier_id: CarrierId,
        amount: Money,
        reason: ReasonCode,
        method: Option<PaymentMethod>,
        actor: ActorId,
    ) -> Result<RemainingBalance, LedgerError> {
        let mut carrier = tx
            .lock_carrier(carrier_id)
            .await?
            .ok_or(LedgerError::CarrierNotFound(carrier_id))?;
        rules::check_accrual(&carrier, reason)?;

        carrier.accrued += amount;
        carrier.updated_at = Utc::now();
        tx.update_carrier(&carrier).await?;

        let txn = LedgerTransaction::record(
            Subject::Carrier(carrier_id),
            amount.amount(),
            reason,
            method,
            actor,
        );
        tx.append_transaction(&txn).await?;

        Ok(RemainingBalance {
            carrier_id,
            applied: amount,
            outstanding: carrier.outstanding(),
            status: carrier.status,
        })
    }

    /// Settles `amount` against one carrier.
    ///
    /// The outstanding balance is read under the carrier's row lock. Kinds
    /// that settle to zero flip to `Settled` when outstanding reaches exactly
    /// zero.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a non-positive amount or a cash session,
    /// `CarrierNotFound`, `CarrierClosed`, or `Overpayment` if `amount`
    /// exceeds outstanding.
    pub async fn apply_settlement(
        &self,
        carrier_id: CarrierId,
        amount: Money,
        method: PaymentMethod,
        actor: ActorId,
    ) -> Result<RemainingBalance, LedgerError> {
        rules::check_amount(amount)?;

        let result = self
            .retry
            .run(|| async move {
                let mut tx = self.store.begin().await?;
                let result = match tx.lock_carrier(carrier_id).await {
                    Ok(Some(carrier)) => match rules::check_payable(&carrier) {
                        Ok(()) => {
                            Self::settle_locked(&mut tx, carrier, amount, method, actor).await
                        }
                        Err(err) => Err(err),
                    },
                    Ok(None) => Err(LedgerError::CarrierNotFound(carrier_id)),
                    Err(err) => Err(err),
                };
                conclude(tx, result).await
            })
            .await;

        match &result {
            Ok(balance) => tracing::info!(
                %carrier_id,
                delta = %(-amount),
                outstanding = %balance.outstanding,
                status = balance.status.as_str(),
                method = method.as_str(),
                "Carrier settled"
            ),
            Err(err) => tracing::warn!(%carrier_id, %amount, error = %err, "Settlement rejected"),
        }
        result
    }

    /// Settles against a carrier already locked in `tx`.
    pub(crate) async fn settle_locked(
        tx: &mut S::Tx,
        mut carrier: Carrier,
        amount: Money,
        method: PaymentMethod,
        actor: ActorId,
    ) -> Result<RemainingBalance, LedgerError> {
        rules::check_settlement(&carrier, amount)?;

        carrier.settled += amount;
        if carrier.kind.settles_to_zero() && carrier.outstanding().is_zero() {
            carrier.status = CarrierStatus::Settled;
        }
        carrier.updated_at = Utc::now();
        tx.update_carrier(&carrier).await?;

        let txn = LedgerTransaction::record(
            Subject::Carrier(carrier.id),
            -amount.amount(),
            carrier.kind.settlement_reason(),
            Some(method),
            actor,
        );
        tx.append_transaction(&txn).await?;

        Ok(RemainingBalance {
            carrier_id: carrier.id,
            applied: amount,
            outstanding: carrier.outstanding(),
            status: carrier.status,
        })
    }

    /// Closes a carrier. Closed carriers accept no further mutation.
    ///
    /// # Errors
    ///
    /// Returns `CarrierNotFound`, or `CarrierClosed` if already closed.
    pub async fn close_carrier(
        &self,
        carrier_id: CarrierId,
        actor: ActorId,
    ) -> Result<Carrier, LedgerError> {
        let carrier = self
            .retry
            .run(|| async move {
                let mut tx = self.store.begin().await?;
                let result = Self::close_locked(&mut tx, carrier_id).await;
                conclude(tx, result).await
            })
            .await?;

        tracing::info!(
            %carrier_id,
            %actor,
            outstanding = %carrier.outstanding(),
            "Carrier closed"
        );
        Ok(carrier)
    }

    pub(crate) async fn close_locked(
        tx: &mut S::Tx,
        carrier_id: CarrierId,
    ) -> Result<Carrier, LedgerError> {
        let mut carrier = tx
            .lock_carrier(carrier_id)
            .await?
            .ok_or(LedgerError::CarrierNotFound(carrier_id))?;
        if carrier.status == CarrierStatus::Closed {
            return Err(LedgerError::CarrierClosed(carrier_id));
        }

        carrier.status = CarrierStatus::Closed;
        carrier.updated_at = Utc::now();
        tx.update_carrier(&carrier).await?;
        Ok(carrier)
    }
}

fn log_consumption(result: &Result<StockMovement, LedgerError>, reason: ReasonCode) {
    match result {
        Ok(movement) => tracing::info!(
            lot_id = %movement.lot_id,
            delta = %movement.delta,
            quantity_on_hand = %movement.quantity_on_hand,
            reason = reason.as_str(),
            "Stock consumed"
        ),
        Err(LedgerError::InsufficientStock {
            lot_id,
            requested,
            available,
        }) => tracing::warn!(
            %lot_id,
            %requested,
            %available,
            reason = reason.as_str(),
            "Consumption rejected: insufficient stock"
        ),
        Err(_) => {}
    }
}
