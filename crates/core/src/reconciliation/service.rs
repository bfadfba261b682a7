//! Reconciliation service: outstanding balances, settlement allocation and
//! cash sessions over the carrier abstraction.

use std::sync::Arc;

use chrono::Utc;
use stockledger_shared::types::{ActorId, CarrierId, Money, OwnerId, SupplierId};

use super::allocation::allocate_oldest_first;
use super::types::{AllocationResult, SessionBreakdown, SessionClosing, SettlementTarget};
use crate::ledger::{
    Carrier, CarrierKind, CarrierStatus, LedgerError, OpenCarrierInput, PaymentMethod, ReasonCode,
    RemainingBalance, RetryPolicy, Subject,
};
use crate::mutation::{MutationEngine, rules};
use crate::store::{CarrierFilter, LedgerSnapshot, LedgerStore, LedgerTx, conclude};

/// Settles and inspects GRNs, customer credit and cash sessions.
pub struct ReconciliationService<S: LedgerStore> {
    engine: MutationEngine<S>,
}

impl<S: LedgerStore> Clone for ReconciliationService<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

impl<S: LedgerStore> ReconciliationService<S> {
    /// Creates a service over `store` with the default retry policy.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            engine: MutationEngine::new(store),
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry(self, retry: RetryPolicy) -> Self {
        Self {
            engine: self.engine.with_retry(retry),
        }
    }

    fn store(&self) -> &Arc<S> {
        self.engine.store()
    }

    // ========================================================================
    // Balances
    // ========================================================================

    /// Outstanding balance of one carrier.
    ///
    /// # Errors
    ///
    /// Returns `CarrierNotFound` or a store error.
    pub async fn get_outstanding(&self, carrier_id: CarrierId) -> Result<Money, LedgerError> {
        let carrier = self.read_carrier(carrier_id).await?;
        Ok(carrier.outstanding())
    }

    /// Sum of outstanding balances over an owner's open carriers of `kind`.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn owner_outstanding(
        &self,
        owner_id: OwnerId,
        kind: CarrierKind,
    ) -> Result<Money, LedgerError> {
        let snapshot = self.store().snapshot().await?;
        let carriers = snapshot
            .carriers(CarrierFilter {
                owner_id: Some(owner_id),
                kind: Some(kind),
                status: Some(CarrierStatus::Open),
            })
            .await;
        snapshot.finish().await?;

        let total = carriers?.iter().map(Carrier::outstanding).sum();
        tracing::debug!(
            %owner_id,
            kind = kind.as_str(),
            outstanding = %total,
            "Read owner outstanding"
        );
        Ok(total)
    }

    async fn read_carrier(&self, carrier_id: CarrierId) -> Result<Carrier, LedgerError> {
        let snapshot = self.store().snapshot().await?;
        let carrier = snapshot.carrier(carrier_id).await;
        snapshot.finish().await?;
        carrier?.ok_or(LedgerError::CarrierNotFound(carrier_id))
    }

    // ========================================================================
    // Settlement
    // ========================================================================

    /// Applies a payment to a carrier or across an owner's open carriers.
    ///
    /// Owner-level settlement locks every open carrier of the owner and kind,
    /// then fills them oldest first. If the payment exceeds what they owe in
    /// total, nothing is applied.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a non-positive amount or a cash session
    /// target, `OwnerNotFound` if the owner has no carriers of the kind,
    /// `Overpayment` if the payment exceeds outstanding, and the
    /// single-carrier errors of [`MutationEngine::apply_settlement`].
    pub async fn settle(
        &self,
        target: SettlementTarget,
        amount: Money,
        method: PaymentMethod,
        actor: ActorId,
    ) -> Result<AllocationResult, LedgerError> {
        match target {
            SettlementTarget::Carrier(carrier_id) => {
                let balance = self
                    .engine
                    .apply_settlement(carrier_id, amount, method, actor)
                    .await?;
                Ok(AllocationResult {
                    total_applied: balance.applied,
                    allocations: vec![balance],
                })
            }
            SettlementTarget::Owner { owner_id, kind } => {
                self.settle_owner(owner_id, kind, amount, method, actor)
                    .await
            }
        }
    }

    async fn settle_owner(
        &self,
        owner_id: OwnerId,
        kind: CarrierKind,
        amount: Money,
        method: PaymentMethod,
        actor: ActorId,
    ) -> Result<AllocationResult, LedgerError> {
        rules::check_amount(amount)?;
        if !kind.settles_to_zero() {
            return Err(LedgerError::validation(format!(
                "{kind} carriers are settled one at a time"
            )));
        }

        let result = self
            .engine
            .retry_policy()
            .run(|| async move {
                let mut tx = self.store().begin().await?;
                let result =
                    Self::allocate_locked(&mut tx, owner_id, kind, amount, method, actor).await;
                conclude(tx, result).await
            })
            .await;

        match &result {
            Ok(allocation) => {
                for balance in &allocation.allocations {
                    tracing::info!(
                        carrier_id = %balance.carrier_id,
                        delta = %(-balance.applied),
                        outstanding = %balance.outstanding,
                        status = balance.status.as_str(),
                        "Carrier settled"
                    );
                }
                tracing::info!(
                    %owner_id,
                    kind = kind.as_str(),
                    total = %allocation.total_applied,
                    carriers = allocation.allocations.len(),
                    "Owner settlement allocated"
                );
            }
            Err(err) => {
                tracing::warn!(
                    %owner_id,
                    kind = kind.as_str(),
                    %amount,
                    error = %err,
                    "Owner settlement rejected"
                );
            }
        }
        result
    }

    async fn allocate_locked(
        tx: &mut S::Tx,
        owner_id: OwnerId,
        kind: CarrierKind,
        amount: Money,
        method: PaymentMethod,
        actor: ActorId,
    ) -> Result<AllocationResult, LedgerError> {
        let carriers = tx.lock_open_carriers(owner_id, kind).await?;
        if carriers.is_empty() && !tx.has_carriers(owner_id, kind).await? {
            return Err(LedgerError::OwnerNotFound { owner_id, kind });
        }
        let shares = allocate_oldest_first(&carriers, amount)?;

        let mut allocations = Vec::with_capacity(shares.len());
        for share in shares {
            let Some(carrier) = carriers.iter().find(|c| c.id == share.carrier_id) else {
                continue;
            };
            let balance =
                MutationEngine::<S>::settle_locked(tx, carrier.clone(), share.amount, method, actor)
                    .await?;
            allocations.push(balance);
        }

        let total_applied = allocations.iter().map(|a| a.applied).sum();
        Ok(AllocationResult {
            allocations,
            total_applied,
        })
    }

    // ========================================================================
    // Opening
    // ========================================================================

    /// Opens a goods received note payable to a supplier.
    ///
    /// # Errors
    ///
    /// Returns `Validation` unless `total` is positive.
    pub async fn open_grn(
        &self,
        supplier_id: SupplierId,
        reference: &str,
        total: Money,
        actor: ActorId,
    ) -> Result<CarrierId, LedgerError> {
        self.open(CarrierKind::Grn, supplier_id.into(), reference, total, actor)
            .await
    }

    /// Opens a customer credit invoice.
    ///
    /// # Errors
    ///
    /// Returns `Validation` unless `total` is positive.
    pub async fn open_invoice(
        &self,
        customer_id: OwnerId,
        reference: &str,
        total: Money,
        actor: ActorId,
    ) -> Result<CarrierId, LedgerError> {
        self.open(CarrierKind::CustomerCredit, customer_id, reference, total, actor)
            .await
    }

    async fn open(
        &self,
        kind: CarrierKind,
        owner_id: OwnerId,
        reference: &str,
        opening: Money,
        actor: ActorId,
    ) -> Result<CarrierId, LedgerError> {
        let input = OpenCarrierInput {
            kind,
            owner_id,
            reference: reference.to_string(),
            opening,
        };
        self.engine.open_carrier(&input, actor).await
    }

    // ========================================================================
    // Cash sessions
    // ========================================================================

    /// Opens a cash session with its opening float.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a negative float.
    pub async fn open_cash_session(
        &self,
        owner_id: OwnerId,
        opening_float: Money,
        actor: ActorId,
    ) -> Result<CarrierId, LedgerError> {
        let reference = format!("session-{}", Utc::now().format("%Y%m%d-%H%M%S"));
        self.open(CarrierKind::CashSession, owner_id, &reference, opening_float, actor)
            .await
    }

    /// Adds a cash sale to an open session.
    ///
    /// # Errors
    ///
    /// See [`MutationEngine::apply_accrual`].
    pub async fn record_cash_sale(
        &self,
        session_id: CarrierId,
        amount: Money,
        actor: ActorId,
    ) -> Result<RemainingBalance, LedgerError> {
        self.engine
            .apply_accrual(
                session_id,
                amount,
                ReasonCode::CashSale,
                Some(PaymentMethod::Cash),
                actor,
            )
            .await
    }

    /// Records cash put into the drawer.
    ///
    /// # Errors
    ///
    /// See [`MutationEngine::apply_accrual`].
    pub async fn cash_in(
        &self,
        session_id: CarrierId,
        amount: Money,
        actor: ActorId,
    ) -> Result<RemainingBalance, LedgerError> {
        self.engine
            .apply_accrual(
                session_id,
                amount,
                ReasonCode::CashIn,
                Some(PaymentMethod::Cash),
                actor,
            )
            .await
    }

    /// Records cash taken out of the drawer.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a non-positive amount or a carrier that is not
    /// a cash session, `CarrierClosed`, or `Overpayment` if the drawer holds
    /// less than `amount`.
    pub async fn cash_out(
        &self,
        session_id: CarrierId,
        amount: Money,
        actor: ActorId,
    ) -> Result<RemainingBalance, LedgerError> {
        rules::check_amount(amount)?;

        let result = self
            .engine
            .retry_policy()
            .run(|| async move {
                let mut tx = self.store().begin().await?;
                let result = match lock_session(&mut tx, session_id).await {
                    Ok(session) => {
                        MutationEngine::<S>::settle_locked(
                            &mut tx,
                            session,
                            amount,
                            PaymentMethod::Cash,
                            actor,
                        )
                        .await
                    }
                    Err(err) => Err(err),
                };
                conclude(tx, result).await
            })
            .await;

        match &result {
            Ok(balance) => tracing::info!(
                %session_id,
                delta = %(-amount),
                expected = %balance.outstanding,
                reason = ReasonCode::CashOut.as_str(),
                "Cash out recorded"
            ),
            Err(err) => tracing::warn!(%session_id, %amount, error = %err, "Cash out rejected"),
        }
        result
    }

    /// Cash the drawer should hold: opening + cash sales + cash-in - cash-out.
    ///
    /// # Errors
    ///
    /// Returns `CarrierNotFound`, or `Validation` if the carrier is not a
    /// cash session.
    pub async fn get_expected_balance(&self, session_id: CarrierId) -> Result<Money, LedgerError> {
        Ok(self.session_breakdown(session_id).await?.expected())
    }

    /// Opening, cash sales, cash-in and cash-out totals of a session.
    ///
    /// # Errors
    ///
    /// Returns `CarrierNotFound`, or `Validation` if the carrier is not a
    /// cash session.
    pub async fn session_breakdown(
        &self,
        session_id: CarrierId,
    ) -> Result<SessionBreakdown, LedgerError> {
        let snapshot = self.store().snapshot().await?;
        let read = async {
            let session = snapshot
                .carrier(session_id)
                .await?
                .ok_or(LedgerError::CarrierNotFound(session_id))?;
            ensure_cash_session(&session)?;
            snapshot
                .transactions(Subject::Carrier(session_id))
                .await
        }
        .await;
        snapshot.finish().await?;

        let breakdown = read?.iter().fold(SessionBreakdown::default(), |mut acc, txn| {
            let amount = Money::new(txn.delta);
            match txn.reason {
                ReasonCode::CarrierOpened => acc.opening += amount,
                ReasonCode::CashSale => acc.cash_sales += amount,
                ReasonCode::CashIn => acc.cash_in += amount,
                ReasonCode::CashOut => acc.cash_out -= amount,
                _ => {}
            }
            acc
        });

        tracing::debug!(%session_id, expected = %breakdown.expected(), "Read session breakdown");
        Ok(breakdown)
    }

    /// Closes a session against the counted drawer.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a negative count or a carrier that is not a
    /// cash session, `CarrierNotFound`, or `CarrierClosed`.
    pub async fn close_cash_session(
        &self,
        session_id: CarrierId,
        counted: Money,
        actor: ActorId,
    ) -> Result<SessionClosing, LedgerError> {
        if counted.is_negative() {
            return Err(LedgerError::validation(format!(
                "counted cash must not be negative, got {counted}"
            )));
        }

        let closing = self
            .engine
            .retry_policy()
            .run(|| async move {
                let mut tx = self.store().begin().await?;
                let result = Self::close_session_locked(&mut tx, session_id, counted).await;
                conclude(tx, result).await
            })
            .await?;

        tracing::info!(
            %session_id,
            %actor,
            expected = %closing.expected,
            counted = %closing.counted,
            variance = %closing.variance,
            "Cash session closed"
        );
        Ok(closing)
    }

    async fn close_session_locked(
        tx: &mut S::Tx,
        session_id: CarrierId,
        counted: Money,
    ) -> Result<SessionClosing, LedgerError> {
        let session = lock_session(tx, session_id).await?;
        let expected = session.outstanding();
        MutationEngine::<S>::close_locked(tx, session_id).await?;

        Ok(SessionClosing {
            session_id,
            expected,
            counted,
            variance: counted - expected,
        })
    }
}

fn ensure_cash_session(carrier: &Carrier) -> Result<(), LedgerError> {
    if carrier.kind == CarrierKind::CashSession {
        Ok(())
    } else {
        Err(LedgerError::validation(format!(
            "carrier {} is a {}, not a cash session",
            carrier.id, carrier.kind
        )))
    }
}

async fn lock_session<X: LedgerTx>(
    tx: &mut X,
    session_id: CarrierId,
) -> Result<Carrier, LedgerError> {
    let session = tx
        .lock_carrier(session_id)
        .await?
        .ok_or(LedgerError::CarrierNotFound(session_id))?;
    ensure_cash_session(&session)?;
    Ok(session)
}
