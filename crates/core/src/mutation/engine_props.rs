//! Property-based tests for the mutation engine.
//!
//! - Stock quantity never goes negative under any intake/consumption sequence
//! - Settlements never push outstanding below zero or above opening
//! - A subject's transactions always sum to its snapshot value

use std::sync::Arc;

use proptest::prelude::*;
use rust_decimal::Decimal;
use stockledger_shared::types::{ActorId, Money, OwnerId, ProductVariantId};

use super::engine::MutationEngine;
use crate::ledger::{
    CarrierKind, IntakeInput, LedgerError, LotKey, OpenCarrierInput, PaymentMethod, ReasonCode,
    Subject, UnitCosts,
};
use crate::store::{InMemoryLedgerStore, LedgerSnapshot, LedgerStore};

#[derive(Debug, Clone, Copy)]
enum StockOp {
    Intake(Decimal),
    Consume(Decimal),
}

/// Quantities 0.001 to 50.000, three decimal places.
fn quantity() -> impl Strategy<Value = Decimal> {
    (1i64..50_000i64).prop_map(|milli| Decimal::new(milli, 3))
}

/// Amounts 0.01 to 2,000.00.
fn amount() -> impl Strategy<Value = Decimal> {
    (1i64..200_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn stock_op() -> impl Strategy<Value = StockOp> {
    prop_oneof![
        quantity().prop_map(StockOp::Intake),
        quantity().prop_map(StockOp::Consume),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn intake(variant: ProductVariantId, quantity: Decimal) -> IntakeInput {
    IntakeInput {
        key: LotKey {
            product_variant_id: variant,
            batch_name: "PROP".to_string(),
        },
        quantity,
        costs: UnitCosts::default(),
        manufactured_on: None,
        expires_on: None,
        supplier_id: None,
        grn_id: None,
    }
}

async fn subject_sum(store: &InMemoryLedgerStore, subject: Subject) -> Decimal {
    let snapshot = store.snapshot().await.unwrap();
    snapshot
        .transactions(subject)
        .await
        .unwrap()
        .iter()
        .map(|t| t.delta)
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Quantity stays non-negative, matches a simple model, and equals the
    /// sum of the lot's transactions after every call.
    #[test]
    fn prop_stock_never_negative(first in quantity(), ops in prop::collection::vec(stock_op(), 1..30)) {
        runtime().block_on(async {
            let store = Arc::new(InMemoryLedgerStore::new());
            let engine = MutationEngine::new(Arc::clone(&store));
            let actor = ActorId::new();
            let variant = ProductVariantId::new();

            let lot_id = engine.apply_intake(&intake(variant, first), actor).await.unwrap();
            let mut model = first;

            for op in ops {
                match op {
                    StockOp::Intake(q) => {
                        engine.apply_intake(&intake(variant, q), actor).await.unwrap();
                        model += q;
                    }
                    StockOp::Consume(q) => {
                        match engine.apply_consumption(lot_id, q, ReasonCode::Sale, actor).await {
                            Ok(movement) => {
                                prop_assert!(q <= model);
                                model -= q;
                                prop_assert_eq!(movement.quantity_on_hand, model);
                            }
                            Err(LedgerError::InsufficientStock { available, .. }) => {
                                prop_assert!(q > model);
                                prop_assert_eq!(available, model);
                            }
                            Err(other) => prop_assert!(false, "unexpected error: {}", other),
                        }
                    }
                }

                let snapshot = store.snapshot().await.unwrap();
                let on_hand = snapshot.lot(lot_id).await.unwrap().unwrap().quantity_on_hand;
                prop_assert!(on_hand >= Decimal::ZERO);
                prop_assert_eq!(on_hand, model);
                prop_assert_eq!(subject_sum(&store, Subject::Lot(lot_id)).await, on_hand);
            }
            Ok(())
        })?;
    }

    /// Outstanding is non-increasing and stays within `0..=opening`; the
    /// carrier's transactions sum to its outstanding balance.
    #[test]
    fn prop_settlement_within_bounds(opening in amount(), payments in prop::collection::vec(amount(), 1..20)) {
        runtime().block_on(async {
            let store = Arc::new(InMemoryLedgerStore::new());
            let engine = MutationEngine::new(Arc::clone(&store));
            let actor = ActorId::new();

            let input = OpenCarrierInput {
                kind: CarrierKind::Grn,
                owner_id: OwnerId::new(),
                reference: "GRN-PROP".to_string(),
                opening: Money::new(opening),
            };
            let carrier_id = engine.open_carrier(&input, actor).await.unwrap();
            let mut previous = Money::new(opening);

            for payment in payments {
                let result = engine
                    .apply_settlement(carrier_id, Money::new(payment), PaymentMethod::Cash, actor)
                    .await;
                match result {
                    Ok(balance) => prop_assert_eq!(balance.outstanding, previous - Money::new(payment)),
                    Err(LedgerError::Overpayment { outstanding, .. }) => {
                        prop_assert_eq!(outstanding, previous);
                        prop_assert!(Money::new(payment) > previous);
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {}", other),
                }

                let snapshot = store.snapshot().await.unwrap();
                let carrier = snapshot.carrier(carrier_id).await.unwrap().unwrap();
                let outstanding = carrier.outstanding();
                prop_assert!(!outstanding.is_negative());
                prop_assert!(outstanding <= Money::new(opening));
                prop_assert!(outstanding <= previous);
                prop_assert_eq!(
                    subject_sum(&store, Subject::Carrier(carrier_id)).await,
                    outstanding.amount()
                );
                previous = outstanding;
            }
            Ok(())
        })?;
    }
}
