//! Database seeder for StockLedger development and testing.
//!
//! Receives stock against a supplier GRN, rings up a few sales, opens a
//! customer credit invoice and runs one cash session, all through the ledger
//! engines so every seeded row has its audit trail.
//!
//! Usage: cargo run --bin seeder

use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use stockledger_core::aggregation::{AggregationEngine, ProductInfo, StaticCatalog};
use stockledger_core::ledger::{
    CarrierKind, ConsumptionLine, IntakeInput, LotKey, PaymentMethod, ReasonCode, RetryPolicy,
    UnitCosts,
};
use stockledger_core::mutation::MutationEngine;
use stockledger_core::reconciliation::{ReconciliationService, SettlementTarget};
use stockledger_core::store::{CarrierFilter, LedgerSnapshot, LedgerStore};
use stockledger_db::PgLedgerStore;
use stockledger_shared::AppConfig;
use stockledger_shared::types::{ActorId, LotId, Money, OwnerId, ProductVariantId, SupplierId};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Seed supplier (consistent for all seeds)
const SEED_SUPPLIER: u128 = 0x0000_0000_0000_0000_0000_0000_0000_0001;
/// Seed customer
const SEED_CUSTOMER: u128 = 0x0000_0000_0000_0000_0000_0000_0000_0002;
/// Seed cashier and actor
const SEED_CASHIER: u128 = 0x0000_0000_0000_0000_0000_0000_0000_0003;

struct SeedProduct {
    variant: u128,
    name: &'static str,
    unit: &'static str,
    category: &'static str,
    quantity: Decimal,
    cost: Decimal,
    price: Decimal,
}

const PRODUCTS: [SeedProduct; 3] = [
    SeedProduct {
        variant: 0x0000_0000_0000_0000_0000_0000_0000_0101,
        name: "Basmati Rice 5kg",
        unit: "bag",
        category: "Grocery",
        quantity: dec!(40),
        cost: dec!(9.40),
        price: dec!(12.99),
    },
    SeedProduct {
        variant: 0x0000_0000_0000_0000_0000_0000_0000_0102,
        name: "Sunflower Oil 1L",
        unit: "bottle",
        category: "Grocery",
        quantity: dec!(24),
        cost: dec!(2.15),
        price: dec!(3.25),
    },
    SeedProduct {
        variant: 0x0000_0000_0000_0000_0000_0000_0000_0103,
        name: "Hand Soap 250ml",
        unit: "piece",
        category: "Household",
        quantity: dec!(6),
        cost: dec!(0.85),
        price: dec!(1.49),
    },
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockledger=debug,seeder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    tracing::info!("Connecting to database...");
    let db = stockledger_db::connect_with_config(&config.database)
        .await
        .context("Failed to connect to database")?;
    let store = Arc::new(PgLedgerStore::new(db, &config.ledger));
    let retry = RetryPolicy::from_config(&config.ledger);

    let supplier = SupplierId::from_uuid(Uuid::from_u128(SEED_SUPPLIER));
    if already_seeded(&store, supplier).await? {
        tracing::info!("Seed supplier already has carriers, skipping...");
        return Ok(());
    }

    let engine = MutationEngine::new(Arc::clone(&store)).with_retry(retry);
    let reconciliation = ReconciliationService::new(Arc::clone(&store)).with_retry(retry);
    let actor = ActorId::from_uuid(Uuid::from_u128(SEED_CASHIER));

    tracing::info!("Seeding GRN and stock...");
    let lots = seed_stock(&engine, &reconciliation, supplier, actor).await?;

    tracing::info!("Seeding sales...");
    seed_sales(&engine, &lots, actor).await?;

    tracing::info!("Seeding customer credit...");
    seed_customer_credit(&reconciliation, actor).await?;

    tracing::info!("Seeding cash session...");
    seed_cash_session(&reconciliation, actor).await?;

    let catalog = PRODUCTS.iter().fold(
        StaticCatalog::new().with_supplier(supplier, "Seed Wholesale Ltd"),
        |catalog, product| {
            catalog.with_product(
                ProductVariantId::from_uuid(Uuid::from_u128(product.variant)),
                ProductInfo {
                    name: product.name.to_string(),
                    unit: Some(product.unit.to_string()),
                    category: Some(product.category.to_string()),
                },
            )
        },
    );
    let aggregation = AggregationEngine::new(Arc::clone(&store))
        .with_catalog(Arc::new(catalog))
        .with_low_stock_threshold(Decimal::from(config.ledger.low_stock_threshold));
    let summary = aggregation.dashboard_summary().await?;
    tracing::info!("Dashboard:\n{}", serde_json::to_string_pretty(&summary)?);

    tracing::info!("Seeding complete!");
    Ok(())
}

async fn already_seeded(store: &PgLedgerStore, supplier: SupplierId) -> anyhow::Result<bool> {
    let snapshot = store.snapshot().await?;
    let carriers = snapshot
        .carriers(CarrierFilter {
            owner_id: Some(supplier.into()),
            ..CarrierFilter::default()
        })
        .await?;
    snapshot.finish().await?;
    Ok(!carriers.is_empty())
}

/// Opens a GRN for the seed supplier, receives every product, then pays
/// part of the GRN.
async fn seed_stock(
    engine: &MutationEngine<PgLedgerStore>,
    reconciliation: &ReconciliationService<PgLedgerStore>,
    supplier: SupplierId,
    actor: ActorId,
) -> anyhow::Result<Vec<LotId>> {
    let grn_total: Money = PRODUCTS
        .iter()
        .map(|p| Money::new(p.cost).times(p.quantity))
        .sum();
    let grn = reconciliation
        .open_grn(supplier, "GRN-SEED-001", grn_total, actor)
        .await?;
    tracing::info!(%grn, total = %grn_total, "Opened seed GRN");

    let today = Utc::now().date_naive();
    let mut lots = Vec::with_capacity(PRODUCTS.len());
    for product in &PRODUCTS {
        let input = IntakeInput {
            key: LotKey {
                product_variant_id: ProductVariantId::from_uuid(Uuid::from_u128(product.variant)),
                batch_name: "SEED-001".to_string(),
            },
            quantity: product.quantity,
            costs: UnitCosts {
                cost_price: Money::new(product.cost),
                mrp: Money::new(product.price),
                selling_price: Money::new(product.price),
                wholesale_price: Money::new(
                    product.cost + (product.price - product.cost) / dec!(2),
                ),
            },
            manufactured_on: Some(today - Duration::days(30)),
            expires_on: Some(today + Duration::days(335)),
            supplier_id: Some(supplier),
            grn_id: Some(grn),
        };
        let lot_id = engine.apply_intake(&input, actor).await?;
        tracing::info!(%lot_id, product = product.name, "Received seed stock");
        lots.push(lot_id);
    }

    let payment = Money::new((grn_total.amount() / dec!(2)).round_dp(2));
    reconciliation
        .settle(
            SettlementTarget::Carrier(grn),
            payment,
            PaymentMethod::BankTransfer,
            actor,
        )
        .await?;
    Ok(lots)
}

async fn seed_sales(
    engine: &MutationEngine<PgLedgerStore>,
    lots: &[LotId],
    actor: ActorId,
) -> anyhow::Result<()> {
    let basket: Vec<ConsumptionLine> = lots
        .iter()
        .zip([dec!(3), dec!(2), dec!(1)])
        .map(|(&lot_id, quantity)| ConsumptionLine { lot_id, quantity })
        .collect();
    engine
        .apply_consumption_lines(&basket, ReasonCode::Sale, actor)
        .await?;

    // Leaves the soap lot empty for the out-of-stock view
    if let Some(&soap) = lots.last() {
        engine
            .apply_consumption(soap, dec!(5), ReasonCode::Writeoff, actor)
            .await?;
    }
    Ok(())
}

async fn seed_customer_credit(
    reconciliation: &ReconciliationService<PgLedgerStore>,
    actor: ActorId,
) -> anyhow::Result<()> {
    let customer = OwnerId::from_uuid(Uuid::from_u128(SEED_CUSTOMER));
    reconciliation
        .open_invoice(customer, "INV-SEED-001", Money::new(dec!(300)), actor)
        .await?;
    reconciliation
        .open_invoice(customer, "INV-SEED-002", Money::new(dec!(200)), actor)
        .await?;

    let result = reconciliation
        .settle(
            SettlementTarget::Owner {
                owner_id: customer,
                kind: CarrierKind::CustomerCredit,
            },
            Money::new(dec!(400)),
            PaymentMethod::Cash,
            actor,
        )
        .await?;
    tracing::info!(
        applied = %result.total_applied,
        remaining = %result.remaining_outstanding(),
        "Settled seed invoices"
    );
    Ok(())
}

async fn seed_cash_session(
    reconciliation: &ReconciliationService<PgLedgerStore>,
    actor: ActorId,
) -> anyhow::Result<()> {
    let cashier = OwnerId::from_uuid(Uuid::from_u128(SEED_CASHIER));
    let session = reconciliation
        .open_cash_session(cashier, Money::new(dec!(100)), actor)
        .await?;
    reconciliation
        .record_cash_sale(session, Money::new(dec!(250)), actor)
        .await?;
    reconciliation
        .cash_in(session, Money::new(dec!(20)), actor)
        .await?;
    reconciliation
        .cash_out(session, Money::new(dec!(40)), actor)
        .await?;

    let expected = reconciliation.get_expected_balance(session).await?;
    let closing = reconciliation
        .close_cash_session(session, expected, actor)
        .await?;
    tracing::info!(
        %session,
        expected = %closing.expected,
        variance = %closing.variance,
        "Closed seed cash session"
    );
    Ok(())
}
