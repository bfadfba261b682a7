//! Read-only derived views over one snapshot per call.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use stockledger_shared::config::LedgerConfig;
use stockledger_shared::types::{CarrierId, LotId, Money, OwnerId, ProductVariantId, SupplierId};

use super::catalog::{CatalogLookup, NoCatalog, ProductInfo};
use super::types::{AuditReport, CarrierBalance, DashboardSummary, LotSummary, OutOfStockGroup};
use crate::ledger::{Carrier, CarrierKind, CarrierStatus, LedgerError, Lot, Subject};
use crate::store::{CarrierFilter, LedgerSnapshot, LedgerStore};

/// Produces stock lists, dashboard figures, balances and audits.
pub struct AggregationEngine<S: LedgerStore> {
    store: Arc<S>,
    catalog: Arc<dyn CatalogLookup>,
    low_stock_threshold: Decimal,
}

impl<S: LedgerStore> Clone for AggregationEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            catalog: Arc::clone(&self.catalog),
            low_stock_threshold: self.low_stock_threshold,
        }
    }
}

impl<S: LedgerStore> AggregationEngine<S> {
    /// Creates an engine with no catalog and the default low-stock threshold.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            catalog: Arc::new(NoCatalog),
            low_stock_threshold: Decimal::from(LedgerConfig::default().low_stock_threshold),
        }
    }

    /// Uses `catalog` to decorate output.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogLookup>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Threshold the dashboard counts low-stock lots against.
    #[must_use]
    pub fn with_low_stock_threshold(mut self, threshold: Decimal) -> Self {
        self.low_stock_threshold = threshold;
        self
    }

    /// Lots with `quantity_on_hand < threshold`, ascending by quantity then id.
    ///
    /// # Errors
    ///
    /// Returns a store error. Catalog failures only omit display fields.
    pub async fn low_stock(&self, threshold: Decimal) -> Result<Vec<LotSummary>, LedgerError> {
        let snapshot = self.store.snapshot().await?;
        let lots = snapshot.lots_below(threshold).await;
        snapshot.finish().await?;
        let lots = lots?;

        tracing::debug!(%threshold, count = lots.len(), "Read low stock");

        let mut decorator = Decorator::new(self.catalog.as_ref());
        let mut summaries = Vec::with_capacity(lots.len());
        for lot in &lots {
            summaries.push(decorator.summarize(lot).await);
        }
        Ok(summaries)
    }

    /// Empty lots grouped by product variant, aged against today.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn out_of_stock(&self) -> Result<Vec<OutOfStockGroup>, LedgerError> {
        self.out_of_stock_as_of(Utc::now().date_naive()).await
    }

    /// Empty lots grouped by product variant, aged against `date`.
    ///
    /// Groups are ordered by product variant id; lots within a group by id.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn out_of_stock_as_of(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<OutOfStockGroup>, LedgerError> {
        let snapshot = self.store.snapshot().await?;
        let lots = snapshot.lots().await;
        snapshot.finish().await?;

        let mut groups: BTreeMap<ProductVariantId, Vec<Lot>> = BTreeMap::new();
        for lot in lots?.into_iter().filter(Lot::is_empty) {
            groups.entry(lot.product_variant_id).or_default().push(lot);
        }

        tracing::debug!(%date, products = groups.len(), "Read out of stock");

        let mut decorator = Decorator::new(self.catalog.as_ref());
        let mut result = Vec::with_capacity(groups.len());
        for (product_variant_id, mut lots) in groups {
            lots.sort_by_key(|l| l.id);
            result.push(OutOfStockGroup {
                product_variant_id,
                product_name: decorator.product(product_variant_id).await.map(|p| p.name),
                average_days_out_of_stock: average_days_since_manufacture(&lots, date),
                lot_ids: lots.iter().map(|l| l.id).collect(),
            });
        }
        Ok(result)
    }

    /// Store-wide stock and balance figures from one snapshot.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn dashboard_summary(&self) -> Result<DashboardSummary, LedgerError> {
        let snapshot = self.store.snapshot().await?;
        let read = async {
            let lots = snapshot.lots().await?;
            let carriers = snapshot
                .carriers(CarrierFilter {
                    status: Some(CarrierStatus::Open),
                    ..CarrierFilter::default()
                })
                .await?;
            Ok::<_, LedgerError>((lots, carriers))
        }
        .await;
        snapshot.finish().await?;
        let (lots, carriers) = read?;

        let stocked: Vec<&Lot> = lots.iter().filter(|l| !l.is_empty()).collect();
        let products: HashSet<ProductVariantId> =
            stocked.iter().map(|l| l.product_variant_id).collect();
        let suppliers: HashSet<SupplierId> = stocked.iter().filter_map(|l| l.supplier_id).collect();
        let total_stock_units: Decimal = stocked.iter().map(|l| l.quantity_on_hand).sum();
        let total_stock_value: Money = stocked.iter().map(|l| l.stock_value()).sum();

        let mut decorator = Decorator::new(self.catalog.as_ref());
        let mut categories = HashSet::new();
        for id in &products {
            if let Some(category) = decorator.product(*id).await.and_then(|p| p.category) {
                categories.insert(category);
            }
        }

        let outstanding_of = |kind: CarrierKind| -> Money {
            carriers
                .iter()
                .filter(|c| c.kind == kind)
                .map(Carrier::outstanding)
                .sum()
        };

        let summary = DashboardSummary {
            products_with_stock: products.len(),
            total_stock_units,
            total_stock_value: total_stock_value.to_output(),
            supplier_count: suppliers.len(),
            category_count: categories.len(),
            low_stock_count: lots
                .iter()
                .filter(|l| l.quantity_on_hand < self.low_stock_threshold)
                .count(),
            out_of_stock_count: lots.iter().filter(|l| l.is_empty()).count(),
            outstanding_payables: outstanding_of(CarrierKind::Grn).to_output(),
            outstanding_receivables: outstanding_of(CarrierKind::CustomerCredit).to_output(),
            generated_at: Utc::now(),
        };

        tracing::debug!(
            products = summary.products_with_stock,
            value = %summary.total_stock_value,
            "Read dashboard summary"
        );
        Ok(summary)
    }

    /// Every carrier of an owner, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn balance_snapshot(
        &self,
        owner_id: OwnerId,
    ) -> Result<Vec<CarrierBalance>, LedgerError> {
        let snapshot = self.store.snapshot().await?;
        let carriers = snapshot
            .carriers(CarrierFilter {
                owner_id: Some(owner_id),
                ..CarrierFilter::default()
            })
            .await;
        snapshot.finish().await?;

        let balances: Vec<CarrierBalance> = carriers?
            .into_iter()
            .map(|c| CarrierBalance {
                carrier_id: c.id,
                kind: c.kind,
                outstanding: c.outstanding().to_output(),
                opening: c.opening.to_output(),
                accrued: c.accrued.to_output(),
                settled: c.settled.to_output(),
                reference: c.reference,
                status: c.status,
                created_at: c.created_at,
            })
            .collect();

        tracing::debug!(%owner_id, count = balances.len(), "Read balance snapshot");
        Ok(balances)
    }

    /// Compares a lot's quantity with the sum of its transactions.
    ///
    /// # Errors
    ///
    /// Returns `LotNotFound` or a store error.
    pub async fn audit_lot(&self, lot_id: LotId) -> Result<AuditReport, LedgerError> {
        let subject = Subject::Lot(lot_id);
        let snapshot = self.store.snapshot().await?;
        let read = async {
            let lot = snapshot
                .lot(lot_id)
                .await?
                .ok_or(LedgerError::LotNotFound(lot_id))?;
            let txns = snapshot.transactions(subject).await?;
            Ok::<_, LedgerError>((lot.quantity_on_hand, txns))
        }
        .await;
        snapshot.finish().await?;
        let (value, txns) = read?;

        Ok(audit(subject, value, txns.iter().map(|t| t.delta)))
    }

    /// Compares a carrier's outstanding balance with the sum of its
    /// transactions.
    ///
    /// # Errors
    ///
    /// Returns `CarrierNotFound` or a store error.
    pub async fn audit_carrier(&self, carrier_id: CarrierId) -> Result<AuditReport, LedgerError> {
        let subject = Subject::Carrier(carrier_id);
        let snapshot = self.store.snapshot().await?;
        let read = async {
            let carrier = snapshot
                .carrier(carrier_id)
                .await?
                .ok_or(LedgerError::CarrierNotFound(carrier_id))?;
            let txns = snapshot.transactions(subject).await?;
            Ok::<_, LedgerError>((carrier.outstanding().amount(), txns))
        }
        .await;
        snapshot.finish().await?;
        let (value, txns) = read?;

        Ok(audit(subject, value, txns.iter().map(|t| t.delta)))
    }
}

fn audit(
    subject: Subject,
    snapshot_value: Decimal,
    deltas: impl Iterator<Item = Decimal>,
) -> AuditReport {
    let mut replayed_value = Decimal::ZERO;
    let mut transaction_count = 0;
    for delta in deltas {
        replayed_value += delta;
        transaction_count += 1;
    }

    let report = AuditReport {
        subject,
        snapshot_value,
        replayed_value,
        transaction_count,
        drift: snapshot_value - replayed_value,
    };
    if !report.is_consistent() {
        tracing::warn!(
            subject = subject.kind_str(),
            id = %subject.uuid(),
            drift = %report.drift,
            "Audit drift detected"
        );
    }
    report
}

fn average_days_since_manufacture(lots: &[Lot], date: NaiveDate) -> Option<Decimal> {
    let days: Vec<i64> = lots
        .iter()
        .filter_map(|l| l.manufactured_on)
        .map(|made| (date - made).num_days().max(0))
        .collect();
    if days.is_empty() {
        return None;
    }
    let total = Decimal::from(days.iter().sum::<i64>());
    Some((total / Decimal::from(days.len())).round_dp(2))
}

/// Catalog lookups memoised for the duration of one call.
struct Decorator<'a> {
    catalog: &'a dyn CatalogLookup,
    products: HashMap<ProductVariantId, Option<ProductInfo>>,
    suppliers: HashMap<SupplierId, Option<String>>,
}

impl<'a> Decorator<'a> {
    fn new(catalog: &'a dyn CatalogLookup) -> Self {
        Self {
            catalog,
            products: HashMap::new(),
            suppliers: HashMap::new(),
        }
    }

    async fn product(&mut self, id: ProductVariantId) -> Option<ProductInfo> {
        if let Some(cached) = self.products.get(&id) {
            return cached.clone();
        }
        let info = match self.catalog.product(id).await {
            Ok(info) => info,
            Err(err) => {
                tracing::warn!(
                    product_variant_id = %id,
                    error = %err,
                    "Catalog product lookup failed"
                );
                None
            }
        };
        self.products.insert(id, info.clone());
        info
    }

    async fn supplier_name(&mut self, id: SupplierId) -> Option<String> {
        if let Some(cached) = self.suppliers.get(&id) {
            return cached.clone();
        }
        let name = match self.catalog.supplier_name(id).await {
            Ok(name) => name,
            Err(err) => {
                tracing::warn!(supplier_id = %id, error = %err, "Catalog supplier lookup failed");
                None
            }
        };
        self.suppliers.insert(id, name.clone());
        name
    }

    async fn summarize(&mut self, lot: &Lot) -> LotSummary {
        let product = self.product(lot.product_variant_id).await;
        let supplier_name = match lot.supplier_id {
            Some(id) => self.supplier_name(id).await,
            None => None,
        };
        let (product_name, unit) = match product {
            Some(p) => (Some(p.name), p.unit),
            None => (None, None),
        };

        LotSummary {
            lot_id: lot.id,
            product_variant_id: lot.product_variant_id,
            batch_id: lot.batch_id,
            quantity_on_hand: lot.quantity_on_hand,
            cost_price: lot.costs.cost_price.to_output(),
            selling_price: lot.costs.selling_price.to_output(),
            stock_value: lot.stock_value().to_output(),
            expires_on: lot.expires_on,
            supplier_id: lot.supplier_id,
            grn_id: lot.grn_id,
            product_name,
            unit,
            supplier_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::catalog::{CatalogError, StaticCatalog};
    use crate::ledger::{IntakeInput, LotKey, OpenCarrierInput, PaymentMethod, ReasonCode, UnitCosts};
    use crate::mutation::MutationEngine;
    use crate::store::InMemoryLedgerStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use stockledger_shared::types::ActorId;

    struct FailingCatalog;

    #[async_trait]
    impl CatalogLookup for FailingCatalog {
        async fn product(&self, _id: ProductVariantId) -> Result<Option<ProductInfo>, CatalogError> {
            Err(CatalogError::Unavailable("connection refused".into()))
        }

        async fn supplier_name(&self, _id: SupplierId) -> Result<Option<String>, CatalogError> {
            Err(CatalogError::Unavailable("connection refused".into()))
        }
    }

    struct Fixture {
        mutations: MutationEngine<InMemoryLedgerStore>,
        store: Arc<InMemoryLedgerStore>,
        actor: ActorId,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(InMemoryLedgerStore::new());
            Self {
                mutations: MutationEngine::new(Arc::clone(&store)),
                store,
                actor: ActorId::new(),
            }
        }

        async fn lot(
            &self,
            variant: ProductVariantId,
            quantity: Decimal,
            cost: Decimal,
            supplier: Option<SupplierId>,
        ) -> LotId {
            let input = IntakeInput {
                key: LotKey {
                    product_variant_id: variant,
                    batch_name: format!("B-{}", LotId::new()),
                },
                quantity: dec!(1) + quantity,
                costs: UnitCosts {
                    cost_price: Money::new(cost),
                    ..UnitCosts::default()
                },
                manufactured_on: None,
                expires_on: None,
                supplier_id: supplier,
                grn_id: None,
            };
            let lot_id = self.mutations.apply_intake(&input, self.actor).await.unwrap();
            // Intake requires a positive quantity; take one back out to reach
            // the requested level, including zero.
            self.mutations
                .apply_consumption(lot_id, dec!(1), ReasonCode::Writeoff, self.actor)
                .await
                .unwrap();
            lot_id
        }

        fn engine(&self) -> AggregationEngine<InMemoryLedgerStore> {
            AggregationEngine::new(Arc::clone(&self.store))
        }
    }

    #[tokio::test]
    async fn test_low_stock_ordering() {
        let fx = Fixture::new();
        let mut ids = Vec::new();
        for qty in [dec!(3), dec!(10), dec!(20), dec!(0)] {
            ids.push(fx.lot(ProductVariantId::new(), qty, dec!(1), None).await);
        }

        let low = fx.engine().low_stock(dec!(15)).await.unwrap();
        let quantities: Vec<Decimal> = low.iter().map(|s| s.quantity_on_hand).collect();
        assert_eq!(quantities, vec![dec!(0), dec!(3), dec!(10)]);
        assert_eq!(low[0].lot_id, ids[3]);
    }

    #[tokio::test]
    async fn test_low_stock_decorates_from_catalog() {
        let fx = Fixture::new();
        let variant = ProductVariantId::new();
        let supplier = SupplierId::new();
        fx.lot(variant, dec!(2), dec!(3.335), Some(supplier)).await;

        let catalog = StaticCatalog::new()
            .with_product(
                variant,
                ProductInfo {
                    name: "Basmati Rice 5kg".to_string(),
                    unit: Some("bag".to_string()),
                    category: Some("Grocery".to_string()),
                },
            )
            .with_supplier(supplier, "Acme Foods");
        let engine = fx.engine().with_catalog(Arc::new(catalog));

        let low = engine.low_stock(dec!(5)).await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].product_name.as_deref(), Some("Basmati Rice 5kg"));
        assert_eq!(low[0].unit.as_deref(), Some("bag"));
        assert_eq!(low[0].supplier_name.as_deref(), Some("Acme Foods"));
        assert_eq!(low[0].stock_value, dec!(6.67));
    }

    #[tokio::test]
    async fn test_catalog_failure_degrades() {
        let fx = Fixture::new();
        fx.lot(ProductVariantId::new(), dec!(2), dec!(1), Some(SupplierId::new()))
            .await;
        let engine = fx.engine().with_catalog(Arc::new(FailingCatalog));

        let low = engine.low_stock(dec!(5)).await.unwrap();
        assert_eq!(low.len(), 1);
        assert!(low[0].product_name.is_none());
        assert!(low[0].supplier_name.is_none());

        let summary = engine.dashboard_summary().await.unwrap();
        assert_eq!(summary.category_count, 0);
        assert_eq!(summary.products_with_stock, 1);
    }

    #[tokio::test]
    async fn test_out_of_stock_groups_and_ages() {
        let fx = Fixture::new();
        let variant = ProductVariantId::new();
        let a = fx.lot(variant, dec!(0), dec!(1), None).await;
        let b = fx.lot(variant, dec!(0), dec!(1), None).await;
        fx.lot(variant, dec!(4), dec!(1), None).await;

        let made = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let mut input = IntakeInput {
            key: LotKey {
                product_variant_id: variant,
                batch_name: "DATED".to_string(),
            },
            quantity: dec!(1),
            costs: UnitCosts::default(),
            manufactured_on: Some(made),
            expires_on: None,
            supplier_id: None,
            grn_id: None,
        };
        let dated = fx.mutations.apply_intake(&input, fx.actor).await.unwrap();
        fx.mutations
            .apply_consumption(dated, dec!(1), ReasonCode::Sale, fx.actor)
            .await
            .unwrap();
        input.key.batch_name = "DATED-2".to_string();
        input.manufactured_on = NaiveDate::from_ymd_opt(2026, 1, 4);
        let dated_two = fx.mutations.apply_intake(&input, fx.actor).await.unwrap();
        fx.mutations
            .apply_consumption(dated_two, dec!(1), ReasonCode::Sale, fx.actor)
            .await
            .unwrap();

        let as_of = NaiveDate::from_ymd_opt(2026, 1, 11).unwrap();
        let groups = fx.engine().out_of_stock_as_of(as_of).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].lot_ids.len(), 4);
        assert!(groups[0].lot_ids.contains(&a));
        assert!(groups[0].lot_ids.contains(&b));
        // (10 + 7) / 2
        assert_eq!(groups[0].average_days_out_of_stock, Some(dec!(8.50)));
    }

    #[tokio::test]
    async fn test_out_of_stock_without_dates() {
        let fx = Fixture::new();
        fx.lot(ProductVariantId::new(), dec!(0), dec!(1), None).await;
        let groups = fx.engine().out_of_stock().await.unwrap();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].average_days_out_of_stock.is_none());
    }

    #[tokio::test]
    async fn test_dashboard_summary() {
        let fx = Fixture::new();
        let supplier = SupplierId::new();
        let rice = ProductVariantId::new();
        fx.lot(rice, dec!(3), dec!(0.333), Some(supplier)).await;
        fx.lot(rice, dec!(30), dec!(0.333), Some(supplier)).await;
        fx.lot(ProductVariantId::new(), dec!(0), dec!(5), Some(SupplierId::new()))
            .await;

        let customer = OwnerId::new();
        let invoice = OpenCarrierInput {
            kind: CarrierKind::CustomerCredit,
            owner_id: customer,
            reference: "INV-7".to_string(),
            opening: Money::new(dec!(120.005)),
        };
        fx.mutations.open_carrier(&invoice, fx.actor).await.unwrap();
        let grn = OpenCarrierInput {
            kind: CarrierKind::Grn,
            owner_id: supplier.into(),
            reference: "GRN-7".to_string(),
            opening: Money::new(dec!(900)),
        };
        let grn_id = fx.mutations.open_carrier(&grn, fx.actor).await.unwrap();
        fx.mutations
            .apply_settlement(grn_id, Money::new(dec!(250)), PaymentMethod::Cash, fx.actor)
            .await
            .unwrap();

        let summary = fx
            .engine()
            .with_low_stock_threshold(dec!(10))
            .dashboard_summary()
            .await
            .unwrap();
        assert_eq!(summary.products_with_stock, 1);
        assert_eq!(summary.total_stock_units, dec!(33));
        // 33 * 0.333 = 10.989, rounded once at the end
        assert_eq!(summary.total_stock_value, dec!(10.99));
        assert_eq!(summary.supplier_count, 1);
        assert_eq!(summary.low_stock_count, 2);
        assert_eq!(summary.out_of_stock_count, 1);
        assert_eq!(summary.outstanding_payables, dec!(650.00));
        assert_eq!(summary.outstanding_receivables, dec!(120.01));
    }

    #[tokio::test]
    async fn test_balance_snapshot_and_audit() {
        let fx = Fixture::new();
        let customer = OwnerId::new();
        for (reference, total) in [("INV-1", dec!(300)), ("INV-2", dec!(200))] {
            let input = OpenCarrierInput {
                kind: CarrierKind::CustomerCredit,
                owner_id: customer,
                reference: reference.to_string(),
                opening: Money::new(total),
            };
            fx.mutations.open_carrier(&input, fx.actor).await.unwrap();
        }

        let balances = fx.engine().balance_snapshot(customer).await.unwrap();
        assert_eq!(balances.len(), 2);
        assert_eq!(balances[0].reference, "INV-1");
        assert_eq!(balances[1].outstanding, dec!(200.00));

        let report = fx.engine().audit_carrier(balances[0].carrier_id).await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.transaction_count, 1);

        let lot = fx.lot(ProductVariantId::new(), dec!(7), dec!(1), None).await;
        let report = fx.engine().audit_lot(lot).await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.snapshot_value, dec!(7));
        assert_eq!(report.transaction_count, 2);

        assert!(matches!(
            fx.engine().audit_lot(LotId::new()).await,
            Err(LedgerError::LotNotFound(_))
        ));
    }
}
