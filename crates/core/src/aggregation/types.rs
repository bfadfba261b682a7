//! Aggregation output types.
//!
//! Money fields here have already crossed the output boundary and carry
//! exactly two decimal places.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use stockledger_shared::types::{BatchId, CarrierId, LotId, ProductVariantId, SupplierId};

use crate::ledger::{CarrierKind, CarrierStatus, Subject};

/// A lot decorated for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotSummary {
    /// Lot ID.
    pub lot_id: LotId,
    /// Product variant.
    pub product_variant_id: ProductVariantId,
    /// Batch.
    pub batch_id: BatchId,
    /// Quantity on hand.
    pub quantity_on_hand: Decimal,
    /// Cost price per unit.
    pub cost_price: Decimal,
    /// Selling price per unit.
    pub selling_price: Decimal,
    /// Cost price times quantity.
    pub stock_value: Decimal,
    /// Expiry date.
    pub expires_on: Option<NaiveDate>,
    /// Supplier of the latest intake.
    pub supplier_id: Option<SupplierId>,
    /// GRN of the latest intake.
    pub grn_id: Option<CarrierId>,
    /// Product name, when the catalog knows it.
    pub product_name: Option<String>,
    /// Unit of measure, when the catalog knows it.
    pub unit: Option<String>,
    /// Supplier name, when the catalog knows it.
    pub supplier_name: Option<String>,
}

/// Out-of-stock lots of one product variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutOfStockGroup {
    /// Product variant.
    pub product_variant_id: ProductVariantId,
    /// Product name, when the catalog knows it.
    pub product_name: Option<String>,
    /// Empty lots of this variant.
    pub lot_ids: Vec<LotId>,
    /// Average days from manufacture to the reference date, over lots with
    /// a manufacture date. `None` if no lot has one.
    pub average_days_out_of_stock: Option<Decimal>,
}

/// Store-wide stock and balance figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    /// Distinct product variants with stock on hand.
    pub products_with_stock: usize,
    /// Total units on hand.
    pub total_stock_units: Decimal,
    /// Total stock value at cost.
    pub total_stock_value: Decimal,
    /// Distinct suppliers of lots with stock on hand.
    pub supplier_count: usize,
    /// Distinct categories of products with stock on hand, as far as the
    /// catalog knows them.
    pub category_count: usize,
    /// Lots under the low-stock threshold.
    pub low_stock_count: usize,
    /// Lots with nothing on hand.
    pub out_of_stock_count: usize,
    /// Outstanding on open GRNs.
    pub outstanding_payables: Decimal,
    /// Outstanding on open customer credit.
    pub outstanding_receivables: Decimal,
    /// When the summary was read.
    pub generated_at: DateTime<Utc>,
}

/// A carrier's balance for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CarrierBalance {
    /// Carrier ID.
    pub carrier_id: CarrierId,
    /// Kind.
    pub kind: CarrierKind,
    /// Reference.
    pub reference: String,
    /// Opening value.
    pub opening: Decimal,
    /// Accrued value.
    pub accrued: Decimal,
    /// Settled value.
    pub settled: Decimal,
    /// Outstanding balance.
    pub outstanding: Decimal,
    /// Status.
    pub status: CarrierStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Snapshot value versus replayed transactions for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    /// Audited subject.
    pub subject: Subject,
    /// Value stored on the record.
    pub snapshot_value: Decimal,
    /// Sum of the subject's transaction deltas.
    pub replayed_value: Decimal,
    /// Number of transactions replayed.
    pub transaction_count: usize,
    /// `snapshot_value - replayed_value`.
    pub drift: Decimal,
}

impl AuditReport {
    /// Returns true if the record matches its transactions exactly.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.drift.is_zero()
    }
}
