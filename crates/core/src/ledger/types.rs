//! Ledger domain types: lots, batches, carriers, and audit transactions.
//!
//! Quantities and money are `Decimal` throughout; nothing in this module
//! rounds. See `stockledger_shared::types::Money::to_output` for the output
//! boundary.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stockledger_shared::types::{
    ActorId, BatchId, CarrierId, LedgerTransactionId, LotId, Money, OwnerId, ProductVariantId,
    SupplierId,
};
use uuid::Uuid;

/// Per-unit prices recorded on a lot at intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnitCosts {
    /// Purchase cost per unit; drives stock valuation.
    pub cost_price: Money,
    /// Maximum retail price printed on the pack.
    pub mrp: Money,
    /// Retail selling price per unit.
    pub selling_price: Money,
    /// Wholesale selling price per unit.
    pub wholesale_price: Money,
}

/// Identity used by intake to find or create a lot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LotKey {
    /// The product variant received.
    pub product_variant_id: ProductVariantId,
    /// Name of the receipt batch; created on first use.
    pub batch_name: String,
}

/// Input for a goods intake.
#[derive(Debug, Clone)]
pub struct IntakeInput {
    /// Which lot the goods land in.
    pub key: LotKey,
    /// Quantity received (must be positive).
    pub quantity: Decimal,
    /// Unit prices for this receipt.
    pub costs: UnitCosts,
    /// Manufacture date, if printed.
    pub manufactured_on: Option<NaiveDate>,
    /// Expiry date, if printed.
    pub expires_on: Option<NaiveDate>,
    /// Supplier the goods came from.
    pub supplier_id: Option<SupplierId>,
    /// Goods received note the intake belongs to.
    pub grn_id: Option<CarrierId>,
}

/// A named grouping of lots sharing a receipt event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Batch ID.
    pub id: BatchId,
    /// Unique batch name.
    pub name: String,
    /// When the batch was first referenced.
    pub created_at: DateTime<Utc>,
}

/// A receipt-specific quantity of one product variant.
///
/// Lots are never deleted once referenced by a transaction; the quantity may
/// reach zero but the record stays for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    /// Lot ID.
    pub id: LotId,
    /// Product variant held in this lot.
    pub product_variant_id: ProductVariantId,
    /// Batch the lot was received under.
    pub batch_id: BatchId,
    /// Quantity currently on hand. Never negative.
    pub quantity_on_hand: Decimal,
    /// Unit prices from the latest intake.
    pub costs: UnitCosts,
    /// Manufacture date.
    pub manufactured_on: Option<NaiveDate>,
    /// Expiry date.
    pub expires_on: Option<NaiveDate>,
    /// Supplier of the latest intake.
    pub supplier_id: Option<SupplierId>,
    /// GRN of the latest intake.
    pub grn_id: Option<CarrierId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Lot {
    /// Stock value of this lot at cost, unrounded.
    #[must_use]
    pub fn stock_value(&self) -> Money {
        self.costs.cost_price.times(self.quantity_on_hand)
    }

    /// Returns true if nothing is left on hand.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quantity_on_hand.is_zero()
    }
}

/// What kind of obligation a carrier tracks.
///
/// The kind supplies the per-feature rules that used to be re-derived in each
/// controller: whether value may accrue after opening, which reason a
/// settlement records, and whether reaching zero settles the carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarrierKind {
    /// Goods received note payable to a supplier.
    Grn,
    /// Customer credit invoice receivable.
    CustomerCredit,
    /// Cash drawer session: float plus cash sales and cash-in, minus cash-out.
    CashSession,
}

impl CarrierKind {
    /// Returns true if value may be added after opening.
    #[must_use]
    pub const fn allows_accrual(self) -> bool {
        matches!(self, Self::CashSession)
    }

    /// Returns true if reaching zero outstanding flips the carrier to settled.
    ///
    /// Cash sessions are closed explicitly, never paid down.
    #[must_use]
    pub const fn settles_to_zero(self) -> bool {
        !matches!(self, Self::CashSession)
    }

    /// Returns true if the opening value must be strictly positive.
    #[must_use]
    pub const fn requires_positive_opening(self) -> bool {
        !matches!(self, Self::CashSession)
    }

    /// Reason code recorded when value leaves this carrier.
    #[must_use]
    pub const fn settlement_reason(self) -> ReasonCode {
        match self {
            Self::Grn | Self::CustomerCredit => ReasonCode::Payment,
            Self::CashSession => ReasonCode::CashOut,
        }
    }

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Grn => "grn",
            Self::CustomerCredit => "customer_credit",
            Self::CashSession => "cash_session",
        }
    }
}

impl std::fmt::Display for CarrierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CarrierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grn" => Ok(Self::Grn),
            "customer_credit" => Ok(Self::CustomerCredit),
            "cash_session" => Ok(Self::CashSession),
            _ => Err(format!("Unknown carrier kind: {s}")),
        }
    }
}

/// Carrier lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarrierStatus {
    /// Accepting accruals and settlements.
    Open,
    /// Outstanding reached exactly zero.
    Settled,
    /// Closed explicitly; no further mutation.
    Closed,
}

impl CarrierStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Settled => "settled",
            Self::Closed => "closed",
        }
    }
}

impl std::str::FromStr for CarrierStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "settled" => Ok(Self::Settled),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Unknown carrier status: {s}")),
        }
    }
}

/// Anything tracking an outstanding balance.
///
/// `outstanding = opening + accrued - settled`, and
/// `0 <= settled <= opening + accrued` at every committed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Carrier {
    /// Carrier ID.
    pub id: CarrierId,
    /// Carrier kind.
    pub kind: CarrierKind,
    /// Supplier, customer, or cashier owning the carrier.
    pub owner_id: OwnerId,
    /// Human reference (GRN number, invoice number, terminal).
    pub reference: String,
    /// Value at opening.
    pub opening: Money,
    /// Value added after opening.
    pub accrued: Money,
    /// Value settled so far.
    pub settled: Money,
    /// Lifecycle status.
    pub status: CarrierStatus,
    /// Creation time; allocation runs oldest first.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Carrier {
    /// Outstanding balance.
    #[must_use]
    pub fn outstanding(&self) -> Money {
        self.opening + self.accrued - self.settled
    }

    /// Upper bound on `settled`.
    #[must_use]
    pub fn limit(&self) -> Money {
        self.opening + self.accrued
    }

    /// Returns true if the carrier accepts mutations.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == CarrierStatus::Open
    }
}

/// Input for opening a carrier.
#[derive(Debug, Clone)]
pub struct OpenCarrierInput {
    /// Carrier kind.
    pub kind: CarrierKind,
    /// Owning party.
    pub owner_id: OwnerId,
    /// Human reference.
    pub reference: String,
    /// Opening value.
    pub opening: Money,
}

/// The record a ledger transaction is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Subject {
    /// A stock lot.
    Lot(LotId),
    /// A balance carrier.
    Carrier(CarrierId),
}

impl Subject {
    /// Storage representation of the subject kind.
    #[must_use]
    pub const fn kind_str(self) -> &'static str {
        match self {
            Self::Lot(_) => "lot",
            Self::Carrier(_) => "carrier",
        }
    }

    /// The subject's raw identifier.
    #[must_use]
    pub const fn uuid(self) -> Uuid {
        match self {
            Self::Lot(id) => id.into_inner(),
            Self::Carrier(id) => id.into_inner(),
        }
    }

    /// Rebuilds a subject from its storage columns.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown kind.
    pub fn from_parts(kind: &str, id: Uuid) -> Result<Self, String> {
        match kind {
            "lot" => Ok(Self::Lot(LotId::from_uuid(id))),
            "carrier" => Ok(Self::Carrier(CarrierId::from_uuid(id))),
            _ => Err(format!("Unknown subject kind: {kind}")),
        }
    }
}

/// Why a quantity or balance changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Goods received into a lot.
    Intake,
    /// POS sale deduction.
    Sale,
    /// Damage or other non-sale deduction.
    Writeoff,
    /// Opening value of a carrier.
    CarrierOpened,
    /// Cash sale added to a cash session.
    CashSale,
    /// Cash put into the drawer.
    CashIn,
    /// Payment settling a GRN or customer invoice.
    Payment,
    /// Cash taken out of the drawer.
    CashOut,
}

impl ReasonCode {
    /// Returns true if the reason deducts stock.
    #[must_use]
    pub const fn is_consumption(self) -> bool {
        matches!(self, Self::Sale | Self::Writeoff)
    }

    /// Returns true if the reason adds value to an open carrier.
    #[must_use]
    pub const fn is_accrual(self) -> bool {
        matches!(self, Self::CashSale | Self::CashIn)
    }

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Sale => "sale",
            Self::Writeoff => "writeoff",
            Self::CarrierOpened => "carrier_opened",
            Self::CashSale => "cash_sale",
            Self::CashIn => "cash_in",
            Self::Payment => "payment",
            Self::CashOut => "cash_out",
        }
    }
}

impl std::str::FromStr for ReasonCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intake" => Ok(Self::Intake),
            "sale" => Ok(Self::Sale),
            "writeoff" => Ok(Self::Writeoff),
            "carrier_opened" => Ok(Self::CarrierOpened),
            "cash_sale" => Ok(Self::CashSale),
            "cash_in" => Ok(Self::CashIn),
            "payment" => Ok(Self::Payment),
            "cash_out" => Ok(Self::CashOut),
            _ => Err(format!("Unknown reason code: {s}")),
        }
    }
}

/// How a settlement was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Cash.
    Cash,
    /// Card terminal.
    Card,
    /// Bank transfer.
    BankTransfer,
    /// Cheque.
    Cheque,
}

impl PaymentMethod {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Card => "card",
            Self::BankTransfer => "bank_transfer",
            Self::Cheque => "cheque",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(Self::Cash),
            "card" => Ok(Self::Card),
            "bank_transfer" => Ok(Self::BankTransfer),
            "cheque" => Ok(Self::Cheque),
            _ => Err(format!("Unknown payment method: {s}")),
        }
    }
}

/// Immutable audit record of one mutation.
///
/// Summing a subject's deltas reproduces its snapshot value: quantity on hand
/// for a lot, outstanding for a carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Transaction ID.
    pub id: LedgerTransactionId,
    /// What changed.
    pub subject: Subject,
    /// Signed change.
    pub delta: Decimal,
    /// Why it changed.
    pub reason: ReasonCode,
    /// Payment method, for settlements.
    pub method: Option<PaymentMethod>,
    /// Who changed it.
    pub actor: ActorId,
    /// When it was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl LedgerTransaction {
    /// Creates a new transaction stamped now.
    #[must_use]
    pub fn record(
        subject: Subject,
        delta: Decimal,
        reason: ReasonCode,
        method: Option<PaymentMethod>,
        actor: ActorId,
    ) -> Self {
        Self {
            id: LedgerTransactionId::new(),
            subject,
            delta,
            reason,
            method,
            actor,
            recorded_at: Utc::now(),
        }
    }
}

/// Result of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockMovement {
    /// Lot that moved.
    pub lot_id: LotId,
    /// Signed change applied.
    pub delta: Decimal,
    /// Quantity on hand after the movement.
    pub quantity_on_hand: Decimal,
}

/// One line of a multi-line consumption (a POS basket).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumptionLine {
    /// Lot to deduct from.
    pub lot_id: LotId,
    /// Quantity to deduct.
    pub quantity: Decimal,
}

/// Balance of a carrier after a settlement or accrual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemainingBalance {
    /// Carrier touched.
    pub carrier_id: CarrierId,
    /// Amount applied by this call.
    pub applied: Money,
    /// Outstanding after the call.
    pub outstanding: Money,
    /// Status after the call.
    pub status: CarrierStatus,
}
