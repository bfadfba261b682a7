//! Ledger domain: types, error taxonomy, and retry policy.
//!
//! This module defines the shared vocabulary of the ledger core:
//! - Lots, batches, and intake input
//! - Carriers and the carrier-kind rules
//! - Immutable ledger transactions
//! - The error taxonomy every operation returns
//! - Bounded retry for concurrency conflicts

pub mod error;
pub mod retry;
pub mod types;

pub use error::LedgerError;
pub use retry::RetryPolicy;
pub use types::{
    Batch, Carrier, CarrierKind, CarrierStatus, ConsumptionLine, IntakeInput, LedgerTransaction,
    Lot, LotKey, OpenCarrierInput, PaymentMethod, ReasonCode, RemainingBalance, StockMovement,
    Subject, UnitCosts,
};
