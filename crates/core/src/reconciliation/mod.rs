//! Reconciliation of carrier balances.
//!
//! GRN payables, customer credit and cash sessions share one settlement path;
//! the per-kind rules live on [`crate::ledger::CarrierKind`].

pub mod allocation;
mod service;
pub mod types;

pub use allocation::{AllocationShare, allocate_oldest_first};
pub use service::ReconciliationService;
pub use types::{AllocationResult, SessionBreakdown, SessionClosing, SettlementTarget};
