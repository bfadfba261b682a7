//! Ledger core for StockLedger.
//!
//! This crate contains the logic that mutates stock quantities and running
//! balances under concurrent access. It has ZERO web or database dependencies;
//! persistence sits behind the [`store::LedgerStore`] trait.
//!
//! # Modules
//!
//! - `ledger` - Domain types, error taxonomy, retry policy
//! - `store` - Persistence boundary and the in-memory store
//! - `mutation` - Quantity and balance mutations under row locks
//! - `reconciliation` - Outstanding balances, multi-carrier settlement, cash sessions
//! - `aggregation` - Read-only snapshot views: low stock, out of stock, dashboard, audit

pub mod aggregation;
pub mod ledger;
pub mod mutation;
pub mod reconciliation;
pub mod store;
