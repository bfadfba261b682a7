//! Aggregated stock and balance views.
//!
//! This module provides read-only views, each computed from a single
//! snapshot:
//! - Low-stock and out-of-stock lists
//! - Dashboard summary
//! - Per-owner balance listings and audit replays

pub mod catalog;
mod engine;
pub mod types;

pub use catalog::{CatalogError, CatalogLookup, NoCatalog, ProductInfo, StaticCatalog};
pub use engine::AggregationEngine;
pub use types::*;
