//! Shared types, errors, and configuration for StockLedger.
//!
//! This crate provides common types used across all other crates:
//! - Money type with fixed-point precision and a two-decimal output boundary
//! - Typed IDs for type-safe entity references
//! - Application-wide error types
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
