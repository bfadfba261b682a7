//! Database layer for the ledger core.
//!
//! This crate provides:
//! - `SeaORM` entity definitions for batches, lots, carriers and transactions
//! - [`PgLedgerStore`], the PostgreSQL implementation of the ledger store
//! - Database migrations

#[allow(missing_docs)]
pub mod entities;
pub mod migration;
pub mod store;

pub use migration::Migrator;
pub use store::{PgLedgerStore, PgLedgerTx, PgSnapshot};

use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use stockledger_shared::config::DatabaseConfig;

/// Establishes a connection to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    Database::connect(database_url).await
}

/// Establishes a pooled connection sized from configuration.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect_with_config(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(8))
        .sqlx_logging(false);

    tracing::debug!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Connecting to database"
    );
    Database::connect(options).await
}
