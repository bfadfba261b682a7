//! `SeaORM` entities for the ledger schema.

pub mod batches;
pub mod carriers;
pub mod ledger_transactions;
pub mod lots;

pub mod prelude {
    //! Entity aliases.
    pub use super::batches::Entity as Batches;
    pub use super::carriers::Entity as Carriers;
    pub use super::ledger_transactions::Entity as LedgerTransactions;
    pub use super::lots::Entity as Lots;
}
