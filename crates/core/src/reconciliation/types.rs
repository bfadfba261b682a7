//! Reconciliation request and result types.

use serde::{Deserialize, Serialize};
use stockledger_shared::types::{CarrierId, Money, OwnerId};

use crate::ledger::{CarrierKind, RemainingBalance};

/// What a settlement is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementTarget {
    /// One specific carrier.
    Carrier(CarrierId),
    /// Every open carrier of an owner, oldest first.
    Owner {
        /// The owner.
        owner_id: OwnerId,
        /// Which carriers of the owner.
        kind: CarrierKind,
    },
}

/// Outcome of a settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationResult {
    /// Carriers touched, in allocation order.
    pub allocations: Vec<RemainingBalance>,
    /// Total amount applied across all carriers.
    pub total_applied: Money,
}

impl AllocationResult {
    /// Outstanding left on the carriers touched by this settlement.
    #[must_use]
    pub fn remaining_outstanding(&self) -> Money {
        self.allocations.iter().map(|a| a.outstanding).sum()
    }
}

/// Cash session totals derived from its transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionBreakdown {
    /// Float at opening.
    pub opening: Money,
    /// Cash sales recorded.
    pub cash_sales: Money,
    /// Cash put into the drawer.
    pub cash_in: Money,
    /// Cash taken out of the drawer.
    pub cash_out: Money,
}

impl SessionBreakdown {
    /// `opening + cash_sales + cash_in - cash_out`.
    #[must_use]
    pub fn expected(&self) -> Money {
        self.opening + self.cash_sales + self.cash_in - self.cash_out
    }
}

/// Result of closing a cash session against a counted drawer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionClosing {
    /// The session.
    pub session_id: CarrierId,
    /// Cash the drawer should hold.
    pub expected: Money,
    /// Cash counted in the drawer.
    pub counted: Money,
    /// `counted - expected`; negative means a shortage.
    pub variance: Money,
}
