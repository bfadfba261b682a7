//! Typed IDs for type-safe entity references.
//!
//! Using typed IDs prevents accidentally passing a `LotId` where a `CarrierId` is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to generate typed ID wrappers.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random ID using UUID v7 (time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

typed_id!(LotId, "Unique identifier for a stock lot.");
typed_id!(BatchId, "Unique identifier for a receipt batch.");
typed_id!(
    CarrierId,
    "Unique identifier for a balance carrier (GRN, customer invoice, cash session)."
);
typed_id!(
    OwnerId,
    "Unique identifier for the party owning a carrier (supplier, customer, cashier)."
);
typed_id!(
    LedgerTransactionId,
    "Unique identifier for an immutable ledger transaction."
);
typed_id!(ProductVariantId, "Unique identifier for a product variant.");
typed_id!(SupplierId, "Unique identifier for a supplier.");
typed_id!(ActorId, "Unique identifier for the user performing a mutation.");

impl From<SupplierId> for OwnerId {
    fn from(id: SupplierId) -> Self {
        Self(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_typed_id_roundtrips_through_uuid() {
        let uuid = Uuid::new_v4();
        let id = LotId::from_uuid(uuid);
        assert_eq!(id.into_inner(), uuid);
        assert_eq!(id.to_string(), uuid.to_string());
        assert_eq!(LotId::from_str(&uuid.to_string()).unwrap(), id);
    }

    #[test]
    fn test_invalid_id_fails_to_parse() {
        assert!(CarrierId::from_str("not-a-uuid").is_err());
    }

    #[test]
    fn test_supplier_becomes_owner() {
        let supplier = SupplierId::new();
        let owner: OwnerId = supplier.into();
        assert_eq!(owner.into_inner(), supplier.into_inner());
    }
}
