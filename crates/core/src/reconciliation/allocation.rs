//! Oldest-first allocation of a payment across carriers.
//!
//! The plan is computed from carriers already locked and read inside the
//! settling unit, so the outstanding balances it sees cannot change before
//! the writes land.

use stockledger_shared::types::{CarrierId, Money};

use crate::ledger::{Carrier, LedgerError};

/// One carrier's share of an allocated payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationShare {
    /// Carrier receiving the share.
    pub carrier_id: CarrierId,
    /// Amount applied to it.
    pub amount: Money,
}

/// Splits `amount` across `carriers` in the given order.
///
/// Each carrier absorbs as much as its outstanding balance allows before the
/// next one is touched. Carriers with nothing outstanding get no share. The
/// shares sum exactly to `amount`.
///
/// # Errors
///
/// Returns `Overpayment` if `amount` exceeds the combined outstanding balance.
pub fn allocate_oldest_first(
    carriers: &[Carrier],
    amount: Money,
) -> Result<Vec<AllocationShare>, LedgerError> {
    let total_outstanding: Money = carriers.iter().map(Carrier::outstanding).sum();
    if amount > total_outstanding {
        return Err(LedgerError::Overpayment {
            requested: amount,
            outstanding: total_outstanding,
        });
    }

    let mut remaining = amount;
    let mut shares = Vec::new();
    for carrier in carriers {
        if remaining.is_zero() {
            break;
        }
        let share = remaining.min(carrier.outstanding());
        if share.is_positive() {
            shares.push(AllocationShare {
                carrier_id: carrier.id,
                amount: share,
            });
            remaining -= share;
        }
    }

    Ok(shares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{CarrierKind, CarrierStatus};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use stockledger_shared::types::OwnerId;

    fn invoice(opening: Decimal, settled: Decimal) -> Carrier {
        let now = Utc::now();
        Carrier {
            id: CarrierId::new(),
            kind: CarrierKind::CustomerCredit,
            owner_id: OwnerId::new(),
            reference: "INV".to_string(),
            opening: Money::new(opening),
            accrued: Money::ZERO,
            settled: Money::new(settled),
            status: CarrierStatus::Open,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_fills_oldest_first() {
        let carriers = [invoice(dec!(300), dec!(0)), invoice(dec!(200), dec!(0))];
        let shares = allocate_oldest_first(&carriers, Money::new(dec!(400))).unwrap();

        assert_eq!(shares.len(), 2);
        assert_eq!(shares[0].carrier_id, carriers[0].id);
        assert_eq!(shares[0].amount, Money::new(dec!(300)));
        assert_eq!(shares[1].amount, Money::new(dec!(100)));
    }

    #[test]
    fn test_stops_when_paid() {
        let carriers = [invoice(dec!(300), dec!(0)), invoice(dec!(200), dec!(0))];
        let shares = allocate_oldest_first(&carriers, Money::new(dec!(120.50))).unwrap();
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].amount, Money::new(dec!(120.50)));
    }

    #[test]
    fn test_skips_fully_paid_carriers() {
        let carriers = [invoice(dec!(300), dec!(300)), invoice(dec!(200), dec!(50))];
        let shares = allocate_oldest_first(&carriers, Money::new(dec!(150))).unwrap();
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].carrier_id, carriers[1].id);
    }

    #[test]
    fn test_remainder_is_overpayment() {
        let carriers = [invoice(dec!(300), dec!(300)), invoice(dec!(200), dec!(100))];
        match allocate_oldest_first(&carriers, Money::new(dec!(150))) {
            Err(LedgerError::Overpayment {
                requested,
                outstanding,
            }) => {
                assert_eq!(requested, Money::new(dec!(150)));
                assert_eq!(outstanding, Money::new(dec!(100)));
            }
            other => panic!("expected Overpayment, got {other:?}"),
        }
    }

    #[test]
    fn test_no_carriers_is_overpayment() {
        assert!(matches!(
            allocate_oldest_first(&[], Money::new(dec!(1))),
            Err(LedgerError::Overpayment { .. })
        ));
    }
}
