//! Business rules checked before and under lock.
//!
//! Request checks (`check_intake`, `check_consumption_request`, ...) look only
//! at caller input. Lock checks (`check_stock`, `check_payable`,
//! `check_settlement`, `check_accrual`) must run on the row as read inside
//! the lock that the following write will use.

use rust_decimal::Decimal;
use stockledger_shared::types::Money;

use crate::ledger::{
    Carrier, CarrierStatus, ConsumptionLine, IntakeInput, LedgerError, Lot, OpenCarrierInput,
    ReasonCode,
};

/// Validates an intake request.
///
/// # Errors
///
/// Returns `Validation` for a non-positive quantity, a negative price, a blank
/// batch name, or an expiry before manufacture.
pub fn check_intake(input: &IntakeInput) -> Result<(), LedgerError> {
    if input.quantity <= Decimal::ZERO {
        return Err(LedgerError::validation(format!(
            "intake quantity must be positive, got {}",
            input.quantity
        )));
    }
    if input.key.batch_name.trim().is_empty() {
        return Err(LedgerError::validation("batch name must not be empty"));
    }

    let costs = &input.costs;
    for (name, price) in [
        ("cost_price", costs.cost_price),
        ("mrp", costs.mrp),
        ("selling_price", costs.selling_price),
        ("wholesale_price", costs.wholesale_price),
    ] {
        if price.is_negative() {
            return Err(LedgerError::validation(format!(
                "{name} must not be negative, got {price}"
            )));
        }
    }

    if let (Some(made), Some(expires)) = (input.manufactured_on, input.expires_on) {
        if expires < made {
            return Err(LedgerError::validation(format!(
                "expiry {expires} precedes manufacture {made}"
            )));
        }
    }

    Ok(())
}

/// Validates a consumption request.
///
/// # Errors
///
/// Returns `Validation` for a non-positive quantity or a reason that does not
/// deduct stock.
pub fn check_consumption_request(quantity: Decimal, reason: ReasonCode) -> Result<(), LedgerError> {
    if quantity <= Decimal::ZERO {
        return Err(LedgerError::validation(format!(
            "consumption quantity must be positive, got {quantity}"
        )));
    }
    if !reason.is_consumption() {
        return Err(LedgerError::validation(format!(
            "{} is not a consumption reason",
            reason.as_str()
        )));
    }
    Ok(())
}

/// Validates a multi-line consumption request.
///
/// # Errors
///
/// Returns `Validation` for an empty basket or any invalid line.
pub fn check_consumption_lines(
    lines: &[ConsumptionLine],
    reason: ReasonCode,
) -> Result<(), LedgerError> {
    if lines.is_empty() {
        return Err(LedgerError::validation("consumption needs at least one line"));
    }
    lines
        .iter()
        .try_for_each(|line| check_consumption_request(line.quantity, reason))
}

/// Checks a locked lot can give up `quantity`, returning what remains.
///
/// # Errors
///
/// Returns `InsufficientStock` if the lot holds less than requested.
pub fn check_stock(lot: &Lot, quantity: Decimal) -> Result<Decimal, LedgerError> {
    if quantity > lot.quantity_on_hand {
        return Err(LedgerError::InsufficientStock {
            lot_id: lot.id,
            requested: quantity,
            available: lot.quantity_on_hand,
        });
    }
    Ok(lot.quantity_on_hand - quantity)
}

/// Validates a carrier opening.
///
/// # Errors
///
/// Returns `Validation` for a negative opening, or a zero opening on a kind
/// that requires a positive one.
pub fn check_opening(input: &OpenCarrierInput) -> Result<(), LedgerError> {
    if input.opening.is_negative() {
        return Err(LedgerError::validation(format!(
            "opening value must not be negative, got {}",
            input.opening
        )));
    }
    if input.kind.requires_positive_opening() && input.opening.is_zero() {
        return Err(LedgerError::validation(format!(
            "{} must open with a positive value",
            input.kind
        )));
    }
    Ok(())
}

/// Validates that an amount is strictly positive.
///
/// # Errors
///
/// Returns `Validation` otherwise.
pub fn check_amount(amount: Money) -> Result<(), LedgerError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(LedgerError::validation(format!(
            "amount must be positive, got {}",
            amount.amount()
        )))
    }
}

fn check_not_closed(carrier: &Carrier) -> Result<(), LedgerError> {
    if carrier.status == CarrierStatus::Closed {
        return Err(LedgerError::CarrierClosed(carrier.id));
    }
    Ok(())
}

/// Checks a locked carrier can absorb a settlement of `amount`.
///
/// # Errors
///
/// Returns `CarrierClosed` for a closed carrier and `Overpayment` if `amount`
/// exceeds the outstanding balance.
pub fn check_settlement(carrier: &Carrier, amount: Money) -> Result<(), LedgerError> {
    check_not_closed(carrier)?;
    let outstanding = carrier.outstanding();
    if amount > outstanding {
        return Err(LedgerError::Overpayment {
            requested: amount,
            outstanding,
        });
    }
    Ok(())
}

/// Checks a carrier kind can be paid down by a settlement.
///
/// Cash sessions are drawn down only through a cash-out.
///
/// # Errors
///
/// Returns `Validation` for a carrier kind that does not settle to zero.
pub fn check_payable(carrier: &Carrier) -> Result<(), LedgerError> {
    if carrier.kind.settles_to_zero() {
        return Ok(());
    }
    Err(LedgerError::validation(format!(
        "{} {} is drawn down by cash-out, not settled",
        carrier.kind, carrier.id
    )))
}

/// Checks a locked carrier can accrue value under `reason`.
///
/// # Errors
///
/// Returns `CarrierClosed` for a carrier that is not open, and `Validation`
/// when the kind does not accrue or the reason is not an accrual.
pub fn check_accrual(carrier: &Carrier, reason: ReasonCode) -> Result<(), LedgerError> {
    if !carrier.is_open() {
        return Err(LedgerError::CarrierClosed(carrier.id));
    }
    if !carrier.kind.allows_accrual() {
        return Err(LedgerError::validation(format!(
            "{} carriers do not accept accruals",
            carrier.kind
        )));
    }
    if !reason.is_accrual() {
        return Err(LedgerError::validation(format!(
            "{} is not an accrual reason",
            reason.as_str()
        )));
    }
    Ok(())
}
