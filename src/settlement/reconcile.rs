use std::str::FromStr;

use rust_decimal::Decimal;

use crate::catalog::{normalize_price, ProductExpectation};
use crate::error::ReconciliationError;
use crate::gateway::{Order, OrderStatus};

/// Payment facts that passed reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledPayment {
    /// Held at currency minor units
    pub amount: Decimal,
    pub currency: String,
}

/// Check the gateway's view of an order against the expected sale.
///
/// Status is checked first, so an unaccepted order is rejected whatever it
/// claims to have paid. Amounts compare numerically after parsing the
/// gateway's decimal string: `"19.990"` matches `19.99`, `"19.991"` does not.
pub fn reconcile(
    order: &Order,
    expected: &ProductExpectation,
    accepted: &[OrderStatus],
) -> Result<ReconciledPayment, ReconciliationError> {
    if !accepted.contains(&order.status) {
        return Err(ReconciliationError::StatusNotAccepted(order.status.to_string()));
    }

    let raw_amount = order
        .amount
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or(ReconciliationError::MissingAmount)?;

    let amount_mismatch = || ReconciliationError::AmountMismatch {
        expected: expected.expected_amount.to_string(),
        paid: raw_amount.to_string(),
    };

    let paid = Decimal::from_str(raw_amount).map_err(|_| amount_mismatch())?;
    if paid != expected.expected_amount {
        return Err(amount_mismatch());
    }

    let currency = order
        .currency
        .as_deref()
        .map(|c| c.trim().to_ascii_uppercase())
        .unwrap_or_default();
    if currency != expected.expected_currency {
        return Err(ReconciliationError::CurrencyMismatch {
            expected: expected.expected_currency.clone(),
            paid: currency,
        });
    }

    Ok(ReconciledPayment {
        amount: normalize_price(paid),
        currency,
    })
}
