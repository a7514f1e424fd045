use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::catalog::PRICE_SCALE;

/// Write-once proof that a gateway order has been consumed.
/// At most one exists per `gateway_order_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SettlementRecord {
    pub id: Uuid,
    pub gateway_order_id: String,
    pub buyer_id: String,
    pub product_id: String,
    pub seller_id: String,
    pub amount: Decimal,
    pub currency: String,
    /// Amount credited to the seller after commission
    pub seller_credit: Decimal,
    pub payer_name: Option<String>,
    pub payer_email: Option<String>,
    pub settled_at: DateTime<Utc>,
}

impl SettlementRecord {
    pub fn from_request(request: &SettlementRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            gateway_order_id: request.gateway_order_id.clone(),
            buyer_id: request.buyer_id.clone(),
            product_id: request.product_id.clone(),
            seller_id: request.seller_id.clone(),
            amount: request.amount,
            currency: request.currency.clone(),
            seller_credit: request.seller_credit(),
            payer_name: request.payer_name.clone(),
            payer_email: request.payer_email.clone(),
            settled_at: Utc::now(),
        }
    }
}

///Seller balance entity
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SellerBalance {
    pub seller_id: String,
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Everything the ledger needs to settle one verified order
#[derive(Debug, Clone)]
pub struct SettlementRequest {
    pub gateway_order_id: String,
    pub buyer_id: String,
    pub product_id: String,
    pub seller_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub commission_rate: Decimal,
    pub payer_name: Option<String>,
    pub payer_email: Option<String>,
}

impl SettlementRequest {
    /// `amount * (1 - commission_rate)` in currency minor units, banker's rounding
    pub fn seller_credit(&self) -> Decimal {
        let mut credit = (self.amount * (Decimal::ONE - self.commission_rate))
            .round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointNearestEven);
        credit.rescale(PRICE_SCALE);
        credit
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    Created(SettlementRecord),
    /// The order was already consumed; carries the existing record
    AlreadyExists(SettlementRecord),
}

#[cfg(test)]
impl SettlementOutcome {
    pub fn record(&self) -> &SettlementRecord {
        match self {
            SettlementOutcome::Created(r) | SettlementOutcome::AlreadyExists(r) => r,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, SettlementOutcome::Created(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(amount: Decimal, rate: Decimal) -> SettlementRequest {
        SettlementRequest {
            gateway_order_id: "o".into(),
            buyer_id: "b".into(),
            product_id: "p".into(),
            seller_id: "s".into(),
            amount,
            currency: "USD".into(),
            commission_rate: rate,
            payer_name: None,
            payer_email: None,
        }
    }

    #[test]
    fn test_commission_arithmetic() {
        assert_eq!(request(dec!(100.00), dec!(0.30)).seller_credit(), dec!(70.00));
        assert_eq!(request(dec!(100.00), dec!(0.30)).seller_credit().to_string(), "70.00");
        assert_eq!(request(dec!(19.99), dec!(0.30)).seller_credit(), dec!(13.99));
        assert_eq!(request(dec!(10.00), dec!(0)).seller_credit(), dec!(10.00));
    }

    #[test]
    fn test_credit_uses_bankers_rounding() {
        // 0.05 * 0.7 = 0.035 -> 0.04 (even), 0.15 * 0.7 = 0.105 -> 0.10 (even)
        assert_eq!(request(dec!(0.05), dec!(0.30)).seller_credit(), dec!(0.04));
        assert_eq!(request(dec!(0.15), dec!(0.30)).seller_credit(), dec!(0.10));
    }
}
