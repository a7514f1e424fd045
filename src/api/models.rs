use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::settlement::VerifiedPayment;

// ========== RESPONSE MODELS ==========

/// Buyer identity as reported by the gateway
#[derive(Debug, Serialize)]
pub struct BuyerResponse {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Successful verification. Amounts serialize as decimal strings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub order_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub buyer: BuyerResponse,
    pub settlement_id: Uuid,
    pub already_settled: bool,
}

impl From<VerifiedPayment> for VerifyPaymentResponse {
    fn from(payment: VerifiedPayment) -> Self {
        Self {
            success: true,
            order_id: payment.order_id,
            amount: payment.amount,
            currency: payment.currency,
            buyer: BuyerResponse {
                name: payment.buyer_name,
                email: payment.buyer_email,
            },
            settlement_id: payment.settlement_id,
            already_settled: payment.already_settled,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}
