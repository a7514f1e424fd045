pub mod paypal;
pub mod token_cache;

pub use paypal::PayPalClient;
pub use token_cache::TokenCache;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Gateway-reported order status
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Created,
    Approved,
    Completed,
    Other(String),
}

impl OrderStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CREATED" => OrderStatus::Created,
            "APPROVED" => OrderStatus::Approved,
            "COMPLETED" => OrderStatus::Completed,
            other => OrderStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Approved => "APPROVED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Other(raw) => raw,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order as reported by the gateway. Never persisted by this service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub gateway_order_id: String,
    pub status: OrderStatus,
    /// Decimal string exactly as the gateway reported it
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub payer_id: Option<String>,
    pub payer_email: Option<String>,
    pub payer_name: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch the authoritative state of an order
    async fn fetch_order(&self, order_id: &str) -> Result<Order, GatewayError>;
}
