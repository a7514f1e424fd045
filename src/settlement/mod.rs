pub mod pipeline;
pub mod reconcile;

pub use pipeline::{PipelineSettings, SettlementPipeline, VerifiedPayment};
pub use reconcile::reconcile;

use serde::Deserialize;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Caller's claim that an order pays for a product. Both ids are
/// untrusted until the gateway and the catalog confirm them.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PaymentClaim {
    #[serde(default, alias = "orderID")]
    #[validate(required, length(min = 1))]
    pub order_id: Option<String>,

    #[serde(default)]
    #[validate(required, length(min = 1))]
    pub product_id: Option<String>,
}

impl PaymentClaim {
    #[cfg(test)]
    pub fn new(order_id: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self {
            order_id: Some(order_id.into()),
            product_id: Some(product_id.into()),
        }
    }

    /// Trimmed `(order_id, product_id)`, or the wire names of the missing fields
    pub fn into_ids(self) -> AppResult<(String, String)> {
        let claim = PaymentClaim {
            order_id: self.order_id.map(|s| s.trim().to_string()),
            product_id: self.product_id.map(|s| s.trim().to_string()),
        };

        if let Err(errors) = claim.validate() {
            let mut missing: Vec<String> = errors
                .field_errors()
                .keys()
                .map(|field| wire_name(field))
                .collect();
            missing.sort();
            return Err(AppError::MissingFields(missing));
        }

        match (claim.order_id, claim.product_id) {
            (Some(order_id), Some(product_id)) => Ok((order_id, product_id)),
            _ => Err(AppError::MissingFields(vec![
                "orderId".to_string(),
                "productId".to_string(),
            ])),
        }
    }
}

fn wire_name(field: &str) -> String {
    match field {
        "order_id" => "orderId".to_string(),
        "product_id" => "productId".to_string(),
        other => other.to_string(),
    }
}
