pub mod emailjs;

pub use emailjs::EmailJsNotifier;

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::NotifyError;

/// Facts about a completed sale, drawn from the verified order and the
/// settlement record only
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleNotice {
    pub order_id: String,
    pub settlement_id: String,
    pub product_id: String,
    pub product_title: Option<String>,
    pub seller_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub buyer_name: Option<String>,
    pub buyer_email: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_sale_notice(&self, notice: &SaleNotice) -> Result<(), NotifyError>;
}

/// Fire-and-forget dispatch. The settlement is already committed, so a
/// failed notice is logged and dropped.
pub fn dispatch(notifier: Arc<dyn Notifier>, notice: SaleNotice) {
    tokio::spawn(async move {
        match notifier.send_sale_notice(&notice).await {
            Ok(()) => info!("📧 Sale notice sent for order {}", notice.order_id),
            Err(e) => warn!(order_id = %notice.order_id, "Sale notice failed: {}", e),
        }
    });
}

/// Writes sale notices to the log; used when no email provider is configured
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_sale_notice(&self, notice: &SaleNotice) -> Result<(), NotifyError> {
        info!(
            order_id = %notice.order_id,
            seller_id = %notice.seller_id,
            "Sale: {} {} for product {}",
            notice.amount,
            notice.currency,
            notice.product_id
        );
        Ok(())
    }
}
