use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{Notifier, SaleNotice};
use crate::error::NotifyError;

pub const EMAILJS_SEND_URL: &str = "https://api.emailjs.com/api/v1.0/email/send";
const LOGGED_BODY_LIMIT: usize = 300;

#[derive(Debug, Clone)]
pub struct EmailJsSettings {
    pub endpoint: String,
    pub service_id: String,
    pub template_id: String,
    pub user_id: String,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct EmailJsRequest<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    template_params: TemplateParams<'a>,
}

#[derive(Debug, Serialize)]
struct TemplateParams<'a> {
    order_id: &'a str,
    product_title: &'a str,
    amount: String,
    buyer_name: &'a str,
    buyer_email: &'a str,
    seller_id: &'a str,
}

/// Sale notices through the EmailJS REST API
pub struct EmailJsNotifier {
    client: Client,
    settings: EmailJsSettings,
}

impl EmailJsNotifier {
    pub fn new(settings: EmailJsSettings) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl Notifier for EmailJsNotifier {
    async fn send_sale_notice(&self, notice: &SaleNotice) -> Result<(), NotifyError> {
        let request = EmailJsRequest {
            service_id: &self.settings.service_id,
            template_id: &self.settings.template_id,
            user_id: &self.settings.user_id,
            template_params: TemplateParams {
                order_id: &notice.order_id,
                product_title: notice.product_title.as_deref().unwrap_or(&notice.product_id),
                amount: format!("{} {}", notice.amount, notice.currency),
                buyer_name: notice.buyer_name.as_deref().unwrap_or(""),
                buyer_email: notice.buyer_email.as_deref().unwrap_or(""),
                seller_id: &notice.seller_id,
            },
        };

        let response = self
            .client
            .post(&self.settings.endpoint)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status,
                body: body.chars().take(LOGGED_BODY_LIMIT).collect(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use rust_decimal_macros::dec;
    use serde_json::Value;
    use tokio::sync::mpsc;

    async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn notifier(endpoint: String) -> EmailJsNotifier {
        EmailJsNotifier::new(EmailJsSettings {
            endpoint,
            service_id: "svc".into(),
            template_id: "tpl".into(),
            user_id: "usr".into(),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    fn notice() -> SaleNotice {
        SaleNotice {
            order_id: "order-1".into(),
            settlement_id: "s-1".into(),
            product_id: "p-1".into(),
            product_title: None,
            seller_id: "seller-1".into(),
            amount: dec!(19.99),
            currency: "USD".into(),
            buyer_name: Some("Ada Lovelace".into()),
            buyer_email: Some("ada@example.com".into()),
        }
    }

    #[tokio::test]
    async fn test_sends_template_params() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        let router = Router::new().route(
            "/send",
            post(move |Json(body): Json<Value>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(body);
                    StatusCode::OK
                }
            }),
        );
        let base = spawn_stub(router).await;

        notifier(format!("{}/send", base)).send_sale_notice(&notice()).await.unwrap();

        let body = rx.recv().await.unwrap();
        assert_eq!(body["service_id"], "svc");
        assert_eq!(body["template_params"]["product_title"], "p-1");
        assert_eq!(body["template_params"]["amount"], "19.99 USD");
        assert_eq!(body["template_params"]["buyer_email"], "ada@example.com");
    }

    #[tokio::test]
    async fn test_provider_rejection() {
        let router = Router::new().route("/send", post(|| async { (StatusCode::BAD_REQUEST, "bad template") }));
        let base = spawn_stub(router).await;

        let err = notifier(format!("{}/send", base))
            .send_sale_notice(&notice())
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Rejected { status: 400, .. }));
    }
}
