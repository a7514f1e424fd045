use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::{Order, OrderStatus, PaymentGateway, TokenCache};
use crate::error::GatewayError;

/// One initial attempt plus a single retry
const MAX_CALL_ATTEMPTS: u32 = 2;
const LOGGED_BODY_LIMIT: usize = 500;

#[derive(Debug, Clone)]
pub struct PayPalSettings {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout: Duration,
    pub retry_backoff: Duration,
    pub token_expiry_margin: Duration,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: Option<String>,
    status: Option<String>,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
    payer: Option<PayerResponse>,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    amount: Option<AmountResponse>,
}

#[derive(Debug, Deserialize)]
struct AmountResponse {
    currency_code: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PayerResponse {
    payer_id: Option<String>,
    email_address: Option<String>,
    name: Option<PayerName>,
}

#[derive(Debug, Deserialize)]
struct PayerName {
    given_name: Option<String>,
    surname: Option<String>,
}

impl OrderResponse {
    fn into_order(self, requested_id: &str) -> Order {
        let amount = self
            .purchase_units
            .into_iter()
            .next()
            .and_then(|unit| unit.amount);
        let (amount, currency) = match amount {
            Some(a) => (a.value, a.currency_code),
            None => (None, None),
        };

        let (payer_id, payer_email, payer_name) = match self.payer {
            Some(p) => {
                let name = p.name.map(|n| {
                    [n.given_name, n.surname]
                        .into_iter()
                        .flatten()
                        .collect::<Vec<_>>()
                        .join(" ")
                });
                (p.payer_id, p.email_address, name.filter(|n| !n.is_empty()))
            }
            None => (None, None, None),
        };

        Order {
            gateway_order_id: self.id.unwrap_or_else(|| requested_id.to_string()),
            status: self
                .status
                .as_deref()
                .map(OrderStatus::parse)
                .unwrap_or_else(|| OrderStatus::Other("UNKNOWN".to_string())),
            amount,
            currency,
            payer_id,
            payer_email,
            payer_name,
        }
    }
}

/// PayPal REST client: client-credentials token exchange plus order lookup
pub struct PayPalClient {
    client: Client,
    settings: PayPalSettings,
    cache_key: String,
    tokens: TokenCache,
}

impl PayPalClient {
    pub fn new(settings: PayPalSettings) -> Self {
        let cache_key = TokenCache::key_for(&settings.client_id, &settings.client_secret);
        Self {
            client: Client::new(),
            settings,
            cache_key,
            tokens: TokenCache::new(),
        }
    }

    fn truncate(body: &str) -> String {
        body.chars().take(LOGGED_BODY_LIMIT).collect()
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&self.settings.base_url)
            .map_err(|e| GatewayError::Unavailable(format!("invalid gateway base url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::Unavailable("gateway base url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request, retrying once on timeout, transport failure or 5xx.
    /// Any other status is handed back to the caller to interpret.
    async fn send_with_retry<F>(&self, call: &'static str, build: F) -> Result<Response, GatewayError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let failure = match build().timeout(self.settings.timeout).send().await {
                Ok(resp) if resp.status().is_server_error() => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    warn!(call, %status, attempt, body = %Self::truncate(&body), "gateway server error");
                    format!("{} returned {}", call, status)
                }
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_timeout() => {
                    warn!(call, attempt, "gateway call timed out");
                    format!("{} timed out", call)
                }
                Err(e) => {
                    warn!(call, attempt, error = %e, "gateway call failed");
                    format!("{} failed", call)
                }
            };

            if attempt >= MAX_CALL_ATTEMPTS {
                return Err(GatewayError::Unavailable(failure));
            }
            tokio::time::sleep(self.settings.retry_backoff).await;
        }
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        if let Some(token) = self.tokens.get(&self.cache_key) {
            return Ok(token);
        }
        self.exchange_token().await
    }

    async fn exchange_token(&self) -> Result<String, GatewayError> {
        let url = self.endpoint(&["v1", "oauth2", "token"])?;

        let resp = self
            .send_with_retry("token exchange", || {
                self.client
                    .post(url.clone())
                    .basic_auth(&self.settings.client_id, Some(&self.settings.client_secret))
                    .header("Content-Type", "application/x-www-form-urlencoded")
                    .body("grant_type=client_credentials")
            })
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, body = %Self::truncate(&body), "gateway token exchange rejected");
            return Err(GatewayError::Auth(format!("token endpoint returned {}", status)));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Auth(format!("unreadable token response: {}", e)))?;
        let access_token = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GatewayError::Auth("no access token received".to_string()))?;

        if let Some(expires_in) = token.expires_in {
            self.tokens.insert(
                self.cache_key.clone(),
                access_token.clone(),
                Duration::from_secs(expires_in),
                self.settings.token_expiry_margin,
            );
        }

        info!("✓ Gateway access token obtained");
        Ok(access_token)
    }

    async fn get_order(&self, url: &Url, token: &str) -> Result<Response, GatewayError> {
        self.send_with_retry("order lookup", || {
            self.client.get(url.clone()).bearer_auth(token)
        })
        .await
    }
}

#[async_trait]
impl PaymentGateway for PayPalClient {
    fn name(&self) -> &'static str {
        "paypal"
    }

    #[instrument(skip(self), fields(gateway = "paypal"))]
    async fn fetch_order(&self, order_id: &str) -> Result<Order, GatewayError> {
        let url = self.endpoint(&["v2", "checkout", "orders", order_id])?;

        let token = self.access_token().await?;
        let mut resp = self.get_order(&url, &token).await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            // Cached token was revoked before its reported expiry
            debug!("gateway rejected cached token, re-exchanging");
            self.tokens.evict(&self.cache_key);
            let token = self.exchange_token().await?;
            resp = self.get_order(&url, &token).await?;
        }

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::OrderNotFound(order_id.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, body = %Self::truncate(&body), "gateway order lookup rejected");
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    GatewayError::Auth(format!("order endpoint returned {}", status))
                }
                _ => GatewayError::Unavailable(format!("order endpoint returned {}", status)),
            });
        }

        let order: OrderResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("unreadable order: {}", e)))?;

        let order = order.into_order(order_id);
        debug!(status = %order.status, "gateway order fetched");
        Ok(order)
    }
}
