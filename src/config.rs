use std::time::Duration;

use config::Environment;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::gateway::OrderStatus;
use crate::notify::emailjs::{EmailJsSettings, EMAILJS_SEND_URL};

const PAYPAL_SANDBOX_URL: &str = "https://api-m.sandbox.paypal.com";
const PAYPAL_LIVE_URL: &str = "https://api-m.paypal.com";
const NOTIFIER_TIMEOUT: Duration = Duration::from_secs(10);
const STORE_READ_SLACK: Duration = Duration::from_secs(5);

/// Which admission backend guards the verification endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    Sliding,
    Gcra,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    pub database_url: String,

    /// `sandbox` or `live`
    pub gateway_env: String,
    /// Overrides the environment's default base URL when set
    pub gateway_base_url: Option<String>,
    pub gateway_client_id: String,
    pub gateway_client_secret: String,
    pub gateway_timeout_ms: u64,
    pub gateway_retry_backoff_ms: u64,
    pub token_expiry_margin_secs: u64,

    /// Platform cut of each settled payment, as a fraction
    pub commission_rate: Decimal,
    /// Comma separated gateway statuses that may be settled
    pub accepted_order_statuses: String,

    pub rate_limit_backend: String,
    pub rate_limit_window_secs: u64,
    pub rate_limit_max_requests: u32,

    pub settlement_max_attempts: u32,
    pub settlement_retry_backoff_ms: u64,

    pub identity_api_key: String,
    pub identity_base_url: String,

    pub emailjs_service_id: Option<String>,
    pub emailjs_template_id: Option<String>,
    pub emailjs_user_id: Option<String>,

    pub cors_allowed_origins: String,
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        Self::load(Environment::default().ignore_empty(true))
    }

    pub fn load(source: Environment) -> AppResult<Self> {
        let cfg: AppConfig = config::Config::builder()
            .set_default("bind_address", "0.0.0.0:8080")?
            .set_default("database_url", "postgresql://localhost/settlement")?
            .set_default("gateway_env", "sandbox")?
            .set_default("gateway_client_id", "")?
            .set_default("gateway_client_secret", "")?
            .set_default("gateway_timeout_ms", 10_000)?
            .set_default("gateway_retry_backoff_ms", 250)?
            .set_default("token_expiry_margin_secs", 60)?
            .set_default("commission_rate", "0.30")?
            .set_default("accepted_order_statuses", "COMPLETED")?
            .set_default("rate_limit_backend", "sliding")?
            .set_default("rate_limit_window_secs", 60)?
            .set_default("rate_limit_max_requests", 20)?
            .set_default("settlement_max_attempts", 3)?
            .set_default("settlement_retry_backoff_ms", 50)?
            .set_default("identity_api_key", "")?
            .set_default("identity_base_url", "https://identitytoolkit.googleapis.com")?
            .set_default("cors_allowed_origins", "http://localhost:3000")?
            .add_source(source)
            .build()?
            .try_deserialize()?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> AppResult<()> {
        if self.commission_rate < Decimal::ZERO || self.commission_rate >= Decimal::ONE {
            return Err(AppError::Config(format!(
                "COMMISSION_RATE must be in [0, 1), got {}",
                self.commission_rate
            )));
        }
        if self.rate_limit_window_secs == 0 || self.rate_limit_max_requests == 0 {
            return Err(AppError::Config(
                "rate limit window and max requests must be positive".to_string(),
            ));
        }
        if self.settlement_max_attempts == 0 {
            return Err(AppError::Config(
                "SETTLEMENT_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if self.accepted_statuses().is_empty() {
            return Err(AppError::Config(
                "ACCEPTED_ORDER_STATUSES must name at least one status".to_string(),
            ));
        }
        self.rate_limit_backend()?;
        self.gateway_base_url()?;
        Ok(())
    }

    pub fn gateway_base_url(&self) -> AppResult<String> {
        if let Some(url) = &self.gateway_base_url {
            return Ok(url.trim_end_matches('/').to_string());
        }
        match self.gateway_env.as_str() {
            "sandbox" => Ok(PAYPAL_SANDBOX_URL.to_string()),
            "live" | "production" => Ok(PAYPAL_LIVE_URL.to_string()),
            other => Err(AppError::Config(format!("Unknown GATEWAY_ENV: {}", other))),
        }
    }

    pub fn rate_limit_backend(&self) -> AppResult<RateLimitBackend> {
        match self.rate_limit_backend.to_ascii_lowercase().as_str() {
            "sliding" => Ok(RateLimitBackend::Sliding),
            "gcra" => Ok(RateLimitBackend::Gcra),
            "postgres" => Ok(RateLimitBackend::Postgres),
            other => Err(AppError::Config(format!(
                "Unknown RATE_LIMIT_BACKEND: {}",
                other
            ))),
        }
    }

    pub fn accepted_statuses(&self) -> Vec<OrderStatus> {
        self.accepted_order_statuses
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(OrderStatus::parse)
            .collect()
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }

    pub fn gateway_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.gateway_retry_backoff_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn settlement_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.settlement_retry_backoff_ms)
    }

    /// The identity provider shares the gateway's per-call timeout
    pub fn identity_timeout(&self) -> Duration {
        self.gateway_timeout()
    }

    /// Budget for the checks before settlement: one identity lookup, token
    /// and order calls with one retry each, and slack for the store reads.
    /// The ledger write itself is not bounded by it.
    pub fn request_deadline(&self) -> Duration {
        let gateway = (self.gateway_timeout() * 2 + self.gateway_retry_backoff()) * 2;
        self.identity_timeout() + gateway + STORE_READ_SLACK
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    /// EmailJS delivery settings, when all three ids are configured
    pub fn emailjs_settings(&self) -> Option<EmailJsSettings> {
        match (
            &self.emailjs_service_id,
            &self.emailjs_template_id,
            &self.emailjs_user_id,
        ) {
            (Some(service_id), Some(template_id), Some(user_id)) => Some(EmailJsSettings {
                endpoint: EMAILJS_SEND_URL.to_string(),
                service_id: service_id.clone(),
                template_id: template_id.clone(),
                user_id: user_id.clone(),
                timeout: NOTIFIER_TIMEOUT,
            }),
            _ => None,
        }
    }
}
