use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::migrate::MigrateError;
use thiserror::Error;
use tracing::error;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Reconciliation failed: {0}")]
    Mismatch(#[from] ReconciliationError),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Missing fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Order already settled by another buyer")]
    AlreadySettled,

    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Caller identity errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing or malformed Authorization header")]
    MissingCredential,

    #[error("Identity token rejected")]
    InvalidToken,

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Payment gateway errors
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Could not obtain gateway access token: {0}")]
    Auth(String),

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),
}

/// Product catalog errors
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Product {product_id} is incomplete: {reason}")]
    Incomplete { product_id: String, reason: String },

    #[error("Catalog storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Settlement ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Seller not found: {0}")]
    SellerNotFound(String),

    #[error("Settlement transaction conflict after {attempts} attempts")]
    TransactionConflict { attempts: u32 },

    #[error("Ledger storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Sale notification errors. Logged only, never surfaced to the caller.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Notification provider rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Gateway facts that disagree with the expected sale
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationError {
    #[error("Order status {0} is not accepted for settlement")]
    StatusNotAccepted(String),

    #[error("Paid amount missing in gateway order")]
    MissingAmount,

    #[error("Paid amount {paid} does not match expected {expected}")]
    AmountMismatch { expected: String, paid: String },

    #[error("Paid currency {paid} does not match expected {expected}")]
    CurrencyMismatch { expected: String, paid: String },
}

impl ReconciliationError {
    /// Caller-facing description. Never includes the internal expected price.
    pub fn detail(&self) -> String {
        match self {
            ReconciliationError::StatusNotAccepted(status) => {
                format!("order status is {}", status)
            }
            ReconciliationError::MissingAmount => "paid amount missing".to_string(),
            ReconciliationError::AmountMismatch { .. } => {
                "paid amount does not match product price".to_string()
            }
            ReconciliationError::CurrencyMismatch { paid, .. } => {
                format!("paid currency {} does not match product currency", paid)
            }
        }
    }
}

/// API error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AppError {
    /// Status code and wire error code for this failure
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Auth(AuthError::Unavailable(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
            AppError::Auth(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            AppError::MissingFields(_) => (StatusCode::BAD_REQUEST, "missing_fields"),
            AppError::AlreadySettled => (StatusCode::BAD_REQUEST, "already_settled"),
            AppError::Mismatch(_) => (StatusCode::BAD_REQUEST, "mismatch"),
            AppError::Catalog(CatalogError::ProductNotFound(_)) => {
                (StatusCode::NOT_FOUND, "product_not_found")
            }
            AppError::Gateway(GatewayError::OrderNotFound(_)) => {
                (StatusCode::NOT_FOUND, "order_not_found")
            }
            AppError::Gateway(GatewayError::Unavailable(_)) | AppError::DeadlineExceeded => {
                (StatusCode::SERVICE_UNAVAILABLE, "gateway_unavailable")
            }
            AppError::Gateway(_) => (StatusCode::INTERNAL_SERVER_ERROR, "gateway_unavailable"),
            AppError::Ledger(LedgerError::TransactionConflict { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, "transaction_conflict")
            }
            AppError::Catalog(_)
            | AppError::Ledger(_)
            | AppError::Database(_)
            | AppError::Config(_)
            | AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let detail = match &self {
            AppError::MissingFields(fields) => Some(fields.join(", ")),
            AppError::Mismatch(mismatch) => Some(mismatch.detail()),
            _ => None,
        };

        if status.is_server_error() {
            // Upstream and storage detail stays in the logs
            error!(error = %self, code, "request failed");
        }

        (status, Json(ErrorResponse { error: code, detail })).into_response()
    }
}

impl From<MigrateError> for AppError {
    fn from(error: MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
