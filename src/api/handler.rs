use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use tracing::{debug, error, Instrument, Span};

use super::models::*;
use crate::auth::bearer_token;
use crate::error::{AppError, AppResult};
use crate::settlement::{PaymentClaim, SettlementPipeline};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SettlementPipeline>,
}

/// Verify a gateway order against a product and settle it
/// POST /api/v1/verify-payment
pub async fn verify_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<PaymentClaim>, JsonRejection>,
) -> AppResult<Json<VerifyPaymentResponse>> {
    let bearer = bearer_token(&headers).ok().map(str::to_owned);

    // An unreadable body is judged only after the caller is authenticated
    let claim = match body {
        Ok(Json(claim)) => claim,
        Err(rejection) => {
            debug!("unreadable verification body: {}", rejection.body_text());
            PaymentClaim::default()
        }
    };

    // Detached so a settlement in progress outlives a dropped connection
    let pipeline = state.pipeline.clone();
    let payment = tokio::spawn(
        async move { pipeline.verify(bearer.as_deref(), claim).await }.instrument(Span::current()),
    )
    .await
    .map_err(|e| {
        error!("verification task failed: {}", e);
        AppError::Internal("verification task failed".to_string())
    })??;

    Ok(Json(payment.into()))
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    })
}
