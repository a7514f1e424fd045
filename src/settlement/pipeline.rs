use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, field, info, instrument, warn, Span};
use uuid::Uuid;

use super::{reconcile, PaymentClaim};
use crate::auth::{AuthenticatedUser, Authenticator};
use crate::catalog::PriceOracle;
use crate::error::{AppError, AppResult, AuthError};
use crate::gateway::{OrderStatus, PaymentGateway};
use crate::ledger::{Ledger, SettlementOutcome, SettlementRecord, SettlementRequest};
use crate::notify::{self, Notifier, SaleNotice};
use crate::rate_limit::RateLimiter;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub commission_rate: Decimal,
    pub accepted_statuses: Vec<OrderStatus>,
    /// Budget for everything before the ledger write. Once settlement
    /// starts it runs to completion.
    pub request_deadline: Duration,
}

/// Where the checks before the ledger write left the request
enum Checked {
    Replay(VerifiedPayment),
    Ready {
        user: AuthenticatedUser,
        request: SettlementRequest,
        product_title: Option<String>,
    },
}

/// Sanitized result of a successful verification. Buyer fields come from
/// the gateway's view of the order, never from the request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    pub order_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub buyer_name: Option<String>,
    pub buyer_email: Option<String>,
    pub settlement_id: Uuid,
    /// The order had been settled for this buyer by an earlier request
    pub already_settled: bool,
}

impl VerifiedPayment {
    fn from_record(record: &SettlementRecord, already_settled: bool) -> Self {
        Self {
            order_id: record.gateway_order_id.clone(),
            amount: record.amount,
            currency: record.currency.clone(),
            buyer_name: record.payer_name.clone(),
            buyer_email: record.payer_email.clone(),
            settlement_id: record.id,
            already_settled,
        }
    }
}

/// Verify -> reconcile -> settle, short-circuiting on the first failure
pub struct SettlementPipeline {
    authenticator: Arc<dyn Authenticator>,
    limiter: Arc<dyn RateLimiter>,
    oracle: Arc<dyn PriceOracle>,
    gateway: Arc<dyn PaymentGateway>,
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn Notifier>,
    settings: PipelineSettings,
}

impl SettlementPipeline {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        limiter: Arc<dyn RateLimiter>,
        oracle: Arc<dyn PriceOracle>,
        gateway: Arc<dyn PaymentGateway>,
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn Notifier>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            authenticator,
            limiter,
            oracle,
            gateway,
            ledger,
            notifier,
            settings,
        }
    }

    /// Run one verification request. `bearer` is the credential from the
    /// Authorization header; a malformed body arrives as an empty claim.
    #[instrument(
        skip_all,
        fields(user_id = field::Empty, order_id = field::Empty, product_id = field::Empty)
    )]
    pub async fn verify(&self, bearer: Option<&str>, claim: PaymentClaim) -> AppResult<VerifiedPayment> {
        let result = self.run(bearer, claim).await;

        match &result {
            Ok(payment) if payment.already_settled => {
                info!("🔁 Replay of settled order {}", payment.order_id)
            }
            Ok(payment) => info!(
                "✓ Payment verified and settled: {} {} (settlement {})",
                payment.amount, payment.currency, payment.settlement_id
            ),
            Err(e) => {
                let (status, code) = e.status_and_code();
                // Server errors are logged with full detail at the response boundary
                if status.is_client_error() {
                    info!(code, "verification rejected: {}", e);
                }
            }
        }
        result
    }

    async fn run(&self, bearer: Option<&str>, claim: PaymentClaim) -> AppResult<VerifiedPayment> {
        let deadline = self.settings.request_deadline;
        let checked = tokio::time::timeout(deadline, self.check(bearer, claim))
            .await
            .map_err(|_| {
                warn!(?deadline, "verification exceeded its deadline");
                AppError::DeadlineExceeded
            })??;

        let (user, request, product_title) = match checked {
            Checked::Replay(payment) => return Ok(payment),
            Checked::Ready {
                user,
                request,
                product_title,
            } => (user, request, product_title),
        };

        // 8. Atomic settlement
        let record = match self.ledger.settle(&request).await? {
            SettlementOutcome::Created(record) => record,
            SettlementOutcome::AlreadyExists(existing) => {
                return replay(&existing, &user, &request.product_id)
            }
        };

        // 9. Best-effort notice, never awaited
        notify::dispatch(
            self.notifier.clone(),
            SaleNotice {
                order_id: record.gateway_order_id.clone(),
                settlement_id: record.id.to_string(),
                product_id: record.product_id.clone(),
                product_title,
                seller_id: record.seller_id.clone(),
                amount: record.amount,
                currency: record.currency.clone(),
                buyer_name: record.payer_name.clone(),
                buyer_email: record.payer_email.clone(),
            },
        );

        Ok(VerifiedPayment::from_record(&record, false))
    }

    /// Steps 1-7: everything that can still be abandoned without side effects
    async fn check(&self, bearer: Option<&str>, claim: PaymentClaim) -> AppResult<Checked> {
        let span = Span::current();

        // 1. Caller identity
        let token = bearer.ok_or(AuthError::MissingCredential)?;
        let user = self.authenticator.verify(token).await?;
        span.record("user_id", user.user_id.as_str());
        debug!(email = ?user.email, "caller authenticated");

        // 2. Admission
        if !self.limiter.admit(&user.user_id).await?.is_allowed() {
            return Err(AppError::RateLimited);
        }

        // 3. Request shape
        let (order_id, product_id) = claim.into_ids()?;
        span.record("order_id", order_id.as_str());
        span.record("product_id", product_id.as_str());

        // 4. Fast-path replay check; the ledger transaction is the real guard
        if let Some(existing) = self.ledger.find_settlement(&order_id).await? {
            return replay(&existing, &user, &product_id).map(Checked::Replay);
        }

        // 5. Expected sale
        let expectation = self.oracle.resolve_expectation(&product_id).await?;

        // 6. Gateway facts
        let order = self.gateway.fetch_order(&order_id).await.map_err(|e| {
            warn!(gateway = self.gateway.name(), "order lookup failed: {}", e);
            e
        })?;

        // 7. Reconciliation
        let paid = reconcile(&order, &expectation, &self.settings.accepted_statuses).map_err(|e| {
            warn!(status = %order.status, "order failed reconciliation: {}", e);
            e
        })?;
        debug!(payer_id = ?order.payer_id, "order reconciled against {}", expectation.product_id);

        let request = SettlementRequest {
            gateway_order_id: order_id,
            buyer_id: user.user_id.clone(),
            product_id: expectation.product_id,
            seller_id: expectation.seller_id,
            amount: paid.amount,
            currency: paid.currency,
            commission_rate: self.settings.commission_rate,
            payer_name: order.payer_name,
            payer_email: order.payer_email,
        };

        Ok(Checked::Ready {
            user,
            request,
            product_title: expectation.title,
        })
    }
}

/// A consumed order answers an exact retry (same buyer, same product) with
/// the stored outcome. Any other claim on it is told it is already settled.
fn replay(existing: &SettlementRecord, user: &AuthenticatedUser, product_id: &str) -> AppResult<VerifiedPayment> {
    if existing.buyer_id != user.user_id {
        warn!(
            order_id = %existing.gateway_order_id,
            "order already settled for a different buyer"
        );
        return Err(AppError::AlreadySettled);
    }
    if existing.product_id != product_id {
        warn!(
            order_id = %existing.gateway_order_id,
            settled_product = %existing.product_id,
            claimed_product = %product_id,
            "order already settled for a different product"
        );
        return Err(AppError::AlreadySettled);
    }
    Ok(VerifiedPayment::from_record(existing, true))
}
