use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info, instrument};

use super::models::*;
use super::{with_conflict_retry, AttemptError, Ledger, RetryPolicy};
use crate::error::LedgerError;

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";

const SETTLEMENT_COLUMNS: &str = "id, gateway_order_id, buyer_id, product_id, seller_id, amount, \
     currency, seller_credit, payer_name, payer_email, settled_at";

/// Ledger repository - THE source of truth for settlements and seller balances
pub struct LedgerRepository {
    pub pool: PgPool,
    retry: RetryPolicy,
}

/// Map a storage error onto retry semantics: serialization failures,
/// deadlocks and lost unique-key races are retried, everything else is fatal.
fn classify(error: sqlx::Error) -> AttemptError {
    let retryable = error
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| {
            matches!(
                code.as_ref(),
                SERIALIZATION_FAILURE | DEADLOCK_DETECTED | UNIQUE_VIOLATION
            )
        })
        .unwrap_or(false);

    if retryable {
        AttemptError::Conflict
    } else {
        AttemptError::Fatal(LedgerError::Storage(error))
    }
}

impl LedgerRepository {
    pub fn new(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    async fn find_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        gateway_order_id: &str,
    ) -> Result<Option<SettlementRecord>, sqlx::Error> {
        sqlx::query_as::<_, SettlementRecord>(&format!(
            "SELECT {} FROM settlements WHERE gateway_order_id = $1",
            SETTLEMENT_COLUMNS
        ))
        .bind(gateway_order_id)
        .fetch_optional(&mut **tx)
        .await
    }

    /// One SERIALIZABLE attempt: lock the seller row, check the order has
    /// not been consumed, write the record and the new balance, commit.
    async fn try_settle(&self, request: &SettlementRequest) -> Result<SettlementOutcome, AttemptError> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        let current: Option<Decimal> = sqlx::query_scalar(
            "SELECT balance FROM seller_balances WHERE seller_id = $1 FOR UPDATE",
        )
        .bind(&request.seller_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(classify)?;

        let Some(current) = current else {
            tx.rollback().await.map_err(classify)?;
            return Err(LedgerError::SellerNotFound(request.seller_id.clone()).into());
        };

        if let Some(existing) = Self::find_in_tx(&mut tx, &request.gateway_order_id)
            .await
            .map_err(classify)?
        {
            tx.rollback().await.map_err(classify)?;
            return Ok(SettlementOutcome::AlreadyExists(existing));
        }

        let record = SettlementRecord::from_request(request);
        let inserted = sqlx::query_as::<_, SettlementRecord>(&format!(
            r#"
            INSERT INTO settlements ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (gateway_order_id) DO NOTHING
            RETURNING {cols}
            "#,
            cols = SETTLEMENT_COLUMNS
        ))
        .bind(record.id)
        .bind(&record.gateway_order_id)
        .bind(&record.buyer_id)
        .bind(&record.product_id)
        .bind(&record.seller_id)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(record.seller_credit)
        .bind(&record.payer_name)
        .bind(&record.payer_email)
        .bind(record.settled_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(classify)?;

        let Some(record) = inserted else {
            // A concurrent transaction committed this order first
            tx.rollback().await.map_err(classify)?;
            return match self.find_settlement(&request.gateway_order_id).await? {
                Some(existing) => Ok(SettlementOutcome::AlreadyExists(existing)),
                None => Err(AttemptError::Conflict),
            };
        };

        sqlx::query(
            r#"
            UPDATE seller_balances
            SET balance = $2, updated_at = NOW()
            WHERE seller_id = $1
            "#,
        )
        .bind(&request.seller_id)
        .bind(current + record.seller_credit)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(classify)?;

        Ok(SettlementOutcome::Created(record))
    }
}

#[async_trait]
impl Ledger for LedgerRepository {
    async fn find_settlement(&self, gateway_order_id: &str) -> Result<Option<SettlementRecord>, LedgerError> {
        let record = sqlx::query_as::<_, SettlementRecord>(&format!(
            "SELECT {} FROM settlements WHERE gateway_order_id = $1",
            SETTLEMENT_COLUMNS
        ))
        .bind(gateway_order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    #[instrument(skip(self, request), fields(order_id = %request.gateway_order_id, seller_id = %request.seller_id))]
    async fn settle(&self, request: &SettlementRequest) -> Result<SettlementOutcome, LedgerError> {
        let outcome = with_conflict_retry(self.retry, |attempt| {
            debug!(attempt, "settlement transaction attempt");
            self.try_settle(request)
        })
        .await?;

        if let SettlementOutcome::Created(record) = &outcome {
            info!(
                "✓ Settlement recorded: {} {} credited {} to seller {}",
                record.amount, record.currency, record.seller_credit, record.seller_id
            );
        }
        Ok(outcome)
    }

    #[cfg(test)]
    async fn seller_balance(&self, seller_id: &str) -> Result<Option<SellerBalance>, LedgerError> {
        let balance = sqlx::query_as::<_, SellerBalance>(
            r#"
            SELECT seller_id, balance, updated_at
            FROM seller_balances
            WHERE seller_id = $1
            "#,
        )
        .bind(seller_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance)
    }
}
