use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::info;

use super::models::*;
use super::{with_conflict_retry, AttemptError, Ledger, RetryPolicy};
use crate::error::LedgerError;

#[derive(Debug, Clone)]
struct Account {
    balance: Decimal,
    version: u64,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct LedgerState {
    records: HashMap<String, SettlementRecord>,
    accounts: HashMap<String, Account>,
}

/// Process-local ledger with optimistic concurrency on each seller account
#[derive(Debug, Clone)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    retry: RetryPolicy,
}

impl InMemoryLedger {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState::default())),
            retry,
        }
    }

    pub fn open_seller_account(&self, seller_id: impl Into<String>, opening: Decimal) {
        self.state.lock().accounts.entry(seller_id.into()).or_insert(Account {
            balance: opening,
            version: 0,
            updated_at: Utc::now(),
        });
    }

    pub fn settlement_count(&self) -> usize {
        self.state.lock().records.len()
    }

    async fn try_settle(&self, request: &SettlementRequest) -> Result<SettlementOutcome, AttemptError> {
        // Read phase
        let snapshot_version = {
            let state = self.state.lock();
            if let Some(existing) = state.records.get(&request.gateway_order_id) {
                return Ok(SettlementOutcome::AlreadyExists(existing.clone()));
            }
            state
                .accounts
                .get(&request.seller_id)
                .map(|a| a.version)
                .ok_or_else(|| LedgerError::SellerNotFound(request.seller_id.clone()))?
        };

        let record = SettlementRecord::from_request(request);

        // Let concurrent settlements interleave between read and commit
        tokio::task::yield_now().await;

        // Commit phase
        let mut state = self.state.lock();
        if let Some(existing) = state.records.get(&request.gateway_order_id) {
            return Ok(SettlementOutcome::AlreadyExists(existing.clone()));
        }
        let account = state
            .accounts
            .get_mut(&request.seller_id)
            .ok_or_else(|| LedgerError::SellerNotFound(request.seller_id.clone()))?;
        if account.version != snapshot_version {
            return Err(AttemptError::Conflict);
        }

        account.balance += record.seller_credit;
        account.version += 1;
        account.updated_at = record.settled_at;
        state
            .records
            .insert(record.gateway_order_id.clone(), record.clone());

        Ok(SettlementOutcome::Created(record))
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn find_settlement(&self, gateway_order_id: &str) -> Result<Option<SettlementRecord>, LedgerError> {
        Ok(self.state.lock().records.get(gateway_order_id).cloned())
    }

    async fn settle(&self, request: &SettlementRequest) -> Result<SettlementOutcome, LedgerError> {
        let outcome = with_conflict_retry(self.retry, |_| self.try_settle(request)).await?;
        if let SettlementOutcome::Created(record) = &outcome {
            info!(
                "✓ Settlement recorded: {} {} credited {} to seller {}",
                record.amount, record.currency, record.seller_credit, record.seller_id
            );
        }
        Ok(outcome)
    }

    async fn seller_balance(&self, seller_id: &str) -> Result<Option<SellerBalance>, LedgerError> {
        Ok(self.state.lock().accounts.get(seller_id).map(|a| SellerBalance {
            seller_id: seller_id.to_string(),
            balance: a.balance,
            updated_at: a.updated_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn request(order_id: &str, seller: &str, amount: Decimal) -> SettlementRequest {
        SettlementRequest {
            gateway_order_id: order_id.into(),
            buyer_id: "buyer-1".into(),
            product_id: "product-1".into(),
            seller_id: seller.into(),
            amount,
            currency: "USD".into(),
            commission_rate: dec!(0.30),
            payer_name: Some("Ada".into()),
            payer_email: Some("ada@example.com".into()),
        }
    }

    fn ledger() -> InMemoryLedger {
        let ledger = InMemoryLedger::new(RetryPolicy {
            max_attempts: 5,
            base_backoff: Duration::from_millis(1),
        });
        ledger.open_seller_account("seller-1", Decimal::ZERO);
        ledger
    }

    #[tokio::test]
    async fn test_settle_credits_seller() {
        let ledger = ledger();
        let outcome = ledger.settle(&request("order-1", "seller-1", dec!(100.00))).await.unwrap();

        assert!(outcome.is_created());
        assert_eq!(outcome.record().seller_credit, dec!(70.00));
        let balance = ledger.seller_balance("seller-1").await.unwrap().unwrap();
        assert_eq!(balance.balance, dec!(70.00));
    }

    #[tokio::test]
    async fn test_settle_is_idempotent() {
        let ledger = ledger();
        let first = ledger.settle(&request("order-1", "seller-1", dec!(10.00))).await.unwrap();
        let second = ledger.settle(&request("order-1", "seller-1", dec!(10.00))).await.unwrap();

        assert!(first.is_created());
        assert_eq!(second, SettlementOutcome::AlreadyExists(first.record().clone()));
        assert_eq!(ledger.settlement_count(), 1);
        let balance = ledger.seller_balance("seller-1").await.unwrap().unwrap();
        assert_eq!(balance.balance, dec!(7.00));
    }

    #[tokio::test]
    async fn test_unknown_seller() {
        let ledger = ledger();
        let err = ledger.settle(&request("order-1", "ghost", dec!(10.00))).await.unwrap_err();

        assert!(matches!(err, LedgerError::SellerNotFound(s) if s == "ghost"));
        assert!(ledger.find_settlement("order-1").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_order_settles_once() {
        let ledger = ledger();
        let a = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.settle(&request("order-1", "seller-1", dec!(20.00))).await })
        };
        let b = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.settle(&request("order-1", "seller-1", dec!(20.00))).await })
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert_eq!([a.is_created(), b.is_created()].iter().filter(|c| **c).count(), 1);
        assert_eq!(a.record().id, b.record().id);

        let balance = ledger.seller_balance("seller-1").await.unwrap().unwrap();
        assert_eq!(balance.balance, dec!(14.00));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_distinct_orders_all_credited() {
        let ledger = ledger();
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    ledger
                        .settle(&request(&format!("order-{i}"), "seller-1", dec!(10.00)))
                        .await
                })
            })
            .collect();

        let mut settled = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(outcome) if outcome.is_created() => settled += 1,
                Ok(_) => {}
                Err(LedgerError::TransactionConflict { .. }) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        // Every committed order is reflected in the balance exactly once
        let balance = ledger.seller_balance("seller-1").await.unwrap().unwrap();
        assert_eq!(balance.balance, dec!(7.00) * Decimal::from(settled));
        assert_eq!(ledger.settlement_count(), settled);
    }
}
