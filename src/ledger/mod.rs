#[cfg(test)]
pub mod memory;
pub mod models;
pub mod repository;

#[cfg(test)]
pub use memory::InMemoryLedger;
#[cfg(test)]
pub use models::SellerBalance;
pub use models::{SettlementOutcome, SettlementRecord, SettlementRequest};
pub use repository::LedgerRepository;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use crate::error::LedgerError;

/// Transactional store of seller balances and consumed orders
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn find_settlement(&self, gateway_order_id: &str) -> Result<Option<SettlementRecord>, LedgerError>;

    /// Atomically create the settlement record and credit the seller.
    /// Both writes happen or neither does.
    async fn settle(&self, request: &SettlementRequest) -> Result<SettlementOutcome, LedgerError>;

    #[cfg(test)]
    async fn seller_balance(&self, seller_id: &str) -> Result<Option<SellerBalance>, LedgerError>;
}

/// Bounded retry for optimistic settlement transactions
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff plus up to one base interval of jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base_ms = self.base_backoff.as_millis() as u64;
        let exp = base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(10));
        let jitter = if base_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=base_ms)
        };
        Duration::from_millis(exp + jitter)
    }
}

/// Outcome of a single transaction attempt
#[derive(Debug)]
pub enum AttemptError {
    /// Lost an optimistic-concurrency race; the whole transaction may be retried
    Conflict,
    Fatal(LedgerError),
}

impl From<LedgerError> for AttemptError {
    fn from(error: LedgerError) -> Self {
        AttemptError::Fatal(error)
    }
}

/// Run `attempt` until it succeeds, fails fatally, or conflicts
/// `max_attempts` times.
pub async fn with_conflict_retry<T, F, Fut>(policy: RetryPolicy, mut attempt: F) -> Result<T, LedgerError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut n = 0;
    loop {
        n += 1;
        match attempt(n).await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(e)) => return Err(e),
            Err(AttemptError::Conflict) if n >= policy.max_attempts => {
                warn!(attempts = n, "settlement transaction conflict, giving up");
                return Err(LedgerError::TransactionConflict { attempts: n });
            }
            Err(AttemptError::Conflict) => {
                let delay = policy.backoff(n);
                warn!(attempt = n, ?delay, "settlement transaction conflict, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_conflict_retry(fast_policy(), |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(AttemptError::Conflict)
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_conflict_exhaustion() {
        let result: Result<(), _> =
            with_conflict_retry(fast_policy(), |_| async { Err(AttemptError::Conflict) }).await;
        assert!(matches!(result, Err(LedgerError::TransactionConflict { attempts: 3 })));
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_conflict_retry(fast_policy(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AttemptError::Fatal(LedgerError::SellerNotFound("s".into()))) }
        })
        .await;

        assert!(matches!(result, Err(LedgerError::SellerNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_grows() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(10),
        };
        let first = policy.backoff(1);
        let third = policy.backoff(3);
        assert!(first >= Duration::from_millis(10) && first <= Duration::from_millis(20));
        assert!(third >= Duration::from_millis(40) && third <= Duration::from_millis(50));
    }
}
