use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota};
use tracing::debug;

use super::{Admission, RateLimiter};
use crate::error::{AppError, AppResult};

type KeyedLimiter = governor::RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// GCRA limiter keyed by identity: a burst of `max_requests`, then one
/// cell back per `window`. Never admits more than `max_requests` in any
/// trailing `window`; a drained identity regains its full burst only after
/// `max_requests` windows.
#[derive(Clone)]
pub struct GcraLimiter {
    limiter: Arc<KeyedLimiter>,
}

impl GcraLimiter {
    pub fn new(window: Duration, max_requests: u32) -> AppResult<Self> {
        let burst = NonZeroU32::new(max_requests)
            .ok_or_else(|| AppError::Config("rate limit max must be positive".to_string()))?;
        let quota = Quota::with_period(window)
            .ok_or_else(|| AppError::Config("rate limit window must be positive".to_string()))?
            .allow_burst(burst);

        Ok(Self {
            limiter: Arc::new(governor::RateLimiter::keyed(quota)),
        })
    }

    /// Drop state for identities that are back at full burst
    pub fn prune_idle(&self) {
        self.limiter.retain_recent();
    }
}

#[async_trait]
impl RateLimiter for GcraLimiter {
    async fn admit(&self, identity: &str) -> AppResult<Admission> {
        match self.limiter.check_key(&identity.to_string()) {
            Ok(_) => Ok(Admission::Allowed),
            Err(_) => {
                debug!(identity, "gcra rate limit denied");
                Ok(Admission::Denied)
            }
        }
    }
}
