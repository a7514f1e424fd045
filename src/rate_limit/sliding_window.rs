use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{Admission, RateLimiter};
use crate::error::AppResult;

type Window = Arc<Mutex<VecDeque<Instant>>>;

/// Sliding-log limiter: at most `max_requests` admissions per identity in
/// any trailing `window`. Each identity has its own critical section, so
/// concurrent calls for one identity never corrupt its count.
#[derive(Debug, Clone)]
pub struct SlidingWindowLimiter {
    windows: Arc<Mutex<HashMap<String, Window>>>,
    window: Duration,
    max_requests: usize,
}

impl SlidingWindowLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            window,
            max_requests: max_requests as usize,
        }
    }

    fn window_for(&self, identity: &str) -> Window {
        let mut windows = self.windows.lock();
        windows
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone()
    }

    fn prune(log: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = log.front() {
            if now.saturating_duration_since(*oldest) >= window {
                log.pop_front();
            } else {
                break;
            }
        }
    }

    pub(crate) fn admit_at(&self, identity: &str, now: Instant) -> Admission {
        let window = self.window_for(identity);
        let mut log = window.lock();

        Self::prune(&mut log, now, self.window);

        if log.len() >= self.max_requests {
            debug!(identity, count = log.len(), "rate limit denied");
            return Admission::Denied;
        }

        log.push_back(now);
        Admission::Allowed
    }

    /// Drop identities whose window holds no live timestamps
    pub fn prune_idle(&self) -> usize {
        self.prune_idle_at(Instant::now())
    }

    pub(crate) fn prune_idle_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, log| {
            // An admission in flight still holds a handle to this window
            if Arc::strong_count(log) > 1 {
                return true;
            }
            let mut log = log.lock();
            Self::prune(&mut log, now, self.window);
            !log.is_empty()
        });
        let evicted = before - windows.len();
        if evicted > 0 {
            info!("🧹 Evicted {} idle rate limit windows", evicted);
        }
        evicted
    }

    #[cfg(test)]
    pub fn tracked_identities(&self) -> usize {
        self.windows.lock().len()
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn admit(&self, identity: &str) -> AppResult<Admission> {
        Ok(self.admit_at(identity, Instant::now()))
    }
}
