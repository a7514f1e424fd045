// Per-identity admission control for the verification endpoint.
//
// The sliding window is the default and is process-local: it gives no
// guarantee across horizontally scaled instances. The Postgres backend
// shares one counter per identity across every instance.

pub mod gcra;
pub mod postgres;
pub mod sliding_window;

pub use gcra::GcraLimiter;
pub use postgres::PgFixedWindowLimiter;
pub use sliding_window::SlidingWindowLimiter;

use async_trait::async_trait;

use crate::error::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied,
}

impl Admission {
    pub fn is_allowed(self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Admit or deny one request for `identity`. A denial does not consume a slot.
    async fn admit(&self, identity: &str) -> AppResult<Admission>;
}
