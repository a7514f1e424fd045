use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info};

use super::{Admission, RateLimiter};
use crate::error::{AppError, AppResult};

/// Fixed-window counter shared by every instance through Postgres.
/// The increment only happens while the count is below the maximum, so a
/// denial leaves the window untouched.
pub struct PgFixedWindowLimiter {
    pool: PgPool,
    window_secs: i64,
    max_requests: i32,
}

impl PgFixedWindowLimiter {
    pub fn new(pool: PgPool, window: Duration, max_requests: u32) -> AppResult<Self> {
        let window_secs = i64::try_from(window.as_secs())
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| AppError::Config("rate limit window must be whole seconds".to_string()))?;
        let max_requests = i32::try_from(max_requests)
            .map_err(|_| AppError::Config("rate limit max too large".to_string()))?;

        Ok(Self {
            pool,
            window_secs,
            max_requests,
        })
    }

    /// Start of the fixed window containing `now`
    pub fn window_start(now: DateTime<Utc>, window_secs: i64) -> DateTime<Utc> {
        let secs = now.timestamp();
        let start = secs - secs.rem_euclid(window_secs);
        DateTime::from_timestamp(start, 0).unwrap_or(now)
    }

    /// Delete windows that can no longer be counted against
    pub async fn prune_expired(&self) -> AppResult<u64> {
        let cutoff = Self::window_start(Utc::now(), self.window_secs);
        let result = sqlx::query("DELETE FROM rate_limit_windows WHERE window_start < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            info!("🧹 Pruned {} expired rate limit windows", result.rows_affected());
        }
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RateLimiter for PgFixedWindowLimiter {
    async fn admit(&self, identity: &str) -> AppResult<Admission> {
        let window_start = Self::window_start(Utc::now(), self.window_secs);

        let count: Option<i32> = sqlx::query_scalar(
            r#"
            INSERT INTO rate_limit_windows (identity, window_start, request_count)
            VALUES ($1, $2, 1)
            ON CONFLICT (identity, window_start)
            DO UPDATE SET request_count = rate_limit_windows.request_count + 1
            WHERE rate_limit_windows.request_count < $3
            RETURNING request_count
            "#,
        )
        .bind(identity)
        .bind(window_start)
        .bind(self.max_requests)
        .fetch_optional(&self.pool)
        .await?;

        match count {
            Some(_) => Ok(Admission::Allowed),
            None => {
                debug!(identity, "shared rate limit denied");
                Ok(Admission::Denied)
            }
        }
    }
}
