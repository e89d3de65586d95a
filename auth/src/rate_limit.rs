use crate::metrics_defs::{RATE_LIMIT_EXCEEDED, STORE_ERRORS};
use crate::store::Store;
use crate::usage::unix_now;
use shared::counter;
use std::sync::Arc;
use std::time::Duration;

const KEY_PREFIX: &str = "ratelimit:";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    /// Unix timestamp at which the current window ends.
    pub reset_at: u64,
    pub exceeded: bool,
}

impl RateLimitStatus {
    pub fn retry_after_secs(&self) -> u64 {
        self.reset_at.saturating_sub(unix_now()).max(1)
    }
}

/// Fixed-window request counter shared through the store, so every gateway
/// instance draws from the same budget.
pub struct RateLimiter {
    store: Arc<dyn Store>,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn Store>, window: Duration) -> Self {
        RateLimiter { store, window }
    }

    /// Counts one request against `bucket`. When the store is unavailable the
    /// request is let through.
    pub async fn check(&self, bucket: &str, limit: u32) -> RateLimitStatus {
        let key = format!("{KEY_PREFIX}{bucket}");
        match self.store.incr_with_ttl(&key, self.window).await {
            Ok(window) => {
                let exceeded = window.count > u64::from(limit);
                if exceeded {
                    counter!(RATE_LIMIT_EXCEEDED).increment(1);
                }
                RateLimitStatus {
                    limit,
                    remaining: u64::from(limit).saturating_sub(window.count) as u32,
                    reset_at: unix_now() + window.ttl.as_secs(),
                    exceeded,
                }
            }
            Err(e) => {
                counter!(STORE_ERRORS, "op" => "incr").increment(1);
                tracing::warn!(error = %e, "rate limit store unavailable, allowing request");
                RateLimitStatus {
                    limit,
                    remaining: limit,
                    reset_at: unix_now() + self.window.as_secs(),
                    exceeded: false,
                }
            }
        }
    }
}
