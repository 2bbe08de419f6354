use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Snapshot of a pool's `RateLimiter.TokenBucket`, as returned by every rate limiter getter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBucketRateLimit {
    pub tokens: U256,
    /// Unix timestamp of the last refill.
    pub last_updated: u32,
    pub is_enabled: bool,
    pub capacity: U256,
    /// Tokens added per second.
    pub rate: U256,
}
