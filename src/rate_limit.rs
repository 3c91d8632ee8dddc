use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use std::time::Duration;

/// Rate-limit window reported by the service on its last response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: u32,
    pub remaining: u32,
    pub reset: DateTime<Utc>,
}

impl RateLimit {
    /// Reads `RateLimit-Limit`, `RateLimit-Remaining` and `RateLimit-Reset`
    /// (unix seconds). All three must be present and numeric.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let number = |name: &str| -> Option<i64> {
            headers.get(name)?.to_str().ok()?.trim().parse().ok()
        };
        let limit = u32::try_from(number("ratelimit-limit")?).ok()?;
        let remaining = u32::try_from(number("ratelimit-remaining")?).ok()?;
        let reset = DateTime::from_timestamp(number("ratelimit-reset")?, 0)?;
        Some(Self {
            limit,
            remaining,
            reset,
        })
    }

    /// Time left until the window resets, zero if it already has.
    pub fn wait_time(&self, now: DateTime<Utc>) -> Duration {
        (self.reset - now).to_std().unwrap_or(Duration::ZERO)
    }

    pub const fn is_near_exhaustion(&self, tolerance: u32) -> bool {
        self.remaining <= tolerance
    }
}
