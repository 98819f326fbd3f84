use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Share of a token's lifetime treated as already expired
const SAFETY_MARGIN_RATIO: f64 = 0.10;

/// Bearer token issued by the identity source
#[derive(Clone, PartialEq)]
pub struct CachedToken {
    pub value: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn new(value: String, issued_at: DateTime<Utc>, expires_in_seconds: i64) -> Self {
        Self {
            value,
            issued_at,
            expires_at: issued_at + Duration::seconds(expires_in_seconds.max(0)),
        }
    }

    /// 10% of the lifetime, so reuse stops before the source would reject it
    pub fn safety_margin(&self) -> Duration {
        let lifetime_ms = (self.expires_at - self.issued_at).num_milliseconds().max(0);
        Duration::milliseconds((lifetime_ms as f64 * SAFETY_MARGIN_RATIO) as i64)
    }

    /// Reusable while `now < expires_at - safety_margin`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - self.safety_margin()
    }
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("value", &"***")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
