//! Per-connection token bucket.

use tokio::time::Instant;

use crate::config::RateLimit;

#[derive(Debug, Clone)]
pub struct TokenBucket {
    per_sec: f64,
    burst:   f64,
    tokens:  f64,
    last:    Instant,
}

impl TokenBucket {
    pub fn new(limit: RateLimit) -> Self {
        let burst = limit.burst.max(1.0);
        Self { per_sec: limit.per_sec.max(0.0), burst, tokens: burst, last: Instant::now() }
    }

    /// Takes one token if available.
    pub fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        self.tokens = (self.tokens + elapsed * self.per_sec).min(self.burst);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
