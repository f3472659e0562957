// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Token-bucket rate limiter shared by every outbound request

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::trace;

/// Back-off between failed acquire attempts
pub const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Bucket {
    allowance: f64,
    last_check: Instant,
}

/// Token bucket refilled continuously at `per_minute / 60` tokens per second
pub struct RateLimiter {
    per_minute: u32,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a limiter whose burst capacity equals the per-minute ceiling
    pub fn new(per_minute: u32) -> Self {
        Self::with_burst(per_minute, per_minute)
    }

    /// Create a limiter with an explicit burst capacity.
    ///
    /// The bucket starts full.
    pub fn with_burst(per_minute: u32, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            per_minute,
            capacity,
            bucket: Mutex::new(Bucket {
                allowance: capacity,
                last_check: Instant::now(),
            }),
        }
    }

    pub fn per_minute(&self) -> u32 {
        self.per_minute
    }

    fn refill_rate(&self) -> f64 {
        f64::from(self.per_minute) / 60.0
    }

    /// Take one token if available
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Take one token as of `now`
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        // Bucket is two plain numbers; poisoning cannot corrupt it
        let mut bucket = match self.bucket.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let elapsed = now.saturating_duration_since(bucket.last_check);
        if now > bucket.last_check {
            bucket.last_check = now;
        }
        bucket.allowance =
            (bucket.allowance + elapsed.as_secs_f64() * self.refill_rate()).min(self.capacity);

        if bucket.allowance < 1.0 {
            false
        } else {
            bucket.allowance -= 1.0;
            true
        }
    }

    /// Wait until a token is available
    pub async fn acquire(&self) {
        while !self.try_acquire() {
            trace!("Rate limit reached, backing off");
            tokio::time::sleep(ACQUIRE_POLL_INTERVAL).await;
        }
    }
}
