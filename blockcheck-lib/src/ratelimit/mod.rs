//! Outbound probe throttling.
//!
//! A token bucket with lazy refill: tokens accrue as a pure function of
//! elapsed time, computed on each acquisition attempt rather than by a
//! background timer. Waiters sleep for the exact deficit and re-check on
//! wakeup, so a task woken early (or racing another acquirer) simply
//! recomputes its remaining wait.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Default bucket capacity (burst size)
pub const DEFAULT_CAPACITY: u32 = 20;
/// Default refill rate in tokens per second
pub const DEFAULT_REFILL_RATE: f64 = 15.0;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, capacity: f64, rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = capacity.min(self.tokens + elapsed * rate);
            self.last_refill = now;
        }
    }
}

/// Token-bucket rate limiter shared by all probes.
///
/// Purely a delay primitive: [`RateLimiter::acquire`] has no error
/// conditions, it just suspends the caller until the requested tokens are
/// available. Safe for concurrent callers.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    capacity: f64,
    rate: f64,
}

impl RateLimiter {
    /// Create a limiter with the given capacity (burst) and refill rate in
    /// tokens per second.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or `rate` is not strictly positive.
    #[must_use]
    pub fn new(capacity: u32, rate: f64) -> Self {
        assert!(capacity > 0, "capacity must be non-zero");
        assert!(rate > 0.0, "refill rate must be positive");
        Self {
            bucket: Mutex::new(Bucket {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
            }),
            capacity: f64::from(capacity),
            rate,
        }
    }

    /// Suspend until `n` tokens are available, then deduct them.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the bucket capacity; such a request could never
    /// be satisfied.
    pub async fn acquire(&self, n: u32) {
        let need = f64::from(n);
        assert!(
            need <= self.capacity,
            "cannot acquire {n} tokens from a bucket of capacity {}",
            self.capacity
        );

        loop {
            let wait = {
                let mut bucket = self.bucket.lock().expect("rate limiter lock poisoned");
                bucket.refill(self.capacity, self.rate);
                if bucket.tokens >= need {
                    bucket.tokens -= need;
                    return;
                }
                Duration::from_secs_f64((need - bucket.tokens) / self.rate)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Tokens currently available (after a lazy refill). Exposed for
    /// observability; the value is stale the moment it is returned.
    #[must_use]
    pub fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().expect("rate limiter lock poisoned");
        bucket.refill(self.capacity, self.rate);
        bucket.tokens
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_REFILL_RATE)
    }
}
