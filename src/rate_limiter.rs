use crate::packet::MAX_DATAGRAM_SIZE;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::trace;

/// Token bucket that paces outgoing bytes to a configured ceiling. Tokens are refilled lazily
///  on every call, and a send that exceeds the available tokens puts the bucket into debt and
///  sleeps until the debt is paid off.
///
/// A limit of 0 means unlimited, and the bucket is bypassed entirely.
pub struct RateLimiter {
    max_bytes_per_sec: u32,
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(max_bytes_per_sec: u32) -> RateLimiter {
        let mut result = RateLimiter {
            max_bytes_per_sec: 0,
            tokens: 0.0,
            last_refill: Instant::now(),
        };
        result.set_max_bytes_per_sec(max_bytes_per_sec);
        result
    }

    pub fn max_bytes_per_sec(&self) -> u32 {
        self.max_bytes_per_sec
    }

    pub fn set_max_bytes_per_sec(&mut self, max_bytes_per_sec: u32) {
        self.max_bytes_per_sec = max_bytes_per_sec;
        self.tokens = self.capacity();
        self.last_refill = Instant::now();
    }

    /// The bucket holds at most 10ms worth of traffic, but never less than one maximum-size
    ///  datagram
    fn capacity(&self) -> f64 {
        (self.max_bytes_per_sec as f64 / 100.0).max(MAX_DATAGRAM_SIZE as f64)
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.max_bytes_per_sec as f64).min(self.capacity());
        self.last_refill = now;
    }

    pub async fn wait_to_send(&mut self, len: usize) {
        if self.max_bytes_per_sec == 0 {
            return;
        }

        self.refill();
        self.tokens -= len as f64;
        if self.tokens < 0.0 {
            let wait = Duration::from_secs_f64(-self.tokens / self.max_bytes_per_sec as f64);
            trace!("rate limit reached, waiting {:?}", wait);
            sleep(wait).await;
        }
    }
}
