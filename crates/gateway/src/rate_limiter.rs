use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Tokens come back in whole-minute steps.
pub const REFILL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct TokenBucket {
    capacity: u32,
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, now: Instant) -> Self {
        TokenBucket {
            capacity,
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Every full interval since the last refill restores `capacity` tokens, never past capacity.
    fn refill_tokens(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let intervals = elapsed.as_secs() / REFILL_INTERVAL.as_secs();
        if intervals == 0 {
            return;
        }

        let restored = intervals.saturating_mul(u64::from(self.capacity));
        let tokens = (u64::from(self.tokens) + restored).min(u64::from(self.capacity));
        self.tokens = u32::try_from(tokens).unwrap_or(self.capacity);
        self.last_refill += Duration::from_secs(intervals * REFILL_INTERVAL.as_secs());
    }

    fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill_tokens(now);
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }
}

/// Per-API-key token buckets, created on a key's first request and kept for
/// the life of the process.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<String, TokenBucket>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take one token from `key`'s bucket. A new bucket holds `limit_per_minute` tokens.
    pub fn admit(&self, key: &str, limit_per_minute: u32) -> bool {
        self.admit_at(key, limit_per_minute, Instant::now())
    }

    pub fn admit_at(&self, key: &str, limit_per_minute: u32, now: Instant) -> bool {
        if let Some(mut bucket) = self.buckets.get_mut(key) {
            return bucket.try_acquire(now);
        }

        // the shard stays locked between lookup and insert, so racing first
        // requests for one key share a single bucket
        self.buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(limit_per_minute, now))
            .try_acquire(now)
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn admits_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        for _ in 0..5 {
            assert!(limiter.admit_at("key", 5, now));
        }
        assert!(!limiter.admit_at("key", 5, now));
        assert!(!limiter.admit_at("key", 5, now + Duration::from_secs(59)));
    }

    #[test]
    fn full_interval_restores_the_bucket() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        for _ in 0..3 {
            assert!(limiter.admit_at("key", 3, now));
        }
        assert!(!limiter.admit_at("key", 3, now));

        let later = now + REFILL_INTERVAL;
        for _ in 0..3 {
            assert!(limiter.admit_at("key", 3, later));
        }
        assert!(!limiter.admit_at("key", 3, later));
    }

    #[test]
    fn idle_buckets_never_exceed_capacity() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        assert!(limiter.admit_at("key", 2, now));

        let much_later = now + Duration::from_secs(60 * 60);
        assert!(limiter.admit_at("key", 2, much_later));
        assert!(limiter.admit_at("key", 2, much_later));
        assert!(!limiter.admit_at("key", 2, much_later));
    }

    #[test]
    fn well_spaced_requests_are_never_rejected() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        for i in 0..10u64 {
            assert!(limiter.admit_at("key", 10, start + Duration::from_secs(i * 6)));
        }
    }

    #[test]
    fn over_limit_inside_a_minute_is_rejected() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        let admitted = (0..11u64)
            .filter(|i| limiter.admit_at("key", 10, start + Duration::from_secs(i * 5)))
            .count();
        assert_eq!(admitted, 10);
    }

    #[test]
    fn keys_have_separate_buckets() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        assert!(limiter.admit_at("a", 1, now));
        assert!(!limiter.admit_at("a", 1, now));
        assert!(limiter.admit_at("b", 1, now));
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn concurrent_first_requests_share_one_bucket() {
        let limiter = RateLimiter::new();
        let admitted = AtomicUsize::new(0);
        let now = Instant::now();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        if limiter.admit_at("shared", 100, now) {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::SeqCst), 100);
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
