//! Shared outbound request limiter.
//!
//! Every outbound HTTP or browser-driven request the engine makes passes
//! through one [`RequestLimiter`], regardless of which backend issues it.
//! The limiter enforces two independent bounds:
//!
//! - a maximum number of requests in flight (semaphore), and
//! - a minimum interval between dispatches (governor quota).
//!
//! Backends hold the returned [`RequestPermit`] for the duration of the
//! request; dropping it releases the concurrency slot.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorLimiter};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default ceiling on concurrent outbound requests.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Default minimum spacing between request dispatches.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(500);

/// Token proving a request slot was granted.
///
/// The concurrency slot is held until this is dropped.
pub struct RequestPermit {
    _permit: OwnedSemaphorePermit,
}

/// Shared pacing + concurrency limiter for outbound requests.
pub struct RequestLimiter {
    pacing: Arc<DirectLimiter>,
    concurrency: Arc<Semaphore>,
    max_concurrent: usize,
}

impl RequestLimiter {
    /// Create a limiter with explicit bounds.
    ///
    /// `min_interval` shorter than 1ms is clamped up; a pacing quota of
    /// zero would mean "never dispatch", which no caller wants.
    pub fn new(max_concurrent: usize, min_interval: Duration) -> Self {
        let interval = min_interval.max(Duration::from_millis(1));
        let quota = Quota::with_period(interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::new(2).unwrap()));
        let max_concurrent = max_concurrent.max(1);
        Self {
            pacing: Arc::new(GovernorLimiter::direct(quota)),
            concurrency: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Wait until a request may be dispatched.
    ///
    /// Acquires a concurrency slot first, then waits out the pacing
    /// quota, so a slow burst of callers queues on the semaphore rather
    /// than stampeding the pacer.
    pub async fn acquire(&self) -> RequestPermit {
        let permit = self
            .concurrency
            .clone()
            .acquire_owned()
            .await
            .expect("request semaphore never closes");
        self.pacing.until_ready().await;
        RequestPermit { _permit: permit }
    }

    /// Configured concurrency ceiling.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Currently available concurrency slots (for diagnostics).
    pub fn available_slots(&self) -> usize {
        self.concurrency.available_permits()
    }
}

impl Default for RequestLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT, DEFAULT_MIN_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[tokio::test]
    async fn test_pacing_spreads_dispatches() {
        let limiter = RequestLimiter::new(10, Duration::from_millis(30));

        let start = Instant::now();
        for _ in 0..3 {
            let _permit = limiter.acquire().await;
        }
        // First dispatch is free; the next two wait out the interval.
        assert!(start.elapsed() >= Duration::from_millis(55));
    }

    #[tokio::test]
    async fn test_concurrency_bound_holds() {
        let limiter = Arc::new(RequestLimiter::new(2, Duration::from_millis(1)));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_permit_releases_slot_on_drop() {
        let limiter = RequestLimiter::new(1, Duration::from_millis(1));
        {
            let _permit = limiter.acquire().await;
            assert_eq!(limiter.available_slots(), 0);
        }
        assert_eq!(limiter.available_slots(), 1);
    }
}
