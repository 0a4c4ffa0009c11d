use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use stampede_core::{Pacing, TargetConfig};
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::time::Instant;

/// Decides when a worker may start its next operation.
pub(crate) enum Pacer {
    /// Fixed sleep after every operation, independent of how long the operation took.
    Interval(Duration),
    /// One token bucket shared by all workers of a target.
    Shared(DefaultDirectRateLimiter),
}

impl Pacer {
    pub fn for_target(target: &TargetConfig) -> Self {
        let interval = target.interval();
        match target.pacing {
            Pacing::PerWorker => Pacer::Interval(interval),
            Pacing::SharedLimiter => {
                let workers = u32::try_from(target.workers).unwrap_or(u32::MAX).max(1);
                Pacer::Shared(rate_limiter(interval / workers))
            }
        }
    }

    /// Waits for permission to start an operation. Returns `false` if the deadline came first.
    pub async fn before_operation(&self, deadline: Instant) -> bool {
        match self {
            Pacer::Interval(_) => Instant::now() < deadline,
            Pacer::Shared(limiter) => {
                tokio::time::timeout_at(deadline, limiter.until_ready())
                    .await
                    .is_ok()
                    && Instant::now() < deadline
            }
        }
    }

    /// Sleeps between operations, never past the deadline. Returns `false` once the deadline
    /// has been reached.
    pub async fn after_operation(&self, deadline: Instant) -> bool {
        if let Pacer::Interval(interval) = self {
            let next = Instant::now()
                .checked_add(*interval)
                .unwrap_or(deadline)
                .min(deadline);
            tokio::time::sleep_until(next).await;
        }
        Instant::now() < deadline
    }
}

fn rate_limiter(period: Duration) -> DefaultDirectRateLimiter {
    let quota = Quota::with_period(period).unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX));
    RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::TargetKind;

    #[tokio::test(start_paused = true)]
    async fn interval_sleep_is_capped_at_deadline() {
        let target = TargetConfig::new("a", TargetKind::Filesystem).rate(0.1);
        let pacer = Pacer::for_target(&target);

        let start = Instant::now();
        let deadline = start + Duration::from_secs(2);
        assert!(!pacer.after_operation(deadline).await);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(2_010), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn interval_sleep_is_full_before_deadline() {
        let target = TargetConfig::new("a", TargetKind::Filesystem).rate(4.);
        let pacer = Pacer::for_target(&target);

        let start = Instant::now();
        assert!(pacer.after_operation(start + Duration::from_secs(10)).await);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(249), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(260), "{elapsed:?}");
    }

    #[tokio::test]
    async fn shared_limiter_spreads_rate_over_workers() {
        let target = TargetConfig::new("a", TargetKind::Filesystem)
            .workers(4)
            .rate(50.)
            .pacing(Pacing::SharedLimiter);
        let pacer = Pacer::for_target(&target);
        let deadline = Instant::now() + Duration::from_secs(5);

        // 4 workers at 50/s share 200/s, so 21 permits need at least 100ms.
        let start = Instant::now();
        for _ in 0..21 {
            assert!(pacer.before_operation(deadline).await);
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(90), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(1), "{elapsed:?}");
    }
}
