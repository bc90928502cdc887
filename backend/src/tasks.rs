use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::debug;

use crate::rate_limit::RateLimiter;

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

pub fn spawn_tasks(limiter: Arc<RateLimiter>) {
    tokio::spawn(prune_rate_limits(limiter));
}

pub async fn prune_rate_limits(limiter: Arc<RateLimiter>) {
    loop {
        sleep(PRUNE_INTERVAL).await;

        let dropped = limiter.prune(Instant::now());
        if dropped > 0 {
            debug!(dropped, remaining = limiter.tracked_keys(), "Pruned idle rate limit keys");
        }
    }
}
