//! Per-client limits for the public form endpoints.
//!
//! State lives in this process only. Several instances behind a balancer each
//! count separately, so the effective limit grows with the instance count.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const MAX_REQUESTS_PER_MINUTE: usize = 3;
pub const MAX_REQUESTS_PER_HOUR: usize = 10;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    MinuteExceeded,
    HourExceeded,
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed)
    }

    pub fn message(&self) -> &'static str {
        match self {
            RateLimitDecision::Allowed => "",
            RateLimitDecision::MinuteExceeded => "Слишком много запросов. Подождите минуту.",
            RateLimitDecision::HourExceeded => "Превышен лимит запросов в час. Попробуйте позже.",
        }
    }
}

/// Accepted request times of one key within the last hour, oldest first.
#[derive(Debug, Default)]
struct RequestWindow {
    hits: VecDeque<Instant>,
}

impl RequestWindow {
    fn evict(&mut self, now: Instant) {
        while let Some(oldest) = self.hits.front() {
            if now.saturating_duration_since(*oldest) > HOUR {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    fn check(&mut self, now: Instant) -> RateLimitDecision {
        self.evict(now);

        let last_minute = self
            .hits
            .iter()
            .rev()
            .take_while(|hit| now.saturating_duration_since(**hit) <= MINUTE)
            .count();

        if last_minute >= MAX_REQUESTS_PER_MINUTE {
            return RateLimitDecision::MinuteExceeded;
        }
        if self.hits.len() >= MAX_REQUESTS_PER_HOUR {
            return RateLimitDecision::HourExceeded;
        }

        self.hits.push_back(now);
        RateLimitDecision::Allowed
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Arc<Mutex<RequestWindow>>>>,
}

impl RateLimiter {
    pub fn key(client_ip: &str, action: &str) -> String {
        format!("{client_ip}:{action}")
    }

    /// Records the request when it is allowed. Rejected requests are not counted.
    pub fn check(&self, key: &str, now: Instant) -> RateLimitDecision {
        let window = {
            let mut windows = lock(&self.windows);
            match windows.get(key) {
                Some(window) => window.clone(),
                None => windows.entry(key.to_string()).or_default().clone(),
            }
        };

        let decision = lock(&window).check(now);
        decision
    }

    /// Drops keys without requests in the last hour. Returns how many were dropped.
    ///
    /// A window still referenced outside the map belongs to a `check` in progress and is kept.
    pub fn prune(&self, now: Instant) -> usize {
        let mut windows = lock(&self.windows);
        let before = windows.len();

        windows.retain(|_, window| {
            if Arc::strong_count(window) > 1 {
                return true;
            }

            match window.try_lock() {
                Ok(mut window) => {
                    window.evict(now);
                    !window.hits.is_empty()
                }
                Err(_) => true,
            }
        });

        before - windows.len()
    }

    pub fn tracked_keys(&self) -> usize {
        lock(&self.windows).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_three_requests_per_minute() {
        let limiter = RateLimiter::default();
        let start = Instant::now();
        let key = RateLimiter::key("10.0.0.1", "feedback");

        for i in 0..3 {
            assert_eq!(
                limiter.check(&key, start + Duration::from_secs(i)),
                RateLimitDecision::Allowed
            );
        }

        let decision = limiter.check(&key, start + Duration::from_secs(10));
        assert_eq!(decision, RateLimitDecision::MinuteExceeded);
        assert_eq!(decision.message(), "Слишком много запросов. Подождите минуту.");

        assert!(limiter
            .check(&key, start + Duration::from_secs(62))
            .is_allowed());
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::default();
        let now = Instant::now();

        for _ in 0..3 {
            limiter.check("10.0.0.1:feedback", now);
        }

        assert!(!limiter.check("10.0.0.1:feedback", now).is_allowed());
        assert!(limiter.check("10.0.0.1:team", now).is_allowed());
        assert!(limiter.check("10.0.0.2:feedback", now).is_allowed());
    }

    #[test]
    fn allows_ten_requests_per_hour() {
        let limiter = RateLimiter::default();
        let start = Instant::now();
        let key = "10.0.0.1:team";

        for i in 0..10 {
            let at = start + Duration::from_secs(i * 61);
            assert!(limiter.check(key, at).is_allowed(), "request {i}");
        }

        let at = start + Duration::from_secs(10 * 61);
        assert_eq!(limiter.check(key, at), RateLimitDecision::HourExceeded);

        // the first request leaves the window an hour after it was made
        let at = start + HOUR + Duration::from_secs(1);
        assert!(limiter.check(key, at).is_allowed());
    }

    #[test]
    fn rejected_requests_are_not_counted() {
        let limiter = RateLimiter::default();
        let start = Instant::now();
        let key = "10.0.0.1:feedback";

        for _ in 0..3 {
            limiter.check(key, start);
        }
        for i in 0..20 {
            limiter.check(key, start + Duration::from_secs(i));
        }

        assert!(limiter.check(key, start + Duration::from_secs(61)).is_allowed());
    }

    #[test]
    fn prune_drops_idle_keys() {
        let limiter = RateLimiter::default();
        let start = Instant::now();

        limiter.check("10.0.0.1:feedback", start);
        limiter.check("10.0.0.2:feedback", start + Duration::from_secs(30 * 60));

        assert_eq!(limiter.prune(start + HOUR + Duration::from_secs(1)), 1);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn prune_keeps_window_of_check_in_progress() {
        let limiter = RateLimiter::default();
        let start = Instant::now();
        let key = "10.0.0.1:feedback";
        let later = start + HOUR + Duration::from_secs(1);

        limiter.check(key, start);

        // `check` has fetched the window but not locked it yet
        let in_flight = lock(&limiter.windows).get(key).unwrap().clone();
        assert_eq!(limiter.prune(later), 0);
        assert_eq!(lock(&in_flight).check(later), RateLimitDecision::Allowed);
        drop(in_flight);

        limiter.check(key, later);
        limiter.check(key, later);
        assert_eq!(limiter.check(key, later), RateLimitDecision::MinuteExceeded);
    }

    #[test]
    fn concurrent_checks_respect_the_limit() {
        let limiter = Arc::new(RateLimiter::default());
        let now = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || limiter.check("10.0.0.1:feedback", now).is_allowed())
            })
            .collect();

        let allowed = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|allowed| *allowed)
            .count();

        assert_eq!(allowed, MAX_REQUESTS_PER_MINUTE);
    }
}
