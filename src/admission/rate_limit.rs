//! Sliding-window rate limiter
//!
//! Keeps a log of request instants per client. A check prunes instants that
//! left the window, then either records the new request or rejects it. The
//! whole read-modify-write happens under one `parking_lot::Mutex`, so bursts
//! of concurrent requests from one client are counted exactly.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Purge idle clients once the table grows past this many keys
const PURGE_THRESHOLD: usize = 4096;

/// Rate limiting policy: `quota` requests per `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub quota: u32,
    pub window: Duration,
}

impl RatePolicy {
    pub fn per_minute(quota: u32) -> Self {
        Self {
            quota,
            window: Duration::from_secs(60),
        }
    }
}

/// Decision for a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow { remaining: u32 },
    Reject { retry_after: Duration },
}

/// Whole seconds a rejected client should wait: rounded up, at least one
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    (retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0)).max(1)
}

/// Per-client sliding window limiter
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

struct RateLimiterInner {
    policy: RatePolicy,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(policy: RatePolicy) -> Self {
        Self {
            inner: Arc::new(RateLimiterInner {
                policy,
                clients: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn policy(&self) -> RatePolicy {
        self.inner.policy
    }

    /// Check and record a request from `client`
    pub fn check(&self, client: &str) -> RateDecision {
        self.check_at(client, Instant::now())
    }

    /// Check and record a request from `client` at a given instant
    pub fn check_at(&self, client: &str, now: Instant) -> RateDecision {
        let RatePolicy { quota, window } = self.inner.policy;
        let mut clients = self.inner.clients.lock();

        if clients.len() > PURGE_THRESHOLD {
            clients.retain(|_, log| {
                prune(log, now, window);
                !log.is_empty()
            });
        }

        let log = clients.entry(client.to_string()).or_default();
        prune(log, now, window);

        if log.len() >= quota as usize {
            let retry_after = log
                .front()
                .map(|oldest| (*oldest + window).saturating_duration_since(now))
                .unwrap_or(window);
            return RateDecision::Reject { retry_after };
        }

        log.push_back(now);
        RateDecision::Allow {
            remaining: quota.saturating_sub(log.len() as u32),
        }
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.inner.clients.lock().len()
    }
}

fn prune(log: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = log.front() {
        if now.saturating_duration_since(*oldest) >= window {
            log.pop_front();
        } else {
            break;
        }
    }
}
