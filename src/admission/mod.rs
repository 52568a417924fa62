//! Request admission
//!
//! The gate in front of every conversion: per-client rate limiting and the
//! payload size ceiling. Nothing is converted or written before admission.

mod rate_limit;

pub use rate_limit::{retry_after_secs, RateDecision, RateLimiter, RatePolicy};

use crate::error::{ConvertError, ConvertResult};

/// Size + rate gate for one endpoint
#[derive(Clone)]
pub struct Admission {
    max_payload: u64,
    limiter: RateLimiter,
}

impl Admission {
    pub fn new(max_payload: u64, policy: RatePolicy) -> Self {
        Self {
            max_payload,
            limiter: RateLimiter::new(policy),
        }
    }

    pub fn max_payload(&self) -> u64 {
        self.max_payload
    }

    /// Admit a request of `payload_size` bytes from `client_key`
    ///
    /// The rate limit is charged first, so an oversized upload still counts
    /// against the client's quota.
    pub fn admit(&self, client_key: &str, payload_size: u64) -> ConvertResult<()> {
        self.check_rate(client_key)?;
        self.check_size(payload_size)
    }

    /// Charge one request against the client's quota
    pub fn check_rate(&self, client_key: &str) -> ConvertResult<()> {
        match self.limiter.check(client_key) {
            RateDecision::Allow { remaining } => {
                tracing::trace!(client = %client_key, remaining, "Request admitted");
                Ok(())
            }
            RateDecision::Reject { retry_after } => {
                tracing::warn!(client = %client_key, "Rate limit exceeded");
                Err(ConvertError::RateLimited {
                    retry_after_secs: retry_after_secs(retry_after),
                })
            }
        }
    }

    /// Charge a request that failed before it could be admitted
    ///
    /// Returns `RateLimited` if the client is over quota, `err` otherwise.
    pub fn reject(&self, client_key: &str, err: ConvertError) -> ConvertError {
        match self.check_rate(client_key) {
            Ok(()) => err,
            Err(limited) => limited,
        }
    }

    pub fn check_size(&self, payload_size: u64) -> ConvertResult<()> {
        if payload_size > self.max_payload {
            tracing::warn!(size = payload_size, max = self.max_payload, "File too large");
            return Err(ConvertError::PayloadTooLarge {
                size: payload_size,
                max: self.max_payload,
            });
        }
        Ok(())
    }
}
