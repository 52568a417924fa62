//! Deadline enforcement for conversion work

use std::future::Future;
use std::time::Duration;

use crate::artifacts::{Artifact, ArtifactSlot};
use crate::error::{ConvertError, ConvertResult};

/// Bounds the wall-clock time of a single dispatch
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    limit: Duration,
}

impl TimeoutGuard {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Race `op` against the deadline
    pub async fn with_deadline<T, F>(&self, op: F) -> ConvertResult<T>
    where
        F: Future<Output = ConvertResult<T>>,
    {
        match tokio::time::timeout(self.limit, op).await {
            Ok(result) => result,
            Err(_) => Err(ConvertError::Timeout {
                secs: self.limit.as_secs(),
            }),
        }
    }

    /// Race a dispatch writing into `slot` against the deadline
    ///
    /// On expiry the slot is abandoned before `Timeout` is returned, so no
    /// artifact for this request exists afterwards.
    pub async fn guard<F>(&self, slot: &ArtifactSlot, op: F) -> ConvertResult<Artifact>
    where
        F: Future<Output = ConvertResult<Artifact>>,
    {
        let result = self.with_deadline(op).await;
        if let Err(ConvertError::Timeout { .. }) = &result {
            tracing::warn!(
                path = %slot.path().display(),
                limit_secs = self.limit.as_secs(),
                "Conversion exceeded deadline"
            );
            slot.abandon().await;
        }
        result
    }
}
