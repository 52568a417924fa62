//! Cleanup Scheduler
//!
//! Background task reaping artifacts older than the retention window.
//! Each cycle scans every store, deletes expired entries and goes back to
//! sleep. A failure on one artifact is logged and the cycle carries on.

use std::io;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::store::{Artifact, ArtifactStore, DeleteOutcome};

/// Counters for one cleanup cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub scanned: usize,
    pub deleted: usize,
    pub already_gone: usize,
    pub failed: usize,
}

impl CleanupReport {
    fn merge(&mut self, other: CleanupReport) {
        self.scanned += other.scanned;
        self.deleted += other.deleted;
        self.already_gone += other.already_gone;
        self.failed += other.failed;
    }
}

/// Periodic reaper over one or more artifact stores
#[derive(Debug, Clone)]
pub struct CleanupScheduler {
    stores: Vec<ArtifactStore>,
    retention: Duration,
    interval: Duration,
}

impl CleanupScheduler {
    /// Create a scheduler that sleeps for the retention window between cycles
    pub fn new(stores: Vec<ArtifactStore>, retention: Duration) -> Self {
        Self {
            stores,
            retention,
            interval: retention,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Run a single cycle against the current time
    pub async fn run_once(&self) -> CleanupReport {
        self.sweep(Utc::now()).await
    }

    /// Run a single cycle, treating `now` as the current time
    pub async fn sweep(&self, now: DateTime<Utc>) -> CleanupReport {
        let mut report = CleanupReport::default();
        for store in &self.stores {
            report.merge(self.sweep_store(store, now).await);
        }
        report
    }

    async fn sweep_store(&self, store: &ArtifactStore, now: DateTime<Utc>) -> CleanupReport {
        self.reap(store, store.list(), now).await
    }

    /// Delete the expired entries of `listing`, one at a time
    async fn reap<S>(&self, store: &ArtifactStore, listing: S, now: DateTime<Utc>) -> CleanupReport
    where
        S: Stream<Item = io::Result<Artifact>>,
    {
        let mut report = CleanupReport::default();
        let retention = chrono::Duration::from_std(self.retention)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        let mut listing = Box::pin(listing);

        while let Some(entry) = listing.next().await {
            let artifact = match entry {
                Ok(artifact) => artifact,
                Err(e) => {
                    tracing::error!(
                        root = %store.root().display(),
                        error = %e,
                        "Exception during periodic cleanup"
                    );
                    report.failed += 1;
                    continue;
                }
            };
            report.scanned += 1;

            if now.signed_duration_since(artifact.created_at) <= retention {
                continue;
            }

            match store.delete(&artifact).await {
                Ok(DeleteOutcome::Deleted) => {
                    tracing::info!(path = %artifact.path.display(), "Automatically deleted artifact");
                    report.deleted += 1;
                }
                Ok(DeleteOutcome::NotFound) => {
                    tracing::debug!(path = %artifact.path.display(), "Artifact already removed");
                    report.already_gone += 1;
                }
                Err(e) => {
                    tracing::error!(
                        path = %artifact.path.display(),
                        error = %e,
                        "Exception during periodic cleanup"
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Start the background loop
    ///
    /// The first scan runs immediately; later scans follow the interval.
    pub fn start(self) -> CleanupHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(
                retention_secs = self.retention.as_secs(),
                interval_secs = self.interval.as_secs(),
                stores = self.stores.len(),
                "Cleanup scheduler started"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }

                tracing::debug!("Cleanup scan starting");
                let report = self.run_once().await;
                if report.deleted > 0 || report.failed > 0 {
                    tracing::info!(
                        scanned = report.scanned,
                        deleted = report.deleted,
                        already_gone = report.already_gone,
                        failed = report.failed,
                        "Cleanup cycle complete"
                    );
                } else {
                    tracing::debug!(scanned = report.scanned, "Cleanup cycle complete");
                }
            }

            tracing::info!("Cleanup scheduler stopped");
        });

        CleanupHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running cleanup loop
pub struct CleanupHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CleanupHandle {
    /// Signal the loop to stop and wait for it
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Cleanup task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store_with(count: usize) -> (TempDir, ArtifactStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path());
        for i in 0..count {
            store.write(&format!("img{i}.png"), "jpeg", vec![0xFF; 16]).await.unwrap();
        }
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_fresh_artifacts_are_kept() {
        let (_dir, store) = store_with(3).await;
        let scheduler = CleanupScheduler::new(vec![store], Duration::from_secs(3600));

        let report = scheduler.run_once().await;
        assert_eq!(report.scanned, 3);
        assert_eq!(report.deleted, 0);
    }

    #[tokio::test]
    async fn test_expired_artifacts_are_deleted() {
        let (_dir, store) = store_with(3).await;
        let scheduler = CleanupScheduler::new(vec![store.clone()], Duration::from_secs(3600));

        let later = Utc::now() + chrono::Duration::hours(2);
        let report = scheduler.sweep(later).await;
        assert_eq!(report.deleted, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(store.list().count().await, 0);
    }

    #[tokio::test]
    async fn test_back_to_back_sweeps_never_error() {
        let (_dir, store) = store_with(5).await;
        let scheduler = CleanupScheduler::new(vec![store], Duration::from_secs(1));
        let later = Utc::now() + chrono::Duration::hours(1);

        let (first, second) = tokio::join!(scheduler.sweep(later), scheduler.sweep(later));
        assert_eq!(first.failed + second.failed, 0);
        assert_eq!(first.deleted + second.deleted, 5);

        let third = scheduler.sweep(later).await;
        assert_eq!(third, CleanupReport::default());
    }

    #[tokio::test]
    async fn test_failed_delete_does_not_stop_the_cycle() {
        let (dir, store) = store_with(2).await;

        // A directory cannot be unlinked as a file, whatever the privileges
        let stuck = dir.path().join("stuck.jpeg");
        std::fs::create_dir(&stuck).unwrap();
        std::fs::write(stuck.join("keep"), b"x").unwrap();
        let undeletable = Artifact {
            path: stuck.clone(),
            created_at: Utc::now() - chrono::Duration::hours(3),
            size_bytes: 1,
        };

        let listing = futures::stream::iter(vec![Ok(undeletable)]).chain(store.list());
        let scheduler = CleanupScheduler::new(vec![store.clone()], Duration::from_secs(60));
        let report = scheduler.reap(&store, listing, Utc::now() + chrono::Duration::hours(1)).await;

        assert_eq!(report.scanned, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.deleted, 2);
        assert!(stuck.is_dir());
        assert_eq!(store.list().count().await, 0);
    }

    #[tokio::test]
    async fn test_listing_errors_are_counted() {
        let (_dir, store) = store_with(1).await;
        let broken = io::Error::new(io::ErrorKind::PermissionDenied, "denied");

        let listing = futures::stream::iter(vec![Err(broken)]).chain(store.list());
        let scheduler = CleanupScheduler::new(vec![store.clone()], Duration::from_secs(60));
        let report = scheduler.reap(&store, listing, Utc::now() + chrono::Duration::hours(1)).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.deleted, 1);
    }

    #[tokio::test]
    async fn test_sweeps_every_store() {
        let (_a, images) = store_with(2).await;
        let (_b, documents) = store_with(1).await;
        let scheduler = CleanupScheduler::new(vec![images, documents], Duration::from_secs(60));

        let report = scheduler.sweep(Utc::now() + chrono::Duration::minutes(5)).await;
        assert_eq!(report.scanned, 3);
        assert_eq!(report.deleted, 3);
    }

    #[tokio::test]
    async fn test_background_loop_reaps_and_stops() {
        let (_dir, store) = store_with(2).await;
        let scheduler = CleanupScheduler::new(vec![store.clone()], Duration::from_millis(1))
            .with_interval(Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(10)).await;
        let handle = scheduler.start();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store.list().count().await, 0);
        handle.stop().await;
    }
}
