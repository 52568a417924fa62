//! Artifact lifecycle
//!
//! Converted outputs live in a flat, per-domain directory. They are created
//! by dispatch, served once, and reaped by the cleanup scheduler once they
//! outlive the retention window.

mod cleanup;
mod store;

pub use cleanup::{CleanupHandle, CleanupReport, CleanupScheduler};
pub use store::{sanitize_stem, Artifact, ArtifactSlot, ArtifactStore, DeleteOutcome};
