//! Artifact Store
//!
//! One flat directory of converted outputs. Writers never collide because
//! every output path is reserved with a unique name before any byte is
//! written, and files are opened with `create_new`.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ConvertError, ConvertResult};

/// Longest stem kept from a declared filename
const MAX_STEM_LEN: usize = 64;

// ============================================================================
// Types
// ============================================================================

/// A converted output owned by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Location on disk
    pub path: PathBuf,
    /// Filesystem creation time (modification time if unavailable)
    pub created_at: DateTime<Utc>,
    /// Size in bytes
    pub size_bytes: u64,
}

impl Artifact {
    /// Artifact file name (without directory)
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    fn from_metadata(path: PathBuf, metadata: &std::fs::Metadata) -> io::Result<Self> {
        let created = metadata.created().or_else(|_| metadata.modified())?;
        Ok(Self {
            path,
            created_at: DateTime::<Utc>::from(created),
            size_bytes: metadata.len(),
        })
    }
}

/// Result of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

// ============================================================================
// Store
// ============================================================================

/// Flat directory of artifacts for one conversion domain
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: Arc<PathBuf>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the namespace directory if missing
    pub async fn ensure_root(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(self.root.as_path()).await
    }

    /// Reserve a unique output path for `declared_filename` with `extension`
    pub fn reserve(&self, declared_filename: &str, extension: &str) -> Arc<ArtifactSlot> {
        let name = unique_name(&sanitize_stem(declared_filename), extension);
        Arc::new(ArtifactSlot::new(self.root.join(name)))
    }

    /// Write `bytes` as a new artifact
    pub async fn write(
        &self,
        declared_filename: &str,
        extension: &str,
        bytes: Vec<u8>,
    ) -> ConvertResult<Artifact> {
        let slot = self.reserve(declared_filename, extension);
        tokio::task::spawn_blocking(move || slot.commit_blocking(&bytes))
            .await
            .map_err(|e| ConvertError::internal(format!("Task join error: {}", e)))?
    }

    /// Lazily enumerate the artifacts currently present
    ///
    /// Each call starts a fresh scan of the directory. Entries removed while
    /// the scan is running are skipped.
    pub fn list(&self) -> impl Stream<Item = io::Result<Artifact>> + Send + 'static {
        stream::unfold(Listing::Pending(self.root.to_path_buf()), |listing| async move {
            let mut listing = listing;
            loop {
                listing = match listing {
                    Listing::Done => return None,
                    Listing::Pending(root) => match tokio::fs::read_dir(&root).await {
                        Ok(entries) => Listing::Reading(entries),
                        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
                        Err(e) => return Some((Err(e), Listing::Done)),
                    },
                    Listing::Reading(mut entries) => match entries.next_entry().await {
                        Ok(Some(entry)) => match entry.metadata().await {
                            Ok(metadata) if metadata.is_file() => {
                                let artifact = Artifact::from_metadata(entry.path(), &metadata);
                                return Some((artifact, Listing::Reading(entries)));
                            }
                            Ok(_) => Listing::Reading(entries),
                            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                                Listing::Reading(entries)
                            }
                            Err(e) => return Some((Err(e), Listing::Reading(entries))),
                        },
                        Ok(None) => return None,
                        Err(e) => return Some((Err(e), Listing::Done)),
                    },
                };
            }
        })
    }

    /// Delete an artifact; a missing file is reported, not an error
    pub async fn delete(&self, artifact: &Artifact) -> io::Result<DeleteOutcome> {
        match tokio::fs::remove_file(&artifact.path).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DeleteOutcome::NotFound),
            Err(e) => Err(e),
        }
    }

    /// Read an artifact's content for serving
    pub async fn read(&self, artifact: &Artifact) -> io::Result<Vec<u8>> {
        tokio::fs::read(&artifact.path).await
    }
}

enum Listing {
    Pending(PathBuf),
    Reading(tokio::fs::ReadDir),
    Done,
}

// ============================================================================
// Output slot
// ============================================================================

enum SlotState {
    Open,
    Committed(Artifact),
    Abandoned,
}

/// Reserved output path of a single dispatch
///
/// The commit lock serializes the worker's write against the caller's
/// abandonment: once [`ArtifactSlot::abandon`] returns, no artifact exists at
/// this path and none will be written later.
pub struct ArtifactSlot {
    path: PathBuf,
    state: tokio::sync::Mutex<SlotState>,
}

impl ArtifactSlot {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: tokio::sync::Mutex::new(SlotState::Open),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write and verify the output. Must run off the async runtime.
    pub fn commit_blocking(&self, bytes: &[u8]) -> ConvertResult<Artifact> {
        let mut state = self.state.blocking_lock();
        match *state {
            SlotState::Open => {}
            SlotState::Committed(ref artifact) => return Ok(artifact.clone()),
            SlotState::Abandoned => {
                return Err(ConvertError::internal("output slot was abandoned"));
            }
        }

        if let Err(e) = write_new(&self.path, bytes) {
            if e.kind() != io::ErrorKind::AlreadyExists {
                let _ = std::fs::remove_file(&self.path);
            }
            return Err(ConvertError::internal(format!(
                "Failed to save output to {}: {}",
                self.path.display(),
                e
            )));
        }

        let artifact = match verify_written(&self.path) {
            Ok(artifact) => artifact,
            Err(e) => {
                let _ = std::fs::remove_file(&self.path);
                return Err(e);
            }
        };

        *state = SlotState::Committed(artifact.clone());
        Ok(artifact)
    }

    /// Give up on this slot, removing any committed output
    pub async fn abandon(&self) {
        let mut state = self.state.lock().await;
        if let SlotState::Committed(artifact) = &*state {
            match tokio::fs::remove_file(&artifact.path).await {
                Ok(()) => tracing::debug!(path = %artifact.path.display(), "Removed abandoned output"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    path = %artifact.path.display(),
                    error = %e,
                    "Failed to remove abandoned output"
                ),
            }
        }
        *state = SlotState::Abandoned;
    }
}

fn write_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn verify_written(path: &Path) -> ConvertResult<Artifact> {
    let unverified = || ConvertError::WriteVerificationFailed(path.display().to_string());

    let metadata = std::fs::metadata(path).map_err(|_| unverified())?;
    if !metadata.is_file() || metadata.len() == 0 {
        tracing::error!(path = %path.display(), "Output was not saved correctly");
        return Err(unverified());
    }

    Artifact::from_metadata(path.to_path_buf(), &metadata).map_err(|_| unverified())
}

// ============================================================================
// Naming
// ============================================================================

/// Reduce a client-declared filename to a safe, bare stem
pub fn sanitize_stem(declared_filename: &str) -> String {
    let name = declared_filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(declared_filename);
    let stem = match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    };

    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_LEN)
        .collect();
    let cleaned = cleaned.trim_matches('.');

    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `{stem}_{timestamp}_{suffix}.{ext}`, unique across concurrent writers
fn unique_name(stem: &str, extension: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S%6f");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}.{}", stem, timestamp, &suffix[..8], extension)
}

// ============================================================================
// Tests
// ============================================================================
