//! Reformat Server
//!
//! A multi-tenant file conversion service: clients upload an image or office
//! document over HTTP, name a target format, and receive the converted file.
//!
//! Request flow:
//!
//! ```text
//! multipart form -> Admission (rate, size) -> format registry
//!     -> Dispatcher (converter family) under TimeoutGuard -> ArtifactStore
//! ```
//!
//! Artifacts are kept for a retention window and reaped by the
//! [`artifacts::CleanupScheduler`].

pub mod admission;
pub mod artifacts;
pub mod codecs;
pub mod config;
pub mod convert;
pub mod error;
pub mod formats;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ConvertError, ConvertResult};
pub use state::AppState;
