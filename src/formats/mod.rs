//! Format registry
//!
//! Canonical target formats, their converter families and the per-domain
//! allow-lists requests are validated against.

pub mod registry;
mod types;

pub use registry::{allowed_tokens, resolve, resolve_in};
pub use types::{CanonicalFormat, ConversionDomain, ConverterFamily};
