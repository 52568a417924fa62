//! Converter capabilities
//!
//! Adapters over the codec crates that perform the actual transcoding. The
//! orchestration in [`crate::convert`] only sees the [`Converter`] trait: one
//! implementation per converter family, invoked on the blocking thread pool.
//!
//! | Family        | Implementation        | Backing crate             |
//! |---------------|-----------------------|---------------------------|
//! | `RasterImage` | [`RasterConverter`]   | `image`, `pcx`            |
//! | `HeifLike`    | [`HeifConverter`]     | `image` (AVIF profile)    |
//! | `Document`    | [`DocumentConverter`] | `zip`, `quick-xml`, `lopdf` |

pub mod document;
pub mod image;

pub use self::document::DocumentConverter;
pub use self::image::{AlphaPolicy, HeifConverter, RasterConverter};

use crate::error::ConvertResult;
use crate::formats::CanonicalFormat;

/// What dispatch determined about the input before conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceHint {
    /// Raster format sniffed from the input bytes
    Raster(::image::ImageFormat),
    /// HEIF-family container (HEIC, AVIF) sniffed from its `ftyp` brand
    Heif,
    /// Document format taken from the declared filename
    Document(CanonicalFormat),
}

/// An opaque transcoding capability
///
/// Implementations are CPU-bound and synchronous; callers run them with
/// `tokio::task::spawn_blocking`.
pub trait Converter: Send + Sync {
    /// Convert `input` into the encoded bytes of `target`
    fn convert(
        &self,
        input: &[u8],
        source: SourceHint,
        target: CanonicalFormat,
    ) -> ConvertResult<Vec<u8>>;
}
