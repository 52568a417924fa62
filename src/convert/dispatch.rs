//! Dispatch
//!
//! Routes each request to exactly one converter capability, keyed by the
//! target's converter family, and commits the result to the artifact slot.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;

use crate::artifacts::{Artifact, ArtifactSlot};
use crate::codecs::{self, AlphaPolicy, Converter, SourceHint};
use crate::error::{ConvertError, ConvertResult};
use crate::formats::{CanonicalFormat, ConverterFamily};

/// Document conversions the server performs
pub const DOCUMENT_ROUTES: &[(CanonicalFormat, CanonicalFormat)] = &[
    (CanonicalFormat::Docx, CanonicalFormat::Pdf),
    (CanonicalFormat::Pdf, CanonicalFormat::Docx),
    (CanonicalFormat::Odt, CanonicalFormat::Docx),
    (CanonicalFormat::Odt, CanonicalFormat::Pdf),
    (CanonicalFormat::Odt, CanonicalFormat::Txt),
    (CanonicalFormat::Pdf, CanonicalFormat::Txt),
    (CanonicalFormat::Docx, CanonicalFormat::Txt),
    (CanonicalFormat::Rtf, CanonicalFormat::Txt),
];

pub fn is_document_route(source: CanonicalFormat, target: CanonicalFormat) -> bool {
    DOCUMENT_ROUTES.contains(&(source, target))
}

/// Family-keyed converter table
#[derive(Clone)]
pub struct Dispatcher {
    raster: Arc<dyn Converter>,
    heif: Arc<dyn Converter>,
    document: Arc<dyn Converter>,
}

impl Dispatcher {
    /// Dispatcher over the built-in codec adapters
    pub fn new(alpha: AlphaPolicy) -> Self {
        Self {
            raster: Arc::new(codecs::RasterConverter::new(alpha)),
            heif: Arc::new(codecs::HeifConverter),
            document: Arc::new(codecs::DocumentConverter::default()),
        }
    }

    /// Replace the capability serving one family
    pub fn with_converter(mut self, family: ConverterFamily, converter: Arc<dyn Converter>) -> Self {
        match family {
            ConverterFamily::RasterImage => self.raster = converter,
            ConverterFamily::HeifLike => self.heif = converter,
            ConverterFamily::Document => self.document = converter,
        }
        self
    }

    fn converter_for(&self, family: ConverterFamily) -> &Arc<dyn Converter> {
        match family {
            ConverterFamily::RasterImage => &self.raster,
            ConverterFamily::HeifLike => &self.heif,
            ConverterFamily::Document => &self.document,
        }
    }

    /// Determine the source of a request and check the route exists
    ///
    /// Images are sniffed from their bytes; documents are identified by the
    /// declared filename's extension.
    pub fn source_of(
        &self,
        input: &[u8],
        declared_filename: &str,
        target: CanonicalFormat,
    ) -> ConvertResult<SourceHint> {
        match target.family() {
            ConverterFamily::RasterImage | ConverterFamily::HeifLike => {
                codecs::image::sniff(input)
            }
            ConverterFamily::Document => {
                let source = CanonicalFormat::document_from_filename(declared_filename)
                    .ok_or_else(|| ConvertError::UnsupportedRoute {
                        from: extension_label(declared_filename),
                        to: target.to_string(),
                    })?;

                if !is_document_route(source, target) {
                    return Err(ConvertError::UnsupportedRoute {
                        from: source.to_string(),
                        to: target.to_string(),
                    });
                }
                Ok(SourceHint::Document(source))
            }
        }
    }

    /// Convert `input` and commit the output to `slot`
    ///
    /// The converter and the write both run on the blocking pool. If the
    /// slot is abandoned first, the commit fails and nothing is written.
    pub async fn dispatch(
        &self,
        input: Bytes,
        declared_filename: &str,
        target: CanonicalFormat,
        slot: Arc<ArtifactSlot>,
    ) -> ConvertResult<Artifact> {
        let source = self.source_of(&input, declared_filename, target)?;
        let converter = Arc::clone(self.converter_for(target.family()));
        let started = Instant::now();

        let artifact = tokio::task::spawn_blocking(move || {
            let output = converter.convert(&input, source, target)?;
            slot.commit_blocking(&output)
        })
        .await
        .map_err(|e| ConvertError::internal(format!("Conversion task failed: {}", e)))??;

        tracing::info!(
            source = ?source,
            target = %target,
            size_bytes = artifact.size_bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Converted successfully"
        );
        Ok(artifact)
    }
}

fn extension_label(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_uppercase())
        .unwrap_or_else(|| "UNKNOWN".to_string())
}
