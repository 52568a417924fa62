//! Canonical format types

use serde::{Deserialize, Serialize};

/// Converter family a canonical format is produced by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConverterFamily {
    /// Formats encoded by the raster codec
    RasterImage,
    /// HEIF container output
    HeifLike,
    /// Office/text documents
    Document,
}

/// Conversion domain (endpoint + artifact namespace)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionDomain {
    Image,
    Document,
}

impl ConversionDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
        }
    }
}

/// Normalized target format after alias resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CanonicalFormat {
    // Images
    Bmp,
    Gif,
    Heif,
    Ico,
    Jpeg,
    Pcx,
    Png,
    Ppm,
    Sgi,
    Webp,
    Tiff,
    // Documents
    Pdf,
    Docx,
    Odt,
    Txt,
    Rtf,
}

impl CanonicalFormat {
    /// Every canonical format, images first
    pub const ALL: [CanonicalFormat; 16] = [
        Self::Bmp,
        Self::Gif,
        Self::Heif,
        Self::Ico,
        Self::Jpeg,
        Self::Pcx,
        Self::Png,
        Self::Ppm,
        Self::Sgi,
        Self::Webp,
        Self::Tiff,
        Self::Pdf,
        Self::Docx,
        Self::Odt,
        Self::Txt,
        Self::Rtf,
    ];

    /// Canonical token, as accepted by the registry
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bmp => "BMP",
            Self::Gif => "GIF",
            Self::Heif => "HEIF",
            Self::Ico => "ICO",
            Self::Jpeg => "JPEG",
            Self::Pcx => "PCX",
            Self::Png => "PNG",
            Self::Ppm => "PPM",
            Self::Sgi => "SGI",
            Self::Webp => "WEBP",
            Self::Tiff => "TIFF",
            Self::Pdf => "PDF",
            Self::Docx => "DOCX",
            Self::Odt => "ODT",
            Self::Txt => "TXT",
            Self::Rtf => "RTF",
        }
    }

    /// MIME type served for artifacts of this format
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Bmp => "image/bmp",
            Self::Gif => "image/gif",
            Self::Heif => "image/heif",
            Self::Ico => "image/vnd.microsoft.icon",
            Self::Jpeg => "image/jpeg",
            Self::Pcx => "image/pcx",
            Self::Png => "image/png",
            Self::Ppm => "image/x-portable-pixmap",
            Self::Sgi => "image/sgi",
            Self::Webp => "image/webp",
            Self::Tiff => "image/tiff",
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Odt => "application/vnd.oasis.opendocument.text",
            Self::Txt => "text/plain",
            Self::Rtf => "application/rtf",
        }
    }

    /// File extension used for artifact names (lowercase, no dot)
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Bmp => "bmp",
            Self::Gif => "gif",
            Self::Heif => "heif",
            Self::Ico => "ico",
            Self::Jpeg => "jpeg",
            Self::Pcx => "pcx",
            Self::Png => "png",
            Self::Ppm => "ppm",
            Self::Sgi => "sgi",
            Self::Webp => "webp",
            Self::Tiff => "tiff",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Odt => "odt",
            Self::Txt => "txt",
            Self::Rtf => "rtf",
        }
    }

    pub fn family(&self) -> ConverterFamily {
        match self {
            Self::Heif => ConverterFamily::HeifLike,
            Self::Bmp
            | Self::Gif
            | Self::Ico
            | Self::Jpeg
            | Self::Pcx
            | Self::Png
            | Self::Ppm
            | Self::Sgi
            | Self::Webp
            | Self::Tiff => ConverterFamily::RasterImage,
            Self::Pdf | Self::Docx | Self::Odt | Self::Txt | Self::Rtf => {
                ConverterFamily::Document
            }
        }
    }

    pub fn domain(&self) -> ConversionDomain {
        match self.family() {
            ConverterFamily::RasterImage | ConverterFamily::HeifLike => ConversionDomain::Image,
            ConverterFamily::Document => ConversionDomain::Document,
        }
    }

    /// Detect a document format from a declared filename's extension
    pub fn document_from_filename(filename: &str) -> Option<Self> {
        let ext = std::path::Path::new(filename).extension()?.to_str()?;
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "odt" => Some(Self::Odt),
            "txt" => Some(Self::Txt),
            "rtf" => Some(Self::Rtf),
            _ => None,
        }
    }

    /// Whether the encoded form can carry an alpha channel
    pub fn supports_alpha(&self) -> bool {
        matches!(self, Self::Png | Self::Webp | Self::Ico | Self::Tiff | Self::Sgi)
    }
}

impl std::fmt::Display for CanonicalFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
