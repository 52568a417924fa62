//! Format registry
//!
//! Maps a requested target-format token onto a [`CanonicalFormat`]. Lookup is
//! case-insensitive and exact: unknown tokens never fall back to a guess.

use super::types::{CanonicalFormat, ConversionDomain};
use crate::error::{ConvertError, ConvertResult};

/// Tokens accepted by the image endpoint
pub const IMAGE_TOKENS: &[&str] = &[
    "BMP", "GIF", "HEIF", "ICO", "JPEG", "JPG", "PCX", "PNG", "PPM", "SGI", "WEBP", "TIF", "TIFF",
];

/// Tokens accepted by the document endpoint
pub const DOCUMENT_TOKENS: &[&str] = &["PDF", "DOCX", "ODT", "TXT", "RTF"];

/// Resolve a token against the full allow-list
pub fn resolve(token: &str) -> ConvertResult<CanonicalFormat> {
    let normalized = token.trim().to_ascii_uppercase();
    let format = match normalized.as_str() {
        "BMP" => CanonicalFormat::Bmp,
        "GIF" => CanonicalFormat::Gif,
        "HEIF" => CanonicalFormat::Heif,
        "ICO" => CanonicalFormat::Ico,
        "JPEG" | "JPG" => CanonicalFormat::Jpeg,
        "PCX" => CanonicalFormat::Pcx,
        "PNG" => CanonicalFormat::Png,
        "PPM" => CanonicalFormat::Ppm,
        "SGI" => CanonicalFormat::Sgi,
        "WEBP" => CanonicalFormat::Webp,
        "TIFF" | "TIF" => CanonicalFormat::Tiff,
        "PDF" => CanonicalFormat::Pdf,
        "DOCX" => CanonicalFormat::Docx,
        "ODT" => CanonicalFormat::Odt,
        "TXT" => CanonicalFormat::Txt,
        "RTF" => CanonicalFormat::Rtf,
        _ => return Err(ConvertError::InvalidFormat(token.to_string())),
    };
    Ok(format)
}

/// Resolve a token, accepting only formats of one domain
pub fn resolve_in(domain: ConversionDomain, token: &str) -> ConvertResult<CanonicalFormat> {
    let format = resolve(token)?;
    if format.domain() != domain {
        return Err(ConvertError::InvalidFormat(token.to_string()));
    }
    Ok(format)
}

/// Allow-list for a domain
pub fn allowed_tokens(domain: ConversionDomain) -> &'static [&'static str] {
    match domain {
        ConversionDomain::Image => IMAGE_TOKENS,
        ConversionDomain::Document => DOCUMENT_TOKENS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases() {
        assert_eq!(resolve("jpg").unwrap(), CanonicalFormat::Jpeg);
        assert_eq!(resolve("JPEG").unwrap(), CanonicalFormat::Jpeg);
        assert_eq!(resolve("tif").unwrap(), CanonicalFormat::Tiff);
        assert_eq!(resolve("Tiff").unwrap(), CanonicalFormat::Tiff);
    }

    #[test]
    fn test_case_insensitive_and_trimmed() {
        assert_eq!(resolve(" webp ").unwrap(), CanonicalFormat::Webp);
        assert_eq!(resolve("dOcX").unwrap(), CanonicalFormat::Docx);
    }

    #[test]
    fn test_unknown_tokens_rejected() {
        for token in ["EXE", "", "JP", "JPEGG", "PNG8", "html"] {
            assert!(
                matches!(resolve(token), Err(ConvertError::InvalidFormat(_))),
                "token {token:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_every_allowed_token_resolves_in_its_domain() {
        for domain in [ConversionDomain::Image, ConversionDomain::Document] {
            for token in allowed_tokens(domain) {
                let format = resolve_in(domain, token).unwrap();
                assert_eq!(format.domain(), domain);
            }
        }
    }

    #[test]
    fn test_cross_domain_token_rejected() {
        assert!(matches!(
            resolve_in(ConversionDomain::Image, "pdf"),
            Err(ConvertError::InvalidFormat(_))
        ));
        assert!(matches!(
            resolve_in(ConversionDomain::Document, "png"),
            Err(ConvertError::InvalidFormat(_))
        ));
    }
}
