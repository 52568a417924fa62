use axum::body::Bytes;

use crate::artifacts::Artifact;
use crate::error::{ConvertError, ConvertResult, ErrorClass};
use crate::formats::CanonicalFormat;

/// A parsed conversion request; exists only for the duration of one request
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub raw_bytes: Bytes,
    pub declared_filename: String,
    pub target_format_token: String,
}

impl ConversionRequest {
    pub fn new(
        raw_bytes: impl Into<Bytes>,
        declared_filename: impl Into<String>,
        target_format_token: impl Into<String>,
    ) -> Self {
        Self {
            raw_bytes: raw_bytes.into(),
            declared_filename: declared_filename.into(),
            target_format_token: target_format_token.into(),
        }
    }

    pub fn payload_size(&self) -> u64 {
        self.raw_bytes.len() as u64
    }
}

/// A successful conversion
#[derive(Debug, Clone)]
pub struct Converted {
    pub artifact: Artifact,
    pub format: CanonicalFormat,
}

/// Terminal state of a request, used for the per-request log line
#[derive(Debug)]
pub enum ConversionOutcome<'a> {
    Success(&'a Converted),
    ValidationError(&'a ConvertError),
    ConversionError(&'a ConvertError),
    Timeout,
}

impl<'a> ConversionOutcome<'a> {
    pub fn of(result: &'a ConvertResult<Converted>) -> Self {
        match result {
            Ok(converted) => Self::Success(converted),
            Err(e) => match e.class() {
                ErrorClass::Validation => Self::ValidationError(e),
                ErrorClass::Conversion => Self::ConversionError(e),
                ErrorClass::Timeout => Self::Timeout,
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::ValidationError(_) => "validation_error",
            Self::ConversionError(_) => "conversion_error",
            Self::Timeout => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        let validation: ConvertResult<Converted> = Err(ConvertError::InvalidFormat("XYZ".into()));
        assert_eq!(ConversionOutcome::of(&validation).label(), "validation_error");

        let conversion: ConvertResult<Converted> = Err(ConvertError::Unreadable("bad".into()));
        assert_eq!(ConversionOutcome::of(&conversion).label(), "conversion_error");

        let timeout: ConvertResult<Converted> = Err(ConvertError::Timeout { secs: 30 });
        assert!(matches!(ConversionOutcome::of(&timeout), ConversionOutcome::Timeout));
    }
}
