//! Office document conversion
//!
//! Documents are converted through a plain-text intermediate: the source is
//! reduced to its paragraphs, then rendered into the target container.
//! Formatting, images and tables are not carried across.

mod docx;
mod odt;
mod pdf;
mod rtf;

use std::io::{Cursor, Read};

use zip::ZipArchive;

use super::{Converter, SourceHint};
use crate::error::{ConvertError, ConvertResult};
use crate::formats::CanonicalFormat;

/// Default ceiling on bytes inflated out of one uploaded document
pub const DEFAULT_MAX_INFLATED_BYTES: u64 = 64 * 1024 * 1024;

/// Text content shared by every document route
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentText {
    pub paragraphs: Vec<String>,
}

impl DocumentText {
    pub fn new(paragraphs: Vec<String>) -> Self {
        Self { paragraphs }
    }

    /// Plain text rendering, one paragraph per line
    pub fn to_plain_text(&self) -> String {
        let mut text = self.paragraphs.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }

    fn from_plain_text(input: &[u8]) -> Self {
        let text = String::from_utf8_lossy(input);
        Self::new(
            text.lines()
                .map(|line| line.trim_end_matches('\r').to_string())
                .collect(),
        )
    }
}

/// Read the paragraphs out of a document
///
/// Compressed content (ZIP members, PDF streams) may expand to at most
/// `max_inflated` bytes before the input is rejected as unreadable.
pub fn extract(
    source: CanonicalFormat,
    input: &[u8],
    max_inflated: u64,
) -> ConvertResult<DocumentText> {
    let paragraphs = match source {
        CanonicalFormat::Pdf => pdf::extract_paragraphs(input, max_inflated)?,
        CanonicalFormat::Docx => docx::extract_paragraphs(input, max_inflated)?,
        CanonicalFormat::Odt => odt::extract_paragraphs(input, max_inflated)?,
        CanonicalFormat::Rtf => rtf::extract_paragraphs(input)?,
        CanonicalFormat::Txt => return Ok(DocumentText::from_plain_text(input)),
        other => {
            return Err(ConvertError::UnsupportedRoute {
                from: other.to_string(),
                to: "document".to_string(),
            })
        }
    };
    Ok(DocumentText::new(paragraphs))
}

/// Encode text into a target container
pub fn render(target: CanonicalFormat, text: &DocumentText) -> ConvertResult<Vec<u8>> {
    match target {
        CanonicalFormat::Txt => Ok(text.to_plain_text().into_bytes()),
        CanonicalFormat::Docx => docx::render(text),
        CanonicalFormat::Pdf => pdf::render(text),
        other => Err(ConvertError::UnsupportedRoute {
            from: "document".to_string(),
            to: other.to_string(),
        }),
    }
}

/// Read one member of a ZIP-packaged document as UTF-8
///
/// The declared size is checked first, then the read itself is capped, since
/// the header of a hostile archive can understate the member size.
fn read_package_part(input: &[u8], name: &str, max_inflated: u64) -> ConvertResult<String> {
    let mut archive = ZipArchive::new(Cursor::new(input))
        .map_err(|e| ConvertError::Unreadable(format!("Not a valid document package: {}", e)))?;

    let part = archive
        .by_name(name)
        .map_err(|_| ConvertError::Unreadable(format!("Document package has no {}", name)))?;

    if part.size() > max_inflated {
        return Err(inflation_exceeded(name, max_inflated));
    }

    let mut bytes = Vec::new();
    part.take(max_inflated.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|e| ConvertError::Unreadable(format!("Cannot read {}: {}", name, e)))?;
    if bytes.len() as u64 > max_inflated {
        return Err(inflation_exceeded(name, max_inflated));
    }

    String::from_utf8(bytes)
        .map_err(|e| ConvertError::Unreadable(format!("{} is not UTF-8: {}", name, e)))
}

fn inflation_exceeded(what: &str, max_inflated: u64) -> ConvertError {
    tracing::warn!(part = what, max_inflated, "Document expands past the inflation ceiling");
    ConvertError::Unreadable(format!("{} expands beyond {} bytes", what, max_inflated))
}

/// Converter for the document family
#[derive(Debug, Clone, Copy)]
pub struct DocumentConverter {
    max_inflated_bytes: u64,
}

impl DocumentConverter {
    pub fn new(max_inflated_bytes: u64) -> Self {
        Self { max_inflated_bytes }
    }
}

impl Default for DocumentConverter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INFLATED_BYTES)
    }
}

impl Converter for DocumentConverter {
    fn convert(
        &self,
        input: &[u8],
        source: SourceHint,
        target: CanonicalFormat,
    ) -> ConvertResult<Vec<u8>> {
        let SourceHint::Document(source) = source else {
            return Err(ConvertError::UnsupportedRoute {
                from: "image".to_string(),
                to: target.to_string(),
            });
        };

        let text = extract(source, input, self.max_inflated_bytes)?;
        tracing::debug!(
            source = %source,
            target = %target,
            paragraphs = text.paragraphs.len(),
            "Document text extracted"
        );

        render(target, &text)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Small documents built in-process for tests

    use std::io::Write;

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::*;

    pub fn docx(paragraphs: &[&str]) -> Vec<u8> {
        let text = DocumentText::new(paragraphs.iter().map(|p| p.to_string()).collect());
        docx::render(&text).unwrap()
    }

    pub fn pdf(paragraphs: &[&str]) -> Vec<u8> {
        let text = DocumentText::new(paragraphs.iter().map(|p| p.to_string()).collect());
        pdf::render(&text).unwrap()
    }

    pub fn odt(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<text:p text:style-name=\"P1\">{}</text:p>", p))
            .collect();
        let content = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <office:document-content \
             xmlns:office=\"urn:oasis:names:tc:opendocument:xmlns:office:1.0\" \
             xmlns:text=\"urn:oasis:names:tc:opendocument:xmlns:text:1.0\">\
             <office:body><office:text>{}</office:text></office:body>\
             </office:document-content>",
            body
        );

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.start_file("mimetype", options).unwrap();
        zip.write_all(b"application/vnd.oasis.opendocument.text").unwrap();
        zip.start_file("content.xml", options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    pub fn rtf(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs.iter().map(|p| format!("{}\\par\n", p)).collect();
        format!(
            "{{\\rtf1\\ansi\\deff0{{\\fonttbl{{\\f0 Times New Roman;}}}}\\f0\\fs24 {}}}",
            body
        )
        .into_bytes()
    }
}
