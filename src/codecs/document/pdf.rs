//! PDF text extraction and generation

use std::io::{self, Read, Write};

use flate2::read::ZlibDecoder;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use super::{inflation_exceeded, DocumentText};
use crate::error::{ConvertError, ConvertResult};

// A4 in points
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 56;

const FONT_SIZE: i64 = 10;
const LINE_HEIGHT: i64 = 14;

/// Courier advances 0.6em per glyph
const CHARS_PER_LINE: usize = ((PAGE_WIDTH - 2 * MARGIN) * 10 / (FONT_SIZE * 6)) as usize;
const LINES_PER_PAGE: usize = ((PAGE_HEIGHT - 2 * MARGIN) / LINE_HEIGHT) as usize;

/// Extract non-blank text lines from every page
pub fn extract_paragraphs(input: &[u8], max_inflated: u64) -> ConvertResult<Vec<String>> {
    // lopdf inflates object and content streams without a bound
    check_inflation(input, max_inflated)?;

    let doc = Document::load_mem(input)
        .map_err(|e| ConvertError::Unreadable(format!("Cannot parse PDF: {}", e)))?;

    let mut paragraphs = Vec::new();
    for page_number in doc.get_pages().into_keys() {
        let text = doc.extract_text(&[page_number]).map_err(|e| {
            ConvertError::internal(format!("Text extraction failed on page {}: {}", page_number, e))
        })?;

        paragraphs.extend(
            text.lines()
                .map(str::trim_end)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }

    Ok(paragraphs)
}

/// Fail if the Flate streams of `input` together inflate past `max_inflated`
///
/// Scans the raw bytes for `stream` bodies so the bound also covers object
/// streams unpacked while the document is parsed. Bodies that are not zlib
/// data stop the decoder at once and count for what was decoded.
fn check_inflation(input: &[u8], max_inflated: u64) -> ConvertResult<()> {
    let mut total: u64 = 0;
    let mut from = 0;

    while let Some(at) = find(input, b"stream", from) {
        let mut start = at + b"stream".len();
        from = start;
        if input[..at].ends_with(b"end") {
            continue;
        }

        let body = &input[start..];
        if body.starts_with(b"\r\n") {
            start += 2;
        } else if body.starts_with(b"\n") {
            start += 1;
        } else {
            continue;
        }

        let end = find(input, b"endstream", start).unwrap_or(input.len());
        let budget = max_inflated - total;
        let mut counter = ByteCounter::default();
        let decoder = ZlibDecoder::new(&input[start..end]);
        let _ = io::copy(&mut decoder.take(budget.saturating_add(1)), &mut counter);

        total += counter.0;
        if total > max_inflated {
            return Err(inflation_exceeded("PDF streams", max_inflated));
        }
        from = end;
    }

    Ok(())
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|i| i + from)
}

#[derive(Default)]
struct ByteCounter(u64);

impl Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Lay text out on A4 pages in a monospaced base font
pub fn render(text: &DocumentText) -> ConvertResult<Vec<u8>> {
    let lines: Vec<String> = text
        .paragraphs
        .iter()
        .flat_map(|paragraph| wrap(paragraph, CHARS_PER_LINE))
        .collect();

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids: Vec<Object> = Vec::new();
    let chunks: Vec<&[String]> = if lines.is_empty() {
        vec![&lines[..]]
    } else {
        lines.chunks(LINES_PER_PAGE).collect()
    };

    for chunk in chunks {
        let page_id = add_page(&mut doc, pages_id, font_id, chunk)?;
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => Object::Integer(page_count),
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(PAGE_WIDTH),
            Object::Integer(PAGE_HEIGHT),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| ConvertError::internal(format!("Failed to write PDF: {}", e)))?;
    Ok(output)
}

fn add_page(
    doc: &mut Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    lines: &[String],
) -> ConvertResult<ObjectId> {
    let mut operations = Vec::with_capacity(lines.len() * 4);
    let mut y = PAGE_HEIGHT - MARGIN - FONT_SIZE;

    // One text object per line so extraction sees a break after each
    for line in lines {
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new(
            "Tf",
            vec![Object::Name(b"F1".to_vec()), Object::Integer(FONT_SIZE)],
        ));
        operations.push(Operation::new(
            "Td",
            vec![Object::Integer(MARGIN), Object::Integer(y)],
        ));
        operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(win_ansi(line))],
        ));
        operations.push(Operation::new("ET", vec![]));
        y -= LINE_HEIGHT;
    }

    let content = Content { operations };
    let encoded = content
        .encode()
        .map_err(|e| ConvertError::internal(format!("Failed to encode page content: {}", e)))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        },
    }))
}

/// Greedy word wrap; words longer than `width` are split
fn wrap(paragraph: &str, width: usize) -> Vec<String> {
    let paragraph = paragraph.replace('\t', "    ");
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in paragraph.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(width);
            lines.push(word.into_iter().collect());
            word = rest;
        }

        let needed = if current.is_empty() { word.len() } else { current.chars().count() + 1 + word.len() };
        if needed > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.extend(word);
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Map text onto single-byte WinAnsi; unmappable characters become '?'
fn win_ansi(line: &str) -> Vec<u8> {
    line.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    use super::*;
    use crate::codecs::document::DEFAULT_MAX_INFLATED_BYTES;

    /// One-object PDF whose stream is `inflated` zero bytes, deflated
    fn pdf_with_stream(inflated: usize) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&vec![0u8; inflated]).unwrap();
        let body = encoder.finish().unwrap();

        let mut pdf = format!(
            "%PDF-1.4\n1 0 obj\n<< /Length {} /Filter /FlateDecode >>\nstream\n",
            body.len()
        )
        .into_bytes();
        pdf.extend_from_slice(&body);
        pdf.extend_from_slice(b"\nendstream\nendobj\n%%EOF\n");
        pdf
    }

    fn doc(paragraphs: &[&str]) -> DocumentText {
        DocumentText::new(paragraphs.iter().map(|p| p.to_string()).collect())
    }

    #[test]
    fn test_render_then_extract() {
        let bytes = render(&doc(&["Hello PDF", "Second line"])).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        assert_eq!(
            extract_paragraphs(&bytes, DEFAULT_MAX_INFLATED_BYTES).unwrap(),
            ["Hello PDF", "Second line"]
        );
    }

    #[test]
    fn test_long_documents_paginate() {
        let paragraphs: Vec<String> = (0..LINES_PER_PAGE * 2 + 3).map(|i| format!("line {i}")).collect();
        let bytes = render(&DocumentText::new(paragraphs)).unwrap();

        let parsed = Document::load_mem(&bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), 3);
    }

    #[test]
    fn test_empty_document_still_has_a_page() {
        let bytes = render(&DocumentText::default()).unwrap();
        let parsed = Document::load_mem(&bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), 1);
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("aaa bbb ccc", 7), ["aaa bbb", "ccc"]);
        assert_eq!(wrap("abcdefghij", 4), ["abcd", "efgh", "ij"]);
        assert_eq!(wrap("", 10), [""]);
    }

    #[test]
    fn test_win_ansi_substitution() {
        assert_eq!(win_ansi("café €"), b"caf\xE9 ?");
    }

    #[test]
    fn test_garbage_is_unreadable() {
        assert!(matches!(
            extract_paragraphs(b"%PDF-1.4 nothing else", DEFAULT_MAX_INFLATED_BYTES),
            Err(ConvertError::Unreadable(_))
        ));
    }

    #[test]
    fn test_stream_inflation_is_bounded() {
        let bytes = pdf_with_stream(8 * 1024 * 1024);
        assert!(bytes.len() < 64 * 1024);

        match extract_paragraphs(&bytes, 1024 * 1024) {
            Err(ConvertError::Unreadable(message)) => assert!(message.contains("expands beyond")),
            other => panic!("expected Unreadable, got {:?}", other),
        }
        assert!(check_inflation(&bytes, 8 * 1024 * 1024).is_ok());
    }

    #[test]
    fn test_rendered_streams_count_against_the_ceiling() {
        let paragraphs: Vec<String> = (0..200).map(|i| format!("line {i}")).collect();
        let bytes = render(&DocumentText::new(paragraphs)).unwrap();
        assert!(check_inflation(&bytes, DEFAULT_MAX_INFLATED_BYTES).is_ok());
        assert!(check_inflation(&bytes, 8).is_err());
    }
}
