//! OpenDocument Text (ODT) reading

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::read_package_part;
use crate::error::{ConvertError, ConvertResult};

const CONTENT_PART: &str = "content.xml";

/// Collect headings and paragraphs from `content.xml`, in document order
pub fn extract_paragraphs(input: &[u8], max_inflated: u64) -> ConvertResult<Vec<String>> {
    let xml = read_package_part(input, CONTENT_PART, max_inflated)?;
    let mut reader = Reader::from_str(&xml);

    let mut paragraphs = Vec::new();
    // Paragraphs nest (notes, frames); the innermost one receives text
    let mut open: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if is_block(&e) {
                    open.push(String::new());
                }
            }
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"text:p" | b"text:h" => paragraphs.push(String::new()),
                b"text:s" => {
                    let count = space_count(&e);
                    if let Some(current) = open.last_mut() {
                        current.extend(std::iter::repeat(' ').take(count));
                    }
                }
                b"text:tab" => push(&mut open, "\t"),
                b"text:line-break" => push(&mut open, "\n"),
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if !open.is_empty() {
                    let text = t.unescape().map_err(ConvertError::unreadable)?;
                    push(&mut open, &text);
                }
            }
            Ok(Event::End(e)) => {
                if matches!(e.name().as_ref(), b"text:p" | b"text:h") {
                    if let Some(paragraph) = open.pop() {
                        paragraphs.push(paragraph);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ConvertError::Unreadable(format!(
                    "Malformed {} at position {}: {}",
                    CONTENT_PART,
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(paragraphs)
}

fn is_block(e: &BytesStart<'_>) -> bool {
    matches!(e.name().as_ref(), b"text:p" | b"text:h")
}

fn push(open: &mut [String], text: &str) {
    if let Some(current) = open.last_mut() {
        current.push_str(text);
    }
}

/// `<text:s text:c="N"/>` stands for N spaces
fn space_count(e: &BytesStart<'_>) -> usize {
    e.try_get_attribute("text:c")
        .ok()
        .flatten()
        .and_then(|attr| attr.unescape_value().ok()?.parse().ok())
        .unwrap_or(1)
}
