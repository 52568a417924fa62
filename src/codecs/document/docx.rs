//! WordprocessingML (DOCX) reading and writing

use std::io::{Cursor, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{read_package_part, DocumentText};
use crate::error::{ConvertError, ConvertResult};

const DOCUMENT_PART: &str = "word/document.xml";

const WORDML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

/// Collect the text of every `w:p` in the main document part
///
/// Paragraphs nest inside text boxes; each one is emitted when it closes.
/// Alternate content is read from `mc:Choice` only.
pub fn extract_paragraphs(input: &[u8], max_inflated: u64) -> ConvertResult<Vec<String>> {
    let xml = read_package_part(input, DOCUMENT_PART, max_inflated)?;
    let mut reader = Reader::from_str(&xml);

    let mut paragraphs = Vec::new();
    let mut open: Vec<String> = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:p" => open.push(String::new()),
                b"w:t" => in_text = true,
                b"mc:Fallback" => {
                    reader.read_to_end(e.name()).map_err(|err| malformed(&reader, err))?;
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:p" => paragraphs.push(String::new()),
                b"w:tab" => push(&mut open, "\t"),
                b"w:br" | b"w:cr" => push(&mut open, "\n"),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(ConvertError::unreadable)?;
                push(&mut open, &text);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    if let Some(paragraph) = open.pop() {
                        paragraphs.push(paragraph);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(&reader, e)),
            _ => {}
        }
    }

    Ok(paragraphs)
}

fn malformed(reader: &Reader<&[u8]>, e: quick_xml::Error) -> ConvertError {
    ConvertError::Unreadable(format!(
        "Malformed {} at position {}: {}",
        DOCUMENT_PART,
        reader.buffer_position(),
        e
    ))
}

fn push(open: &mut [String], text: &str) {
    if let Some(paragraph) = open.last_mut() {
        paragraph.push_str(text);
    }
}

/// Write a minimal DOCX package: one run per paragraph, line breaks kept
pub fn render(text: &DocumentText) -> ConvertResult<Vec<u8>> {
    let document = document_xml(text)?;

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, body) in [
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("_rels/.rels", PACKAGE_RELS.as_bytes()),
        (DOCUMENT_PART, document.as_slice()),
    ] {
        zip.start_file(name, options).map_err(ConvertError::internal)?;
        zip.write_all(body).map_err(ConvertError::internal)?;
    }

    let cursor = zip.finish().map_err(ConvertError::internal)?;
    Ok(cursor.into_inner())
}

fn document_xml(text: &DocumentText) -> ConvertResult<Vec<u8>> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

    let mut root = BytesStart::new("w:document");
    root.push_attribute(("xmlns:w", WORDML_NS));
    write(&mut writer, Event::Start(root))?;
    write(&mut writer, Event::Start(BytesStart::new("w:body")))?;

    for paragraph in &text.paragraphs {
        write(&mut writer, Event::Start(BytesStart::new("w:p")))?;
        write(&mut writer, Event::Start(BytesStart::new("w:r")))?;

        for (i, line) in paragraph.split('\n').enumerate() {
            if i > 0 {
                write(&mut writer, Event::Empty(BytesStart::new("w:br")))?;
            }
            let mut t = BytesStart::new("w:t");
            t.push_attribute(("xml:space", "preserve"));
            write(&mut writer, Event::Start(t))?;
            write(&mut writer, Event::Text(BytesText::new(line)))?;
            write(&mut writer, Event::End(BytesEnd::new("w:t")))?;
        }

        write(&mut writer, Event::End(BytesEnd::new("w:r")))?;
        write(&mut writer, Event::End(BytesEnd::new("w:p")))?;
    }

    write(&mut writer, Event::End(BytesEnd::new("w:body")))?;
    write(&mut writer, Event::End(BytesEnd::new("w:document")))?;

    Ok(writer.into_inner().into_inner())
}

fn write<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> ConvertResult<()> {
    writer.write_event(event).map_err(ConvertError::internal)
}
