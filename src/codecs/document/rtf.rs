//! RTF text extraction
//!
//! A control-word scanner, not a full RTF reader: it tracks group nesting,
//! skips destinations that carry no body text, decodes `\'hh` and `\uN`
//! escapes, and turns `\par` into paragraph breaks.

use crate::error::{ConvertError, ConvertResult};

/// Destinations whose content is never body text
const SKIPPED_DESTINATIONS: &[&str] = &[
    "fonttbl", "colortbl", "stylesheet", "info", "pict", "header", "footer", "headerl",
    "headerr", "footerl", "footerr", "footnote", "object", "themedata", "listtable",
    "listoverridetable", "rsidtbl", "generator", "xmlnstbl", "latentstyles",
];

#[derive(Debug, Clone, Copy)]
struct Group {
    skip: bool,
    /// Fallback characters following a `\u` escape
    uc: usize,
}

pub fn extract_paragraphs(input: &[u8]) -> ConvertResult<Vec<String>> {
    let start = input
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(input.len());
    if !input[start..].starts_with(b"{\\rtf") {
        return Err(ConvertError::Unreadable("Missing RTF header".to_string()));
    }

    let mut scanner = Scanner {
        input,
        pos: 0,
        stack: Vec::new(),
        group: Group { skip: false, uc: 1 },
        paragraphs: Vec::new(),
        current: String::new(),
        pending_skip: 0,
    };
    scanner.run()?;

    let Scanner { mut paragraphs, current, .. } = scanner;
    if !current.trim().is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs)
}

struct Scanner<'a> {
    input: &'a [u8],
    pos: usize,
    stack: Vec<Group>,
    group: Group,
    paragraphs: Vec<String>,
    current: String,
    /// Fallback characters still to drop after a `\u` escape
    pending_skip: usize,
}

impl Scanner<'_> {
    fn run(&mut self) -> ConvertResult<()> {
        while let Some(&byte) = self.input.get(self.pos) {
            self.pos += 1;
            match byte {
                b'{' => {
                    self.stack.push(self.group);
                    self.pending_skip = 0;
                }
                b'}' => {
                    self.group = self.stack.pop().ok_or_else(|| {
                        ConvertError::Unreadable("Unbalanced RTF group".to_string())
                    })?;
                    self.pending_skip = 0;
                }
                b'\\' => self.control()?,
                b'\r' | b'\n' => {}
                other => self.emit(char::from(other)),
            }
        }

        if !self.stack.is_empty() {
            return Err(ConvertError::Unreadable("Unterminated RTF group".to_string()));
        }
        Ok(())
    }

    fn control(&mut self) -> ConvertResult<()> {
        let Some(&next) = self.input.get(self.pos) else {
            return Ok(());
        };

        if !next.is_ascii_alphabetic() {
            self.pos += 1;
            match next {
                b'\\' | b'{' | b'}' => self.emit(char::from(next)),
                b'~' => self.emit(' '),
                b'_' => self.emit('-'),
                b'*' => self.group.skip = true,
                b'\'' => {
                    let hex = self.input.get(self.pos..self.pos + 2).unwrap_or_default();
                    self.pos += hex.len();
                    let byte = std::str::from_utf8(hex)
                        .ok()
                        .and_then(|h| u8::from_str_radix(h, 16).ok());
                    if let Some(byte) = byte {
                        self.emit(cp1252(byte));
                    }
                }
                b'\r' | b'\n' => self.paragraph_break(),
                _ => {}
            }
            return Ok(());
        }

        let start = self.pos;
        while self.input.get(self.pos).is_some_and(u8::is_ascii_alphabetic) {
            self.pos += 1;
        }
        let word = std::str::from_utf8(&self.input[start..self.pos]).map_err(ConvertError::unreadable)?;

        let num_start = self.pos;
        if self.input.get(self.pos) == Some(&b'-') {
            self.pos += 1;
        }
        while self.input.get(self.pos).is_some_and(u8::is_ascii_digit) {
            self.pos += 1;
        }
        let param: Option<i32> = std::str::from_utf8(&self.input[num_start..self.pos])
            .ok()
            .and_then(|n| n.parse().ok());

        if self.input.get(self.pos) == Some(&b' ') {
            self.pos += 1;
        }

        match word {
            "par" | "sect" | "page" => self.paragraph_break(),
            "line" => self.emit('\n'),
            "tab" => self.emit('\t'),
            "emdash" | "endash" => self.emit('-'),
            "lquote" | "rquote" => self.emit('\''),
            "ldblquote" | "rdblquote" => self.emit('"'),
            "uc" => self.group.uc = param.and_then(|n| usize::try_from(n).ok()).unwrap_or(1),
            "u" => {
                if let Some(n) = param {
                    // Negative values encode code points above 0x7FFF
                    let code = if n < 0 { n + 0x10000 } else { n };
                    let c = u32::try_from(code).ok().and_then(char::from_u32).unwrap_or('?');
                    self.emit(c);
                    self.pending_skip = self.group.uc;
                }
            }
            w if SKIPPED_DESTINATIONS.contains(&w) => self.group.skip = true,
            _ => {}
        }
        Ok(())
    }

    fn emit(&mut self, c: char) {
        if self.pending_skip > 0 && c != '\n' {
            self.pending_skip -= 1;
            return;
        }
        if !self.group.skip {
            self.current.push(c);
        }
    }

    fn paragraph_break(&mut self) {
        if !self.group.skip {
            let paragraph = std::mem::take(&mut self.current);
            self.paragraphs.push(paragraph.trim_start().to_string());
        }
    }
}

/// Windows-1252 to Unicode for `\'hh` escapes
fn cp1252(byte: u8) -> char {
    const HIGH: [char; 32] = [
        '€', '?', '‚', 'ƒ', '„', '…', '†', '‡', 'ˆ', '‰', 'Š', '‹', 'Œ', '?', 'Ž', '?',
        '?', '‘', '’', '“', '”', '•', '–', '—', '˜', '™', 'š', '›', 'œ', '?', 'ž', 'Ÿ',
    ];
    match byte {
        0x80..=0x9F => HIGH[usize::from(byte - 0x80)],
        _ => char::from(byte),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(rtf: &str) -> Vec<String> {
        extract_paragraphs(rtf.as_bytes()).unwrap()
    }

    #[test]
    fn test_plain_paragraphs() {
        let rtf = r"{\rtf1\ansi{\fonttbl{\f0 Arial;}}\f0\fs24 Hello\par World\par}";
        assert_eq!(extract(rtf), ["Hello", "World"]);
    }

    #[test]
    fn test_trailing_text_without_par() {
        assert_eq!(extract(r"{\rtf1 Only line}"), ["Only line"]);
    }

    #[test]
    fn test_escapes() {
        let rtf = r"{\rtf1 caf\'e9 \{x\} \u8364? sign\tab end\par}";
        assert_eq!(extract(rtf), ["café {x} € sign\tend"]);
    }

    #[test]
    fn test_ignorable_destinations_are_skipped() {
        let rtf = r"{\rtf1{\*\generator Writer;}{\info{\title Secret}}{\colortbl;\red0\green0\blue0;}Body\par}";
        assert_eq!(extract(rtf), ["Body"]);
    }

    #[test]
    fn test_not_rtf() {
        assert!(matches!(
            extract_paragraphs(b"plain text"),
            Err(ConvertError::Unreadable(_))
        ));
    }

    #[test]
    fn test_unbalanced_groups() {
        assert!(matches!(
            extract_paragraphs(br"{\rtf1 {open"),
            Err(ConvertError::Unreadable(_))
        ));
        assert!(matches!(
            extract_paragraphs(br"{\rtf1 x}}"),
            Err(ConvertError::Unreadable(_))
        ));
    }
}
