//! Byte-to-code-point front end: BOM detection, transcoding, forbidden
//! code point validation and mark tracking.
//!
//! The scanner never touches raw bytes directly — it only calls
//! [`Reader::peek`] and [`Reader::forward`], both of which operate in code
//! points so the scanner's lookahead arithmetic never has to reason about
//! UTF-8 continuation bytes.

use std::rc::Rc;

use encoding_rs::{UTF_16BE, UTF_16LE};

use crate::error::{Error, Result};
use crate::mark::Mark;

/// The encoding detected (or assumed) for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
}

impl Encoding {
    pub fn label(self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Utf16Le => "utf-16le",
            Encoding::Utf16Be => "utf-16be",
            Encoding::Utf32Le => "utf-32le",
            Encoding::Utf32Be => "utf-32be",
        }
    }
}

/// Detects a BOM at the start of `bytes` and returns the encoding plus the
/// number of bytes the BOM itself occupies. Falls back to UTF-8 when no BOM
/// is present.
fn detect_bom(bytes: &[u8]) -> (Encoding, usize) {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        (Encoding::Utf8, 3)
    } else if bytes.starts_with(&[0x00, 0x00, 0xFE, 0xFF]) {
        (Encoding::Utf32Be, 4)
    } else if bytes.starts_with(&[0xFF, 0xFE, 0x00, 0x00]) {
        (Encoding::Utf32Le, 4)
    } else if bytes.starts_with(&[0xFE, 0xFF]) {
        (Encoding::Utf16Be, 2)
    } else if bytes.starts_with(&[0xFF, 0xFE]) {
        (Encoding::Utf16Le, 2)
    } else {
        (Encoding::Utf8, 0)
    }
}

fn decode_utf32(bytes: &[u8], big_endian: bool, name: &Rc<str>) -> Result<String> {
    if bytes.len() % 4 != 0 {
        return Err(Error::reader(
            "stream length is not a multiple of 4 bytes for a UTF-32 encoding",
            Mark::new(name.clone(), bytes.len(), 0, 0),
        ));
    }
    let mut out = String::with_capacity(bytes.len() / 4);
    for (i, chunk) in bytes.chunks(4).enumerate() {
        let code = if big_endian {
            u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
        } else {
            u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
        };
        let ch = char::from_u32(code).ok_or_else(|| {
            Error::reader(
                format!("invalid UTF-32 code point 0x{code:08X}"),
                Mark::new(name.clone(), i * 4, 0, 0),
            )
        })?;
        out.push(ch);
    }
    Ok(out)
}

/// Is `ch` one of the code points forbidden anywhere in a YAML stream (C0
/// controls other than TAB/LF, DEL, the C1 block other than NEL,
/// non-characters, unpaired surrogates)?
fn is_forbidden(ch: char) -> bool {
    let c = ch as u32;
    matches!(c, 0x00..=0x08 | 0x0B | 0x0C | 0x0E..=0x1F)
        || c == 0x7F
        || matches!(c, 0x80..=0x84 | 0x86..=0x9F)
        || matches!(c, 0xD800..=0xDFFF)
        || matches!(c, 0xFDD0..=0xFDEF)
        || (c & 0xFFFE) == 0xFFFE
}

/// A code-point cursor over a fully decoded, UTF-8-normalized buffer.
pub struct Reader {
    name: Rc<str>,
    buffer: Vec<char>,
    pos: usize,
    index: usize,
    line: usize,
    column: usize,
    pub encoding: Encoding,
}

impl Reader {
    /// Decode `bytes` (detecting its encoding from a BOM, defaulting to
    /// UTF-8), validate it contains no forbidden code points and no BOM
    /// after the first byte, and return a cursor over the result.
    pub fn new(name: impl Into<Rc<str>>, bytes: &[u8]) -> Result<Self> {
        let name = name.into();
        let (encoding, bom_len) = detect_bom(bytes);
        let body = &bytes[bom_len..];

        let text = match encoding {
            Encoding::Utf8 => std::str::from_utf8(body)
                .map_err(|e| {
                    Error::reader(
                        format!("invalid UTF-8 byte at offset {}", e.valid_up_to()),
                        Mark::new(name.clone(), e.valid_up_to(), 0, 0),
                    )
                })?
                .to_owned(),
            Encoding::Utf16Le => {
                let (cow, _, had_errors) = UTF_16LE.decode(body);
                if had_errors {
                    return Err(Error::reader(
                        "invalid UTF-16LE sequence",
                        Mark::new(name.clone(), bom_len, 0, 0),
                    ));
                }
                cow.into_owned()
            }
            Encoding::Utf16Be => {
                let (cow, _, had_errors) = UTF_16BE.decode(body);
                if had_errors {
                    return Err(Error::reader(
                        "invalid UTF-16BE sequence",
                        Mark::new(name.clone(), bom_len, 0, 0),
                    ));
                }
                cow.into_owned()
            }
            Encoding::Utf32Le => decode_utf32(body, false, &name)?,
            Encoding::Utf32Be => decode_utf32(body, true, &name)?,
        };

        let buffer: Vec<char> = text.chars().collect();
        for (i, &ch) in buffer.iter().enumerate() {
            if ch == '\u{FEFF}' {
                return Err(Error::reader(
                    "a byte order mark is only allowed at the start of the stream",
                    Mark::new(name.clone(), i, 0, 0),
                ));
            }
            if is_forbidden(ch) {
                return Err(Error::reader(
                    format!("special character U+{:04X} is not allowed", ch as u32),
                    Mark::new(name.clone(), i, 0, 0),
                ));
            }
        }

        Ok(Reader { name, buffer, pos: 0, index: 0, line: 0, column: 0, encoding })
    }

    /// The code point `offset` positions ahead of the cursor, or `'\0'` at
    /// end of stream.
    pub fn peek(&self, offset: usize) -> char {
        self.buffer.get(self.pos + offset).copied().unwrap_or('\0')
    }

    /// A short slice of upcoming code points, useful for multi-character
    /// lookahead (`"---"`, `"..."`, escape sequences).
    pub fn prefix(&self, len: usize) -> String {
        let end = (self.pos + len).min(self.buffer.len());
        self.buffer[self.pos..end].iter().collect()
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.buffer.len()
    }

    /// Advance the cursor by `n` code points, updating line/column using
    /// the break-normalization rule from the data model (CR, CRLF, NEL, LS,
    /// PS all count as a single line feed).
    pub fn forward(&mut self, mut n: usize) {
        while n > 0 && self.pos < self.buffer.len() {
            let ch = self.buffer[self.pos];
            if is_break(ch) {
                if ch == '\r' && self.buffer.get(self.pos + 1) == Some(&'\n') {
                    self.pos += 1;
                    self.index += 1;
                }
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
            self.pos += 1;
            self.index += 1;
            n -= 1;
        }
    }

    pub fn mark(&self) -> Mark {
        Mark::new(self.name.clone(), self.index, self.line, self.column)
    }

    pub fn name(&self) -> &Rc<str> {
        &self.name
    }
}

/// Is `ch` a line break under the normalization rule in the data model?
pub fn is_break(ch: char) -> bool {
    matches!(ch, '\n' | '\r' | '\u{85}' | '\u{2028}' | '\u{2029}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"a: 1");
        let r = Reader::new("<test>", &bytes).unwrap();
        assert_eq!(r.encoding, Encoding::Utf8);
        assert_eq!(r.peek(0), 'a');
    }

    #[test]
    fn defaults_to_utf8() {
        let r = Reader::new("<test>", b"a: 1").unwrap();
        assert_eq!(r.encoding, Encoding::Utf8);
    }

    #[test]
    fn rejects_bom_after_first_byte() {
        let err = Reader::new("<test>", "a\u{FEFF}b".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Reader(_)));
    }

    #[test]
    fn rejects_forbidden_control_char() {
        let err = Reader::new("<test>", b"a\x01b").unwrap_err();
        assert!(matches!(err, Error::Reader(_)));
    }

    #[test]
    fn decodes_utf16le_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for ch in "hi".encode_utf16() {
            bytes.extend_from_slice(&ch.to_le_bytes());
        }
        let r = Reader::new("<test>", &bytes).unwrap();
        assert_eq!(r.encoding, Encoding::Utf16Le);
        assert_eq!(r.peek(0), 'h');
        assert_eq!(r.peek(1), 'i');
    }

    #[test]
    fn forward_tracks_lines() {
        let mut r = Reader::new("<test>", b"ab\ncd").unwrap();
        r.forward(3);
        assert_eq!(r.line, 1);
        assert_eq!(r.column, 0);
        assert_eq!(r.peek(0), 'c');
    }
}
