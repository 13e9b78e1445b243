//! Event stream → YAML bytes.
//!
//! Unlike the scanner/parser pair, emission does not need a state-stack
//! automaton: the event stream is already fully bracketed (every
//! `SequenceStart`/`MappingStart` has a matching `*End`), so a single
//! recursive walk over the flat event list reconstructs the tree shape and
//! writes it directly. Each scalar is analyzed on the spot to pick the
//! narrowest style that round-trips it.

use std::io::Write;

use crate::error::{Error, Result};
use crate::parser::{Event, EventKind};
use crate::scanner::ScalarStyle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineBreak {
    Lf,
    CrLf,
    Cr,
}

impl LineBreak {
    fn as_str(self) -> &'static str {
        match self {
            LineBreak::Lf => "\n",
            LineBreak::CrLf => "\r\n",
            LineBreak::Cr => "\r",
        }
    }
}

/// Dump-time configuration, mirroring PyYAML's `Dumper` keyword arguments.
#[derive(Debug, Clone)]
pub struct DumperOptions {
    pub canonical: bool,
    pub indent: usize,
    pub text_width: usize,
    pub line_break: LineBreak,
    pub explicit_start: bool,
    pub explicit_end: bool,
    pub default_flow_style: bool,
}

impl Default for DumperOptions {
    fn default() -> Self {
        DumperOptions {
            canonical: false,
            indent: 2,
            text_width: 80,
            line_break: LineBreak::Lf,
            explicit_start: false,
            explicit_end: false,
            default_flow_style: false,
        }
    }
}

/// A scalar's shape, analyzed once so style selection doesn't re-scan the
/// string per candidate style.
struct Analysis {
    multiline: bool,
    special: bool,
}

fn analyze(value: &str) -> Analysis {
    let multiline = value.contains('\n');
    let special = value.is_empty()
        || value.starts_with(|c: char| "!&*-?|>%@`\"'#,[]{}: \t".contains(c))
        || value.ends_with(' ')
        || value.starts_with(' ')
        || value.contains(": ")
        || value.contains(" #")
        || value.contains('\t')
        || matches!(value, "~" | "null" | "Null" | "NULL" | "true" | "True" | "TRUE" | "false" | "False" | "FALSE");
    Analysis { multiline, special }
}

/// Collapse a full tag URI to its shorthand when it's the standard schema,
/// otherwise emit it verbatim between angle brackets.
fn format_tag(tag: &str) -> String {
    match tag.strip_prefix("tag:yaml.org,2002:") {
        Some(suffix) => format!("!!{suffix}"),
        None => format!("!<{tag}>"),
    }
}

pub struct Emitter<'a, W: Write> {
    writer: W,
    options: DumperOptions,
    events: &'a [Event],
    pos: usize,
}

impl<'a, W: Write> Emitter<'a, W> {
    pub fn new(writer: W, options: DumperOptions) -> Self {
        Emitter { writer, options, events: &[], pos: 0 }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn emit(&mut self, events: &'a [Event]) -> Result<()> {
        self.events = events;
        self.pos = 0;
        while self.pos < self.events.len() {
            match self.events[self.pos].kind.clone() {
                EventKind::StreamStart | EventKind::StreamEnd => {
                    self.pos += 1;
                }
                EventKind::DocumentStart { explicit, .. } => {
                    self.pos += 1;
                    if explicit || self.options.explicit_start {
                        self.write_str("---")?;
                        self.newline()?;
                    }
                    self.write_value(0)?;
                    self.newline()?;
                }
                EventKind::DocumentEnd { explicit } => {
                    self.pos += 1;
                    if explicit || self.options.explicit_end {
                        self.write_str("...")?;
                        self.newline()?;
                    }
                }
                other => return Err(Error::emitter(format!("expected a document boundary event, found {other:?}"))),
            }
        }
        Ok(())
    }

    fn write_str(&mut self, s: &str) -> Result<()> {
        self.writer.write_all(s.as_bytes()).map_err(Error::from)
    }

    fn newline(&mut self) -> Result<()> {
        let br = self.options.line_break.as_str();
        self.writer.write_all(br.as_bytes()).map_err(Error::from)
    }

    fn write_indent(&mut self, indent: usize) -> Result<()> {
        self.write_str(&" ".repeat(indent))
    }

    fn is_block_collection_start(kind: &EventKind) -> bool {
        matches!(
            kind,
            EventKind::SequenceStart { flow_style: false, .. } | EventKind::MappingStart { flow_style: false, .. }
        )
    }

    /// Whether `self.events[self.pos]` starts a non-empty block collection —
    /// such a value begins on its own line rather than after `": "`.
    fn starts_on_new_line(&self) -> bool {
        match self.events.get(self.pos).map(|e| &e.kind) {
            Some(kind) if Self::is_block_collection_start(kind) => {
                !matches!(
                    self.events.get(self.pos + 1).map(|e| &e.kind),
                    Some(EventKind::SequenceEnd) | Some(EventKind::MappingEnd)
                )
            }
            _ => false,
        }
    }

    /// Writes the node at `self.pos`, advancing past it. `indent` is the
    /// column any of its block-style children should be written at.
    fn write_value(&mut self, indent: usize) -> Result<()> {
        let kind = self.events[self.pos].kind.clone();
        self.pos += 1;
        match kind {
            EventKind::Alias { anchor } => self.write_str(&format!("*{anchor}")),

            EventKind::Scalar { anchor, tag, plain_implicit, quoted_implicit, value, style } => {
                if let Some(a) = anchor {
                    self.write_str(&format!("&{a} "))?;
                }
                let elide_tag = (style == ScalarStyle::Plain && plain_implicit) || (style != ScalarStyle::Plain && quoted_implicit);
                if !elide_tag {
                    if let Some(t) = &tag {
                        self.write_str(&format!("{} ", format_tag(t)))?;
                    }
                }
                self.write_scalar(indent, style, &value)
            }

            EventKind::SequenceStart { anchor, tag, implicit, flow_style } => {
                self.write_collection_prelude(anchor, tag, implicit)?;
                if flow_style && !self.options.canonical {
                    self.write_flow_sequence(indent)
                } else {
                    self.write_block_sequence(indent)
                }
            }

            EventKind::MappingStart { anchor, tag, implicit, flow_style } => {
                self.write_collection_prelude(anchor, tag, implicit)?;
                if flow_style && !self.options.canonical {
                    self.write_flow_mapping(indent)
                } else {
                    self.write_block_mapping(indent)
                }
            }

            other => Err(Error::emitter(format!("expected a node event, found {other:?}"))),
        }
    }

    fn write_collection_prelude(&mut self, anchor: Option<String>, tag: Option<String>, implicit: bool) -> Result<()> {
        if let Some(a) = anchor {
            self.write_str(&format!("&{a} "))?;
        }
        if !implicit {
            if let Some(t) = tag {
                self.write_str(&format!("{} ", format_tag(&t)))?;
            }
        }
        Ok(())
    }

    fn write_block_sequence(&mut self, indent: usize) -> Result<()> {
        if matches!(self.events[self.pos].kind, EventKind::SequenceEnd) {
            self.pos += 1;
            return self.write_str("[]");
        }
        let child_indent = indent + self.options.indent;
        let mut first = true;
        while !matches!(self.events[self.pos].kind, EventKind::SequenceEnd) {
            if !first || indent > 0 {
                self.newline()?;
                self.write_indent(indent)?;
            }
            first = false;
            self.write_str("- ")?;
            self.write_value(child_indent)?;
        }
        self.pos += 1;
        Ok(())
    }

    fn write_flow_sequence(&mut self, indent: usize) -> Result<()> {
        self.write_str("[")?;
        let mut first = true;
        while !matches!(self.events[self.pos].kind, EventKind::SequenceEnd) {
            if !first {
                self.write_str(", ")?;
            }
            first = false;
            self.write_value(indent)?;
        }
        self.pos += 1;
        self.write_str("]")
    }

    fn write_block_mapping(&mut self, indent: usize) -> Result<()> {
        if matches!(self.events[self.pos].kind, EventKind::MappingEnd) {
            self.pos += 1;
            return self.write_str("{}");
        }
        let child_indent = indent + self.options.indent;
        let mut first = true;
        while !matches!(self.events[self.pos].kind, EventKind::MappingEnd) {
            if !first || indent > 0 {
                self.newline()?;
                self.write_indent(indent)?;
            }
            first = false;
            self.write_value(indent)?;
            if self.starts_on_new_line() {
                self.write_str(":")?;
                self.newline()?;
                self.write_indent(child_indent)?;
            } else {
                self.write_str(": ")?;
            }
            self.write_value(child_indent)?;
        }
        self.pos += 1;
        Ok(())
    }

    fn write_flow_mapping(&mut self, indent: usize) -> Result<()> {
        self.write_str("{")?;
        let mut first = true;
        while !matches!(self.events[self.pos].kind, EventKind::MappingEnd) {
            if !first {
                self.write_str(", ")?;
            }
            first = false;
            self.write_value(indent)?;
            self.write_str(": ")?;
            self.write_value(indent)?;
        }
        self.pos += 1;
        self.write_str("}")
    }

    fn write_scalar(&mut self, indent: usize, style: ScalarStyle, value: &str) -> Result<()> {
        match style {
            ScalarStyle::Literal => self.write_block_scalar(indent, value, '|'),
            ScalarStyle::Folded => self.write_block_scalar(indent, value, '>'),
            ScalarStyle::SingleQuoted => self.write_single_quoted(indent, value),
            ScalarStyle::DoubleQuoted => self.write_double_quoted(value),
            ScalarStyle::Plain => {
                let analysis = analyze(value);
                if self.options.canonical || analysis.special {
                    self.write_double_quoted(value)
                } else if analysis.multiline {
                    self.write_block_scalar(indent, value, '|')
                } else {
                    self.write_str(value)
                }
            }
        }
    }

    /// A line break inside a single-quoted scalar folds to a space on
    /// reload (the scanner's `n` breaks → `n - 1` literal breaks rule), so
    /// a stored `\n` only ever survived because it came from a run of
    /// breaks — it must be re-emitted as that run, one more break than the
    /// number of consecutive `\n`s, or the next load would fold it back to
    /// a space and join two lines that should stay apart.
    fn write_single_quoted(&mut self, indent: usize, value: &str) -> Result<()> {
        self.write_str("'")?;
        let mut prev_was_content = false;
        for (i, segment) in value.split('\n').enumerate() {
            if i > 0 {
                self.newline()?;
                if prev_was_content {
                    self.newline()?;
                }
            }
            if !segment.is_empty() {
                if i > 0 {
                    self.write_indent(indent)?;
                }
                self.write_str(&segment.replace('\'', "''"))?;
                prev_was_content = true;
            } else {
                prev_was_content = false;
            }
        }
        self.write_str("'")
    }

    fn write_double_quoted(&mut self, value: &str) -> Result<()> {
        self.write_str("\"")?;
        for ch in value.chars() {
            match ch {
                '\\' => self.write_str("\\\\")?,
                '"' => self.write_str("\\\"")?,
                '\n' => self.write_str("\\n")?,
                '\t' => self.write_str("\\t")?,
                '\r' => self.write_str("\\r")?,
                '\0' => self.write_str("\\0")?,
                c => {
                    let mut buf = [0u8; 4];
                    self.write_str(c.encode_utf8(&mut buf))?
                }
            }
        }
        self.write_str("\"")
    }

    /// `|`/`>` block scalars: a `-` chomping indicator is added unless the
    /// value already ends with a line break (the default "clip" form).
    ///
    /// Literal (`|`) breaks are stored one-for-one with what gets written,
    /// but folded (`>`) breaks are not: a lone break between two content
    /// lines folds to a space on reload, so a stored `\n` only survived
    /// because it was part of a run — re-emitting just one break per
    /// stored `\n` would fold it right back to a space. A run of `k`
    /// consecutive `\n`s needs `k + 1` breaks on the way out, matching the
    /// scanner's `n` breaks → `n - 1` literal breaks rule in reverse.
    fn write_block_scalar(&mut self, indent: usize, value: &str, indicator: char) -> Result<()> {
        let clip = value.ends_with('\n');
        self.write_str(&indicator.to_string())?;
        if !clip {
            self.write_str("-")?;
        }
        let body = if clip { &value[..value.len() - 1] } else { value };
        let child_indent = indent + self.options.indent;
        let folded = indicator == '>';
        let mut prev_was_content = false;
        for (i, line) in body.split('\n').enumerate() {
            self.newline()?;
            if folded && i > 0 && prev_was_content {
                self.newline()?;
            }
            if !line.is_empty() {
                self.write_indent(child_indent)?;
                self.write_str(line)?;
                prev_was_content = true;
            } else {
                prev_was_content = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::Composer;
    use crate::parser::Parser;
    use crate::reader::Reader;
    use crate::representer::Representer;
    use crate::scanner::Scanner;
    use crate::serializer::{Serializer, SerializerOptions};
    use pretty_assertions::assert_eq;

    fn roundtrip(src: &str) -> String {
        let reader = Reader::new("<test>", src.as_bytes()).unwrap();
        let scanner = Scanner::new(reader);
        let parser = Parser::new(scanner);
        let mut composer = Composer::new(parser).unwrap();
        let node = composer.next_document().unwrap().unwrap();

        let mut constructor = crate::constructor::Constructor::new();
        let typed = constructor.construct(&node).unwrap();

        let mut serializer = Serializer::new(Representer::new(), SerializerOptions::default());
        let mut events = serializer.serialize_document(&typed);
        events.extend(serializer.close());

        let mut out = Vec::new();
        let mut emitter = Emitter::new(&mut out, DumperOptions::default());
        emitter.emit(&events).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn emits_a_flow_sequence_of_ints() {
        let text = roundtrip("[1, 2, 3]\n");
        assert_eq!(text.trim_end(), "[1, 2, 3]");
    }

    #[test]
    fn emits_a_block_mapping() {
        let text = roundtrip("a: 1\nb: 2\n");
        assert!(text.contains("a: 1"));
        assert!(text.contains("b: 2"));
    }

    #[test]
    fn quotes_a_string_that_looks_like_a_number() {
        let text = roundtrip("\"42\"\n");
        assert_eq!(text.trim_end(), "\"42\"");
    }

    fn load_value(src: &str) -> String {
        let reader = Reader::new("<test>", src.as_bytes()).unwrap();
        let scanner = Scanner::new(reader);
        let parser = Parser::new(scanner);
        let mut composer = Composer::new(parser).unwrap();
        let node = composer.next_document().unwrap().unwrap();
        let mut constructor = crate::constructor::Constructor::new();
        constructor.construct(&node).unwrap().as_str().unwrap().to_string()
    }

    #[test]
    fn single_quoted_blank_line_survives_round_trip() {
        let src = "'line one\n\n  line two'\n";
        let original = load_value(src);
        assert_eq!(original, "line one\nline two");
        let dumped = roundtrip(src);
        assert_eq!(load_value(&dumped), original);
    }

    #[test]
    fn folded_scalar_internal_break_survives_round_trip() {
        let src = ">\n  line one\n\n  line two\n";
        let original = load_value(src);
        assert_eq!(original, "line one\nline two");
        let dumped = roundtrip(src);
        assert_eq!(load_value(&dumped), original);
    }

    #[test]
    fn block_mapping_emits_expected_lines() {
        let text = roundtrip("a: 1\nb: 2\nc: 3\n");
        assert_eq!(text, "a: 1\nb: 2\nc: 3\n");
    }
}
