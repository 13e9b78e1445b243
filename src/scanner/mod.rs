//! Tokenizer: code points to [`Token`]s.
//!
//! The hard part of a YAML scanner is that `-`, `?` and `:` are ambiguous
//! until more input has been seen (is `- x` a sequence entry or a plain
//! scalar starting with a dash?), and that a mapping key found several
//! tokens ago might need a `KEY` token retroactively inserted before it
//! once the matching `:` shows up. This is the "simple key" mechanism
//! described in the component design: at most one pending simple key is
//! tracked per flow level, and `fetch_value` splices a `Key` (and possibly
//! a `BlockMappingStart`) into the token queue in front of it.

mod token;

use std::collections::{HashMap, VecDeque};

pub use token::{ScalarStyle, Token, TokenKind};

use crate::error::{Error, Result};
use crate::mark::Mark;
use crate::reader::{is_break, Reader};

struct SimpleKey {
    token_number: usize,
    required: bool,
    mark: Mark,
}

/// Pull tokenizer: each call to [`Scanner::next_token`] (or the `Iterator`
/// impl) returns the next token, scanning just enough input to resolve it.
pub struct Scanner {
    reader: Reader,
    tokens: VecDeque<Token>,
    tokens_taken: usize,
    done: bool,
    indent: isize,
    indents: Vec<isize>,
    flow_level: usize,
    allow_simple_key: bool,
    possible_simple_keys: HashMap<usize, SimpleKey>,
}

fn is_blank(ch: char) -> bool {
    ch == ' ' || ch == '\t'
}

fn is_flow_indicator(ch: char) -> bool {
    matches!(ch, ',' | '[' | ']' | '{' | '}')
}

fn is_anchor_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

impl Scanner {
    pub fn new(reader: Reader) -> Self {
        let mut scanner = Scanner {
            reader,
            tokens: VecDeque::new(),
            tokens_taken: 0,
            done: false,
            indent: -1,
            indents: Vec::new(),
            flow_level: 0,
            allow_simple_key: true,
            possible_simple_keys: HashMap::new(),
        };
        scanner.fetch_stream_start();
        scanner
    }

    pub fn next_token(&mut self) -> Result<Option<Token>> {
        loop {
            if self.tokens.is_empty() {
                if self.done {
                    return Ok(None);
                }
                self.fetch_more_tokens()?;
                continue;
            }
            self.stale_possible_simple_keys()?;
            if self.next_possible_simple_key() == Some(self.tokens_taken) {
                self.fetch_more_tokens()?;
                continue;
            }
            break;
        }
        let token = self.tokens.pop_front();
        if token.is_some() {
            self.tokens_taken += 1;
        }
        Ok(token)
    }

    fn is_blank_or_eof(&self, offset: usize) -> bool {
        let ch = self.reader.peek(offset);
        ch == '\0' || is_break(ch) || is_blank(ch)
    }

    fn next_possible_simple_key(&self) -> Option<usize> {
        self.possible_simple_keys.values().map(|k| k.token_number).min()
    }

    fn stale_possible_simple_keys(&mut self) -> Result<()> {
        let current = self.reader.mark();
        let stale: Vec<usize> = self
            .possible_simple_keys
            .iter()
            .filter(|(_, key)| {
                key.mark.line != current.line || current.index.saturating_sub(key.mark.index) > 1024
            })
            .map(|(level, _)| *level)
            .collect();
        for level in stale {
            if let Some(key) = self.possible_simple_keys.remove(&level) {
                if key.required {
                    return Err(Error::scanner_ctx(
                        "could not find expected ':'",
                        current.clone(),
                        "while scanning a simple key",
                        key.mark,
                    ));
                }
            }
        }
        Ok(())
    }

    fn save_possible_simple_key(&mut self) -> Result<()> {
        let required = self.flow_level == 0 && self.indent == self.reader.mark().column as isize;
        if self.allow_simple_key {
            self.remove_possible_simple_key()?;
            let token_number = self.tokens_taken + self.tokens.len();
            self.possible_simple_keys
                .insert(self.flow_level, SimpleKey { token_number, required, mark: self.reader.mark() });
        }
        Ok(())
    }

    fn remove_possible_simple_key(&mut self) -> Result<()> {
        if let Some(key) = self.possible_simple_keys.remove(&self.flow_level) {
            if key.required {
                return Err(Error::scanner_ctx(
                    "could not find expected ':'",
                    self.reader.mark(),
                    "while scanning a simple key",
                    key.mark,
                ));
            }
        }
        Ok(())
    }

    fn unwind_indent(&mut self, column: isize) {
        if self.flow_level > 0 {
            return;
        }
        while self.indent > column {
            let mark = self.reader.mark();
            self.tokens.push_back(Token::new(TokenKind::BlockEnd, mark.clone(), mark));
            self.indent = self.indents.pop().unwrap_or(-1);
        }
    }

    fn add_indent(&mut self, column: isize) -> bool {
        if self.indent < column {
            self.indents.push(self.indent);
            self.indent = column;
            true
        } else {
            false
        }
    }

    fn fetch_more_tokens(&mut self) -> Result<()> {
        self.scan_to_next_token();
        self.stale_possible_simple_keys()?;
        let column = self.reader.mark().column as isize;
        self.unwind_indent(column);

        if self.reader.is_eof() {
            return self.fetch_stream_end();
        }

        if column == 0 && self.reader.prefix(3) == "---" && self.is_blank_or_eof(3) {
            return self.fetch_document_indicator(TokenKind::DocumentStart);
        }
        if column == 0 && self.reader.prefix(3) == "..." && self.is_blank_or_eof(3) {
            return self.fetch_document_indicator(TokenKind::DocumentEnd);
        }

        let ch = self.reader.peek(0);
        match ch {
            '%' if column == 0 => self.fetch_directive(),
            '[' => self.fetch_flow_collection_start(TokenKind::FlowSequenceStart),
            '{' => self.fetch_flow_collection_start(TokenKind::FlowMappingStart),
            ']' => self.fetch_flow_collection_end(TokenKind::FlowSequenceEnd),
            '}' => self.fetch_flow_collection_end(TokenKind::FlowMappingEnd),
            ',' => self.fetch_flow_entry(),
            '-' if self.is_blank_or_eof(1) => self.fetch_block_entry(),
            '?' if self.flow_level > 0 || self.is_blank_or_eof(1) => self.fetch_key(),
            ':' if self.flow_level > 0 || self.is_blank_or_eof(1) => self.fetch_value(),
            '*' => self.fetch_anchor_or_alias(true),
            '&' => self.fetch_anchor_or_alias(false),
            '!' => self.fetch_tag(),
            '|' if self.flow_level == 0 => self.fetch_block_scalar(ScalarStyle::Literal),
            '>' if self.flow_level == 0 => self.fetch_block_scalar(ScalarStyle::Folded),
            '\'' => self.fetch_flow_scalar(ScalarStyle::SingleQuoted),
            '"' => self.fetch_flow_scalar(ScalarStyle::DoubleQuoted),
            '@' | '`' => Err(Error::scanner(
                format!("character '{ch}' is reserved and cannot start a plain scalar"),
                self.reader.mark(),
            )),
            _ => self.fetch_plain(),
        }
    }

    fn scan_to_next_token(&mut self) {
        loop {
            while matches!(self.reader.peek(0), ' ' | '\t') {
                self.reader.forward(1);
            }
            if self.reader.peek(0) == '#' {
                while !is_break(self.reader.peek(0)) && self.reader.peek(0) != '\0' {
                    self.reader.forward(1);
                }
            }
            if is_break(self.reader.peek(0)) {
                self.reader.forward(1);
                if self.flow_level == 0 {
                    self.allow_simple_key = true;
                }
            } else {
                break;
            }
        }
    }

    fn fetch_stream_start(&mut self) {
        let mark = self.reader.mark();
        self.allow_simple_key = true;
        self.tokens.push_back(Token::new(TokenKind::StreamStart, mark.clone(), mark));
    }

    fn fetch_stream_end(&mut self) -> Result<()> {
        self.unwind_indent(-1);
        self.remove_possible_simple_key()?;
        self.allow_simple_key = false;
        self.possible_simple_keys.clear();
        let mark = self.reader.mark();
        self.tokens.push_back(Token::new(TokenKind::StreamEnd, mark.clone(), mark));
        self.done = true;
        Ok(())
    }

    fn fetch_document_indicator(&mut self, kind: TokenKind) -> Result<()> {
        self.unwind_indent(-1);
        self.remove_possible_simple_key()?;
        self.allow_simple_key = false;
        let start = self.reader.mark();
        self.reader.forward(3);
        let end = self.reader.mark();
        self.tokens.push_back(Token::new(kind, start, end));
        Ok(())
    }

    fn fetch_flow_collection_start(&mut self, kind: TokenKind) -> Result<()> {
        self.save_possible_simple_key()?;
        self.flow_level += 1;
        self.allow_simple_key = true;
        let start = self.reader.mark();
        self.reader.forward(1);
        let end = self.reader.mark();
        self.tokens.push_back(Token::new(kind, start, end));
        Ok(())
    }

    fn fetch_flow_collection_end(&mut self, kind: TokenKind) -> Result<()> {
        self.remove_possible_simple_key()?;
        self.flow_level = self.flow_level.saturating_sub(1);
        self.allow_simple_key = false;
        let start = self.reader.mark();
        self.reader.forward(1);
        let end = self.reader.mark();
        self.tokens.push_back(Token::new(kind, start, end));
        Ok(())
    }

    fn fetch_flow_entry(&mut self) -> Result<()> {
        self.allow_simple_key = true;
        self.remove_possible_simple_key()?;
        let start = self.reader.mark();
        self.reader.forward(1);
        let end = self.reader.mark();
        self.tokens.push_back(Token::new(TokenKind::FlowEntry, start, end));
        Ok(())
    }

    fn fetch_block_entry(&mut self) -> Result<()> {
        if self.flow_level == 0 {
            if !self.allow_simple_key {
                return Err(Error::scanner(
                    "sequence entries are not allowed here",
                    self.reader.mark(),
                ));
            }
            let column = self.reader.mark().column as isize;
            if self.add_indent(column) {
                let mark = self.reader.mark();
                self.tokens.push_back(Token::new(TokenKind::BlockSequenceStart, mark.clone(), mark));
            }
        }
        self.allow_simple_key = true;
        self.remove_possible_simple_key()?;
        let start = self.reader.mark();
        self.reader.forward(1);
        let end = self.reader.mark();
        self.tokens.push_back(Token::new(TokenKind::BlockEntry, start, end));
        Ok(())
    }

    fn fetch_key(&mut self) -> Result<()> {
        if self.flow_level == 0 {
            if !self.allow_simple_key {
                return Err(Error::scanner("mapping keys are not allowed here", self.reader.mark()));
            }
            let column = self.reader.mark().column as isize;
            if self.add_indent(column) {
                let mark = self.reader.mark();
                self.tokens.push_back(Token::new(TokenKind::BlockMappingStart, mark.clone(), mark));
            }
        }
        self.allow_simple_key = self.flow_level == 0;
        self.remove_possible_simple_key()?;
        let start = self.reader.mark();
        self.reader.forward(1);
        let end = self.reader.mark();
        self.tokens.push_back(Token::new(TokenKind::Key, start, end));
        Ok(())
    }

    fn fetch_value(&mut self) -> Result<()> {
        if let Some(key) = self.possible_simple_keys.remove(&self.flow_level) {
            let idx = key.token_number - self.tokens_taken;
            self.tokens.insert(idx, Token::new(TokenKind::Key, key.mark.clone(), key.mark.clone()));
            if self.flow_level == 0 {
                let column = key.mark.column as isize;
                if self.add_indent(column) {
                    self.tokens
                        .insert(idx, Token::new(TokenKind::BlockMappingStart, key.mark.clone(), key.mark));
                }
            }
            self.allow_simple_key = false;
        } else {
            if self.flow_level == 0 {
                if !self.allow_simple_key {
                    return Err(Error::scanner(
                        "mapping values are not allowed here",
                        self.reader.mark(),
                    ));
                }
                let column = self.reader.mark().column as isize;
                if self.add_indent(column) {
                    let mark = self.reader.mark();
                    self.tokens.push_back(Token::new(TokenKind::BlockMappingStart, mark.clone(), mark));
                }
            }
            self.allow_simple_key = self.flow_level == 0;
        }
        let start = self.reader.mark();
        self.reader.forward(1);
        let end = self.reader.mark();
        self.tokens.push_back(Token::new(TokenKind::Value, start, end));
        Ok(())
    }

    fn fetch_anchor_or_alias(&mut self, is_alias: bool) -> Result<()> {
        self.save_possible_simple_key()?;
        self.allow_simple_key = false;
        let start = self.reader.mark();
        self.reader.forward(1);
        let mut name = String::new();
        while is_anchor_char(self.reader.peek(0)) {
            name.push(self.reader.peek(0));
            self.reader.forward(1);
        }
        if name.is_empty() {
            return Err(Error::scanner_ctx(
                "expected an alphanumeric, '-' or '_' character",
                self.reader.mark(),
                format!("while scanning an {}", if is_alias { "alias" } else { "anchor" }),
                start,
            ));
        }
        let end = self.reader.mark();
        let kind = if is_alias { TokenKind::Alias(name) } else { TokenKind::Anchor(name) };
        self.tokens.push_back(Token::new(kind, start, end));
        Ok(())
    }

    fn fetch_tag(&mut self) -> Result<()> {
        self.save_possible_simple_key()?;
        self.allow_simple_key = false;
        let start = self.reader.mark();
        let (handle, suffix) = if self.reader.peek(1) == '<' {
            self.reader.forward(2);
            let suffix = self.scan_tag_uri(&start)?;
            if self.reader.peek(0) != '>' {
                return Err(Error::scanner_ctx(
                    "expected '>'",
                    self.reader.mark(),
                    "while scanning a tag",
                    start.clone(),
                ));
            }
            self.reader.forward(1);
            (String::new(), suffix)
        } else {
            let mut length = 1usize;
            let mut use_handle = false;
            loop {
                let ch = self.reader.peek(length);
                if ch == '\0' || is_break(ch) || is_blank(ch) {
                    break;
                }
                if ch == '!' {
                    use_handle = true;
                    break;
                }
                length += 1;
            }
            let handle = if use_handle {
                self.scan_tag_handle(&start)?
            } else {
                self.reader.forward(1);
                "!".to_string()
            };
            let suffix = self.scan_tag_uri(&start)?;
            (handle, suffix)
        };
        let end = self.reader.mark();
        self.tokens.push_back(Token::new(TokenKind::Tag(handle, suffix), start, end));
        Ok(())
    }

    fn scan_tag_handle(&mut self, start: &Mark) -> Result<String> {
        let mut value = String::new();
        if self.reader.peek(0) != '!' {
            return Err(Error::scanner_ctx(
                "expected '!'",
                self.reader.mark(),
                "while scanning a tag",
                start.clone(),
            ));
        }
        value.push('!');
        self.reader.forward(1);
        while self.reader.peek(0).is_ascii_alphanumeric()
            || matches!(self.reader.peek(0), '-' | '_')
        {
            value.push(self.reader.peek(0));
            self.reader.forward(1);
        }
        if self.reader.peek(0) == '!' {
            value.push('!');
            self.reader.forward(1);
        } else {
            return Err(Error::scanner_ctx(
                "expected '!'",
                self.reader.mark(),
                "while scanning a tag",
                start.clone(),
            ));
        }
        Ok(value)
    }

    fn scan_tag_uri(&mut self, start: &Mark) -> Result<String> {
        let mut value = String::new();
        loop {
            let ch = self.reader.peek(0);
            if ch == '%' {
                value.push_str(&self.scan_uri_escape(start)?);
            } else if ch.is_ascii_alphanumeric() || "-;/?:@&=+$,_.!~*'()[]".contains(ch) {
                value.push(ch);
                self.reader.forward(1);
            } else {
                break;
            }
        }
        if value.is_empty() {
            return Err(Error::scanner_ctx(
                "expected a URI",
                self.reader.mark(),
                "while parsing a tag",
                start.clone(),
            ));
        }
        Ok(value)
    }

    fn scan_uri_escape(&mut self, start: &Mark) -> Result<String> {
        let mut bytes = Vec::new();
        while self.reader.peek(0) == '%' {
            self.reader.forward(1);
            let hex = self.reader.prefix(2);
            if hex.len() < 2 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(Error::scanner_ctx(
                    "expected two hexadecimal digits after '%'",
                    self.reader.mark(),
                    "while parsing a tag",
                    start.clone(),
                ));
            }
            bytes.push(u8::from_str_radix(&hex, 16).unwrap());
            self.reader.forward(2);
        }
        String::from_utf8(bytes).map_err(|_| {
            Error::scanner_ctx("invalid UTF-8 in %-escaped tag URI", self.reader.mark(), "while parsing a tag", start.clone())
        })
    }

    fn fetch_directive(&mut self) -> Result<()> {
        self.unwind_indent(-1);
        self.remove_possible_simple_key()?;
        self.allow_simple_key = false;
        let start = self.reader.mark();
        self.reader.forward(1);
        let name = self.scan_directive_name(&start)?;
        let value = match name.as_str() {
            "YAML" => self.scan_yaml_directive_value(&start)?,
            "TAG" => self.scan_tag_directive_value(&start)?,
            _ => {
                self.scan_directive_ignored_line(&start)?;
                String::new()
            }
        };
        let end = self.reader.mark();
        self.tokens.push_back(Token::new(TokenKind::Directive { name, value }, start, end));
        Ok(())
    }

    fn scan_directive_name(&mut self, start: &Mark) -> Result<String> {
        let mut name = String::new();
        while self.reader.peek(0).is_ascii_alphanumeric() || matches!(self.reader.peek(0), '-' | '_') {
            name.push(self.reader.peek(0));
            self.reader.forward(1);
        }
        if name.is_empty() || !self.is_blank_or_eof(0) {
            return Err(Error::scanner_ctx(
                "expected an alphanumeric character",
                self.reader.mark(),
                "while scanning a directive",
                start.clone(),
            ));
        }
        Ok(name)
    }

    fn scan_yaml_directive_value(&mut self, start: &Mark) -> Result<String> {
        while self.reader.peek(0) == ' ' {
            self.reader.forward(1);
        }
        let major = self.scan_directive_digits(start)?;
        if self.reader.peek(0) != '.' {
            return Err(Error::scanner_ctx(
                "expected a digit or '.'",
                self.reader.mark(),
                "while scanning a directive",
                start.clone(),
            ));
        }
        self.reader.forward(1);
        let minor = self.scan_directive_digits(start)?;
        self.scan_directive_ignored_line(start)?;
        Ok(format!("{major}.{minor}"))
    }

    fn scan_directive_digits(&mut self, start: &Mark) -> Result<String> {
        let mut digits = String::new();
        while self.reader.peek(0).is_ascii_digit() {
            digits.push(self.reader.peek(0));
            self.reader.forward(1);
        }
        if digits.is_empty() {
            return Err(Error::scanner_ctx(
                "expected a digit",
                self.reader.mark(),
                "while scanning a directive",
                start.clone(),
            ));
        }
        Ok(digits)
    }

    fn scan_tag_directive_value(&mut self, start: &Mark) -> Result<String> {
        while self.reader.peek(0) == ' ' {
            self.reader.forward(1);
        }
        let handle = self.scan_tag_handle(start)?;
        while self.reader.peek(0) == ' ' {
            self.reader.forward(1);
        }
        let prefix = self.scan_tag_uri(start)?;
        self.scan_directive_ignored_line(start)?;
        Ok(format!("{handle} {prefix}"))
    }

    fn scan_directive_ignored_line(&mut self, start: &Mark) -> Result<()> {
        while self.reader.peek(0) == ' ' {
            self.reader.forward(1);
        }
        if self.reader.peek(0) == '#' {
            while !is_break(self.reader.peek(0)) && self.reader.peek(0) != '\0' {
                self.reader.forward(1);
            }
        }
        if !self.is_blank_or_eof(0) {
            return Err(Error::scanner_ctx(
                "expected a comment or a line break",
                self.reader.mark(),
                "while scanning a directive",
                start.clone(),
            ));
        }
        if self.reader.peek(0) != '\0' {
            self.reader.forward(1);
        }
        Ok(())
    }

    fn fetch_block_scalar(&mut self, style: ScalarStyle) -> Result<()> {
        self.allow_simple_key = true;
        self.remove_possible_simple_key()?;
        let token = self.scan_block_scalar(style)?;
        self.tokens.push_back(token);
        Ok(())
    }

    fn scan_block_scalar(&mut self, style: ScalarStyle) -> Result<Token> {
        let start = self.reader.mark();
        self.reader.forward(1);

        let mut chomping: Option<bool> = None;
        let mut explicit_indent: Option<usize> = None;
        loop {
            match self.reader.peek(0) {
                '+' | '-' if chomping.is_none() => {
                    chomping = Some(self.reader.peek(0) == '+');
                    self.reader.forward(1);
                }
                '0' if explicit_indent.is_none() => {
                    return Err(Error::scanner(
                        "block scalar indentation indicator cannot be 0",
                        self.reader.mark(),
                    ));
                }
                c @ '1'..='9' if explicit_indent.is_none() => {
                    explicit_indent = Some(c.to_digit(10).unwrap() as usize);
                    self.reader.forward(1);
                }
                _ => break,
            }
        }
        loop {
            match self.reader.peek(0) {
                ' ' => self.reader.forward(1),
                '#' => {
                    while !is_break(self.reader.peek(0)) && self.reader.peek(0) != '\0' {
                        self.reader.forward(1);
                    }
                }
                _ => break,
            }
        }
        if self.reader.peek(0) != '\0' && !is_break(self.reader.peek(0)) {
            return Err(Error::scanner_ctx(
                "expected a comment or a line break",
                self.reader.mark(),
                "while scanning a block scalar",
                start.clone(),
            ));
        }
        if self.reader.peek(0) != '\0' {
            self.reader.forward(1);
        }

        let parent_indent = if self.indent >= 0 { self.indent as usize } else { 0 };
        let mut content_indent = explicit_indent.map(|i| parent_indent + i);
        let mut lines: Vec<Option<String>> = Vec::new();
        let mut end_mark = self.reader.mark();

        loop {
            let mut indent = 0usize;
            while self.reader.peek(0) == ' ' {
                self.reader.forward(1);
                indent += 1;
            }
            let ch = self.reader.peek(0);
            let blank = ch == '\0' || is_break(ch);

            if blank {
                lines.push(None);
                end_mark = self.reader.mark();
                if ch == '\0' {
                    break;
                }
                self.reader.forward(1);
                continue;
            }

            match content_indent {
                None => {
                    if indent <= parent_indent {
                        end_mark = self.reader.mark();
                        break;
                    }
                    content_indent = Some(indent);
                }
                Some(want) if indent < want => {
                    end_mark = self.reader.mark();
                    break;
                }
                _ => {}
            }
            let want = content_indent.unwrap();
            let mut text = " ".repeat(indent - want);
            while !is_break(self.reader.peek(0)) && self.reader.peek(0) != '\0' {
                text.push(self.reader.peek(0));
                self.reader.forward(1);
            }
            lines.push(Some(text));
            end_mark = self.reader.mark();
            if self.reader.peek(0) == '\0' {
                break;
            }
            self.reader.forward(1);
        }

        let mut trailing_blank = 0usize;
        while matches!(lines.last(), Some(None)) {
            lines.pop();
            trailing_blank += 1;
        }

        let mut value = String::new();
        let mut prev_more_indented = false;
        let mut first = true;
        for line in &lines {
            match line {
                None => {
                    value.push('\n');
                    prev_more_indented = false;
                }
                Some(text) => {
                    let more_indented = text.starts_with(' ');
                    if !first {
                        match style {
                            ScalarStyle::Literal => value.push('\n'),
                            ScalarStyle::Folded => {
                                if !value.ends_with('\n') {
                                    if more_indented || prev_more_indented {
                                        value.push('\n');
                                    } else {
                                        value.push(' ');
                                    }
                                }
                            }
                            _ => unreachable!("block scalars are always literal or folded"),
                        }
                    }
                    value.push_str(text);
                    prev_more_indented = more_indented;
                    first = false;
                }
            }
        }
        if !lines.is_empty() || trailing_blank > 0 {
            value.push('\n');
        }
        for _ in 1..trailing_blank {
            value.push('\n');
        }

        match chomping {
            Some(false) => {
                while value.ends_with('\n') {
                    value.pop();
                }
            }
            Some(true) => {}
            None => {
                while value.ends_with('\n') {
                    value.pop();
                }
                if !value.is_empty() {
                    value.push('\n');
                }
            }
        }

        Ok(Token::new(
            TokenKind::Scalar { value, style, plain_implicit: false, quoted_implicit: false },
            start,
            end_mark,
        ))
    }

    fn fetch_flow_scalar(&mut self, style: ScalarStyle) -> Result<()> {
        self.save_possible_simple_key()?;
        self.allow_simple_key = false;
        let token = self.scan_flow_scalar(style)?;
        self.tokens.push_back(token);
        Ok(())
    }

    fn scan_flow_scalar(&mut self, style: ScalarStyle) -> Result<Token> {
        let double = matches!(style, ScalarStyle::DoubleQuoted);
        let quote = if double { '"' } else { '\'' };
        let start = self.reader.mark();
        self.reader.forward(1);
        let mut value = String::new();

        loop {
            let ch = self.reader.peek(0);
            if ch == quote {
                if !double && self.reader.peek(1) == '\'' {
                    value.push('\'');
                    self.reader.forward(2);
                    continue;
                }
                break;
            }
            if ch == '\0' {
                return Err(Error::scanner_ctx(
                    "found unexpected end of stream",
                    self.reader.mark(),
                    "while scanning a quoted scalar",
                    start,
                ));
            }
            if is_break(ch) || is_blank(ch) {
                value.push_str(&self.scan_flow_scalar_whitespace_run());
                continue;
            }
            if double && ch == '\\' {
                if is_break(self.reader.peek(1)) {
                    self.reader.forward(1);
                    self.scan_flow_scalar_whitespace_run();
                    continue;
                }
                value.push_str(&self.scan_double_escape(&start)?);
                continue;
            }
            value.push(ch);
            self.reader.forward(1);
        }
        self.reader.forward(1);
        let end = self.reader.mark();
        Ok(Token::new(
            TokenKind::Scalar { value, style, plain_implicit: false, quoted_implicit: !double },
            start,
            end,
        ))
    }

    /// Scan a run of blanks and/or line breaks and fold it: a lone break
    /// becomes a space, `n` consecutive breaks become `n - 1` literal
    /// breaks, and any surrounding blanks vanish.
    fn scan_flow_scalar_whitespace_run(&mut self) -> String {
        while matches!(self.reader.peek(0), ' ' | '\t') {
            self.reader.forward(1);
        }
        if !is_break(self.reader.peek(0)) {
            return " ".to_string();
        }
        let mut breaks = 0usize;
        while is_break(self.reader.peek(0)) {
            self.reader.forward(1);
            breaks += 1;
            while matches!(self.reader.peek(0), ' ' | '\t') {
                self.reader.forward(1);
            }
        }
        if breaks == 1 {
            " ".to_string()
        } else {
            "\n".repeat(breaks - 1)
        }
    }

    fn scan_double_escape(&mut self, start: &Mark) -> Result<String> {
        self.reader.forward(1);
        let ch = self.reader.peek(0);
        let simple = match ch {
            '0' => Some('\0'),
            'a' => Some('\u{7}'),
            'b' => Some('\u{8}'),
            't' | '\t' => Some('\t'),
            'n' => Some('\n'),
            'v' => Some('\u{b}'),
            'f' => Some('\u{c}'),
            'r' => Some('\r'),
            'e' => Some('\u{1b}'),
            ' ' => Some(' '),
            '"' => Some('"'),
            '\\' => Some('\\'),
            'N' => Some('\u{85}'),
            '_' => Some('\u{a0}'),
            'L' => Some('\u{2028}'),
            'P' => Some('\u{2029}'),
            _ => None,
        };
        if let Some(c) = simple {
            self.reader.forward(1);
            return Ok(c.to_string());
        }
        let (len, radix) = match ch {
            'x' => (2, 16),
            'u' => (4, 16),
            'U' => (8, 16),
            _ => {
                return Err(Error::scanner_ctx(
                    format!("found unknown escape character '{ch}'"),
                    self.reader.mark(),
                    "while parsing a quoted scalar",
                    start.clone(),
                ));
            }
        };
        self.reader.forward(1);
        let hex = self.reader.prefix(len);
        if hex.len() < len || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::scanner_ctx(
                "expected hexadecimal digits in an escape sequence",
                self.reader.mark(),
                "while parsing a quoted scalar",
                start.clone(),
            ));
        }
        let code = u32::from_str_radix(&hex, radix).unwrap();
        let c = char::from_u32(code).ok_or_else(|| {
            Error::scanner_ctx(
                format!("invalid escaped code point 0x{code:X}"),
                self.reader.mark(),
                "while parsing a quoted scalar",
                start.clone(),
            )
        })?;
        self.reader.forward(len);
        Ok(c.to_string())
    }

    fn fetch_plain(&mut self) -> Result<()> {
        self.save_possible_simple_key()?;
        self.allow_simple_key = false;
        let token = self.scan_plain()?;
        self.tokens.push_back(token);
        Ok(())
    }

    fn scan_plain(&mut self) -> Result<Token> {
        let start = self.reader.mark();
        let mut end_mark = start.clone();
        let mut value = String::new();
        let mut spaces = String::new();
        let indent_limit = self.indent;

        loop {
            loop {
                let ch = self.reader.peek(0);
                if ch == '\0' || is_break(ch) || ch == ' ' {
                    break;
                }
                if ch == ':' {
                    let next = self.reader.peek(1);
                    let terminates = if self.flow_level > 0 {
                        next == '\0' || is_break(next) || is_blank(next) || is_flow_indicator(next)
                    } else {
                        next == '\0' || is_break(next) || is_blank(next)
                    };
                    if terminates {
                        break;
                    }
                }
                if self.flow_level > 0 && is_flow_indicator(ch) {
                    break;
                }
                value.push_str(&spaces);
                spaces.clear();
                value.push(ch);
                self.reader.forward(1);
                end_mark = self.reader.mark();
            }

            while self.reader.peek(0) == ' ' {
                spaces.push(' ');
                self.reader.forward(1);
            }
            if self.reader.peek(0) == '#' || !is_break(self.reader.peek(0)) {
                break;
            }

            let mut breaks = 0usize;
            while is_break(self.reader.peek(0)) {
                self.reader.forward(1);
                breaks += 1;
                while self.reader.peek(0) == ' ' {
                    self.reader.forward(1);
                }
            }
            let column = self.reader.mark().column as isize;
            if self.flow_level == 0 && column <= indent_limit.max(0) {
                break;
            }
            let prefix = self.reader.prefix(4);
            if column == 0
                && (prefix.starts_with("---") || prefix.starts_with("..."))
                && matches!(prefix.chars().nth(3), None | Some(' ') | Some('\t'))
            {
                break;
            }
            spaces = if breaks == 1 { " ".to_string() } else { "\n".repeat(breaks - 1) };
        }

        self.allow_simple_key = self.flow_level == 0;
        Ok(Token::new(
            TokenKind::Scalar { value, style: ScalarStyle::Plain, plain_implicit: true, quoted_implicit: false },
            start,
            end_mark,
        ))
    }
}

impl Iterator for Scanner {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_token() {
            Ok(Some(token)) => Some(Ok(token)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Reader;

    fn scan(src: &str) -> Vec<TokenKind> {
        let reader = Reader::new("<test>", src.as_bytes()).unwrap();
        Scanner::new(reader).map(|t| t.unwrap().kind).collect()
    }

    #[test]
    fn scans_simple_mapping() {
        let kinds = scan("a: 1\nb: 2\n");
        assert_eq!(
            kinds,
            vec![
                TokenKind::StreamStart,
                TokenKind::BlockMappingStart,
                TokenKind::Key,
                TokenKind::Scalar {
                    value: "a".into(),
                    style: ScalarStyle::Plain,
                    plain_implicit: true,
                    quoted_implicit: false
                },
                TokenKind::Value,
                TokenKind::Scalar {
                    value: "1".into(),
                    style: ScalarStyle::Plain,
                    plain_implicit: true,
                    quoted_implicit: false
                },
                TokenKind::Key,
                TokenKind::Scalar {
                    value: "b".into(),
                    style: ScalarStyle::Plain,
                    plain_implicit: true,
                    quoted_implicit: false
                },
                TokenKind::Value,
                TokenKind::Scalar {
                    value: "2".into(),
                    style: ScalarStyle::Plain,
                    plain_implicit: true,
                    quoted_implicit: false
                },
                TokenKind::BlockEnd,
                TokenKind::StreamEnd,
            ]
        );
    }

    #[test]
    fn scans_flow_sequence() {
        let kinds = scan("[Red, Green, Blue]\n");
        assert_eq!(
            kinds,
            vec![
                TokenKind::StreamStart,
                TokenKind::FlowSequenceStart,
                TokenKind::Scalar {
                    value: "Red".into(),
                    style: ScalarStyle::Plain,
                    plain_implicit: true,
                    quoted_implicit: false
                },
                TokenKind::FlowEntry,
                TokenKind::Scalar {
                    value: "Green".into(),
                    style: ScalarStyle::Plain,
                    plain_implicit: true,
                    quoted_implicit: false
                },
                TokenKind::FlowEntry,
                TokenKind::Scalar {
                    value: "Blue".into(),
                    style: ScalarStyle::Plain,
                    plain_implicit: true,
                    quoted_implicit: false
                },
                TokenKind::FlowSequenceEnd,
                TokenKind::StreamEnd,
            ]
        );
    }

    #[test]
    fn rejects_zero_block_indentation_indicator() {
        let reader = Reader::new("<test>", b"a: |0\n  x\n").unwrap();
        let err = Scanner::new(reader).collect::<Result<Vec<_>>>().unwrap_err();
        assert!(matches!(err, Error::Scanner(_)));
    }

    #[test]
    fn literal_block_scalar_preserves_newlines() {
        let reader = Reader::new("<test>", b"a: |\n  one\n  two\n").unwrap();
        let tokens: Vec<_> = Scanner::new(reader).map(|t| t.unwrap().kind).collect();
        let scalar = tokens
            .into_iter()
            .find_map(|k| match k {
                TokenKind::Scalar { value, style: ScalarStyle::Literal, .. } => Some(value),
                _ => None,
            })
            .unwrap();
        assert_eq!(scalar, "one\ntwo\n");
    }

    #[test]
    fn folded_block_scalar_folds_single_breaks() {
        let reader = Reader::new("<test>", b"a: >\n  one\n  two\n").unwrap();
        let tokens: Vec<_> = Scanner::new(reader).map(|t| t.unwrap().kind).collect();
        let scalar = tokens
            .into_iter()
            .find_map(|k| match k {
                TokenKind::Scalar { value, style: ScalarStyle::Folded, .. } => Some(value),
                _ => None,
            })
            .unwrap();
        assert_eq!(scalar, "one two\n");
    }

    #[test]
    fn double_quoted_scalar_unescapes() {
        let reader = Reader::new("<test>", b"\"a\\tb\\u00e9\"").unwrap();
        let mut scanner = Scanner::new(reader);
        scanner.next().unwrap().unwrap();
        let token = scanner.next().unwrap().unwrap();
        match token.kind {
            TokenKind::Scalar { value, .. } => assert_eq!(value, "a\tb\u{e9}"),
            other => panic!("unexpected token {other:?}"),
        }
    }

    #[test]
    fn retroactive_key_insertion_for_simple_key() {
        let kinds = scan("foo: bar\n");
        assert_eq!(kinds[1], TokenKind::BlockMappingStart);
        assert_eq!(kinds[2], TokenKind::Key);
    }
}
