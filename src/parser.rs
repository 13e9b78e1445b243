//! Token to event state machine.
//!
//! Unlike the scanner, the parser needs no lookahead beyond the next token:
//! every ambiguity (is this the start of a block sequence? does this value
//! belong to the enclosing flow mapping or an implicit one opened by a bare
//! `?`/key?) is resolved by which of a fixed set of states is active. The
//! state transitions below are a direct translation of the standard
//! YAML parsing algorithm into an explicit state enum plus a stack, rather
//! than the bound-method/closure trampoline a dynamically typed host
//! language would use for the same automaton.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::mark::Mark;
use crate::scanner::{ScalarStyle, Scanner, Token, TokenKind};

/// A parsed structural event: the parser's output, and the composer's input.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    StreamStart,
    StreamEnd,
    DocumentStart { explicit: bool, version: Option<(u32, u32)>, tags: Option<HashMap<String, String>> },
    DocumentEnd { explicit: bool },
    Alias { anchor: String },
    Scalar {
        anchor: Option<String>,
        tag: Option<String>,
        plain_implicit: bool,
        quoted_implicit: bool,
        value: String,
        style: ScalarStyle,
    },
    SequenceStart { anchor: Option<String>, tag: Option<String>, implicit: bool, flow_style: bool },
    SequenceEnd,
    MappingStart { anchor: Option<String>, tag: Option<String>, implicit: bool, flow_style: bool },
    MappingEnd,
}

#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub start: Mark,
    pub end: Mark,
}

impl Event {
    pub fn new(kind: EventKind, start: Mark, end: Mark) -> Self {
        Event { kind, start, end }
    }
}

fn process_empty_scalar(mark: Mark) -> Event {
    Event::new(
        EventKind::Scalar {
            anchor: None,
            tag: None,
            plain_implicit: true,
            quoted_implicit: false,
            value: String::new(),
            style: ScalarStyle::Plain,
        },
        mark.clone(),
        mark,
    )
}

fn default_tags() -> HashMap<String, String> {
    let mut tags = HashMap::new();
    tags.insert("!".to_string(), "!".to_string());
    tags.insert("!!".to_string(), "tag:yaml.org,2002:".to_string());
    tags
}

#[derive(Debug, Clone)]
enum State {
    StreamStart,
    ImplicitDocumentStart,
    DocumentStart,
    DocumentContent,
    DocumentEnd,
    BlockNode,
    BlockNodeOrIndentlessSequence,
    FlowNode,
    BlockSequenceFirstEntry,
    BlockSequenceEntry,
    IndentlessSequenceEntry,
    BlockMappingFirstKey,
    BlockMappingKey,
    BlockMappingValue,
    FlowSequenceFirstEntry,
    FlowSequenceEntry { first: bool },
    FlowSequenceEntryMappingKey,
    FlowSequenceEntryMappingValue,
    FlowSequenceEntryMappingEnd,
    FlowMappingFirstKey,
    FlowMappingKey { first: bool },
    FlowMappingValue,
    FlowMappingEmptyValue,
    Done,
}

/// Drives a [`Scanner`] through the YAML grammar, one event at a time.
pub struct Parser {
    scanner: Scanner,
    peeked: Option<Token>,
    state: State,
    states: Vec<State>,
    marks: Vec<Mark>,
    tag_handles: HashMap<String, String>,
    yaml_version: Option<(u32, u32)>,
}

impl Parser {
    pub fn new(scanner: Scanner) -> Self {
        Parser {
            scanner,
            peeked: None,
            state: State::StreamStart,
            states: Vec::new(),
            marks: Vec::new(),
            tag_handles: default_tags(),
            yaml_version: None,
        }
    }

    pub fn next_event(&mut self) -> Result<Option<Event>> {
        if matches!(self.state, State::Done) {
            return Ok(None);
        }
        Ok(Some(self.step()?))
    }

    fn peek_token(&mut self) -> Result<&Token> {
        if self.peeked.is_none() {
            let token = self
                .scanner
                .next_token()?
                .ok_or_else(|| Error::parser("unexpected end of token stream", Mark::unknown()))?;
            self.peeked = Some(token);
        }
        Ok(self.peeked.as_ref().unwrap())
    }

    fn get_token(&mut self) -> Result<Token> {
        self.peek_token()?;
        Ok(self.peeked.take().unwrap())
    }

    fn resolve_tag(&self, handle: &str, suffix: &str, mark: Mark) -> Result<String> {
        if handle.is_empty() {
            Ok(suffix.to_string())
        } else {
            self.tag_handles
                .get(handle)
                .map(|prefix| format!("{prefix}{suffix}"))
                .ok_or_else(|| Error::parser(format!("found undefined tag handle {handle:?}"), mark))
        }
    }

    fn process_directives(&mut self) -> Result<(Option<(u32, u32)>, Option<HashMap<String, String>>)> {
        self.yaml_version = None;
        let mut handles: HashMap<String, String> = HashMap::new();
        loop {
            if !matches!(self.peek_token()?.kind, TokenKind::Directive { .. }) {
                break;
            }
            let token = self.get_token()?;
            if let TokenKind::Directive { name, value } = token.kind {
                if name == "YAML" {
                    if self.yaml_version.is_some() {
                        return Err(Error::parser("found duplicate YAML directive", token.start));
                    }
                    let mut parts = value.splitn(2, '.');
                    let major: u32 = parts.next().unwrap_or("0").parse().unwrap_or(0);
                    let minor: u32 = parts.next().unwrap_or("0").parse().unwrap_or(0);
                    if major != 1 {
                        return Err(Error::parser(
                            "found incompatible YAML document (version 1.* is required)",
                            token.start,
                        ));
                    }
                    self.yaml_version = Some((major, minor));
                } else if name == "TAG" {
                    if let Some((handle, prefix)) = value.split_once(' ') {
                        if handles.contains_key(handle) {
                            return Err(Error::parser(
                                format!("duplicate tag handle {handle:?}"),
                                token.start,
                            ));
                        }
                        handles.insert(handle.to_string(), prefix.to_string());
                    }
                }
            }
        }
        let tags = if handles.is_empty() { None } else { Some(handles.clone()) };
        handles.entry("!".to_string()).or_insert_with(|| "!".to_string());
        handles.entry("!!".to_string()).or_insert_with(|| "tag:yaml.org,2002:".to_string());
        self.tag_handles = handles;
        Ok((self.yaml_version, tags))
    }

    fn step(&mut self) -> Result<Event> {
        match std::mem::replace(&mut self.state, State::Done) {
            State::StreamStart => self.parse_stream_start(),
            State::ImplicitDocumentStart => self.parse_implicit_document_start(),
            State::DocumentStart => self.parse_document_start(),
            State::DocumentContent => self.parse_document_content(),
            State::DocumentEnd => self.parse_document_end(),
            State::BlockNode => self.parse_node(true, false),
            State::BlockNodeOrIndentlessSequence => self.parse_node(true, true),
            State::FlowNode => self.parse_node(false, false),
            State::BlockSequenceFirstEntry => self.parse_block_sequence_first_entry(),
            State::BlockSequenceEntry => self.parse_block_sequence_entry(),
            State::IndentlessSequenceEntry => self.parse_indentless_sequence_entry(),
            State::BlockMappingFirstKey => self.parse_block_mapping_first_key(),
            State::BlockMappingKey => self.parse_block_mapping_key(),
            State::BlockMappingValue => self.parse_block_mapping_value(),
            State::FlowSequenceFirstEntry => self.parse_flow_sequence_first_entry(),
            State::FlowSequenceEntry { first } => self.parse_flow_sequence_entry(first),
            State::FlowSequenceEntryMappingKey => self.parse_flow_sequence_entry_mapping_key(),
            State::FlowSequenceEntryMappingValue => self.parse_flow_sequence_entry_mapping_value(),
            State::FlowSequenceEntryMappingEnd => self.parse_flow_sequence_entry_mapping_end(),
            State::FlowMappingFirstKey => self.parse_flow_mapping_first_key(),
            State::FlowMappingKey { first } => self.parse_flow_mapping_key(first),
            State::FlowMappingValue => self.parse_flow_mapping_value(),
            State::FlowMappingEmptyValue => self.parse_flow_mapping_empty_value(),
            State::Done => unreachable!("next_event guards against stepping past Done"),
        }
    }

    fn parse_stream_start(&mut self) -> Result<Event> {
        let token = self.get_token()?;
        self.state = State::ImplicitDocumentStart;
        Ok(Event::new(EventKind::StreamStart, token.start.clone(), token.end))
    }

    fn parse_implicit_document_start(&mut self) -> Result<Event> {
        let is_explicit_start = matches!(
            self.peek_token()?.kind,
            TokenKind::Directive { .. } | TokenKind::DocumentStart | TokenKind::StreamEnd
        );
        if is_explicit_start {
            return self.parse_document_start();
        }
        self.tag_handles = default_tags();
        let mark = self.peek_token()?.start.clone();
        self.states.push(State::DocumentEnd);
        self.state = State::BlockNode;
        Ok(Event::new(
            EventKind::DocumentStart { explicit: false, version: None, tags: None },
            mark.clone(),
            mark,
        ))
    }

    fn parse_document_start(&mut self) -> Result<Event> {
        while matches!(self.peek_token()?.kind, TokenKind::DocumentEnd) {
            self.get_token()?;
        }
        if matches!(self.peek_token()?.kind, TokenKind::StreamEnd) {
            let token = self.get_token()?;
            self.state = State::Done;
            return Ok(Event::new(EventKind::StreamEnd, token.start.clone(), token.end));
        }
        let start = self.peek_token()?.start.clone();
        let (version, tags) = self.process_directives()?;
        if !matches!(self.peek_token()?.kind, TokenKind::DocumentStart) {
            let token = self.peek_token()?.clone();
            return Err(Error::parser_ctx(
                format!("expected '<document start>', but found {:?}", token.kind),
                token.start,
                "while parsing a document",
                start,
            ));
        }
        let token = self.get_token()?;
        self.states.push(State::DocumentEnd);
        self.state = State::DocumentContent;
        Ok(Event::new(EventKind::DocumentStart { explicit: true, version, tags }, start, token.end))
    }

    fn parse_document_end(&mut self) -> Result<Event> {
        let start = self.peek_token()?.start.clone();
        let mut end = start.clone();
        let mut explicit = false;
        if matches!(self.peek_token()?.kind, TokenKind::DocumentEnd) {
            let token = self.get_token()?;
            end = token.end;
            explicit = true;
        }
        self.state = State::DocumentStart;
        Ok(Event::new(EventKind::DocumentEnd { explicit }, start, end))
    }

    fn parse_document_content(&mut self) -> Result<Event> {
        let is_empty = matches!(
            self.peek_token()?.kind,
            TokenKind::Directive { .. }
                | TokenKind::DocumentStart
                | TokenKind::DocumentEnd
                | TokenKind::StreamEnd
        );
        if is_empty {
            let mark = self.peek_token()?.start.clone();
            self.state = self.states.pop().unwrap();
            return Ok(process_empty_scalar(mark));
        }
        self.parse_node(true, false)
    }

    fn parse_node(&mut self, block: bool, indentless_sequence: bool) -> Result<Event> {
        if matches!(self.peek_token()?.kind, TokenKind::Alias(_)) {
            let token = self.get_token()?;
            self.state = self.states.pop().unwrap();
            let name = match token.kind {
                TokenKind::Alias(name) => name,
                _ => unreachable!(),
            };
            return Ok(Event::new(EventKind::Alias { anchor: name }, token.start, token.end));
        }

        let mut anchor = None;
        let mut tag_raw: Option<(String, String)> = None;
        let mut start: Option<Mark> = None;
        let mut end: Option<Mark> = None;

        if matches!(self.peek_token()?.kind, TokenKind::Anchor(_)) {
            let token = self.get_token()?;
            start = Some(token.start.clone());
            end = Some(token.end.clone());
            anchor = match token.kind {
                TokenKind::Anchor(name) => Some(name),
                _ => None,
            };
            if matches!(self.peek_token()?.kind, TokenKind::Tag(..)) {
                let token = self.get_token()?;
                end = Some(token.end.clone());
                tag_raw = match token.kind {
                    TokenKind::Tag(handle, suffix) => Some((handle, suffix)),
                    _ => None,
                };
            }
        } else if matches!(self.peek_token()?.kind, TokenKind::Tag(..)) {
            let token = self.get_token()?;
            start = Some(token.start.clone());
            end = Some(token.end.clone());
            tag_raw = match token.kind {
                TokenKind::Tag(handle, suffix) => Some((handle, suffix)),
                _ => None,
            };
            if matches!(self.peek_token()?.kind, TokenKind::Anchor(_)) {
                let token = self.get_token()?;
                end = Some(token.end.clone());
                anchor = match token.kind {
                    TokenKind::Anchor(name) => Some(name),
                    _ => None,
                };
            }
        }

        let tag = match tag_raw {
            Some((handle, suffix)) => {
                let mark = start.clone().unwrap_or_else(Mark::unknown);
                Some(self.resolve_tag(&handle, &suffix, mark)?)
            }
            None => None,
        };

        let start = match start {
            Some(mark) => mark,
            None => self.peek_token()?.start.clone(),
        };
        let mut end = end.unwrap_or_else(|| start.clone());
        let implicit = tag.is_none() || tag.as_deref() == Some("!");

        if indentless_sequence && matches!(self.peek_token()?.kind, TokenKind::BlockEntry) {
            end = self.peek_token()?.end.clone();
            self.state = State::IndentlessSequenceEntry;
            return Ok(Event::new(
                EventKind::SequenceStart { anchor, tag, implicit, flow_style: false },
                start,
                end,
            ));
        }

        let kind_tag = match &self.peek_token()?.kind {
            TokenKind::Scalar { .. } => 0u8,
            TokenKind::FlowSequenceStart => 1,
            TokenKind::FlowMappingStart => 2,
            TokenKind::BlockSequenceStart if block => 3,
            TokenKind::BlockMappingStart if block => 4,
            _ => 5,
        };

        match kind_tag {
            0 => {
                let token = self.get_token()?;
                end = token.end.clone();
                let (value, style, plain_implicit, quoted_implicit) = match token.kind {
                    TokenKind::Scalar { value, style, plain_implicit, quoted_implicit } => {
                        (value, style, plain_implicit, quoted_implicit)
                    }
                    _ => unreachable!(),
                };
                let (plain_implicit, quoted_implicit) = if tag.is_none() {
                    (plain_implicit, quoted_implicit)
                } else if tag.as_deref() == Some("!") {
                    (true, false)
                } else {
                    (false, false)
                };
                self.state = self.states.pop().unwrap();
                Ok(Event::new(
                    EventKind::Scalar { anchor, tag, plain_implicit, quoted_implicit, value, style },
                    start,
                    end,
                ))
            }
            1 => {
                end = self.peek_token()?.end.clone();
                self.state = State::FlowSequenceFirstEntry;
                Ok(Event::new(EventKind::SequenceStart { anchor, tag, implicit, flow_style: true }, start, end))
            }
            2 => {
                end = self.peek_token()?.end.clone();
                self.state = State::FlowMappingFirstKey;
                Ok(Event::new(EventKind::MappingStart { anchor, tag, implicit, flow_style: true }, start, end))
            }
            3 => {
                end = self.peek_token()?.start.clone();
                self.state = State::BlockSequenceFirstEntry;
                Ok(Event::new(EventKind::SequenceStart { anchor, tag, implicit, flow_style: false }, start, end))
            }
            4 => {
                end = self.peek_token()?.start.clone();
                self.state = State::BlockMappingFirstKey;
                Ok(Event::new(EventKind::MappingStart { anchor, tag, implicit, flow_style: false }, start, end))
            }
            _ if anchor.is_some() || tag.is_some() => {
                self.state = self.states.pop().unwrap();
                Ok(Event::new(
                    EventKind::Scalar {
                        anchor,
                        tag,
                        plain_implicit: implicit,
                        quoted_implicit: false,
                        value: String::new(),
                        style: ScalarStyle::Plain,
                    },
                    start,
                    end,
                ))
            }
            _ => {
                let token = self.peek_token()?.clone();
                Err(Error::parser_ctx(
                    format!("expected the node content, but found {:?}", token.kind),
                    token.start,
                    "while parsing a node",
                    start,
                ))
            }
        }
    }

    fn parse_block_sequence_first_entry(&mut self) -> Result<Event> {
        let token = self.get_token()?;
        self.marks.push(token.start.clone());
        self.parse_block_sequence_entry()
    }

    fn parse_block_sequence_entry(&mut self) -> Result<Event> {
        if matches!(self.peek_token()?.kind, TokenKind::BlockEntry) {
            let token = self.get_token()?;
            let terminates = matches!(self.peek_token()?.kind, TokenKind::BlockEntry | TokenKind::BlockEnd);
            if !terminates {
                self.states.push(State::BlockSequenceEntry);
                return self.parse_node(true, false);
            }
            self.state = State::BlockSequenceEntry;
            return Ok(process_empty_scalar(token.end));
        }
        if !matches!(self.peek_token()?.kind, TokenKind::BlockEnd) {
            let token = self.peek_token()?.clone();
            let mark = self.marks.last().cloned().unwrap_or_else(Mark::unknown);
            return Err(Error::parser_ctx(
                format!("expected <block end>, but found {:?}", token.kind),
                token.start,
                "while parsing a block collection",
                mark,
            ));
        }
        let token = self.get_token()?;
        self.marks.pop();
        self.state = self.states.pop().unwrap();
        Ok(Event::new(EventKind::SequenceEnd, token.start, token.end))
    }

    fn parse_indentless_sequence_entry(&mut self) -> Result<Event> {
        if matches!(self.peek_token()?.kind, TokenKind::BlockEntry) {
            let token = self.get_token()?;
            let terminates = matches!(
                self.peek_token()?.kind,
                TokenKind::BlockEntry | TokenKind::Key | TokenKind::Value | TokenKind::BlockEnd
            );
            if !terminates {
                self.states.push(State::IndentlessSequenceEntry);
                return self.parse_node(true, false);
            }
            self.state = State::IndentlessSequenceEntry;
            return Ok(process_empty_scalar(token.end));
        }
        let mark = self.peek_token()?.start.clone();
        self.state = self.states.pop().unwrap();
        Ok(Event::new(EventKind::SequenceEnd, mark.clone(), mark))
    }

    fn parse_block_mapping_first_key(&mut self) -> Result<Event> {
        let token = self.get_token()?;
        self.marks.push(token.start.clone());
        self.parse_block_mapping_key()
    }

    fn parse_block_mapping_key(&mut self) -> Result<Event> {
        if matches!(self.peek_token()?.kind, TokenKind::Key) {
            let token = self.get_token()?;
            let terminates =
                matches!(self.peek_token()?.kind, TokenKind::Key | TokenKind::Value | TokenKind::BlockEnd);
            if !terminates {
                self.states.push(State::BlockMappingValue);
                return self.parse_node(true, true);
            }
            self.state = State::BlockMappingValue;
            return Ok(process_empty_scalar(token.end));
        }
        if !matches!(self.peek_token()?.kind, TokenKind::BlockEnd) {
            let token = self.peek_token()?.clone();
            let mark = self.marks.last().cloned().unwrap_or_else(Mark::unknown);
            return Err(Error::parser_ctx(
                format!("expected <block end>, but found {:?}", token.kind),
                token.start,
                "while parsing a block mapping",
                mark,
            ));
        }
        let token = self.get_token()?;
        self.marks.pop();
        self.state = self.states.pop().unwrap();
        Ok(Event::new(EventKind::MappingEnd, token.start, token.end))
    }

    fn parse_block_mapping_value(&mut self) -> Result<Event> {
        if matches!(self.peek_token()?.kind, TokenKind::Value) {
            let token = self.get_token()?;
            let terminates =
                matches!(self.peek_token()?.kind, TokenKind::Key | TokenKind::Value | TokenKind::BlockEnd);
            if !terminates {
                self.states.push(State::BlockMappingKey);
                return self.parse_node(true, true);
            }
            self.state = State::BlockMappingKey;
            return Ok(process_empty_scalar(token.end));
        }
        self.state = State::BlockMappingKey;
        let mark = self.peek_token()?.start.clone();
        Ok(process_empty_scalar(mark))
    }

    fn parse_flow_sequence_first_entry(&mut self) -> Result<Event> {
        let token = self.get_token()?;
        self.marks.push(token.start.clone());
        self.parse_flow_sequence_entry(true)
    }

    fn parse_flow_sequence_entry(&mut self, first: bool) -> Result<Event> {
        if !matches!(self.peek_token()?.kind, TokenKind::FlowSequenceEnd) {
            if !first {
                if matches!(self.peek_token()?.kind, TokenKind::FlowEntry) {
                    self.get_token()?;
                } else {
                    let token = self.peek_token()?.clone();
                    let mark = self.marks.last().cloned().unwrap_or_else(Mark::unknown);
                    return Err(Error::parser_ctx(
                        format!("expected ',' or ']', but found {:?}", token.kind),
                        token.start,
                        "while parsing a flow sequence",
                        mark,
                    ));
                }
            }
            if matches!(self.peek_token()?.kind, TokenKind::Key) {
                let token = self.peek_token()?.clone();
                self.state = State::FlowSequenceEntryMappingKey;
                return Ok(Event::new(
                    EventKind::MappingStart { anchor: None, tag: None, implicit: true, flow_style: true },
                    token.start.clone(),
                    token.end,
                ));
            }
            if !matches!(self.peek_token()?.kind, TokenKind::FlowSequenceEnd) {
                self.states.push(State::FlowSequenceEntry { first: false });
                return self.parse_node(false, false);
            }
        }
        let token = self.get_token()?;
        self.marks.pop();
        self.state = self.states.pop().unwrap();
        Ok(Event::new(EventKind::SequenceEnd, token.start, token.end))
    }

    fn parse_flow_sequence_entry_mapping_key(&mut self) -> Result<Event> {
        let token = self.get_token()?;
        let terminates = matches!(
            self.peek_token()?.kind,
            TokenKind::Value | TokenKind::FlowEntry | TokenKind::FlowSequenceEnd
        );
        if !terminates {
            self.states.push(State::FlowSequenceEntryMappingValue);
            self.parse_node(false, false)
        } else {
            self.state = State::FlowSequenceEntryMappingValue;
            Ok(process_empty_scalar(token.end))
        }
    }

    fn parse_flow_sequence_entry_mapping_value(&mut self) -> Result<Event> {
        if matches!(self.peek_token()?.kind, TokenKind::Value) {
            let token = self.get_token()?;
            let terminates =
                matches!(self.peek_token()?.kind, TokenKind::FlowEntry | TokenKind::FlowSequenceEnd);
            if !terminates {
                self.states.push(State::FlowSequenceEntryMappingEnd);
                self.parse_node(false, false)
            } else {
                self.state = State::FlowSequenceEntryMappingEnd;
                Ok(process_empty_scalar(token.end))
            }
        } else {
            self.state = State::FlowSequenceEntryMappingEnd;
            let mark = self.peek_token()?.start.clone();
            Ok(process_empty_scalar(mark))
        }
    }

    fn parse_flow_sequence_entry_mapping_end(&mut self) -> Result<Event> {
        self.state = State::FlowSequenceEntry { first: false };
        let mark = self.peek_token()?.start.clone();
        Ok(Event::new(EventKind::MappingEnd, mark.clone(), mark))
    }

    fn parse_flow_mapping_first_key(&mut self) -> Result<Event> {
        let token = self.get_token()?;
        self.marks.push(token.start.clone());
        self.parse_flow_mapping_key(true)
    }

    fn parse_flow_mapping_key(&mut self, first: bool) -> Result<Event> {
        if !matches!(self.peek_token()?.kind, TokenKind::FlowMappingEnd) {
            if !first {
                if matches!(self.peek_token()?.kind, TokenKind::FlowEntry) {
                    self.get_token()?;
                } else {
                    let token = self.peek_token()?.clone();
                    let mark = self.marks.last().cloned().unwrap_or_else(Mark::unknown);
                    return Err(Error::parser_ctx(
                        format!("expected ',' or '}}', but found {:?}", token.kind),
                        token.start,
                        "while parsing a flow mapping",
                        mark,
                    ));
                }
            }
            if matches!(self.peek_token()?.kind, TokenKind::Key) {
                let token = self.get_token()?;
                let terminates = matches!(
                    self.peek_token()?.kind,
                    TokenKind::Value | TokenKind::FlowEntry | TokenKind::FlowMappingEnd
                );
                if !terminates {
                    self.states.push(State::FlowMappingValue);
                    return self.parse_node(false, false);
                }
                self.state = State::FlowMappingValue;
                return Ok(process_empty_scalar(token.end));
            }
            if !matches!(self.peek_token()?.kind, TokenKind::FlowMappingEnd) {
                self.states.push(State::FlowMappingEmptyValue);
                return self.parse_node(false, false);
            }
        }
        let token = self.get_token()?;
        self.marks.pop();
        self.state = self.states.pop().unwrap();
        Ok(Event::new(EventKind::MappingEnd, token.start, token.end))
    }

    fn parse_flow_mapping_value(&mut self) -> Result<Event> {
        if matches!(self.peek_token()?.kind, TokenKind::Value) {
            let token = self.get_token()?;
            let terminates =
                matches!(self.peek_token()?.kind, TokenKind::FlowEntry | TokenKind::FlowMappingEnd);
            if !terminates {
                self.states.push(State::FlowMappingKey { first: false });
                self.parse_node(false, false)
            } else {
                self.state = State::FlowMappingKey { first: false };
                Ok(process_empty_scalar(token.end))
            }
        } else {
            self.state = State::FlowMappingKey { first: false };
            let mark = self.peek_token()?.start.clone();
            Ok(process_empty_scalar(mark))
        }
    }

    fn parse_flow_mapping_empty_value(&mut self) -> Result<Event> {
        self.state = State::FlowMappingKey { first: false };
        let mark = self.peek_token()?.start.clone();
        Ok(process_empty_scalar(mark))
    }
}

impl Iterator for Parser {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_event() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => None,
            Err(e) => {
                self.state = State::Done;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Reader;

    fn events(src: &str) -> Vec<EventKind> {
        let reader = Reader::new("<test>", src.as_bytes()).unwrap();
        let scanner = Scanner::new(reader);
        Parser::new(scanner).map(|e| e.unwrap().kind).collect()
    }

    #[test]
    fn parses_scalar_document() {
        let kinds = events("hello\n");
        assert_eq!(
            kinds,
            vec![
                EventKind::StreamStart,
                EventKind::DocumentStart { explicit: false, version: None, tags: None },
                EventKind::Scalar {
                    anchor: None,
                    tag: None,
                    plain_implicit: true,
                    quoted_implicit: false,
                    value: "hello".into(),
                    style: ScalarStyle::Plain,
                },
                EventKind::DocumentEnd { explicit: false },
                EventKind::StreamEnd,
            ]
        );
    }

    #[test]
    fn parses_block_mapping() {
        let kinds = events("a: 1\nb: 2\n");
        assert!(matches!(kinds[1], EventKind::DocumentStart { .. }));
        assert!(matches!(kinds[2], EventKind::MappingStart { flow_style: false, .. }));
        assert!(matches!(kinds.last().unwrap(), EventKind::StreamEnd));
        assert_eq!(kinds.iter().filter(|k| matches!(k, EventKind::MappingEnd)).count(), 1);
    }

    #[test]
    fn parses_flow_sequence_of_mappings() {
        let kinds = events("[{a: 1}, {b: 2}]\n");
        let mapping_starts = kinds.iter().filter(|k| matches!(k, EventKind::MappingStart { .. })).count();
        assert_eq!(mapping_starts, 2);
    }

    #[test]
    fn resolves_alias_against_anchor() {
        let kinds = events("- &x foo\n- *x\n");
        assert!(kinds.iter().any(|k| matches!(k, EventKind::Scalar { anchor: Some(a), .. } if a == "x")));
        assert!(kinds.iter().any(|k| matches!(k, EventKind::Alias { anchor } if anchor == "x")));
    }

    #[test]
    fn parses_explicit_document_markers_and_tag_directive() {
        let kinds = events("%TAG !e! tag:example.com,2000:app/\n---\n!e!foo bar\n...\n");
        assert!(kinds.iter().any(|k| matches!(
            k,
            EventKind::Scalar { tag: Some(t), .. } if t == "tag:example.com,2000:app/foo"
        )));
        assert!(matches!(kinds[1], EventKind::DocumentStart { explicit: true, .. }));
        assert!(kinds.iter().any(|k| matches!(k, EventKind::DocumentEnd { explicit: true })));
    }

    #[test]
    fn rejects_undefined_tag_handle() {
        let reader = Reader::new("<test>", b"!e!foo bar\n").unwrap();
        let scanner = Scanner::new(reader);
        let err = Parser::new(scanner).collect::<Result<Vec<_>>>().unwrap_err();
        assert!(matches!(err, Error::Parser(_)));
    }
}
