//! Events → node tree, with anchor/alias resolution.
//!
//! Composition produces the same [`Node`] tree the rest of the crate works
//! with, but every scalar still holds its raw source text here — tag
//! resolution happens in this stage (deciding *which* tag a node gets),
//! while decoding that text into `Int`/`Float`/`Bool`/... values is the
//! constructor's job. A node emerging from here is tagged but not yet typed.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::mark::Mark;
use crate::node::{Mapping, Node, NodeValue};
use crate::parser::{Event, EventKind, Parser};
use crate::resolver::{Resolver, TAG_MAP, TAG_SEQ, TAG_STR};
use crate::scanner::ScalarStyle;

fn style_char(style: ScalarStyle) -> Option<char> {
    match style {
        ScalarStyle::Plain => None,
        ScalarStyle::SingleQuoted => Some('\''),
        ScalarStyle::DoubleQuoted => Some('"'),
        ScalarStyle::Literal => Some('|'),
        ScalarStyle::Folded => Some('>'),
    }
}

/// Consumes a [`Parser`]'s events one document at a time, resolving
/// anchors/aliases and implicit tags along the way.
pub struct Composer {
    parser: Parser,
    resolver: Resolver,
    peeked: Option<Event>,
    anchors: HashMap<String, Node>,
    /// Anchors whose node has started composing but not finished — used to
    /// reject an alias that refers to its own still-open anchor.
    in_progress: HashSet<String>,
}

impl Composer {
    pub fn new(parser: Parser) -> Result<Self> {
        let mut composer = Composer {
            parser,
            resolver: Resolver::new(),
            peeked: None,
            anchors: HashMap::new(),
            in_progress: HashSet::new(),
        };
        let start = composer.get_event()?;
        match start.kind {
            EventKind::StreamStart => Ok(composer),
            other => Err(Error::composer(format!("expected a stream start event, found {other:?}"), start.start)),
        }
    }

    pub fn with_resolver(parser: Parser, resolver: Resolver) -> Result<Self> {
        let mut composer = Composer::new(parser)?;
        composer.resolver = resolver;
        Ok(composer)
    }

    /// Compose the next document, or `None` once the stream ends.
    pub fn next_document(&mut self) -> Result<Option<Node>> {
        if matches!(self.peek_event()?.kind, EventKind::StreamEnd) {
            self.get_event()?;
            return Ok(None);
        }

        let start = self.get_event()?;
        if !matches!(start.kind, EventKind::DocumentStart { .. }) {
            return Err(Error::composer(
                format!("expected a document start event, found {:?}", start.kind),
                start.start,
            ));
        }

        let node = self.compose_node()?;

        let end = self.get_event()?;
        if !matches!(end.kind, EventKind::DocumentEnd { .. }) {
            return Err(Error::composer(format!("expected a document end event, found {:?}", end.kind), end.start));
        }

        self.anchors.clear();
        self.in_progress.clear();
        Ok(Some(node))
    }

    fn peek_event(&mut self) -> Result<&Event> {
        if self.peeked.is_none() {
            let event = self
                .parser
                .next_event()?
                .ok_or_else(|| Error::composer("unexpected end of event stream", Mark::unknown()))?;
            self.peeked = Some(event);
        }
        Ok(self.peeked.as_ref().unwrap())
    }

    fn get_event(&mut self) -> Result<Event> {
        match self.peeked.take() {
            Some(event) => Ok(event),
            None => self
                .parser
                .next_event()?
                .ok_or_else(|| Error::composer("unexpected end of event stream", Mark::unknown())),
        }
    }

    fn resolve_alias(&self, anchor: &str, mark: &Mark) -> Result<Node> {
        if let Some(node) = self.anchors.get(anchor) {
            Ok(node.clone())
        } else if self.in_progress.contains(anchor) {
            Err(Error::composer(format!("found recursive alias to anchor {anchor:?}"), mark.clone()))
        } else {
            Err(Error::composer(format!("found undefined alias {anchor:?}"), mark.clone()))
        }
    }

    fn compose_node(&mut self) -> Result<Node> {
        let event = self.get_event()?;
        match event.kind {
            EventKind::Alias { anchor } => self.resolve_alias(&anchor, &event.start),

            EventKind::Scalar { anchor, tag, plain_implicit, value, style, .. } => {
                let resolved_tag = self.resolve_scalar_tag(tag.as_deref(), plain_implicit, &value);
                let mut node = Node::with_mark(NodeValue::Str(value), resolved_tag, event.start).with_style(style_char(style));
                if let Some(name) = anchor {
                    node = node.with_anchor(name.clone());
                    self.anchors.insert(name, node.clone());
                }
                Ok(node)
            }

            EventKind::SequenceStart { anchor, tag, implicit, flow_style } => {
                if let Some(name) = &anchor {
                    self.in_progress.insert(name.clone());
                }
                let resolved_tag = resolve_collection_tag(tag.as_deref(), implicit, TAG_SEQ);
                let mut items = Vec::new();
                loop {
                    if matches!(self.peek_event()?.kind, EventKind::SequenceEnd) {
                        self.get_event()?;
                        break;
                    }
                    items.push(self.compose_node()?);
                }
                let mut node =
                    Node::with_mark(NodeValue::Sequence(items), resolved_tag, event.start).with_flow_style(Some(flow_style));
                if let Some(name) = anchor {
                    node = node.with_anchor(name.clone());
                    self.in_progress.remove(&name);
                    self.anchors.insert(name, node.clone());
                }
                Ok(node)
            }

            EventKind::MappingStart { anchor, tag, implicit, flow_style } => {
                if let Some(name) = &anchor {
                    self.in_progress.insert(name.clone());
                }
                let resolved_tag = resolve_collection_tag(tag.as_deref(), implicit, TAG_MAP);
                let mut mapping = Mapping::new();
                loop {
                    if matches!(self.peek_event()?.kind, EventKind::MappingEnd) {
                        self.get_event()?;
                        break;
                    }
                    let key = self.compose_node()?;
                    let value = self.compose_node()?;
                    mapping.insert(key, value);
                }
                let mut node =
                    Node::with_mark(NodeValue::Mapping(mapping), resolved_tag, event.start).with_flow_style(Some(flow_style));
                if let Some(name) = anchor {
                    node = node.with_anchor(name.clone());
                    self.in_progress.remove(&name);
                    self.anchors.insert(name, node.clone());
                }
                Ok(node)
            }

            other => Err(Error::composer(format!("expected a node, found {other:?}"), event.start)),
        }
    }

    /// Decide a scalar's tag: an explicit (non-`!`) tag wins outright;
    /// `plain_implicit` means no tag was given at all, so the resolver gets
    /// to guess from the text; otherwise (a quoted scalar with no tag) it's
    /// `!!str` by definition.
    fn resolve_scalar_tag(&self, tag: Option<&str>, plain_implicit: bool, value: &str) -> String {
        if let Some(t) = tag {
            if t != "!" {
                return t.to_string();
            }
        }
        if plain_implicit {
            self.resolver.resolve_scalar(value).to_string()
        } else {
            TAG_STR.to_string()
        }
    }
}

/// A collection's tag: an explicit (non-`!`) tag wins, otherwise it's the
/// kind's default (`!!seq`/`!!map`) — the resolver never disambiguates
/// collections, only scalars.
fn resolve_collection_tag(tag: Option<&str>, _implicit: bool, default: &str) -> String {
    match tag {
        Some(t) if t != "!" => t.to_string(),
        _ => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Reader;
    use crate::scanner::Scanner;

    fn compose_all(src: &str) -> Vec<Node> {
        let reader = Reader::new("<test>", src.as_bytes()).unwrap();
        let scanner = Scanner::new(reader);
        let parser = Parser::new(scanner);
        let mut composer = Composer::new(parser).unwrap();
        let mut docs = Vec::new();
        while let Some(node) = composer.next_document().unwrap() {
            docs.push(node);
        }
        docs
    }

    #[test]
    fn composes_scalar_document() {
        let docs = compose_all("42\n");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].tag(), "tag:yaml.org,2002:int");
        assert_eq!(docs[0].as_str(), Some("42"));
    }

    #[test]
    fn composes_mapping_with_anchor_and_alias() {
        let docs = compose_all("a: &x 1\nb: *x\n");
        let mapping = docs[0].as_mapping().unwrap();
        let a_key = Node::new(NodeValue::Str("a".into()), TAG_STR);
        let b_key = Node::new(NodeValue::Str("b".into()), TAG_STR);
        let a_val = mapping.get(&a_key).unwrap();
        let b_val = mapping.get(&b_key).unwrap();
        assert!(a_val.is_same_as(b_val));
    }

    #[test]
    fn undefined_alias_is_an_error() {
        let reader = Reader::new("<test>", b"a: *missing\n").unwrap();
        let scanner = Scanner::new(reader);
        let parser = Parser::new(scanner);
        let mut composer = Composer::new(parser).unwrap();
        assert!(composer.next_document().is_err());
    }

    #[test]
    fn resolves_sequence_and_mapping_default_tags() {
        let docs = compose_all("- 1\n- 2\n");
        assert_eq!(docs[0].tag(), TAG_SEQ);

        let docs = compose_all("a: 1\n");
        assert_eq!(docs[0].tag(), TAG_MAP);
    }

    #[test]
    fn captures_flow_vs_block_collection_style() {
        let docs = compose_all("[1, 2]\n");
        assert_eq!(docs[0].flow_style(), Some(true));

        let docs = compose_all("- 1\n- 2\n");
        assert_eq!(docs[0].flow_style(), Some(false));
    }
}
