//! Typed [`Node`] tree → events, the dump-side counterpart of the
//! composer.
//!
//! Two passes over the tree: the first counts how many times each node
//! identity is visited (an `Rc` observed twice needs an anchor on the way
//! out); the second walks again producing events, emitting `&anchorN` on
//! the first occurrence of a shared node and `*anchorN` on every one after.

use std::collections::HashMap;

use crate::mark::Mark;
use crate::node::{Node, NodeValue};
use crate::parser::{Event, EventKind};
use crate::resolver::Resolver;
use crate::scanner::ScalarStyle;

fn style_from_char(style: Option<char>) -> ScalarStyle {
    match style {
        Some('\'') => ScalarStyle::SingleQuoted,
        Some('"') => ScalarStyle::DoubleQuoted,
        Some('|') => ScalarStyle::Literal,
        Some('>') => ScalarStyle::Folded,
        _ => ScalarStyle::Plain,
    }
}

/// Walks a node tree and produces the event sequence a
/// [`crate::serializer::Serializer`] wraps into a document.
pub struct Representer {
    resolver: Resolver,
    default_flow_style: bool,
    visit_counts: HashMap<usize, usize>,
    anchor_names: HashMap<usize, String>,
    next_anchor: usize,
}

impl Representer {
    pub fn new() -> Self {
        Representer {
            resolver: Resolver::new(),
            default_flow_style: false,
            visit_counts: HashMap::new(),
            anchor_names: HashMap::new(),
            next_anchor: 1,
        }
    }

    pub fn with_resolver(resolver: Resolver) -> Self {
        Representer { resolver, ..Representer::new() }
    }

    pub fn default_flow_style(mut self, flow: bool) -> Self {
        self.default_flow_style = flow;
        self
    }

    /// Represent a root node as the events between (but not including)
    /// document-start and document-end.
    pub fn represent(&mut self, root: &Node) -> Vec<Event> {
        self.visit_counts.clear();
        self.anchor_names.clear();
        self.next_anchor = 1;
        self.count_visits(root);

        let mut events = Vec::new();
        self.represent_node(root, &mut events);
        events
    }

    fn count_visits(&mut self, node: &Node) {
        let id = node.identity();
        let count = self.visit_counts.entry(id).or_insert(0);
        *count += 1;
        if *count > 1 {
            return;
        }
        match node.value() {
            NodeValue::Sequence(items) => {
                for item in items {
                    self.count_visits(item);
                }
            }
            NodeValue::Mapping(pairs) => {
                for (key, value) in pairs.iter() {
                    self.count_visits(key);
                    self.count_visits(value);
                }
            }
            _ => {}
        }
    }

    fn anchor_for(&mut self, node: &Node) -> Option<String> {
        let id = node.identity();
        if self.visit_counts.get(&id).copied().unwrap_or(0) <= 1 {
            return None;
        }
        if let Some(name) = self.anchor_names.get(&id) {
            return Some(name.clone());
        }
        let name = format!("id{:03}", self.next_anchor);
        self.next_anchor += 1;
        self.anchor_names.insert(id, name.clone());
        Some(name)
    }

    fn represent_node(&mut self, node: &Node, events: &mut Vec<Event>) {
        let mark = node.mark().cloned().unwrap_or_else(Mark::unknown);
        let id = node.identity();
        let repeated = self.visit_counts.get(&id).copied().unwrap_or(0) > 1;

        if repeated && self.anchor_names.contains_key(&id) {
            let anchor = self.anchor_names.get(&id).unwrap().clone();
            events.push(Event::new(EventKind::Alias { anchor }, mark.clone(), mark));
            return;
        }

        let anchor = self.anchor_for(node);

        match node.value() {
            NodeValue::Sequence(items) => {
                let implicit = node.tag() == "tag:yaml.org,2002:seq";
                events.push(Event::new(
                    EventKind::SequenceStart {
                        anchor,
                        tag: Some(node.tag().to_string()),
                        implicit,
                        flow_style: node.flow_style().unwrap_or(self.default_flow_style),
                    },
                    mark.clone(),
                    mark.clone(),
                ));
                for item in items {
                    self.represent_node(item, events);
                }
                events.push(Event::new(EventKind::SequenceEnd, mark.clone(), mark));
            }
            NodeValue::Mapping(pairs) => {
                let implicit = node.tag() == "tag:yaml.org,2002:map";
                events.push(Event::new(
                    EventKind::MappingStart {
                        anchor,
                        tag: Some(node.tag().to_string()),
                        implicit,
                        flow_style: node.flow_style().unwrap_or(self.default_flow_style),
                    },
                    mark.clone(),
                    mark.clone(),
                ));
                for (key, value) in pairs.iter() {
                    self.represent_node(key, events);
                    self.represent_node(value, events);
                }
                events.push(Event::new(EventKind::MappingEnd, mark.clone(), mark));
            }
            _ => {
                let text = scalar_text(node);
                let plain_implicit = self.resolver.resolve_scalar(&text) == node.tag();
                let quoted_implicit = node.tag() == "tag:yaml.org,2002:str";
                events.push(Event::new(
                    EventKind::Scalar {
                        anchor,
                        tag: Some(node.tag().to_string()),
                        plain_implicit,
                        quoted_implicit,
                        value: text,
                        style: style_from_char(node.style()),
                    },
                    mark.clone(),
                    mark,
                ));
            }
        }
    }
}

impl Default for Representer {
    fn default() -> Self {
        Representer::new()
    }
}

/// Render a scalar node's value back to its textual form, for round-tripping
/// through the resolver (to decide whether the tag can stay implicit) and
/// for the emitter to write out.
fn scalar_text(node: &Node) -> String {
    match node.value() {
        NodeValue::Null => "null".to_string(),
        NodeValue::Bool(b) => {
            if *b {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        NodeValue::Int(i) => i.to_string(),
        NodeValue::Float(f) => format_float(*f),
        NodeValue::Str(s) => s.clone(),
        NodeValue::Bytes(bytes) => {
            use base64::Engine as _;
            base64::engine::general_purpose::STANDARD.encode(bytes)
        }
        NodeValue::Timestamp(dt) => dt.to_rfc3339(),
        NodeValue::Sequence(_) | NodeValue::Mapping(_) => unreachable!("scalar_text only sees scalar nodes"),
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        return ".nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { ".inf".to_string() } else { "-.inf".to_string() };
    }
    if f == f.trunc() && f.abs() < 1e15 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_node_is_anchored_and_aliased() {
        let shared = Node::new(NodeValue::Int(7), "tag:yaml.org,2002:int");
        let mut mapping = crate::node::Mapping::new();
        mapping.insert(Node::new(NodeValue::Str("a".into()), "tag:yaml.org,2002:str"), shared.clone());
        mapping.insert(Node::new(NodeValue::Str("b".into()), "tag:yaml.org,2002:str"), shared);
        let root = Node::new(NodeValue::Mapping(mapping), "tag:yaml.org,2002:map");

        let mut representer = Representer::new();
        let events = representer.represent(&root);

        let anchors: Vec<String> = events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::Scalar { anchor: Some(a), .. } => Some(a.clone()),
                _ => None,
            })
            .collect();
        let aliases: Vec<String> = events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::Alias { anchor } => Some(anchor.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(anchors.len(), 1);
        assert_eq!(aliases, vec![anchors[0].clone()]);
    }

    #[test]
    fn flow_style_flag_on_a_node_overrides_the_default() {
        let root = Node::new(
            NodeValue::Sequence(vec![Node::new(NodeValue::Int(1), "tag:yaml.org,2002:int")]),
            "tag:yaml.org,2002:seq",
        )
        .with_flow_style(Some(true));
        let mut representer = Representer::new();
        let events = representer.represent(&root);
        assert!(matches!(events[0].kind, EventKind::SequenceStart { flow_style: true, .. }));
    }

    #[test]
    fn unshared_tree_has_no_anchors() {
        let root = Node::new(
            NodeValue::Sequence(vec![Node::new(NodeValue::Int(1), "tag:yaml.org,2002:int")]),
            "tag:yaml.org,2002:seq",
        );
        let mut representer = Representer::new();
        let events = representer.represent(&root);
        assert!(events.iter().all(|e| !matches!(&e.kind, EventKind::Alias { .. })));
    }
}
