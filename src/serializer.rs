//! Wraps a [`Representer`]'s events with the document/stream framing the
//! [`crate::emitter::Emitter`] expects, and owns the dump-side tag-directive
//! table — the serializer's counterpart to the parser owning it on load.

use std::collections::HashMap;

use crate::mark::Mark;
use crate::node::Node;
use crate::parser::{Event, EventKind};
use crate::representer::Representer;

/// Options that control how a stream of documents is wrapped.
pub struct SerializerOptions {
    pub explicit_start: bool,
    pub explicit_end: bool,
    pub version: Option<(u32, u32)>,
    pub tags: Option<HashMap<String, String>>,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        SerializerOptions { explicit_start: false, explicit_end: false, version: None, tags: None }
    }
}

/// Turns one or more node trees into a single, fully framed event stream.
pub struct Serializer {
    representer: Representer,
    options: SerializerOptions,
    opened: bool,
    closed: bool,
}

impl Serializer {
    pub fn new(representer: Representer, options: SerializerOptions) -> Self {
        Serializer { representer, options, opened: false, closed: false }
    }

    /// `stream-start`, if not already emitted.
    fn open(&mut self, events: &mut Vec<Event>) {
        if !self.opened {
            events.push(Event::new(EventKind::StreamStart, Mark::unknown(), Mark::unknown()));
            self.opened = true;
        }
    }

    /// Serialize one document (root node) as `document-start`, its node
    /// tree, `document-end` — `stream-start` is emitted automatically
    /// before the first document.
    pub fn serialize_document(&mut self, root: &Node) -> Vec<Event> {
        let mut events = Vec::new();
        self.open(&mut events);

        events.push(Event::new(
            EventKind::DocumentStart {
                explicit: self.options.explicit_start,
                version: self.options.version,
                tags: self.options.tags.clone(),
            },
            Mark::unknown(),
            Mark::unknown(),
        ));
        events.extend(self.representer.represent(root));
        events.push(Event::new(EventKind::DocumentEnd { explicit: self.options.explicit_end }, Mark::unknown(), Mark::unknown()));
        events
    }

    /// `stream-end`. Call once after every document has been serialized.
    pub fn close(&mut self) -> Vec<Event> {
        if self.closed {
            return Vec::new();
        }
        self.closed = true;
        let mut events = Vec::new();
        self.open(&mut events);
        events.push(Event::new(EventKind::StreamEnd, Mark::unknown(), Mark::unknown()));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeValue;

    #[test]
    fn wraps_a_single_document_with_stream_and_document_framing() {
        let mut serializer = Serializer::new(Representer::new(), SerializerOptions::default());
        let root = Node::new(NodeValue::Int(1), "tag:yaml.org,2002:int");
        let mut events = serializer.serialize_document(&root);
        events.extend(serializer.close());

        let kinds: Vec<&EventKind> = events.iter().map(|e| &e.kind).collect();
        assert!(matches!(kinds[0], EventKind::StreamStart));
        assert!(matches!(kinds[1], EventKind::DocumentStart { .. }));
        assert!(matches!(kinds[kinds.len() - 2], EventKind::DocumentEnd { .. }));
        assert!(matches!(kinds[kinds.len() - 1], EventKind::StreamEnd));
    }

    #[test]
    fn multiple_documents_share_one_stream_start_and_end() {
        let mut serializer = Serializer::new(Representer::new(), SerializerOptions::default());
        let mut events = serializer.serialize_document(&Node::new(NodeValue::Int(1), "tag:yaml.org,2002:int"));
        events.extend(serializer.serialize_document(&Node::new(NodeValue::Int(2), "tag:yaml.org,2002:int")));
        events.extend(serializer.close());

        let stream_starts = events.iter().filter(|e| matches!(e.kind, EventKind::StreamStart)).count();
        let stream_ends = events.iter().filter(|e| matches!(e.kind, EventKind::StreamEnd)).count();
        assert_eq!(stream_starts, 1);
        assert_eq!(stream_ends, 1);
    }
}
