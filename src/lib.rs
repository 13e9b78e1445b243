//! A YAML 1.1 processing pipeline: reader, scanner, parser, composer and
//! constructor on the load side; representer, serializer and emitter on the
//! dump side, with a resolver shared by both halves.
//!
//! ```
//! # fn main() -> yamele::Result<()> {
//! let node = yamele::load(b"a: 1\nb: [2, 3]\n")?.expect("one document");
//! let mapping = node.as_mapping().unwrap();
//! assert_eq!(mapping.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod composer;
pub mod constructor;
pub mod emitter;
pub mod error;
pub mod mark;
pub mod node;
pub mod parser;
pub mod reader;
pub mod representer;
pub mod resolver;
pub mod scanner;
pub mod serializer;

use std::io::{Read as IoRead, Write as IoWrite};

pub use error::{Error, Result};
pub use mark::Mark;
pub use node::{Mapping, Node, NodeValue};
pub use parser::{Event, EventKind};

use composer::Composer;
use constructor::Constructor;
use emitter::{DumperOptions, Emitter};
use parser::Parser;
use reader::Reader;
use representer::Representer;
use resolver::Resolver;
use scanner::Scanner;
use serializer::{Serializer, SerializerOptions};

/// Load-side configuration: which resolver and constructor to decode
/// scalars with, plus a name for the input used in diagnostics.
pub struct Loader {
    pub resolver: Resolver,
    pub constructor: Constructor,
    pub name: String,
}

impl Default for Loader {
    fn default() -> Self {
        Loader { resolver: Resolver::new(), constructor: Constructor::new(), name: "<bytes>".to_string() }
    }
}

impl Loader {
    pub fn new() -> Self {
        Loader::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn composer(&self, bytes: &[u8]) -> Result<Composer> {
        let reader = Reader::new(self.name.clone(), bytes)?;
        let scanner = Scanner::new(reader);
        let parser = Parser::new(scanner);
        Composer::with_resolver(parser, Resolver::new())
    }

    /// Load the first document in `bytes`, or `None` for an empty stream.
    pub fn load(&mut self, bytes: &[u8]) -> Result<Option<Node>> {
        let mut composer = self.composer(bytes)?;
        log::debug!("loading document from {:?}", self.name);
        match composer.next_document()? {
            Some(raw) => Ok(Some(self.constructor.construct(&raw)?)),
            None => Ok(None),
        }
    }

    /// Load every document in `bytes`.
    pub fn load_all(&mut self, bytes: &[u8]) -> Result<Vec<Node>> {
        let mut composer = self.composer(bytes)?;
        let mut docs = Vec::new();
        while let Some(raw) = composer.next_document()? {
            log::trace!("composed document {} in {:?}", docs.len(), self.name);
            docs.push(self.constructor.construct(&raw)?);
        }
        Ok(docs)
    }
}

/// Load the first document in `bytes` with a default [`Loader`].
pub fn load(bytes: &[u8]) -> Result<Option<Node>> {
    Loader::new().load(bytes)
}

/// Load every document in `bytes` with a default [`Loader`].
pub fn load_all(bytes: &[u8]) -> Result<Vec<Node>> {
    Loader::new().load_all(bytes)
}

/// Read `reader` to completion and load the first document in it.
pub fn load_reader(mut reader: impl IoRead) -> Result<Option<Node>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    load(&bytes)
}

/// Dump a single node tree to a freshly allocated byte buffer.
pub fn dump(node: &Node, options: &DumperOptions) -> Result<Vec<u8>> {
    dump_all(std::slice::from_ref(node), options)
}

/// Dump several node trees as a single multi-document stream.
pub fn dump_all(nodes: &[Node], options: &DumperOptions) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    dump_writer(nodes, options, &mut buffer)?;
    Ok(buffer)
}

/// Dump several node trees into `writer`, a thin `std::io::Write` bridge
/// over the in-memory [`Serializer`]/[`Emitter`] pair.
pub fn dump_writer(nodes: &[Node], options: &DumperOptions, writer: impl IoWrite) -> Result<()> {
    log::debug!("dumping {} document(s)", nodes.len());
    let serializer_options =
        SerializerOptions { explicit_start: options.explicit_start, explicit_end: options.explicit_end, version: None, tags: None };
    let mut serializer = Serializer::new(Representer::new().default_flow_style(options.default_flow_style), serializer_options);
    let mut events = Vec::new();
    for node in nodes {
        events.extend(serializer.serialize_document(node));
    }
    events.extend(serializer.close());

    let mut emitter = Emitter::new(writer, options.clone());
    emitter.emit(&events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_and_dumps_round_trip_structurally() {
        env_logger::init();
        let node = load(b"a: 1\nb: [2, 3]\n").unwrap().unwrap();
        let bytes = dump(&node, &DumperOptions::default()).unwrap();
        let reloaded = load(&bytes).unwrap().unwrap();
        assert!(node.map_eq_unordered(&reloaded));
    }

    #[test]
    fn load_all_returns_every_document() {
        let docs = load_all(b"---\n1\n---\n2\n").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].as_i64(), Some(1));
        assert_eq!(docs[1].as_i64(), Some(2));
    }

    #[test]
    fn load_reader_bridges_a_read_impl() {
        let cursor = std::io::Cursor::new(b"hello\n".to_vec());
        let node = load_reader(cursor).unwrap().unwrap();
        assert_eq!(node.as_str(), Some("hello"));
    }
}
