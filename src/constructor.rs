//! Tag-driven decoding: composed (tagged, still-textual) nodes → typed
//! [`Node`] values.
//!
//! Every tag in the core schema decodes independently except `!!merge`,
//! which only has meaning as a mapping key and is handled inline by
//! [`construct_mapping`] rather than by a standalone `construct_*` function.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::node::{Mapping, Node, NodeValue};
use crate::resolver::{self, TAG_BINARY, TAG_BOOL, TAG_FLOAT, TAG_INT, TAG_MAP, TAG_MERGE, TAG_NULL, TAG_OMAP, TAG_PAIRS, TAG_SEQ, TAG_SET, TAG_STR, TAG_TIMESTAMP};

/// Decodes a composed node tree into its typed form, preserving anchor
/// sharing: two aliases to the same composed node decode to the same `Rc`
/// allocation rather than two equal-but-distinct ones.
#[derive(Default)]
pub struct Constructor {
    constructed: HashMap<usize, Node>,
}

impl Constructor {
    pub fn new() -> Self {
        Constructor::default()
    }

    pub fn construct(&mut self, node: &Node) -> Result<Node> {
        if let Some(existing) = self.constructed.get(&node.identity()) {
            return Ok(existing.clone());
        }
        let built = self.construct_uncached(node)?;
        self.constructed.insert(node.identity(), built.clone());
        Ok(built)
    }

    fn construct_uncached(&mut self, node: &Node) -> Result<Node> {
        match node.value() {
            NodeValue::Sequence(_) => self.construct_collection(node),
            NodeValue::Mapping(_) => self.construct_collection(node),
            NodeValue::Str(text) => self.construct_scalar(node, text),
            // Already-typed values only occur on nodes built programmatically
            // for a dump, never on a freshly composed load-side tree.
            _ => Ok(node.clone()),
        }
    }

    fn construct_scalar(&mut self, node: &Node, text: &str) -> Result<Node> {
        let mark = node.mark().cloned().unwrap_or_else(crate::mark::Mark::unknown);
        let tag = node.tag();
        let value = match tag {
            TAG_NULL => NodeValue::Null,
            TAG_BOOL => {
                let b = resolver::construct_bool(text)
                    .ok_or_else(|| Error::constructor(format!("invalid !!bool scalar {text:?}"), mark.clone()))?;
                NodeValue::Bool(b)
            }
            TAG_INT => {
                let i = resolver::construct_int(text)
                    .ok_or_else(|| Error::constructor(format!("invalid !!int scalar {text:?}"), mark.clone()))?;
                NodeValue::Int(i)
            }
            TAG_FLOAT => {
                let f = resolver::construct_float(text)
                    .ok_or_else(|| Error::constructor(format!("invalid !!float scalar {text:?}"), mark.clone()))?;
                NodeValue::Float(f)
            }
            TAG_BINARY => NodeValue::Bytes(resolver::construct_binary(text, mark.clone())?),
            TAG_TIMESTAMP => NodeValue::Timestamp(resolver::construct_timestamp(text, mark.clone())?),
            TAG_STR | TAG_MERGE => NodeValue::Str(text.to_string()),
            _ => NodeValue::Str(text.to_string()),
        };
        let mut built = Node::with_mark(value, tag.to_string(), mark);
        if let Some(style) = node.style() {
            built = built.with_style(Some(style));
        }
        if let Some(anchor) = node.anchor() {
            built = built.with_anchor(anchor.to_string());
        }
        Ok(built)
    }

    fn construct_collection(&mut self, node: &Node) -> Result<Node> {
        let mark = node.mark().cloned().unwrap_or_else(crate::mark::Mark::unknown);
        let tag = node.tag().to_string();
        let value = match (tag.as_str(), node.value()) {
            (TAG_SEQ, NodeValue::Sequence(items)) => {
                let items = items.iter().map(|n| self.construct(n)).collect::<Result<Vec<_>>>()?;
                NodeValue::Sequence(items)
            }
            (TAG_OMAP, NodeValue::Sequence(items)) | (TAG_PAIRS, NodeValue::Sequence(items)) => {
                return self.construct_pair_sequence(node, &tag, items, mark);
            }
            (TAG_MAP, NodeValue::Mapping(_)) => return self.construct_mapping(node, TAG_MAP.to_string(), mark),
            (TAG_SET, NodeValue::Mapping(pairs)) => {
                let mut set = Mapping::new();
                for (key, _) in pairs.iter() {
                    set.insert(self.construct(key)?, Node::null());
                }
                NodeValue::Mapping(set)
            }
            (_, NodeValue::Mapping(_)) => return self.construct_mapping(node, tag.clone(), mark),
            (_, NodeValue::Sequence(items)) => {
                let items = items.iter().map(|n| self.construct(n)).collect::<Result<Vec<_>>>()?;
                NodeValue::Sequence(items)
            }
            _ => unreachable!("construct_collection only sees sequence/mapping nodes"),
        };
        let mut built = Node::with_mark(value, tag, mark).with_flow_style(node.flow_style());
        if let Some(anchor) = node.anchor() {
            built = built.with_anchor(anchor.to_string());
        }
        Ok(built)
    }

    /// `!!omap`/`!!pairs`: a sequence of single-pair mappings. `!!omap`
    /// additionally rejects duplicate keys; `!!pairs` allows them.
    fn construct_pair_sequence(
        &mut self,
        node: &Node,
        tag: &str,
        items: &[Node],
        mark: crate::mark::Mark,
    ) -> Result<Node> {
        let mut pairs = Vec::with_capacity(items.len());
        let mut seen = Mapping::new();
        for item in items {
            let item_mapping = item
                .as_mapping()
                .ok_or_else(|| Error::constructor(format!("!!{} entry must be a single-pair mapping", short_tag(tag)), mark.clone()))?;
            if item_mapping.len() != 1 {
                return Err(Error::constructor(format!("!!{} entry must have exactly one pair", short_tag(tag)), mark.clone()));
            }
            let (key, value) = item_mapping.iter().next().unwrap();
            let key = self.construct(key)?;
            let value = self.construct(value)?;
            if tag == TAG_OMAP {
                if seen.contains_key(&key) {
                    return Err(Error::constructor("duplicate key in !!omap", mark.clone()));
                }
                seen.insert(key.clone(), Node::null());
            }
            let mut pair_mapping = Mapping::new();
            pair_mapping.insert(key, value);
            pairs.push(Node::with_mark(NodeValue::Mapping(pair_mapping), TAG_MAP.to_string(), mark.clone()));
        }
        let mut built = Node::with_mark(NodeValue::Sequence(pairs), tag.to_string(), mark).with_flow_style(node.flow_style());
        if let Some(anchor) = node.anchor() {
            built = built.with_anchor(anchor.to_string());
        }
        Ok(built)
    }

    /// `!!map`, or any other mapping-shaped tag: expand `<<` merge keys,
    /// giving precedence to keys already explicit in the mapping and, among
    /// merge sources, to earlier ones. Key order follows PyYAML's
    /// `flatten_mapping` (merge pairs prepended, `merge + node.value`): a
    /// merge-only key keeps the position its merge source gave it, an
    /// explicit key keeps its textual position after that, and a key
    /// present in both keeps the merge pass's position with the explicit
    /// value.
    fn construct_mapping(&mut self, node: &Node, tag: String, mark: crate::mark::Mark) -> Result<Node> {
        let raw = node.as_mapping().expect("caller only passes mapping-valued nodes");
        let mut result = Mapping::new();

        // First pass: merge sources, in document order, each only filling
        // gaps earlier merges left open.
        for (key, value) in raw.iter() {
            if key.tag() != TAG_MERGE {
                continue;
            }
            self.merge_into(&mut result, value, &mark)?;
        }

        // Second pass: explicit (non-merge) keys override any value a merge
        // supplied, without disturbing the position the merge pass assigned.
        for (key, value) in raw.iter() {
            if key.tag() == TAG_MERGE {
                continue;
            }
            result.insert(self.construct(key)?, self.construct(value)?);
        }

        let mut built = Node::with_mark(NodeValue::Mapping(result), tag, mark).with_flow_style(node.flow_style());
        if let Some(anchor) = node.anchor() {
            built = built.with_anchor(anchor.to_string());
        }
        Ok(built)
    }

    fn merge_into(&mut self, result: &mut Mapping, source: &Node, mark: &crate::mark::Mark) -> Result<()> {
        match source.value() {
            NodeValue::Mapping(pairs) => {
                for (key, value) in pairs.iter() {
                    result.insert_if_absent(self.construct(key)?, self.construct(value)?);
                }
                Ok(())
            }
            NodeValue::Sequence(sources) => {
                for inner in sources {
                    self.merge_into(result, inner, mark)?;
                }
                Ok(())
            }
            _ => Err(Error::constructor("!!merge value must be a mapping or a sequence of mappings", mark.clone())),
        }
    }
}

fn short_tag(tag: &str) -> &str {
    tag.rsplit(':').next().unwrap_or(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::Composer;
    use crate::parser::Parser;
    use crate::reader::Reader;
    use crate::scanner::Scanner;

    fn construct_all(src: &str) -> Vec<Node> {
        let reader = Reader::new("<test>", src.as_bytes()).unwrap();
        let scanner = Scanner::new(reader);
        let parser = Parser::new(scanner);
        let mut composer = Composer::new(parser).unwrap();
        let mut constructor = Constructor::new();
        let mut out = Vec::new();
        while let Some(raw) = composer.next_document().unwrap() {
            out.push(constructor.construct(&raw).unwrap());
        }
        out
    }

    #[test]
    fn decodes_core_scalars() {
        let docs = construct_all("- 1\n- 3.5\n- true\n- null\n- hello\n");
        let items = docs[0].as_sequence().unwrap();
        assert_eq!(items[0].as_i64(), Some(1));
        assert_eq!(items[1].as_f64(), Some(3.5));
        assert_eq!(items[2].as_bool(), Some(true));
        assert!(items[3].is_null());
        assert_eq!(items[4].as_str(), Some("hello"));
    }

    #[test]
    fn merge_key_does_not_shadow_explicit_key() {
        let docs = construct_all("base: &b\n  x: 1\n  y: 2\nover:\n  <<: *b\n  y: 99\n");
        let mapping = docs[0].as_mapping().unwrap();
        let over = mapping.get(&Node::new(NodeValue::Str("over".into()), TAG_STR)).unwrap();
        let over_mapping = over.as_mapping().unwrap();
        let x = over_mapping.get(&Node::new(NodeValue::Str("x".into()), TAG_STR)).unwrap();
        let y = over_mapping.get(&Node::new(NodeValue::Str("y".into()), TAG_STR)).unwrap();
        assert_eq!(x.as_i64(), Some(1));
        assert_eq!(y.as_i64(), Some(99));
    }

    #[test]
    fn earlier_merge_source_shadows_later_one() {
        let docs = construct_all("a: &a\n  k: 1\nb: &b\n  k: 2\nc:\n  <<: [*a, *b]\n");
        let mapping = docs[0].as_mapping().unwrap();
        let c = mapping.get(&Node::new(NodeValue::Str("c".into()), TAG_STR)).unwrap();
        let k = c.as_mapping().unwrap().get(&Node::new(NodeValue::Str("k".into()), TAG_STR)).unwrap();
        assert_eq!(k.as_i64(), Some(1));
    }

    #[test]
    fn merge_pairs_keep_merge_order_ahead_of_explicit_keys() {
        let docs = construct_all("a: &a\n  x: 1\n  y: 2\nc:\n  <<: *a\n  r: 10\n");
        let mapping = docs[0].as_mapping().unwrap();
        let c = mapping.get(&Node::new(NodeValue::Str("c".into()), TAG_STR)).unwrap();
        let keys: Vec<&str> = c.as_mapping().unwrap().iter().map(|(k, _)| k.as_str().unwrap()).collect();
        assert_eq!(keys, vec!["x", "y", "r"]);
    }

    #[test]
    fn anchored_node_decodes_once_and_is_shared() {
        let docs = construct_all("a: &x 10\nb: *x\n");
        let mapping = docs[0].as_mapping().unwrap();
        let a = mapping.get(&Node::new(NodeValue::Str("a".into()), TAG_STR)).unwrap();
        let b = mapping.get(&Node::new(NodeValue::Str("b".into()), TAG_STR)).unwrap();
        assert!(a.is_same_as(b));
    }
}
