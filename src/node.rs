//! The typed value tree that flows between the load side (Composer /
//! Constructor) and the dump side (Representer / Serializer).

use std::rc::Rc;

use chrono::{DateTime, FixedOffset};

use crate::mark::Mark;

/// An ordered, key-deduplicating list of `(key, value)` pairs.
///
/// Mappings are insertion-ordered rather than hash-ordered: dumping a
/// loaded document should round-trip key order, and iteration needs to be
/// deterministic. A `HashMap<Node, Node>` would also be an awkward fit —
/// `Node` holds `f64` scalars, so a structural `Hash` would have to paper
/// over `NaN`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    pairs: Vec<(Node, Node)>,
}

impl Mapping {
    pub fn new() -> Self {
        Mapping { pairs: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, key: &Node) -> Option<&Node> {
        self.pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &Node) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Insert a pair. If the key is already present its value is
    /// overwritten in place, so that an explicit key keeps its original
    /// position when a later `<<` merge supplies the same key again.
    pub fn insert(&mut self, key: Node, value: Node) {
        if let Some(slot) = self.pairs.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.pairs.push((key, value));
        }
    }

    /// Insert only if the key is absent. Used by `<<` merges, which must
    /// never shadow a key the mapping already defines explicitly.
    pub fn insert_if_absent(&mut self, key: Node, value: Node) {
        if !self.contains_key(&key) {
            self.pairs.push((key, value));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Node, Node)> {
        self.pairs.iter()
    }
}

impl IntoIterator for Mapping {
    type Item = (Node, Node);
    type IntoIter = std::vec::IntoIter<(Node, Node)>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}

impl FromIterator<(Node, Node)> for Mapping {
    fn from_iter<T: IntoIterator<Item = (Node, Node)>>(iter: T) -> Self {
        let mut mapping = Mapping::new();
        for (k, v) in iter {
            mapping.insert(k, v);
        }
        mapping
    }
}

/// The decoded payload of a [`Node`].
#[derive(Debug, Clone)]
pub enum NodeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<FixedOffset>),
    Sequence(Vec<Node>),
    Mapping(Mapping),
}

impl PartialEq for NodeValue {
    fn eq(&self, other: &Self) -> bool {
        use NodeValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (Timestamp(a), Timestamp(b)) => a == b,
            (Sequence(a), Sequence(b)) => a == b,
            (Mapping(a), Mapping(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    value: NodeValue,
    tag: String,
    style: Option<char>,
    /// Collection style (`Some(true)` = flow, `Some(false)` = block),
    /// meaningful only when `value` is `Sequence`/`Mapping`; `None` for
    /// scalars and for collections built programmatically rather than
    /// composed from a parsed event.
    flow_style: Option<bool>,
    anchor: Option<String>,
    mark: Option<Mark>,
}

/// A value in the data model, cheaply cloneable via `Rc` so an anchored
/// node is shared — not deep-copied — by every alias that resolves to it.
#[derive(Debug, Clone)]
pub struct Node(Rc<NodeData>);

impl Node {
    pub fn new(value: NodeValue, tag: impl Into<String>) -> Self {
        Node(Rc::new(NodeData { value, tag: tag.into(), style: None, flow_style: None, anchor: None, mark: None }))
    }

    pub fn with_mark(value: NodeValue, tag: impl Into<String>, mark: Mark) -> Self {
        Node(Rc::new(NodeData { value, tag: tag.into(), style: None, flow_style: None, anchor: None, mark: Some(mark) }))
    }

    pub fn null() -> Self {
        Node::new(NodeValue::Null, "tag:yaml.org,2002:null")
    }

    pub fn value(&self) -> &NodeValue {
        &self.0.value
    }

    pub fn tag(&self) -> &str {
        &self.0.tag
    }

    pub fn mark(&self) -> Option<&Mark> {
        self.0.mark.as_ref()
    }

    pub fn anchor(&self) -> Option<&str> {
        self.0.anchor.as_deref()
    }

    /// The original scalar style (`'"'`, `'\''`, `'|'`, `'>'`, or `None`
    /// for plain), preserved from the Composer so the Representer can
    /// prefer it when re-dumping a loaded document.
    pub fn style(&self) -> Option<char> {
        self.0.style
    }

    /// Tag a node with the scalar style it was read in. `Node` is
    /// otherwise immutable once built, so this clones the underlying data
    /// if it is shared (which it never is at construction time — aliasing
    /// only happens once a node is anchored in the Composer's table).
    pub fn with_style(self, style: Option<char>) -> Self {
        let mut data = (*self.0).clone();
        data.style = style;
        Node(Rc::new(data))
    }

    pub fn with_anchor(self, anchor: impl Into<String>) -> Self {
        let mut data = (*self.0).clone();
        data.anchor = Some(anchor.into());
        Node(Rc::new(data))
    }

    /// The collection style a sequence/mapping was read in (flow `[]`/`{}`
    /// vs. block), preserved from the Composer so the Representer can
    /// round-trip it instead of forcing a single style on every collection.
    pub fn flow_style(&self) -> Option<bool> {
        self.0.flow_style
    }

    pub fn with_flow_style(self, flow_style: Option<bool>) -> Self {
        let mut data = (*self.0).clone();
        data.flow_style = flow_style;
        Node(Rc::new(data))
    }

    /// Pointer identity, distinct from [`PartialEq`] (which compares by
    /// value). Every alias to the same anchor clones the same `Rc`, so
    /// `is_same_as` is how the Representer decides two occurrences are the
    /// same object rather than two equal-looking ones.
    pub fn is_same_as(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// A stable identity for this node's underlying allocation, for use as
    /// a map key where `is_same_as` pairwise comparison would be quadratic
    /// (e.g. the Constructor's memo of already-decoded aliased nodes).
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.0.value {
            NodeValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match &self.0.value {
            NodeValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match &self.0.value {
            NodeValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &self.0.value {
            NodeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.0.value, NodeValue::Null)
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match &self.0.value {
            NodeValue::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match &self.0.value {
            NodeValue::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// Order-insensitive structural equality for mappings; `==` is
    /// order-sensitive (mappings are an ordered list of pairs in the data
    /// model). Falls through to `==` for every other node kind.
    pub fn map_eq_unordered(&self, other: &Node) -> bool {
        match (&self.0.value, &other.0.value) {
            (NodeValue::Mapping(a), NodeValue::Mapping(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).is_some_and(|bv| v.map_eq_unordered(bv)))
            }
            (NodeValue::Sequence(a), NodeValue::Sequence(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.map_eq_unordered(y))
            }
            _ => self == other,
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.0.tag == other.0.tag && self.0.value == other.0.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_equality_ignores_identity() {
        let a = Node::new(NodeValue::Str("x".into()), "tag:yaml.org,2002:str");
        let b = Node::new(NodeValue::Str("x".into()), "tag:yaml.org,2002:str");
        assert_eq!(a, b);
        assert!(!a.is_same_as(&b));
    }

    #[test]
    fn cloned_rc_is_same_as_itself() {
        let a = Node::new(NodeValue::Str("x".into()), "tag:yaml.org,2002:str");
        let b = a.clone();
        assert!(a.is_same_as(&b));
    }

    #[test]
    fn mapping_insert_overwrites_in_place() {
        let k = Node::new(NodeValue::Str("a".into()), "tag:yaml.org,2002:str");
        let mut m = Mapping::new();
        m.insert(k.clone(), Node::new(NodeValue::Int(1), "tag:yaml.org,2002:int"));
        m.insert(k.clone(), Node::new(NodeValue::Int(2), "tag:yaml.org,2002:int"));
        assert_eq!(m.len(), 1);
        assert_eq!(m.get(&k).and_then(Node::as_i64), Some(2));
    }

    #[test]
    fn mapping_ordered_eq_differs_from_unordered() {
        let k1 = Node::new(NodeValue::Str("a".into()), "tag:yaml.org,2002:str");
        let v1 = Node::new(NodeValue::Int(1), "tag:yaml.org,2002:int");
        let k2 = Node::new(NodeValue::Str("b".into()), "tag:yaml.org,2002:str");
        let v2 = Node::new(NodeValue::Int(2), "tag:yaml.org,2002:int");

        let m1 = Mapping::from_iter([(k1.clone(), v1.clone()), (k2.clone(), v2.clone())]);
        let m2 = Mapping::from_iter([(k2, v2), (k1, v1)]);

        let n1 = Node::new(NodeValue::Mapping(m1), "tag:yaml.org,2002:map");
        let n2 = Node::new(NodeValue::Mapping(m2), "tag:yaml.org,2002:map");
        assert_ne!(n1, n2);
        assert!(n1.map_eq_unordered(&n2));
    }
}
