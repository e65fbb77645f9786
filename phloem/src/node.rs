//! Abstract node model.
//!
//! A [`Node`] is an immutable snapshot of one element of a host tree: what
//! kind of thing it is, an optional sibling key, its attributes, and its
//! children in rendered order. Children are owned, so a node can never be its
//! own descendant.

use core::fmt;
use facet::Facet;
use std::collections::BTreeMap;

/// Attribute holding the content of [`NodeType::Text`] nodes.
pub const TEXT_ATTR: &str = "data";

/// Identity discriminator for a node. Two nodes are the same type iff their
/// `NodeType`s are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum NodeType {
    /// A host element identified by its tag name
    Element(String),
    /// A caller-level component identified by name
    Component(String),
    /// A text node; content lives in the [`TEXT_ATTR`] attribute
    Text,
    /// A grouping node with no host representation of its own
    Fragment,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeType::Element(tag) => write!(f, "<{tag}>"),
            NodeType::Component(name) => write!(f, "{name}"),
            NodeType::Text => write!(f, "#text"),
            NodeType::Fragment => write!(f, "#fragment"),
        }
    }
}

/// Caller-supplied identity token, unique among the siblings of one parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Facet)]
#[repr(u8)]
pub enum Key {
    /// String key
    Str(String),
    /// Integer key
    Int(i64),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => write!(f, "{s:?}"),
            Key::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_owned())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

/// An attribute value.
///
/// Equality is structural per variant: `Int(0)` and `Str("0")` differ.
#[derive(Debug, Clone, PartialEq, Facet)]
#[repr(u8)]
pub enum AttrValue {
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    Str(String),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::Float(x) => write!(f, "{x}"),
            AttrValue::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl From<f64> for AttrValue {
    fn from(x: f64) -> Self {
        AttrValue::Float(x)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

/// Attribute mapping with unique names.
///
/// Backed by an ordered map so anything derived from it (patches, logs) comes
/// out in a stable order regardless of how the caller built it.
#[derive(Debug, Clone, Default, PartialEq, Facet)]
#[facet(transparent)]
pub struct Attributes(pub BTreeMap<String, AttrValue>);

impl Attributes {
    /// Create an empty attribute mapping.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Get an attribute value by name.
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.0.get(name)
    }

    /// Set an attribute, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Option<AttrValue> {
        self.0.insert(name.into(), value.into())
    }

    /// Remove an attribute, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<AttrValue> {
        self.0.remove(name)
    }

    /// Iterate over attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no attributes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<AttrValue>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One element of a tree snapshot.
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct Node {
    /// What kind of node this is
    pub type_id: NodeType,
    /// Optional identity among siblings
    pub key: Option<Key>,
    /// Attributes
    pub attributes: Attributes,
    /// Children in rendered order
    pub children: Vec<Node>,
}

impl Node {
    /// Create a childless, unkeyed node of the given type.
    pub fn new(type_id: NodeType) -> Self {
        Self {
            type_id,
            key: None,
            attributes: Attributes::new(),
            children: Vec::new(),
        }
    }

    /// Create an element node.
    pub fn element(tag: impl Into<String>) -> Self {
        Self::new(NodeType::Element(tag.into()))
    }

    /// Create a component node.
    pub fn component(name: impl Into<String>) -> Self {
        Self::new(NodeType::Component(name.into()))
    }

    /// Create a text node holding `data`.
    pub fn text(data: impl Into<String>) -> Self {
        let data: String = data.into();
        Self::new(NodeType::Text).with_attr(TEXT_ATTR, data)
    }

    /// Create a fragment node.
    pub fn fragment() -> Self {
        Self::new(NodeType::Fragment)
    }

    /// Set the sibling key.
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set an attribute.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.set(name, value);
        self
    }

    /// Append a child.
    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Append several children.
    pub fn with_children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    /// Text content, for text nodes.
    pub fn text_data(&self) -> Option<&str> {
        match (&self.type_id, self.attributes.get(TEXT_ATTR)) {
            (NodeType::Text, Some(AttrValue::Str(s))) => Some(s),
            _ => None,
        }
    }

    /// Whether `self` and `other` have the same type.
    pub fn same_type(&self, other: &Node) -> bool {
        self.type_id == other.type_id
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }
}
