use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub type Attrs = BTreeMap<String, serde_json::Value>;
pub type ElementKind = String;

/// One node of the immutable content tree.
///
/// Children are `Arc`-shared: rebuilding a path of ancestors clones only
/// the child vectors, so untouched subtrees are shared by reference
/// between document versions and never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub kind: ElementKind,
    #[serde(default)]
    pub attrs: Attrs,
    #[serde(default)]
    pub children: Vec<Arc<Node>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
    #[serde(default)]
    pub marks: Vec<Mark>,
}

/// A formatting annotation on a span of inline content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    pub kind: String,
    #[serde(default)]
    pub attrs: Attrs,
}

impl Mark {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attrs: Attrs::default(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }
}

impl Node {
    /// Token-count contribution of this node: a text run counts one token
    /// per character; an element counts its children plus an open and a
    /// close boundary token.
    pub fn node_size(&self) -> usize {
        match self {
            Node::Text(t) => t.text.chars().count(),
            Node::Element(el) => 2 + el.children.iter().map(|c| c.node_size()).sum::<usize>(),
        }
    }

    /// Size of an element's content, without its own boundary tokens.
    pub fn content_size(&self) -> usize {
        match self {
            Node::Text(t) => t.text.chars().count(),
            Node::Element(_) => self.node_size() - 2,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Node::Element(el) => &el.kind,
            Node::Text(_) => "text",
        }
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextNode> {
        match self {
            Node::Text(t) => Some(t),
            Node::Element(_) => None,
        }
    }

    pub fn attr(&self, key: &str) -> Option<&serde_json::Value> {
        match self {
            Node::Element(el) => el.attrs.get(key),
            Node::Text(_) => None,
        }
    }

    /// Concatenated text of all runs in this subtree.
    pub fn text_content(&self) -> String {
        match self {
            Node::Text(t) => t.text.clone(),
            Node::Element(el) => el.children.iter().map(|c| c.text_content()).collect(),
        }
    }
}

/// A set/remove pair applied to a node's attrs. Applying a patch yields
/// the reverse patch, so attr edits invert exactly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttrPatch {
    #[serde(default)]
    pub set: Attrs,
    #[serde(default)]
    pub remove: Vec<String>,
}

impl AttrPatch {
    pub fn set(key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut patch = Self::default();
        patch.set.insert(key.into(), value);
        patch
    }

    pub fn remove(key: impl Into<String>) -> Self {
        Self {
            set: Attrs::default(),
            remove: vec![key.into()],
        }
    }
}

pub(crate) fn patch_apply(attrs: &mut Attrs, patch: &AttrPatch) -> AttrPatch {
    let mut old_set = Attrs::new();
    let mut old_remove = Vec::new();

    for (k, v) in &patch.set {
        if let Some(prev) = attrs.insert(k.clone(), v.clone()) {
            old_set.insert(k.clone(), prev);
        } else {
            old_remove.push(k.clone());
        }
    }

    for key in &patch.remove {
        if let Some(prev) = attrs.remove(key) {
            old_set.insert(key.clone(), prev);
        }
    }

    AttrPatch {
        set: old_set,
        remove: old_remove,
    }
}

/// Adds a mark to a set, replacing any existing mark of the same kind.
pub(crate) fn add_to_mark_set(marks: &[Mark], mark: &Mark) -> Vec<Mark> {
    let mut out: Vec<Mark> = marks.iter().filter(|m| m.kind != mark.kind).cloned().collect();
    out.push(mark.clone());
    out
}

/// Removes any mark of the given kind from a set.
pub(crate) fn remove_from_mark_set(marks: &[Mark], kind: &str) -> Vec<Mark> {
    marks.iter().filter(|m| m.kind != kind).cloned().collect()
}

pub(crate) fn mark_sets_equal(a: &[Mark], b: &[Mark]) -> bool {
    a.len() == b.len() && a.iter().all(|m| b.contains(m))
}
