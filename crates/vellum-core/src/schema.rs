use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::node::{mark_sets_equal, Attrs, ElementNode, Mark, Node, TextNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Block,
    Inline,
}

/// What an element kind admits as children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentRule {
    /// No children at all (void blocks such as dividers).
    None,
    /// Text runs and inline elements.
    Inline,
    /// Block elements of any kind.
    Block,
    /// Only the listed element kinds, e.g. a table row admits only cells.
    Only(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub kind: String,
    pub role: NodeRole,
    pub content: ContentRule,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkSpec {
    pub kind: String,
}

/// Node and mark kinds contributed by a plugin.
#[derive(Debug, Clone, Default)]
pub struct SchemaExtensions {
    pub nodes: Vec<NodeSpec>,
    pub marks: Vec<MarkSpec>,
}

/// The set of node and mark types a document may use, with their content
/// contracts. Node construction goes through the schema and fails with
/// `SchemaViolation` when content does not match the declared rule.
#[derive(Debug, Clone)]
pub struct Schema {
    nodes: HashMap<String, NodeSpec>,
    marks: HashMap<String, MarkSpec>,
}

impl Schema {
    /// The built-in core: a `doc` root holding blocks and a `paragraph`
    /// holding inline content. Everything else arrives via extensions.
    pub fn base() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            "doc".to_string(),
            NodeSpec {
                kind: "doc".to_string(),
                role: NodeRole::Block,
                content: ContentRule::Block,
            },
        );
        nodes.insert(
            "paragraph".to_string(),
            NodeSpec {
                kind: "paragraph".to_string(),
                role: NodeRole::Block,
                content: ContentRule::Inline,
            },
        );
        Self {
            nodes,
            marks: HashMap::new(),
        }
    }

    /// Folds plugin extensions into the schema. A kind collision between
    /// extensions (or with the base) is a fatal configuration error.
    pub fn with_extensions(
        mut self,
        extensions: impl IntoIterator<Item = SchemaExtensions>,
    ) -> Result<Self, EngineError> {
        for ext in extensions {
            for spec in ext.nodes {
                if self.nodes.contains_key(&spec.kind) {
                    return Err(EngineError::PluginConflict(format!(
                        "duplicate node kind: {}",
                        spec.kind
                    )));
                }
                self.nodes.insert(spec.kind.clone(), spec);
            }
            for spec in ext.marks {
                if self.marks.contains_key(&spec.kind) {
                    return Err(EngineError::PluginConflict(format!(
                        "duplicate mark kind: {}",
                        spec.kind
                    )));
                }
                self.marks.insert(spec.kind.clone(), spec);
            }
        }
        Ok(self)
    }

    pub fn node_spec(&self, kind: &str) -> Option<&NodeSpec> {
        self.nodes.get(kind)
    }

    pub fn mark_spec(&self, kind: &str) -> Option<&MarkSpec> {
        self.marks.get(kind)
    }

    pub fn content_rule(&self, kind: &str) -> Option<&ContentRule> {
        self.nodes.get(kind).map(|s| &s.content)
    }

    /// Builds an element node, validating its immediate children against
    /// the declared content rule. Adjacent text runs with identical mark
    /// sets are coalesced so run boundaries stay canonical.
    pub fn element(
        &self,
        kind: impl Into<String>,
        attrs: Attrs,
        children: Vec<Arc<Node>>,
    ) -> Result<Arc<Node>, EngineError> {
        let kind = kind.into();
        let spec = self.nodes.get(&kind).ok_or_else(|| {
            EngineError::SchemaViolation(format!("unknown node kind: {kind}"))
        })?;

        for child in &children {
            self.check_child(spec, child)?;
        }

        Ok(Arc::new(Node::Element(ElementNode {
            kind,
            attrs,
            children: coalesce_text_runs(children),
        })))
    }

    /// Shorthand for an element with no attrs.
    pub fn block(
        &self,
        kind: impl Into<String>,
        children: Vec<Arc<Node>>,
    ) -> Result<Arc<Node>, EngineError> {
        self.element(kind, Attrs::default(), children)
    }

    /// Builds a text run. Empty runs are forbidden: they would occupy no
    /// tokens and make position resolution ambiguous.
    pub fn text(
        &self,
        text: impl Into<String>,
        marks: Vec<Mark>,
    ) -> Result<Arc<Node>, EngineError> {
        let text = text.into();
        if text.is_empty() {
            return Err(EngineError::SchemaViolation(
                "empty text runs are not allowed".to_string(),
            ));
        }
        for mark in &marks {
            if !self.marks.contains_key(&mark.kind) {
                return Err(EngineError::SchemaViolation(format!(
                    "unknown mark kind: {}",
                    mark.kind
                )));
            }
        }
        Ok(Arc::new(Node::Text(TextNode { text, marks })))
    }

    /// A paragraph with a single plain text run, or an empty paragraph.
    pub fn paragraph(&self, text: &str) -> Result<Arc<Node>, EngineError> {
        if text.is_empty() {
            self.block("paragraph", Vec::new())
        } else {
            let run = self.text(text, Vec::new())?;
            self.block("paragraph", vec![run])
        }
    }

    /// An empty document: one empty paragraph under the root.
    pub fn empty_doc(&self) -> Result<Arc<Node>, EngineError> {
        let para = self.paragraph("")?;
        self.block("doc", vec![para])
    }

    /// Checks that `child` may appear under an element with spec `spec`.
    pub(crate) fn check_child(&self, spec: &NodeSpec, child: &Node) -> Result<(), EngineError> {
        match (&spec.content, child) {
            (ContentRule::None, _) => Err(EngineError::SchemaViolation(format!(
                "{} admits no children",
                spec.kind
            ))),
            (ContentRule::Inline, Node::Text(_)) => Ok(()),
            (ContentRule::Inline, Node::Element(el)) => {
                match self.nodes.get(&el.kind).map(|s| s.role) {
                    Some(NodeRole::Inline) => Ok(()),
                    _ => Err(EngineError::SchemaViolation(format!(
                        "{} admits only inline content, got {}",
                        spec.kind, el.kind
                    ))),
                }
            }
            (ContentRule::Block, Node::Text(_)) => Err(EngineError::SchemaViolation(format!(
                "{} admits only block content, got a text run",
                spec.kind
            ))),
            (ContentRule::Block, Node::Element(el)) => {
                match self.nodes.get(&el.kind).map(|s| s.role) {
                    Some(NodeRole::Block) => Ok(()),
                    _ => Err(EngineError::SchemaViolation(format!(
                        "{} admits only block content, got {}",
                        spec.kind, el.kind
                    ))),
                }
            }
            (ContentRule::Only(kinds), Node::Element(el)) if kinds.contains(&el.kind) => Ok(()),
            (ContentRule::Only(kinds), child) => Err(EngineError::SchemaViolation(format!(
                "{} admits only {:?}, got {}",
                spec.kind,
                kinds,
                child.kind()
            ))),
        }
    }
}

fn coalesce_text_runs(children: Vec<Arc<Node>>) -> Vec<Arc<Node>> {
    let mut out: Vec<Arc<Node>> = Vec::with_capacity(children.len());
    for child in children {
        let merged = match (out.last(), child.as_ref()) {
            (Some(prev), Node::Text(right)) => match prev.as_ref() {
                Node::Text(left) if mark_sets_equal(&left.marks, &right.marks) => {
                    Some(Arc::new(Node::Text(TextNode {
                        text: format!("{}{}", left.text, right.text),
                        marks: left.marks.clone(),
                    })))
                }
                _ => None,
            },
            _ => None,
        };
        match merged {
            Some(node) => {
                out.pop();
                out.push(node);
            }
            None => out.push(child),
        }
    }
    out
}
