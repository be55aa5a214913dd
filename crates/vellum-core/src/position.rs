use std::sync::Arc;

use crate::error::EngineError;
use crate::node::{ElementNode, Mark, Node};

/// One descent edge on the way from the document root to a resolved
/// position: the parent element, the index of the child entered, and the
/// absolute position of that child's open token (or first character,
/// for a text run).
#[derive(Debug, Clone)]
pub struct PathStep {
    pub parent: Arc<Node>,
    pub child_index: usize,
    pub child_start: usize,
}

/// The result of resolving a flat position against a document version.
///
/// Positions are version-scoped: a `ResolvedPos` is only meaningful for
/// the exact document it was resolved against.
#[derive(Debug, Clone)]
pub struct ResolvedPos {
    pub pos: usize,
    /// Descent edges from the root down to (but not including) `parent`.
    pub path: Vec<PathStep>,
    /// The deepest element whose content contains the position.
    pub parent: Arc<Node>,
    /// Absolute position of `parent`'s first content token.
    pub content_start: usize,
    /// Token offset of the position within `parent`'s content.
    pub offset: usize,
}

impl ResolvedPos {
    /// Child indices taken from the root to reach `parent`.
    pub fn parent_path(&self) -> Vec<usize> {
        self.path.iter().map(|step| step.child_index).collect()
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

/// Where an offset lands within an element's content.
#[derive(Debug, Clone)]
pub(crate) enum Location {
    /// Between children (or at the content's start/end). `index` is the
    /// child slot the offset sits before.
    Boundary { index: usize },
    /// Inside a text run. `char_offset` may be zero when the offset sits
    /// exactly at the run's start.
    InText {
        index: usize,
        run_start: usize,
        char_offset: usize,
    },
    /// Inside a child element's own token span (on or past its open
    /// token). Structural steps cannot target such an offset.
    InElement,
}

pub(crate) fn locate(parent: &ElementNode, offset: usize) -> Location {
    let mut acc = 0usize;
    for (index, child) in parent.children.iter().enumerate() {
        if offset == acc {
            // Prefer treating a run's start as a text location so text
            // edits at run boundaries address the run itself.
            if child.as_text().is_some() {
                return Location::InText {
                    index,
                    run_start: acc,
                    char_offset: 0,
                };
            }
            return Location::Boundary { index };
        }
        let size = child.node_size();
        if offset < acc + size {
            return match child.as_ref() {
                Node::Text(_) => Location::InText {
                    index,
                    run_start: acc,
                    char_offset: offset - acc,
                },
                Node::Element(_) => Location::InElement,
            };
        }
        acc += size;
    }
    Location::Boundary {
        index: parent.children.len(),
    }
}

/// Walks down from the root, consuming boundary tokens and child sizes,
/// until the offset is located inside a specific node. Defined for
/// `0 <= pos <= doc.node_size()`; anything else is `OutOfRange`.
///
/// Positions 0 and `node_size` sit on the document's own boundary
/// tokens; they resolve to the document itself with the offset clamped
/// to its content edge.
pub fn resolve(doc: &Arc<Node>, pos: usize) -> Result<ResolvedPos, EngineError> {
    let max = doc.node_size();
    if pos > max {
        return Err(EngineError::OutOfRange { pos, max });
    }

    let mut path = Vec::new();
    let mut parent = doc.clone();
    let mut content_start = 1usize;
    let mut rel = pos.saturating_sub(1).min(doc.content_size());

    loop {
        let el = match parent.as_ref() {
            Node::Element(el) => el,
            // The root is always an element; text runs are never descended
            // into, so this cannot be reached.
            Node::Text(_) => {
                return Err(EngineError::OutOfRange { pos, max });
            }
        };

        let mut acc = 0usize;
        let mut descend: Option<(usize, usize)> = None;
        for (index, child) in el.children.iter().enumerate() {
            if rel <= acc {
                break;
            }
            let size = child.node_size();
            if rel < acc + size {
                if child.as_element().is_some() {
                    descend = Some((index, acc));
                }
                break;
            }
            acc += size;
        }

        match descend {
            Some((index, child_rel_start)) => {
                let child = el.children[index].clone();
                let child_start = content_start + child_rel_start;
                path.push(PathStep {
                    parent: parent.clone(),
                    child_index: index,
                    child_start,
                });
                rel -= child_rel_start + 1;
                content_start = child_start + 1;
                parent = child;
            }
            None => {
                return Ok(ResolvedPos {
                    pos,
                    path,
                    parent,
                    content_start,
                    offset: rel,
                });
            }
        }
    }
}

/// Rebuilds the ancestor chain above the element at `path` (child
/// indices from the root), applying `f` to that element. Untouched
/// siblings are shared by reference with the previous version.
pub(crate) fn rebuild_at(
    node: &Arc<Node>,
    path: &[usize],
    f: &mut dyn FnMut(&ElementNode) -> Result<ElementNode, EngineError>,
) -> Result<Arc<Node>, EngineError> {
    let el = node.as_element().ok_or_else(|| {
        EngineError::TransactionRejected("step path descends into a text run".to_string())
    })?;

    if path.is_empty() {
        return Ok(Arc::new(Node::Element(f(el)?)));
    }

    let index = path[0];
    let child = el.children.get(index).ok_or_else(|| {
        EngineError::TransactionRejected(format!("step path index {index} out of bounds"))
    })?;
    let rebuilt = rebuild_at(child, &path[1..], f)?;

    let mut children = el.children.clone();
    children[index] = rebuilt;
    Ok(Arc::new(Node::Element(ElementNode {
        kind: el.kind.clone(),
        attrs: el.attrs.clone(),
        children,
    })))
}

/// A text run located by an absolute position range.
#[derive(Debug, Clone)]
pub(crate) struct RunRef {
    /// Absolute position of the run's first character.
    pub start: usize,
    pub len: usize,
    pub marks: Vec<Mark>,
}

/// Collects the text runs overlapping `[from, to)`, in document order.
pub(crate) fn text_runs_in(doc: &Arc<Node>, from: usize, to: usize) -> Vec<RunRef> {
    let mut runs = Vec::new();
    collect_runs(doc, 0, from, to, &mut runs);
    runs
}

fn collect_runs(node: &Arc<Node>, node_start: usize, from: usize, to: usize, out: &mut Vec<RunRef>) {
    match node.as_ref() {
        Node::Text(t) => {
            let len = t.text.chars().count();
            if node_start < to && node_start + len > from {
                out.push(RunRef {
                    start: node_start,
                    len,
                    marks: t.marks.clone(),
                });
            }
        }
        Node::Element(el) => {
            let mut child_start = node_start + 1;
            for child in &el.children {
                let size = child.node_size();
                if child_start < to && child_start + size > from {
                    collect_runs(child, child_start, from, to, out);
                }
                child_start += size;
            }
        }
    }
}
