use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::node::{patch_apply, AttrPatch, ElementNode, Mark, Node, TextNode};
use crate::position::{locate, rebuild_at, resolve, Location};
use crate::schema::{ContentRule, Schema};

/// The smallest unit of a transaction: a single document edit that is
/// independently invertible. Applying a step yields the inverse step
/// that, applied to the post-step document, recovers the pre-step one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Insert text at `pos`. Strictly inside a run the text inherits the
    /// run's marks. At a run boundary it joins an adjacent run whose
    /// marks equal `marks` (preferring the left one), or starts a new
    /// run otherwise.
    InsertText {
        pos: usize,
        text: String,
        #[serde(default)]
        marks: Vec<Mark>,
    },
    /// Remove `len` characters starting at `pos`. The range must lie
    /// within a single text run; emptying a run removes the run node.
    RemoveText { pos: usize, len: usize },
    /// Insert a node at a child boundary.
    InsertNode { pos: usize, node: Arc<Node> },
    /// Remove the child node starting exactly at `pos`.
    RemoveNode { pos: usize },
    /// Patch the attrs of the element starting at `pos`.
    SetNodeAttrs { pos: usize, patch: AttrPatch },
    /// Replace the mark set of the text run starting at `pos`.
    SetTextMarks { pos: usize, marks: Vec<Mark> },
}

/// Maps positions across one applied step: the span `[start,
/// start+old_len)` was replaced by `new_len` tokens. Positions inside a
/// deleted span collapse to its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMap {
    pub start: usize,
    pub old_len: usize,
    pub new_len: usize,
}

impl StepMap {
    pub const IDENTITY: StepMap = StepMap {
        start: 0,
        old_len: 0,
        new_len: 0,
    };

    pub fn map_pos(&self, pos: usize) -> usize {
        if pos < self.start {
            pos
        } else if pos >= self.start + self.old_len {
            pos - self.old_len + self.new_len
        } else {
            self.start
        }
    }
}

pub(crate) struct StepResult {
    pub doc: Arc<Node>,
    pub inverse: Step,
    pub map: StepMap,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn byte_ix(s: &str, char_ix: usize) -> usize {
    s.char_indices()
        .nth(char_ix)
        .map(|(ix, _)| ix)
        .unwrap_or(s.len())
}

fn rejected(msg: impl Into<String>) -> EngineError {
    EngineError::TransactionRejected(msg.into())
}

/// Resolves a structural position to a child-boundary index within the
/// parent. A text run's start counts as the boundary before it.
fn boundary_index(parent: &ElementNode, offset: usize) -> Result<usize, EngineError> {
    match locate(parent, offset) {
        Location::Boundary { index } => Ok(index),
        Location::InText {
            index,
            char_offset: 0,
            ..
        } => Ok(index),
        Location::InText { .. } => Err(rejected("position is inside a text run")),
        Location::InElement => Err(rejected("position is inside a child node")),
    }
}

/// Applies one step against `doc`, producing the new document, the
/// precise inverse step, and the position map. Precondition failures
/// reject the step without touching the document.
pub(crate) fn apply_step(
    schema: &Schema,
    doc: &Arc<Node>,
    step: &Step,
) -> Result<StepResult, EngineError> {
    match step {
        Step::InsertText { pos, text, marks } => {
            if text.is_empty() {
                return Err(rejected("empty text insertion"));
            }
            let r = resolve(doc, *pos)?;
            let parent = r
                .parent
                .as_element()
                .ok_or_else(|| rejected("insertion parent is not an element"))?;
            match schema.content_rule(&parent.kind) {
                Some(ContentRule::Inline) => {}
                _ => {
                    return Err(rejected(format!(
                        "{} does not hold inline content",
                        parent.kind
                    )));
                }
            }

            let len = char_len(text);
            let offset = r.offset;
            let path = r.parent_path();
            let new_doc = rebuild_at(doc, &path, &mut |el| {
                let mut children = el.children.clone();
                // Splices text at a child boundary: into a matching left
                // neighbor, or as a fresh run carrying the step's marks.
                let splice_at = |children: &mut Vec<Arc<Node>>, index: usize| {
                    let merged_left = index
                        .checked_sub(1)
                        .and_then(|ix| children[ix].as_text().cloned())
                        .filter(|left| crate::node::mark_sets_equal(&left.marks, marks));
                    if let Some(left) = merged_left {
                        children[index - 1] = Arc::new(Node::Text(TextNode {
                            text: format!("{}{}", left.text, text),
                            marks: left.marks,
                        }));
                    } else {
                        children.insert(
                            index,
                            Arc::new(Node::Text(TextNode {
                                text: text.clone(),
                                marks: marks.clone(),
                            })),
                        );
                    }
                };
                match locate(el, offset) {
                    Location::InText {
                        index, char_offset, ..
                    } => {
                        let run = children[index].as_text().cloned().ok_or_else(|| {
                            rejected("located run is not a text node")
                        })?;
                        if char_offset == 0
                            && !crate::node::mark_sets_equal(&run.marks, marks)
                        {
                            splice_at(&mut children, index);
                        } else {
                            let mut new_text = run.text.clone();
                            new_text.insert_str(byte_ix(&run.text, char_offset), text);
                            children[index] = Arc::new(Node::Text(TextNode {
                                text: new_text,
                                marks: run.marks,
                            }));
                        }
                    }
                    Location::Boundary { index } => {
                        splice_at(&mut children, index);
                    }
                    Location::InElement => {
                        return Err(rejected("text insertion inside a child node"));
                    }
                }
                Ok(ElementNode {
                    kind: el.kind.clone(),
                    attrs: el.attrs.clone(),
                    children,
                })
            })?;

            Ok(StepResult {
                doc: new_doc,
                inverse: Step::RemoveText { pos: *pos, len },
                map: StepMap {
                    start: *pos,
                    old_len: 0,
                    new_len: len,
                },
            })
        }

        Step::RemoveText { pos, len } => {
            if *len == 0 {
                return Err(rejected("empty text removal"));
            }
            let r = resolve(doc, *pos)?;
            let parent = r
                .parent
                .as_element()
                .ok_or_else(|| rejected("removal parent is not an element"))?;
            let (index, char_offset) = match locate(parent, r.offset) {
                Location::InText {
                    index, char_offset, ..
                } => (index, char_offset),
                _ => return Err(rejected("removal range does not start in a text run")),
            };
            let run = parent.children[index]
                .as_text()
                .cloned()
                .ok_or_else(|| rejected("located run is not a text node"))?;
            let run_len = char_len(&run.text);
            if char_offset + len > run_len {
                return Err(rejected("removal range crosses the run's end"));
            }

            let start_b = byte_ix(&run.text, char_offset);
            let end_b = byte_ix(&run.text, char_offset + len);
            let removed = run.text[start_b..end_b].to_string();
            let mut new_text = run.text.clone();
            new_text.replace_range(start_b..end_b, "");

            let path = r.parent_path();
            let new_doc = rebuild_at(doc, &path, &mut |el| {
                let mut children = el.children.clone();
                if new_text.is_empty() {
                    children.remove(index);
                } else {
                    children[index] = Arc::new(Node::Text(TextNode {
                        text: new_text.clone(),
                        marks: run.marks.clone(),
                    }));
                }
                Ok(ElementNode {
                    kind: el.kind.clone(),
                    attrs: el.attrs.clone(),
                    children,
                })
            })?;

            Ok(StepResult {
                doc: new_doc,
                inverse: Step::InsertText {
                    pos: *pos,
                    text: removed,
                    marks: run.marks,
                },
                map: StepMap {
                    start: *pos,
                    old_len: *len,
                    new_len: 0,
                },
            })
        }

        Step::InsertNode { pos, node } => {
            let r = resolve(doc, *pos)?;
            let parent = r
                .parent
                .as_element()
                .ok_or_else(|| rejected("insertion parent is not an element"))?;
            let index = boundary_index(parent, r.offset)?;
            let spec = schema
                .node_spec(&parent.kind)
                .ok_or_else(|| rejected(format!("unknown parent kind: {}", parent.kind)))?;
            schema.check_child(spec, node)?;

            let size = node.node_size();
            let path = r.parent_path();
            let new_doc = rebuild_at(doc, &path, &mut |el| {
                let mut children = el.children.clone();
                children.insert(index, node.clone());
                Ok(ElementNode {
                    kind: el.kind.clone(),
                    attrs: el.attrs.clone(),
                    children,
                })
            })?;

            Ok(StepResult {
                doc: new_doc,
                inverse: Step::RemoveNode { pos: *pos },
                map: StepMap {
                    start: *pos,
                    old_len: 0,
                    new_len: size,
                },
            })
        }

        Step::RemoveNode { pos } => {
            let r = resolve(doc, *pos)?;
            let parent = r
                .parent
                .as_element()
                .ok_or_else(|| rejected("removal parent is not an element"))?;
            let index = boundary_index(parent, r.offset)?;
            let removed = parent
                .children
                .get(index)
                .cloned()
                .ok_or_else(|| rejected("no node starts at the removal position"))?;

            let size = removed.node_size();
            let path = r.parent_path();
            let new_doc = rebuild_at(doc, &path, &mut |el| {
                let mut children = el.children.clone();
                children.remove(index);
                Ok(ElementNode {
                    kind: el.kind.clone(),
                    attrs: el.attrs.clone(),
                    children,
                })
            })?;

            Ok(StepResult {
                doc: new_doc,
                inverse: Step::InsertNode {
                    pos: *pos,
                    node: removed,
                },
                map: StepMap {
                    start: *pos,
                    old_len: size,
                    new_len: 0,
                },
            })
        }

        Step::SetNodeAttrs { pos, patch } => {
            let r = resolve(doc, *pos)?;
            let parent = r
                .parent
                .as_element()
                .ok_or_else(|| rejected("target parent is not an element"))?;
            let index = boundary_index(parent, r.offset)?;
            let target = parent
                .children
                .get(index)
                .and_then(|n| n.as_element())
                .ok_or_else(|| rejected("no element starts at the attrs position"))?
                .clone();

            let mut attrs = target.attrs.clone();
            let reverse = patch_apply(&mut attrs, patch);

            let path = r.parent_path();
            let new_doc = rebuild_at(doc, &path, &mut |el| {
                let mut children = el.children.clone();
                children[index] = Arc::new(Node::Element(ElementNode {
                    kind: target.kind.clone(),
                    attrs: attrs.clone(),
                    children: target.children.clone(),
                }));
                Ok(ElementNode {
                    kind: el.kind.clone(),
                    attrs: el.attrs.clone(),
                    children,
                })
            })?;

            Ok(StepResult {
                doc: new_doc,
                inverse: Step::SetNodeAttrs {
                    pos: *pos,
                    patch: reverse,
                },
                map: StepMap::IDENTITY,
            })
        }

        Step::SetTextMarks { pos, marks } => {
            let r = resolve(doc, *pos)?;
            let parent = r
                .parent
                .as_element()
                .ok_or_else(|| rejected("target parent is not an element"))?;
            let index = match locate(parent, r.offset) {
                Location::InText {
                    index,
                    char_offset: 0,
                    ..
                } => index,
                _ => return Err(rejected("no text run starts at the marks position")),
            };
            for mark in marks {
                if schema.mark_spec(&mark.kind).is_none() {
                    return Err(rejected(format!("unknown mark kind: {}", mark.kind)));
                }
            }
            let run = parent.children[index]
                .as_text()
                .cloned()
                .ok_or_else(|| rejected("located run is not a text node"))?;

            let path = r.parent_path();
            let new_doc = rebuild_at(doc, &path, &mut |el| {
                let mut children = el.children.clone();
                children[index] = Arc::new(Node::Text(TextNode {
                    text: run.text.clone(),
                    marks: marks.clone(),
                }));
                Ok(ElementNode {
                    kind: el.kind.clone(),
                    attrs: el.attrs.clone(),
                    children,
                })
            })?;

            Ok(StepResult {
                doc: new_doc,
                inverse: Step::SetTextMarks {
                    pos: *pos,
                    marks: run.marks,
                },
                map: StepMap::IDENTITY,
            })
        }
    }
}
