use std::sync::Arc;

use serde_json::Value;

use crate::history::{HistoryState, HISTORY_PLUGIN};
use crate::node::{Attrs, Mark, Node};
use crate::position::{locate, resolve, text_runs_in, Location};
use crate::schema::ContentRule;
use crate::state::EditorState;

/// A text block (an element with inline content) and the absolute
/// position of its open token.
#[derive(Debug, Clone)]
pub struct BlockRef {
    pub node: Arc<Node>,
    pub pos: usize,
}

/// The innermost text block containing the selection head. `None` when
/// the head sits outside any inline context (e.g. between table rows).
pub fn block_at(state: &EditorState) -> Option<BlockRef> {
    let r = resolve(state.doc(), state.selection().head).ok()?;
    let mut chain: Vec<BlockRef> = Vec::with_capacity(r.depth());
    for step in &r.path {
        let el = step.parent.as_element()?;
        chain.push(BlockRef {
            node: el.children.get(step.child_index)?.clone(),
            pos: step.child_start,
        });
    }
    chain.into_iter().rev().find(|block| {
        matches!(
            state.schema().content_rule(block.node.kind()),
            Some(ContentRule::Inline)
        )
    })
}

pub fn get_block_type(state: &EditorState) -> Option<String> {
    block_at(state).map(|block| block.node.kind().to_string())
}

pub fn get_block_attrs(state: &EditorState) -> Option<Attrs> {
    let block = block_at(state)?;
    block.node.as_element().map(|el| el.attrs.clone())
}

/// Block alignment, defaulting to `"left"` when the attr is absent.
pub fn get_alignment(state: &EditorState) -> String {
    get_block_attrs(state)
        .and_then(|attrs| attrs.get("align").and_then(|v| v.as_str().map(String::from)))
        .unwrap_or_else(|| "left".to_string())
}

/// Block indent level, defaulting to zero.
pub fn get_indent(state: &EditorState) -> u64 {
    get_block_attrs(state)
        .and_then(|attrs| attrs.get("indent").and_then(Value::as_u64))
        .unwrap_or(0)
}

pub fn get_line_height(state: &EditorState) -> Option<f64> {
    get_block_attrs(state).and_then(|attrs| attrs.get("line_height").and_then(Value::as_f64))
}

/// Marks in effect at a cursor: the marks of the run the cursor touches,
/// preferring the run it just left (so typing continues its styling).
fn marks_at_cursor(state: &EditorState, pos: usize) -> Vec<Mark> {
    let Ok(r) = resolve(state.doc(), pos) else {
        return Vec::new();
    };
    let Some(parent) = r.parent.as_element() else {
        return Vec::new();
    };
    match locate(parent, r.offset) {
        Location::InText {
            index, char_offset, ..
        } => {
            if char_offset == 0 {
                // At the run's start, the preceding run's marks win when
                // there is one.
                if let Some(left) = index
                    .checked_sub(1)
                    .and_then(|ix| parent.children[ix].as_text())
                {
                    return left.marks.clone();
                }
            }
            parent.children[index]
                .as_text()
                .map(|t| t.marks.clone())
                .unwrap_or_default()
        }
        Location::Boundary { index } => index
            .checked_sub(1)
            .and_then(|ix| parent.children[ix].as_text())
            .map(|t| t.marks.clone())
            .unwrap_or_default(),
        Location::InElement => Vec::new(),
    }
}

/// Whether every character in the selection carries a mark of `kind`.
/// On a cursor this reflects the marks the next insertion would inherit.
pub fn is_mark_active(state: &EditorState, kind: &str) -> bool {
    let selection = state.selection();
    if selection.is_cursor() {
        return marks_at_cursor(state, selection.head)
            .iter()
            .any(|m| m.kind == kind);
    }
    let runs = text_runs_in(state.doc(), selection.from(), selection.to());
    !runs.is_empty() && runs.iter().all(|run| run.marks.iter().any(|m| m.kind == kind))
}

/// The marks shared by the whole selection (or in effect at the cursor).
pub fn get_active_marks(state: &EditorState) -> Vec<Mark> {
    let selection = state.selection();
    if selection.is_cursor() {
        return marks_at_cursor(state, selection.head);
    }
    let runs = text_runs_in(state.doc(), selection.from(), selection.to());
    let Some((first, rest)) = runs.split_first() else {
        return Vec::new();
    };
    first
        .marks
        .iter()
        .filter(|mark| {
            rest.iter()
                .all(|run| run.marks.iter().any(|m| m.kind == mark.kind))
        })
        .cloned()
        .collect()
}

pub fn can_undo(state: &EditorState) -> bool {
    state
        .plugin_field::<HistoryState>(HISTORY_PLUGIN)
        .is_some_and(|history| history.can_undo())
}

pub fn can_redo(state: &EditorState) -> bool {
    state
        .plugin_field::<HistoryState>(HISTORY_PLUGIN)
        .is_some_and(|history| history.can_redo())
}
