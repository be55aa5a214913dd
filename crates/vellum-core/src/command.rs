use std::sync::Arc;

use serde_json::Value;

use crate::node::{Attrs, AttrPatch, Mark};
use crate::query::{block_at, get_active_marks, is_mark_active};
use crate::selection::Selection;
use crate::state::EditorState;
use crate::transaction::Transaction;

/// A command inspects the state and optionally produces a transaction.
/// With `dispatch` omitted it only reports applicability ("can-execute"
/// mode) and has no side effects; with `dispatch` supplied it builds and
/// dispatches a transaction when applicable. `true` means handled.
pub type Command =
    Arc<dyn Fn(&EditorState, Option<&mut dyn FnMut(Transaction)>) -> bool + Send + Sync>;

/// Composes commands left to right; the first one that returns `true`
/// short-circuits the rest.
pub fn chain(commands: impl IntoIterator<Item = Command>) -> Command {
    let commands: Vec<Command> = commands.into_iter().collect();
    Arc::new(move |state, mut dispatch| {
        for command in &commands {
            let reborrowed = dispatch
                .as_mut()
                .map(|d| &mut **d as &mut dyn FnMut(Transaction));
            if command(state, reborrowed) {
                return true;
            }
        }
        false
    })
}

/// Replaces the current selection with plain text.
pub fn insert_text(text: impl Into<String>) -> Command {
    let text = text.into();
    Arc::new(move |state, dispatch| {
        let selection = state.selection();
        let marks = get_active_marks(state);
        let mut tr = state.transaction();
        if !selection.is_cursor() {
            tr = match tr.delete_range(selection.from(), selection.to()) {
                Ok(tr) => tr,
                Err(_) => return false,
            };
        }
        let pos = selection.from();
        tr = match tr.insert_text(pos, text.clone(), marks) {
            Ok(tr) => tr,
            Err(_) => return false,
        };
        let len = text.chars().count();
        let tr = tr.set_selection(Selection::cursor(pos + len));
        if let Some(dispatch) = dispatch {
            dispatch(tr);
        }
        true
    })
}

/// Deletes the selected range; a no-op on a cursor.
pub fn delete_selection(
    state: &EditorState,
    dispatch: Option<&mut dyn FnMut(Transaction)>,
) -> bool {
    let selection = state.selection();
    if selection.is_cursor() {
        return false;
    }
    let tr = match state
        .transaction()
        .delete_range(selection.from(), selection.to())
    {
        Ok(tr) => tr,
        Err(_) => return false,
    };
    let tr = tr.set_selection(Selection::cursor(selection.from()));
    if let Some(dispatch) = dispatch {
        dispatch(tr);
    }
    true
}

/// Toggles `mark` over the selected range: removed when the whole range
/// already carries it, added otherwise. A cursor has no range to mark.
pub fn toggle_mark(mark: Mark) -> Command {
    Arc::new(move |state, dispatch| {
        let selection = state.selection();
        if selection.is_cursor() {
            return false;
        }
        let (from, to) = (selection.from(), selection.to());
        let result = if is_mark_active(state, &mark.kind) {
            state.transaction().remove_mark(from, to, &mark.kind)
        } else {
            state.transaction().add_mark(from, to, mark.clone())
        };
        let tr = match result {
            Ok(tr) => tr,
            Err(_) => return false,
        };
        if let Some(dispatch) = dispatch {
            dispatch(tr.set_selection(selection));
        }
        true
    })
}

/// Applies or clears a colored mark (`text_color`, `highlight_color`)
/// over the selection.
pub fn set_mark_color(kind: &'static str, color: Option<String>) -> Command {
    Arc::new(move |state, dispatch| {
        let selection = state.selection();
        if selection.is_cursor() {
            return false;
        }
        let (from, to) = (selection.from(), selection.to());
        let result = match &color {
            Some(color) => state.transaction().add_mark(
                from,
                to,
                Mark::new(kind).with_attr("color", Value::String(color.clone())),
            ),
            None => state.transaction().remove_mark(from, to, kind),
        };
        let tr = match result {
            Ok(tr) => tr,
            Err(_) => return false,
        };
        if let Some(dispatch) = dispatch {
            dispatch(tr.set_selection(selection));
        }
        true
    })
}

/// Rebuilds the block containing the cursor as `kind`, keeping its
/// content. A no-op when the block already matches kind and attrs.
pub fn set_block_type(kind: &'static str, attrs: Attrs) -> Command {
    Arc::new(move |state, dispatch| {
        let Some(block) = block_at(state) else {
            return false;
        };
        let el = match block.node.as_element() {
            Some(el) => el,
            None => return false,
        };
        if el.kind == kind && el.attrs == attrs {
            return false;
        }
        let replacement = match state
            .schema()
            .element(kind, attrs.clone(), el.children.clone())
        {
            Ok(node) => node,
            Err(_) => return false,
        };
        let tr = match state.transaction().replace_node(block.pos, replacement) {
            Ok(tr) => tr,
            Err(_) => return false,
        };
        // Content sizes are unchanged, so the old selection stays valid.
        let tr = tr.set_selection(state.selection());
        if let Some(dispatch) = dispatch {
            dispatch(tr);
        }
        true
    })
}

fn set_block_attr(state: &EditorState, patch: AttrPatch) -> Option<Transaction> {
    let block = block_at(state)?;
    let tr = state.transaction().set_node_attrs(block.pos, patch).ok()?;
    Some(tr.set_selection(state.selection()))
}

/// Sets the block's alignment attr; `"left"` clears it back to the
/// default.
pub fn set_alignment(align: &'static str) -> Command {
    Arc::new(move |state, dispatch| {
        let patch = if align == "left" {
            AttrPatch::remove("align")
        } else {
            AttrPatch::set("align", Value::String(align.to_string()))
        };
        let Some(tr) = set_block_attr(state, patch) else {
            return false;
        };
        if let Some(dispatch) = dispatch {
            dispatch(tr);
        }
        true
    })
}

pub fn set_indent(level: u64) -> Command {
    Arc::new(move |state, dispatch| {
        let patch = if level == 0 {
            AttrPatch::remove("indent")
        } else {
            AttrPatch::set("indent", Value::Number(level.into()))
        };
        let Some(tr) = set_block_attr(state, patch) else {
            return false;
        };
        if let Some(dispatch) = dispatch {
            dispatch(tr);
        }
        true
    })
}

pub fn set_line_height(value: Option<f64>) -> Command {
    Arc::new(move |state, dispatch| {
        let patch = match value.and_then(serde_json::Number::from_f64) {
            Some(number) => AttrPatch::set("line_height", Value::Number(number)),
            None => AttrPatch::remove("line_height"),
        };
        let Some(tr) = set_block_attr(state, patch) else {
            return false;
        };
        if let Some(dispatch) = dispatch {
            dispatch(tr);
        }
        true
    })
}
