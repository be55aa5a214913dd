use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::command::Command;
use crate::plugin::{Plugin, ToolbarItem};
use crate::query::{can_redo, can_undo};
use crate::selection::Selection;
use crate::state::{EditorState, PluginValue};
use crate::step::Step;
use crate::transaction::Transaction;

pub const HISTORY_PLUGIN: &str = "history";

/// Meta key marking a transaction as produced by undo/redo, so the
/// history plugin moves entries between stacks instead of recording.
pub const HISTORY_META: &str = "history";

/// Meta key naming a transaction's origin; `user_only` recording keys
/// off a `"user"` value here.
pub const SOURCE_META: &str = "source";

#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Record only transactions whose source meta is `"user"`.
    pub user_only: bool,
    /// Text edits landing within this window of the previous entry merge
    /// into it, so a burst of typing undoes as one.
    pub delay: Duration,
    /// Depth cap; the oldest entry is dropped when exceeded.
    pub max_stack: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            user_only: false,
            delay: Duration::from_millis(500),
            max_stack: 100,
        }
    }
}

/// One undoable unit: the steps that reverse it plus the selections to
/// restore on either side.
#[derive(Clone)]
pub struct HistoryEntry {
    inverse: Vec<Step>,
    selection_before: Selection,
    selection_after: Selection,
    at: Instant,
}

/// The undo and redo stacks, stored as this plugin's state field so
/// depth queries are pure reads of an `EditorState`.
#[derive(Clone, Default)]
pub struct HistoryState {
    undo: Vec<HistoryEntry>,
    redo: Vec<HistoryEntry>,
}

impl HistoryState {
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }
}

fn history_transaction(
    state: &EditorState,
    entry: &HistoryEntry,
    selection: Selection,
    direction: &str,
) -> Option<Transaction> {
    let mut tr = state.transaction();
    for step in &entry.inverse {
        tr = tr.step(step.clone()).ok()?;
    }
    Some(
        tr.set_selection(selection)
            .set_meta(HISTORY_META, Value::String(direction.to_string())),
    )
}

/// Reverts the newest undo entry, restoring its pre-edit selection.
pub fn undo(state: &EditorState, dispatch: Option<&mut dyn FnMut(Transaction)>) -> bool {
    let Some(history) = state.plugin_field::<HistoryState>(HISTORY_PLUGIN) else {
        return false;
    };
    let Some(entry) = history.undo.last() else {
        return false;
    };
    let Some(dispatch) = dispatch else {
        return true;
    };
    let Some(tr) = history_transaction(state, entry, entry.selection_before, "undo") else {
        return false;
    };
    dispatch(tr);
    true
}

/// Re-applies the newest redo entry, restoring its post-edit selection.
pub fn redo(state: &EditorState, dispatch: Option<&mut dyn FnMut(Transaction)>) -> bool {
    let Some(history) = state.plugin_field::<HistoryState>(HISTORY_PLUGIN) else {
        return false;
    };
    let Some(entry) = history.redo.last() else {
        return false;
    };
    let Some(dispatch) = dispatch else {
        return true;
    };
    let Some(tr) = history_transaction(state, entry, entry.selection_after, "redo") else {
        return false;
    };
    dispatch(tr);
    true
}

fn text_only(steps: &[Step]) -> bool {
    steps
        .iter()
        .all(|step| matches!(step, Step::InsertText { .. } | Step::RemoveText { .. }))
}

/// Tracks document history as a plugin state field. Undo and redo are
/// ordinary transactions tagged via meta, so they flow through the same
/// dispatch pipeline as any other edit.
pub struct HistoryPlugin {
    config: HistoryConfig,
}

impl HistoryPlugin {
    pub fn new(config: HistoryConfig) -> Self {
        Self { config }
    }
}

impl Default for HistoryPlugin {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl Plugin for HistoryPlugin {
    fn name(&self) -> &'static str {
        HISTORY_PLUGIN
    }

    fn initial_state(&self) -> Option<PluginValue> {
        Some(Arc::new(HistoryState::default()))
    }

    fn apply_state(
        &self,
        tr: &Transaction,
        value: Option<&PluginValue>,
        old_state: &EditorState,
        new_state: &EditorState,
    ) -> Option<PluginValue> {
        let mut history = value
            .and_then(|v| v.downcast_ref::<HistoryState>())
            .cloned()
            .unwrap_or_default();

        match tr.meta(HISTORY_META).and_then(Value::as_str) {
            Some("undo") => {
                let entry = history.undo.pop()?;
                // The dispatched transaction holds the inverse steps;
                // inverting it again recovers the forward edit for redo.
                let inverse = tr.inverted(old_state.doc()).ok()?;
                history.redo.push(HistoryEntry {
                    inverse,
                    selection_before: entry.selection_before,
                    selection_after: entry.selection_after,
                    at: Instant::now(),
                });
            }
            Some("redo") => {
                let entry = history.redo.pop()?;
                let inverse = tr.inverted(old_state.doc()).ok()?;
                history.undo.push(HistoryEntry {
                    inverse,
                    selection_before: entry.selection_before,
                    selection_after: entry.selection_after,
                    at: Instant::now(),
                });
            }
            _ => {
                if tr.steps().is_empty() {
                    return None;
                }
                // Any new edit invalidates the redo stack.
                history.redo.clear();

                let recordable = !self.config.user_only
                    || tr.meta(SOURCE_META).and_then(Value::as_str) == Some("user");
                if recordable {
                    let inverse = tr.inverted(old_state.doc()).ok()?;
                    let now = Instant::now();
                    let coalesce = !self.config.delay.is_zero()
                        && text_only(tr.steps())
                        && history.undo.last().is_some_and(|last| {
                            text_only(&last.inverse)
                                && now.duration_since(last.at) <= self.config.delay
                        });
                    if coalesce {
                        let last = history.undo.last_mut()?;
                        // Undoing the merged entry plays the new inverse
                        // first, then the older one.
                        let mut merged = inverse;
                        merged.extend(last.inverse.iter().cloned());
                        last.inverse = merged;
                        last.selection_after = new_state.selection();
                        last.at = now;
                    } else {
                        history.undo.push(HistoryEntry {
                            inverse,
                            selection_before: old_state.selection(),
                            selection_after: new_state.selection(),
                            at: now,
                        });
                        if history.undo.len() > self.config.max_stack {
                            history.undo.remove(0);
                        }
                    }
                }
            }
        }

        Some(Arc::new(history))
    }

    fn keymap(&self) -> Vec<(&'static str, Command)> {
        vec![
            ("Mod-Z", Arc::new(undo) as Command),
            ("Mod-Shift-Z", Arc::new(redo) as Command),
            ("Mod-Y", Arc::new(redo) as Command),
        ]
    }

    fn toolbar_items(&self) -> Vec<ToolbarItem> {
        vec![
            ToolbarItem::button("undo", Arc::new(undo) as Command)
                .icon("undo")
                .shortcut("Mod-Z")
                .enabled(can_undo),
            ToolbarItem::button("redo", Arc::new(redo) as Command)
                .icon("redo")
                .shortcut("Mod-Shift-Z")
                .enabled(can_redo),
        ]
    }
}
