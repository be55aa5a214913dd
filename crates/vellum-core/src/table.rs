use std::sync::Arc;

use serde_json::Value;

use crate::command::Command;
use crate::error::EngineError;
use crate::node::{AttrPatch, ElementNode, Node};
use crate::plugin::{ContextMenuItem, MenuContext, Plugin, ToolbarItem};
use crate::position::resolve;
use crate::schema::{ContentRule, NodeRole, NodeSpec, Schema, SchemaExtensions};
use crate::selection::Selection;
use crate::state::EditorState;
use crate::transaction::Transaction;

/// Where a position sits inside a table: the table node, its open-token
/// position, and the row/cell indices on the descent path.
#[derive(Debug, Clone)]
pub struct TableContext {
    pub table: Arc<Node>,
    pub table_pos: usize,
    pub row_index: usize,
    pub cell_index: usize,
}

/// The table context of the selection head, or `None` outside a table.
pub fn table_context(state: &EditorState) -> Option<TableContext> {
    table_context_at(state, state.selection().head)
}

pub fn table_context_at(state: &EditorState, pos: usize) -> Option<TableContext> {
    let r = resolve(state.doc(), pos).ok()?;
    for (depth, step) in r.path.iter().enumerate() {
        let parent = step.parent.as_element()?;
        let child = parent.children.get(step.child_index)?;
        if child.kind() == "table" {
            let row_step = r.path.get(depth + 1)?;
            let cell_step = r.path.get(depth + 2)?;
            return Some(TableContext {
                table: child.clone(),
                table_pos: step.child_start,
                row_index: row_step.child_index,
                cell_index: cell_step.child_index,
            });
        }
    }
    None
}

/// A fresh `rows x cols` table; every cell holds one empty paragraph.
pub fn table_node(schema: &Schema, rows: usize, cols: usize) -> Result<Arc<Node>, EngineError> {
    let rows = rows.max(1);
    let mut row_nodes = Vec::with_capacity(rows);
    for _ in 0..rows {
        row_nodes.push(table_row_node(schema, cols)?);
    }
    schema.block("table", row_nodes)
}

fn table_row_node(schema: &Schema, cols: usize) -> Result<Arc<Node>, EngineError> {
    let cols = cols.max(1);
    let mut cells = Vec::with_capacity(cols);
    for _ in 0..cols {
        cells.push(table_cell_node(schema)?);
    }
    schema.block("table_row", cells)
}

fn table_cell_node(schema: &Schema) -> Result<Arc<Node>, EngineError> {
    let para = schema.paragraph("")?;
    schema.block("table_cell", vec![para])
}

/// Open-token position of the row at `row_index`.
fn row_pos(table_el: &ElementNode, table_pos: usize, row_index: usize) -> usize {
    let mut pos = table_pos + 1;
    for row in &table_el.children[..row_index] {
        pos += row.node_size();
    }
    pos
}

/// Open-token position of cell `(row_index, cell_index)`.
fn cell_pos(
    table_el: &ElementNode,
    table_pos: usize,
    row_index: usize,
    cell_index: usize,
) -> Option<usize> {
    let row_el = table_el.children.get(row_index)?.as_element()?;
    let mut pos = row_pos(table_el, table_pos, row_index) + 1;
    for cell in row_el.children.get(..cell_index)? {
        pos += cell.node_size();
    }
    Some(pos)
}

/// The cursor position inside a cell's first block: past the cell's open
/// token and the block's open token.
fn cell_cursor(cell_pos: usize) -> usize {
    cell_pos + 2
}

fn span_attr(el: &ElementNode, name: &str) -> u64 {
    el.attrs.get(name).and_then(Value::as_u64).unwrap_or(1)
}

fn dispatch_tr(dispatch: Option<&mut dyn FnMut(Transaction)>, tr: Transaction) -> bool {
    if let Some(dispatch) = dispatch {
        dispatch(tr);
    }
    true
}

/// Inserts a fresh table after the top-level block containing the
/// cursor and places the cursor in cell (0, 0).
pub fn insert_table(rows: usize, cols: usize) -> Command {
    Arc::new(move |state, dispatch| {
        let Ok(r) = resolve(state.doc(), state.selection().head) else {
            return false;
        };
        let insert_pos = match r.path.first() {
            Some(step) => {
                let Some(block) = step
                    .parent
                    .as_element()
                    .and_then(|el| el.children.get(step.child_index))
                else {
                    return false;
                };
                step.child_start + block.node_size()
            }
            None => 1 + state.doc().content_size(),
        };
        let Ok(table) = table_node(state.schema(), rows, cols) else {
            return false;
        };
        let Ok(tr) = state.transaction().insert_node(insert_pos, table) else {
            return false;
        };
        // insert_pos + 1 (row open) + 1 (cell open) + 2 reaches the first
        // cell's paragraph content.
        let tr = tr.set_selection(Selection::cursor(insert_pos + 4));
        dispatch_tr(dispatch, tr)
    })
}

fn insert_row(
    state: &EditorState,
    dispatch: Option<&mut dyn FnMut(Transaction)>,
    ctx: &TableContext,
    index: usize,
) -> bool {
    let Some(table_el) = ctx.table.as_element() else {
        return false;
    };
    let cols = table_el
        .children
        .get(ctx.row_index)
        .and_then(|row| row.as_element())
        .map(|row| row.children.len())
        .unwrap_or(1);
    let Ok(row) = table_row_node(state.schema(), cols) else {
        return false;
    };
    let pos = row_pos(table_el, ctx.table_pos, index);
    let Ok(tr) = state.transaction().insert_node(pos, row) else {
        return false;
    };
    // No explicit selection: the prior cursor is projected through the
    // step maps, staying in its cell.
    dispatch_tr(dispatch, tr)
}

pub fn add_row_before(state: &EditorState, dispatch: Option<&mut dyn FnMut(Transaction)>) -> bool {
    let Some(ctx) = table_context(state) else {
        return false;
    };
    insert_row(state, dispatch, &ctx, ctx.row_index)
}

pub fn add_row_after(state: &EditorState, dispatch: Option<&mut dyn FnMut(Transaction)>) -> bool {
    let Some(ctx) = table_context(state) else {
        return false;
    };
    insert_row(state, dispatch, &ctx, ctx.row_index + 1)
}

fn insert_column(
    state: &EditorState,
    dispatch: Option<&mut dyn FnMut(Transaction)>,
    ctx: &TableContext,
    after: bool,
) -> bool {
    let Some(table_el) = ctx.table.as_element() else {
        return false;
    };
    let mut tr = state.transaction();
    // Bottom to top, so positions computed against the original table
    // stay valid as cells are inserted.
    for row_index in (0..table_el.children.len()).rev() {
        let Some(row_el) = table_el.children[row_index].as_element() else {
            return false;
        };
        let index = (ctx.cell_index + usize::from(after)).min(row_el.children.len());
        let mut pos = row_pos(table_el, ctx.table_pos, row_index) + 1;
        for cell in &row_el.children[..index] {
            pos += cell.node_size();
        }
        let Ok(cell) = table_cell_node(state.schema()) else {
            return false;
        };
        tr = match tr.insert_node(pos, cell) {
            Ok(tr) => tr,
            Err(_) => return false,
        };
    }
    dispatch_tr(dispatch, tr)
}

pub fn add_column_before(
    state: &EditorState,
    dispatch: Option<&mut dyn FnMut(Transaction)>,
) -> bool {
    let Some(ctx) = table_context(state) else {
        return false;
    };
    insert_column(state, dispatch, &ctx, false)
}

pub fn add_column_after(
    state: &EditorState,
    dispatch: Option<&mut dyn FnMut(Transaction)>,
) -> bool {
    let Some(ctx) = table_context(state) else {
        return false;
    };
    insert_column(state, dispatch, &ctx, true)
}

/// Removes the current row. The last remaining row cannot be deleted;
/// use `delete_table` instead.
pub fn delete_row(state: &EditorState, dispatch: Option<&mut dyn FnMut(Transaction)>) -> bool {
    let Some(ctx) = table_context(state) else {
        return false;
    };
    let Some(table_el) = ctx.table.as_element() else {
        return false;
    };
    if table_el.children.len() <= 1 {
        return false;
    }
    let pos = row_pos(table_el, ctx.table_pos, ctx.row_index);
    let Ok(tr) = state.transaction().remove_node(pos) else {
        return false;
    };

    // Land the cursor in the same column of the nearest surviving row.
    let remaining: Vec<&Arc<Node>> = table_el
        .children
        .iter()
        .enumerate()
        .filter(|(ix, _)| *ix != ctx.row_index)
        .map(|(_, row)| row)
        .collect();
    let target_row = ctx.row_index.min(remaining.len() - 1);
    let Some(row_el) = remaining[target_row].as_element() else {
        return false;
    };
    let target_cell = ctx.cell_index.min(row_el.children.len().saturating_sub(1));
    let mut cursor = ctx.table_pos + 1;
    for row in &remaining[..target_row] {
        cursor += row.node_size();
    }
    cursor += 1;
    for cell in &row_el.children[..target_cell] {
        cursor += cell.node_size();
    }
    dispatch_tr(dispatch, tr.set_selection(Selection::cursor(cell_cursor(cursor))))
}

/// Removes the current column from every row. A single-column table
/// cannot lose its last column.
pub fn delete_column(state: &EditorState, dispatch: Option<&mut dyn FnMut(Transaction)>) -> bool {
    let Some(ctx) = table_context(state) else {
        return false;
    };
    let Some(table_el) = ctx.table.as_element() else {
        return false;
    };
    let Some(current_row) = table_el
        .children
        .get(ctx.row_index)
        .and_then(|row| row.as_element())
    else {
        return false;
    };
    if current_row.children.len() <= 1 {
        return false;
    }

    let mut tr = state.transaction();
    let mut removed_sizes = vec![0usize; table_el.children.len()];
    for row_index in (0..table_el.children.len()).rev() {
        let Some(row_el) = table_el.children[row_index].as_element() else {
            return false;
        };
        if row_el.children.len() <= 1 {
            continue;
        }
        let index = ctx.cell_index.min(row_el.children.len() - 1);
        removed_sizes[row_index] = row_el.children[index].node_size();
        let Some(pos) = cell_pos(table_el, ctx.table_pos, row_index, index) else {
            return false;
        };
        tr = match tr.remove_node(pos) {
            Ok(tr) => tr,
            Err(_) => return false,
        };
    }

    // Cursor into the neighboring cell of the same row, positions taken
    // against the post-delete sizes.
    let removed_index = ctx.cell_index.min(current_row.children.len() - 1);
    let target_cell = if removed_index == current_row.children.len() - 1 {
        removed_index.saturating_sub(1)
    } else {
        removed_index
    };
    let mut cursor = ctx.table_pos + 1;
    for (row, removed) in table_el.children[..ctx.row_index]
        .iter()
        .zip(&removed_sizes)
    {
        cursor += row.node_size() - removed;
    }
    cursor += 1;
    for (ix, cell) in current_row.children.iter().enumerate() {
        if ix == removed_index {
            continue;
        }
        let logical = if ix > removed_index { ix - 1 } else { ix };
        if logical < target_cell {
            cursor += cell.node_size();
        }
    }
    dispatch_tr(dispatch, tr.set_selection(Selection::cursor(cell_cursor(cursor))))
}

/// Removes the whole table, leaving an empty paragraph in its place.
pub fn delete_table(state: &EditorState, dispatch: Option<&mut dyn FnMut(Transaction)>) -> bool {
    let Some(ctx) = table_context(state) else {
        return false;
    };
    let Ok(para) = state.schema().paragraph("") else {
        return false;
    };
    let tr = state
        .transaction()
        .remove_node(ctx.table_pos)
        .and_then(|tr| tr.insert_node(ctx.table_pos, para));
    let Ok(tr) = tr else {
        return false;
    };
    dispatch_tr(
        dispatch,
        tr.set_selection(Selection::cursor(ctx.table_pos + 1)),
    )
}

/// Merges the cells covered by the selection into one, when they form a
/// straight horizontal or vertical run. The merged cell records the
/// combined extent in its `colspan`/`rowspan` attr.
pub fn merge_cells(state: &EditorState, dispatch: Option<&mut dyn FnMut(Transaction)>) -> bool {
    let selection = state.selection();
    if selection.is_cursor() {
        return false;
    }
    let (Some(a), Some(b)) = (
        table_context_at(state, selection.from()),
        table_context_at(state, selection.to()),
    ) else {
        return false;
    };
    if a.table_pos != b.table_pos {
        return false;
    }
    let Some(table_el) = a.table.as_element() else {
        return false;
    };

    if a.row_index == b.row_index && a.cell_index != b.cell_index {
        merge_horizontal(state, dispatch, table_el, &a, b.cell_index)
    } else if a.cell_index == b.cell_index && a.row_index != b.row_index {
        merge_vertical(state, dispatch, table_el, &a, b.row_index)
    } else {
        false
    }
}

fn merge_horizontal(
    state: &EditorState,
    dispatch: Option<&mut dyn FnMut(Transaction)>,
    table_el: &ElementNode,
    ctx: &TableContext,
    other_cell: usize,
) -> bool {
    let (lo, hi) = (
        ctx.cell_index.min(other_cell),
        ctx.cell_index.max(other_cell),
    );
    let Some(row_el) = table_el
        .children
        .get(ctx.row_index)
        .and_then(|row| row.as_element())
    else {
        return false;
    };
    if hi >= row_el.children.len() {
        return false;
    }

    let mut children = Vec::new();
    let mut span = 0u64;
    for cell in &row_el.children[lo..=hi] {
        let Some(el) = cell.as_element() else {
            return false;
        };
        children.extend(el.children.iter().cloned());
        span += span_attr(el, "colspan");
    }
    let Some(first) = row_el.children[lo].as_element() else {
        return false;
    };
    let mut attrs = first.attrs.clone();
    attrs.insert("colspan".to_string(), Value::Number(span.into()));
    let Ok(merged) = state.schema().element("table_cell", attrs, children) else {
        return false;
    };

    let mut tr = state.transaction();
    for cell_index in (lo..=hi).rev() {
        let Some(pos) = cell_pos(table_el, ctx.table_pos, ctx.row_index, cell_index) else {
            return false;
        };
        tr = match tr.remove_node(pos) {
            Ok(tr) => tr,
            Err(_) => return false,
        };
    }
    let Some(target) = cell_pos(table_el, ctx.table_pos, ctx.row_index, lo) else {
        return false;
    };
    tr = match tr.insert_node(target, merged) {
        Ok(tr) => tr,
        Err(_) => return false,
    };
    dispatch_tr(dispatch, tr.set_selection(Selection::cursor(cell_cursor(target))))
}

fn merge_vertical(
    state: &EditorState,
    dispatch: Option<&mut dyn FnMut(Transaction)>,
    table_el: &ElementNode,
    ctx: &TableContext,
    other_row: usize,
) -> bool {
    let (lo, hi) = (ctx.row_index.min(other_row), ctx.row_index.max(other_row));
    if hi >= table_el.children.len() {
        return false;
    }

    let mut children = Vec::new();
    let mut span = 0u64;
    for row in &table_el.children[lo..=hi] {
        let Some(cell) = row
            .as_element()
            .and_then(|row_el| row_el.children.get(ctx.cell_index))
            .and_then(|cell| cell.as_element())
        else {
            return false;
        };
        children.extend(cell.children.iter().cloned());
        span += span_attr(cell, "rowspan");
    }
    let Some(first) = table_el.children[lo]
        .as_element()
        .and_then(|row_el| row_el.children.get(ctx.cell_index))
        .and_then(|cell| cell.as_element())
    else {
        return false;
    };
    let mut attrs = first.attrs.clone();
    attrs.insert("rowspan".to_string(), Value::Number(span.into()));
    let Ok(merged) = state.schema().element("table_cell", attrs, children) else {
        return false;
    };

    let mut tr = state.transaction();
    // Lower rows lose their cell first, bottom to top, so every position
    // is taken against the original table.
    for row_index in ((lo + 1)..=hi).rev() {
        let Some(pos) = cell_pos(table_el, ctx.table_pos, row_index, ctx.cell_index) else {
            return false;
        };
        tr = match tr.remove_node(pos) {
            Ok(tr) => tr,
            Err(_) => return false,
        };
    }
    let Some(target) = cell_pos(table_el, ctx.table_pos, lo, ctx.cell_index) else {
        return false;
    };
    tr = match tr
        .remove_node(target)
        .and_then(|tr| tr.insert_node(target, merged))
    {
        Ok(tr) => tr,
        Err(_) => return false,
    };
    dispatch_tr(dispatch, tr.set_selection(Selection::cursor(cell_cursor(target))))
}

/// Splits a previously merged cell back into unit cells. The original
/// cell keeps the content; the reclaimed slots get empty cells.
pub fn split_cell(state: &EditorState, dispatch: Option<&mut dyn FnMut(Transaction)>) -> bool {
    let Some(ctx) = table_context(state) else {
        return false;
    };
    let Some(table_el) = ctx.table.as_element() else {
        return false;
    };
    let Some(cell_el) = table_el
        .children
        .get(ctx.row_index)
        .and_then(|row| row.as_element())
        .and_then(|row_el| row_el.children.get(ctx.cell_index))
        .and_then(|cell| cell.as_element())
    else {
        return false;
    };
    let colspan = span_attr(cell_el, "colspan");
    let rowspan = span_attr(cell_el, "rowspan");
    let Some(base) = cell_pos(table_el, ctx.table_pos, ctx.row_index, ctx.cell_index) else {
        return false;
    };

    if colspan > 1 {
        let mut attrs = cell_el.attrs.clone();
        attrs.remove("colspan");
        let Ok(first) = state
            .schema()
            .element("table_cell", attrs, cell_el.children.clone())
        else {
            return false;
        };
        let first_size = first.node_size();
        let mut tr = match state
            .transaction()
            .remove_node(base)
            .and_then(|tr| tr.insert_node(base, first))
        {
            Ok(tr) => tr,
            Err(_) => return false,
        };
        let mut pos = base + first_size;
        for _ in 1..colspan {
            let Ok(empty) = table_cell_node(state.schema()) else {
                return false;
            };
            let size = empty.node_size();
            tr = match tr.insert_node(pos, empty) {
                Ok(tr) => tr,
                Err(_) => return false,
            };
            pos += size;
        }
        return dispatch_tr(dispatch, tr.set_selection(Selection::cursor(cell_cursor(base))));
    }

    if rowspan > 1 {
        let mut tr = state.transaction();
        let last_row = (ctx.row_index + rowspan as usize - 1).min(table_el.children.len() - 1);
        for row_index in ((ctx.row_index + 1)..=last_row).rev() {
            let Some(row_el) = table_el.children[row_index].as_element() else {
                return false;
            };
            let index = ctx.cell_index.min(row_el.children.len());
            let mut pos = row_pos(table_el, ctx.table_pos, row_index) + 1;
            for cell in &row_el.children[..index] {
                pos += cell.node_size();
            }
            let Ok(empty) = table_cell_node(state.schema()) else {
                return false;
            };
            tr = match tr.insert_node(pos, empty) {
                Ok(tr) => tr,
                Err(_) => return false,
            };
        }
        tr = match tr.set_node_attrs(base, AttrPatch::remove("rowspan")) {
            Ok(tr) => tr,
            Err(_) => return false,
        };
        return dispatch_tr(dispatch, tr.set_selection(Selection::cursor(cell_cursor(base))));
    }

    false
}

/// Moves the cursor to the next cell in reading order. On the last cell
/// a new row is appended and the cursor stays put; the following call
/// moves into it.
pub fn move_to_next_cell(
    state: &EditorState,
    dispatch: Option<&mut dyn FnMut(Transaction)>,
) -> bool {
    let Some(ctx) = table_context(state) else {
        return false;
    };
    let Some(table_el) = ctx.table.as_element() else {
        return false;
    };
    let Some(row_el) = table_el
        .children
        .get(ctx.row_index)
        .and_then(|row| row.as_element())
    else {
        return false;
    };

    let (mut row_index, mut cell_index) = (ctx.row_index, ctx.cell_index + 1);
    if cell_index >= row_el.children.len() {
        row_index += 1;
        cell_index = 0;
    }
    if row_index >= table_el.children.len() {
        return insert_row(state, dispatch, &ctx, table_el.children.len());
    }
    let Some(pos) = cell_pos(table_el, ctx.table_pos, row_index, cell_index) else {
        return false;
    };
    let tr = state
        .transaction()
        .set_selection(Selection::cursor(cell_cursor(pos)));
    dispatch_tr(dispatch, tr)
}

/// Moves the cursor to the previous cell, wrapping to the end of the
/// prior row. On cell (0, 0) there is nowhere to go.
pub fn move_to_prev_cell(
    state: &EditorState,
    dispatch: Option<&mut dyn FnMut(Transaction)>,
) -> bool {
    let Some(ctx) = table_context(state) else {
        return false;
    };
    let Some(table_el) = ctx.table.as_element() else {
        return false;
    };

    let (row_index, cell_index) = if ctx.cell_index > 0 {
        (ctx.row_index, ctx.cell_index - 1)
    } else if ctx.row_index > 0 {
        let Some(prev_row) = table_el
            .children
            .get(ctx.row_index - 1)
            .and_then(|row| row.as_element())
        else {
            return false;
        };
        (ctx.row_index - 1, prev_row.children.len().saturating_sub(1))
    } else {
        return false;
    };
    let Some(pos) = cell_pos(table_el, ctx.table_pos, row_index, cell_index) else {
        return false;
    };
    let tr = state
        .transaction()
        .set_selection(Selection::cursor(cell_cursor(pos)));
    dispatch_tr(dispatch, tr)
}

/// Table support: schema kinds, Tab navigation, and the structural edit
/// commands exposed through the toolbar and context menu.
#[derive(Default)]
pub struct TablePlugin;

impl Plugin for TablePlugin {
    fn name(&self) -> &'static str {
        "table"
    }

    fn schema_extensions(&self) -> SchemaExtensions {
        SchemaExtensions {
            nodes: vec![
                NodeSpec {
                    kind: "table".to_string(),
                    role: NodeRole::Block,
                    content: ContentRule::Only(vec!["table_row".to_string()]),
                },
                NodeSpec {
                    kind: "table_row".to_string(),
                    role: NodeRole::Block,
                    content: ContentRule::Only(vec!["table_cell".to_string()]),
                },
                NodeSpec {
                    kind: "table_cell".to_string(),
                    role: NodeRole::Block,
                    content: ContentRule::Block,
                },
            ],
            marks: Vec::new(),
        }
    }

    fn keymap(&self) -> Vec<(&'static str, Command)> {
        vec![
            ("Tab", Arc::new(move_to_next_cell) as Command),
            ("Shift-Tab", Arc::new(move_to_prev_cell) as Command),
        ]
    }

    fn toolbar_items(&self) -> Vec<ToolbarItem> {
        vec![ToolbarItem::button("insert_table", insert_table(2, 2))
            .icon("table")
            .label("Table")]
    }

    fn context_menu_items(&self, context: &MenuContext<'_>) -> Vec<ContextMenuItem> {
        if table_context(context.state).is_none() {
            return Vec::new();
        }
        vec![
            ContextMenuItem::new(
                "add_row_before",
                "Insert row above",
                Arc::new(add_row_before) as Command,
                "table",
                10,
            ),
            ContextMenuItem::new(
                "add_row_after",
                "Insert row below",
                Arc::new(add_row_after) as Command,
                "table",
                11,
            ),
            ContextMenuItem::new(
                "add_column_before",
                "Insert column left",
                Arc::new(add_column_before) as Command,
                "table",
                12,
            ),
            ContextMenuItem::new(
                "add_column_after",
                "Insert column right",
                Arc::new(add_column_after) as Command,
                "table",
                13,
            ),
            ContextMenuItem::new(
                "delete_row",
                "Delete row",
                Arc::new(delete_row) as Command,
                "table",
                20,
            )
            .enabled(|state| delete_row(state, None)),
            ContextMenuItem::new(
                "delete_column",
                "Delete column",
                Arc::new(delete_column) as Command,
                "table",
                21,
            )
            .enabled(|state| delete_column(state, None)),
            ContextMenuItem::new(
                "merge_cells",
                "Merge cells",
                Arc::new(merge_cells) as Command,
                "table",
                30,
            )
            .enabled(|state| merge_cells(state, None)),
            ContextMenuItem::new(
                "split_cell",
                "Split cell",
                Arc::new(split_cell) as Command,
                "table",
                31,
            )
            .enabled(|state| split_cell(state, None)),
            ContextMenuItem::new(
                "delete_table",
                "Delete table",
                Arc::new(delete_table) as Command,
                "table",
                40,
            ),
        ]
    }
}
