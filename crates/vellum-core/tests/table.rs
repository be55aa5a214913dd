use std::sync::Arc;

use vellum_core::{
    add_column_after, add_row_after, default_plugins, delete_column, delete_row, delete_table,
    insert_table, merge_cells, split_cell, table_context, Command, Editor, EditorState,
    ElementNode, Selection, Transaction,
};

fn cmd(
    f: fn(&EditorState, Option<&mut dyn FnMut(Transaction)>) -> bool,
) -> Command {
    Arc::new(f)
}

fn table_editor() -> Editor {
    let mut editor = Editor::new(default_plugins()).unwrap();
    assert!(editor.execute(&insert_table(2, 2)).unwrap());
    editor
}

fn table_el(editor: &Editor) -> &ElementNode {
    editor.doc().as_element().unwrap().children[1]
        .as_element()
        .unwrap()
}

fn row_len(editor: &Editor, row: usize) -> usize {
    table_el(editor).children[row]
        .as_element()
        .unwrap()
        .children
        .len()
}

fn select(editor: &mut Editor, anchor: usize, head: usize) {
    let tr = editor
        .state()
        .transaction()
        .set_selection(Selection::range(anchor, head));
    editor.dispatch(tr).unwrap();
}

#[test]
fn inserting_a_table_places_the_cursor_in_the_first_cell() {
    let editor = table_editor();

    // Leading paragraph spans 1..3, so the table opens at 3; the first
    // cell's content starts four tokens in.
    assert_eq!(editor.selection(), Selection::cursor(7));

    let ctx = table_context(editor.state()).unwrap();
    assert_eq!(ctx.table_pos, 3);
    assert_eq!(ctx.row_index, 0);
    assert_eq!(ctx.cell_index, 0);
    assert_eq!(table_el(&editor).children.len(), 2);
    assert_eq!(row_len(&editor, 0), 2);
}

#[test]
fn tab_walks_the_cells_in_reading_order() {
    let mut editor = table_editor();

    assert!(editor.handle_key("Tab").unwrap());
    assert_eq!(editor.selection(), Selection::cursor(11)); // (0, 1)

    assert!(editor.handle_key("Tab").unwrap());
    assert_eq!(editor.selection(), Selection::cursor(17)); // (1, 0)

    assert!(editor.handle_key("Tab").unwrap());
    assert_eq!(editor.selection(), Selection::cursor(21)); // (1, 1)
}

#[test]
fn tab_on_the_last_cell_appends_a_row_without_moving() {
    let mut editor = table_editor();
    for _ in 0..3 {
        editor.handle_key("Tab").unwrap();
    }
    assert_eq!(editor.selection(), Selection::cursor(21));

    assert!(editor.handle_key("Tab").unwrap());
    assert_eq!(table_el(&editor).children.len(), 3);
    assert_eq!(editor.selection(), Selection::cursor(21));

    // The next press moves into the new row.
    assert!(editor.handle_key("Tab").unwrap());
    assert_eq!(editor.selection(), Selection::cursor(27)); // (2, 0)
}

#[test]
fn shift_tab_walks_backwards_and_stops_at_the_first_cell() {
    let mut editor = table_editor();
    editor.handle_key("Tab").unwrap();
    editor.handle_key("Tab").unwrap();
    assert_eq!(editor.selection(), Selection::cursor(17)); // (1, 0)

    // Wraps to the end of the previous row.
    assert!(editor.handle_key("Shift-Tab").unwrap());
    assert_eq!(editor.selection(), Selection::cursor(11)); // (0, 1)

    assert!(editor.handle_key("Shift-Tab").unwrap());
    assert_eq!(editor.selection(), Selection::cursor(7)); // (0, 0)

    assert!(!editor.handle_key("Shift-Tab").unwrap());
    assert_eq!(editor.selection(), Selection::cursor(7));
}

#[test]
fn adding_rows_and_columns_preserves_the_cursor() {
    let mut editor = table_editor();

    assert!(editor.execute(&cmd(add_row_after)).unwrap());
    assert_eq!(table_el(&editor).children.len(), 3);
    assert_eq!(editor.selection(), Selection::cursor(7));
    assert_eq!(row_len(&editor, 1), 2);

    assert!(editor.execute(&cmd(add_column_after)).unwrap());
    for row in 0..3 {
        assert_eq!(row_len(&editor, row), 3);
    }
    assert_eq!(editor.selection(), Selection::cursor(7));
}

#[test]
fn deleting_a_row_moves_the_cursor_to_the_survivor() {
    let mut editor = table_editor();

    assert!(editor.execute(&cmd(delete_row)).unwrap());
    assert_eq!(table_el(&editor).children.len(), 1);
    assert_eq!(editor.selection(), Selection::cursor(7));

    // The last row cannot be deleted.
    assert!(!editor.execute(&cmd(delete_row)).unwrap());
    assert_eq!(table_el(&editor).children.len(), 1);
}

#[test]
fn deleting_a_column_removes_one_cell_per_row() {
    let mut editor = table_editor();
    editor.handle_key("Tab").unwrap(); // (0, 1)

    assert!(editor.execute(&cmd(delete_column)).unwrap());
    assert_eq!(row_len(&editor, 0), 1);
    assert_eq!(row_len(&editor, 1), 1);
    assert_eq!(editor.selection(), Selection::cursor(7));

    assert!(!editor.execute(&cmd(delete_column)).unwrap());
}

#[test]
fn deleting_the_table_leaves_a_paragraph() {
    let mut editor = table_editor();

    assert!(editor.execute(&cmd(delete_table)).unwrap());
    let root = editor.doc().as_element().unwrap();
    assert_eq!(root.children.len(), 2);
    assert_eq!(root.children[1].kind(), "paragraph");
    assert_eq!(editor.selection(), Selection::cursor(4));
    assert!(table_context(editor.state()).is_none());
}

#[test]
fn merging_cells_in_a_row_records_the_colspan() {
    let mut editor = table_editor();
    select(&mut editor, 7, 11); // cell (0, 0) through cell (0, 1)

    assert!(editor.execute(&cmd(merge_cells)).unwrap());
    assert_eq!(row_len(&editor, 0), 1);
    assert_eq!(row_len(&editor, 1), 2);
    assert_eq!(editor.selection(), Selection::cursor(7));

    let merged = table_el(&editor).children[0].as_element().unwrap().children[0].clone();
    assert_eq!(merged.attr("colspan").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(merged.as_element().unwrap().children.len(), 2);
}

#[test]
fn splitting_a_merged_cell_restores_the_columns() {
    let mut editor = table_editor();
    select(&mut editor, 7, 11);
    editor.execute(&cmd(merge_cells)).unwrap();

    assert!(editor.execute(&cmd(split_cell)).unwrap());
    assert_eq!(row_len(&editor, 0), 2);

    let first = table_el(&editor).children[0].as_element().unwrap().children[0].clone();
    assert!(first.attr("colspan").is_none());
    // The merged content stays in the first fragment.
    assert_eq!(first.as_element().unwrap().children.len(), 2);
}

#[test]
fn merging_cells_in_a_column_records_the_rowspan() {
    let mut editor = table_editor();
    select(&mut editor, 7, 17); // cell (0, 0) through cell (1, 0)

    assert!(editor.execute(&cmd(merge_cells)).unwrap());
    assert_eq!(row_len(&editor, 0), 2);
    assert_eq!(row_len(&editor, 1), 1);
    assert_eq!(editor.selection(), Selection::cursor(7));

    let merged = table_el(&editor).children[0].as_element().unwrap().children[0].clone();
    assert_eq!(merged.attr("rowspan").and_then(|v| v.as_u64()), Some(2));

    assert!(editor.execute(&cmd(split_cell)).unwrap());
    assert_eq!(row_len(&editor, 1), 2);
    let first = table_el(&editor).children[0].as_element().unwrap().children[0].clone();
    assert!(first.attr("rowspan").is_none());
}

#[test]
fn merge_requires_a_straight_cell_run() {
    let mut editor = table_editor();

    // A cursor has nothing to merge.
    assert!(!editor.execute(&cmd(merge_cells)).unwrap());

    // A diagonal selection is rejected.
    select(&mut editor, 7, 21);
    assert!(!editor.execute(&cmd(merge_cells)).unwrap());

    // An unmerged cell has nothing to split.
    assert!(!editor.execute(&cmd(split_cell)).unwrap());
}

#[test]
fn table_context_menu_only_shows_inside_a_table() {
    let mut editor = table_editor();
    let items = editor.context_menu_items();
    assert!(items.iter().any(|item| item.group == "table"));

    let tr = editor
        .state()
        .transaction()
        .set_selection(Selection::cursor(2));
    editor.dispatch(tr).unwrap();
    let items = editor.context_menu_items();
    assert!(items.iter().all(|item| item.group != "table"));
}
