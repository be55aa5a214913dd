use std::sync::Arc;

use serde_json::Value;
use vellum_core::{
    chain, default_plugins, delete_selection, get_alignment, get_block_attrs, get_block_type,
    get_indent, get_line_height, insert_table, insert_text, set_alignment, set_block_type,
    set_indent, set_line_height, Attrs, Command, Editor, Selection,
};

fn editor() -> Editor {
    Editor::new(default_plugins()).unwrap()
}

fn heading_attrs(level: u64) -> Attrs {
    let mut attrs = Attrs::default();
    attrs.insert("level".to_string(), Value::Number(level.into()));
    attrs
}

#[test]
fn block_type_changes_keep_content_and_cursor() {
    let mut editor = editor();
    editor.execute(&insert_text("title")).unwrap();
    assert_eq!(get_block_type(editor.state()), Some("paragraph".to_string()));

    assert!(editor
        .execute(&set_block_type("heading", heading_attrs(1)))
        .unwrap());
    assert_eq!(get_block_type(editor.state()), Some("heading".to_string()));
    assert_eq!(editor.doc().text_content(), "title");
    assert_eq!(editor.selection(), Selection::cursor(7));

    let attrs = get_block_attrs(editor.state()).unwrap();
    assert_eq!(attrs.get("level").and_then(Value::as_u64), Some(1));

    // Already a level-one heading; nothing to do.
    assert!(!editor.can_execute(&set_block_type("heading", heading_attrs(1))));
    assert!(editor.can_execute(&set_block_type("heading", heading_attrs(2))));
}

#[test]
fn alignment_defaults_to_left_and_round_trips() {
    let mut editor = editor();
    assert_eq!(get_alignment(editor.state()), "left");

    assert!(editor.execute(&set_alignment("center")).unwrap());
    assert_eq!(get_alignment(editor.state()), "center");

    // Left clears the attr entirely.
    assert!(editor.execute(&set_alignment("left")).unwrap());
    assert_eq!(get_alignment(editor.state()), "left");
    let attrs = get_block_attrs(editor.state()).unwrap();
    assert!(attrs.get("align").is_none());
}

#[test]
fn indent_and_line_height_round_trip() {
    let mut editor = editor();
    assert_eq!(get_indent(editor.state()), 0);
    assert_eq!(get_line_height(editor.state()), None);

    editor.execute(&set_indent(2)).unwrap();
    assert_eq!(get_indent(editor.state()), 2);
    editor.execute(&set_indent(0)).unwrap();
    assert_eq!(get_indent(editor.state()), 0);
    assert!(get_block_attrs(editor.state()).unwrap().get("indent").is_none());

    editor.execute(&set_line_height(Some(1.5))).unwrap();
    assert_eq!(get_line_height(editor.state()), Some(1.5));
    editor.execute(&set_line_height(None)).unwrap();
    assert_eq!(get_line_height(editor.state()), None);
}

#[test]
fn queries_see_the_block_inside_a_table_cell() {
    let mut editor = editor();
    editor.execute(&insert_table(2, 2)).unwrap();
    assert_eq!(get_block_type(editor.state()), Some("paragraph".to_string()));

    assert!(editor
        .execute(&set_block_type("heading", heading_attrs(2)))
        .unwrap());
    assert_eq!(get_block_type(editor.state()), Some("heading".to_string()));
}

#[test]
fn chain_stops_at_the_first_handling_command() {
    let mut editor = editor();

    // A cursor gives delete_selection nothing to do, so the chain falls
    // through to the insertion.
    let command = chain([
        Arc::new(delete_selection) as Command,
        insert_text("x"),
    ]);
    assert!(editor.execute(&command).unwrap());
    assert_eq!(editor.doc().text_content(), "x");

    let noop = chain([Arc::new(delete_selection) as Command]);
    assert!(!editor.execute(&noop).unwrap());
}

#[test]
fn can_execute_probes_without_side_effects() {
    let editor = editor();
    assert!(editor.can_execute(&insert_text("x")));
    assert_eq!(editor.doc().text_content(), "");
    assert_eq!(editor.selection(), Selection::cursor(2));
}

#[test]
fn inserting_text_replaces_the_selection() {
    let mut editor = editor();
    editor.execute(&insert_text("hello")).unwrap();

    let tr = editor
        .state()
        .transaction()
        .set_selection(Selection::range(2, 7));
    editor.dispatch(tr).unwrap();

    assert!(editor.execute(&insert_text("y")).unwrap());
    assert_eq!(editor.doc().text_content(), "y");
    assert_eq!(editor.selection(), Selection::cursor(3));
}
