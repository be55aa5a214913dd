use std::time::Duration;

use serde_json::Value;
use vellum_core::{
    can_redo, can_undo, default_plugins, insert_table, insert_text, Editor, FormattingPlugin,
    HistoryConfig, HistoryPlugin, HistoryState, Plugin, Selection, HISTORY_PLUGIN,
    SOURCE_META,
};

fn history_editor(config: HistoryConfig) -> Editor {
    Editor::new(vec![
        Box::new(FormattingPlugin) as Box<dyn Plugin>,
        Box::new(HistoryPlugin::new(config)),
    ])
    .unwrap()
}

fn no_coalesce() -> HistoryConfig {
    HistoryConfig {
        delay: Duration::ZERO,
        ..HistoryConfig::default()
    }
}

fn undo_depth(editor: &Editor) -> usize {
    editor
        .state()
        .plugin_field::<HistoryState>(HISTORY_PLUGIN)
        .unwrap()
        .undo_depth()
}

#[test]
fn undo_restores_the_document_and_selection_exactly() {
    let mut editor = history_editor(no_coalesce());
    let before = editor.doc().clone();

    assert!(editor.execute(&insert_text("hello")).unwrap());
    assert_eq!(editor.doc().text_content(), "hello");
    assert_eq!(editor.selection(), Selection::cursor(7));
    assert!(can_undo(editor.state()));

    assert!(editor.handle_key("Mod-Z").unwrap());
    assert_eq!(editor.doc(), &before);
    assert_eq!(editor.selection(), Selection::cursor(2));
    assert!(!can_undo(editor.state()));
    assert!(can_redo(editor.state()));

    assert!(editor.handle_key("Mod-Y").unwrap());
    assert_eq!(editor.doc().text_content(), "hello");
    assert_eq!(editor.selection(), Selection::cursor(7));
    assert!(!can_redo(editor.state()));
}

#[test]
fn undo_with_an_empty_stack_is_not_handled() {
    let mut editor = history_editor(no_coalesce());
    assert!(!editor.handle_key("Mod-Z").unwrap());
    assert!(!editor.handle_key("Mod-Y").unwrap());
}

#[test]
fn new_edits_clear_the_redo_stack() {
    let mut editor = history_editor(no_coalesce());
    editor.execute(&insert_text("a")).unwrap();
    editor.handle_key("Mod-Z").unwrap();
    assert!(can_redo(editor.state()));

    editor.execute(&insert_text("b")).unwrap();
    assert!(!can_redo(editor.state()));
}

#[test]
fn the_undo_stack_is_capped() {
    let mut editor = history_editor(HistoryConfig {
        delay: Duration::ZERO,
        max_stack: 2,
        ..HistoryConfig::default()
    });
    for text in ["a", "b", "c"] {
        editor.execute(&insert_text(text)).unwrap();
    }
    assert_eq!(undo_depth(&editor), 2);

    // Only the two newest edits unwind.
    editor.handle_key("Mod-Z").unwrap();
    editor.handle_key("Mod-Z").unwrap();
    assert_eq!(editor.doc().text_content(), "a");
    assert!(!can_undo(editor.state()));
}

#[test]
fn rapid_text_edits_coalesce_into_one_entry() {
    let mut editor = history_editor(HistoryConfig::default());
    editor.execute(&insert_text("he")).unwrap();
    editor.execute(&insert_text("llo")).unwrap();
    assert_eq!(editor.doc().text_content(), "hello");
    assert_eq!(undo_depth(&editor), 1);

    editor.handle_key("Mod-Z").unwrap();
    assert_eq!(editor.doc().text_content(), "");
    assert_eq!(editor.selection(), Selection::cursor(2));
}

#[test]
fn user_only_skips_untagged_transactions() {
    let mut editor = history_editor(HistoryConfig {
        user_only: true,
        delay: Duration::ZERO,
        ..HistoryConfig::default()
    });

    let tr = editor
        .state()
        .transaction()
        .insert_text(2, "silent", Vec::new())
        .unwrap();
    editor.dispatch(tr).unwrap();
    assert!(!can_undo(editor.state()));

    let tr = editor
        .state()
        .transaction()
        .insert_text(8, "!", Vec::new())
        .unwrap()
        .set_meta(SOURCE_META, Value::String("user".to_string()));
    editor.dispatch(tr).unwrap();
    assert!(can_undo(editor.state()));

    // Only the tagged edit unwinds.
    editor.handle_key("Mod-Z").unwrap();
    assert_eq!(editor.doc().text_content(), "silent");
    assert!(!can_undo(editor.state()));
}

#[test]
fn structural_edits_undo_in_one_step() {
    let mut editor = Editor::new(default_plugins()).unwrap();
    let before = editor.doc().clone();

    editor.execute(&insert_table(2, 2)).unwrap();
    assert_eq!(editor.selection(), Selection::cursor(7));

    editor.handle_key("Mod-Z").unwrap();
    assert_eq!(editor.doc(), &before);
    assert_eq!(editor.selection(), Selection::cursor(2));

    editor.handle_key("Mod-Shift-Z").unwrap();
    assert_eq!(editor.selection(), Selection::cursor(7));
    assert!(vellum_core::table_context(editor.state()).is_some());
}

#[test]
fn selection_only_transactions_are_not_recorded() {
    let mut editor = history_editor(no_coalesce());
    editor.execute(&insert_text("hi")).unwrap();
    assert_eq!(undo_depth(&editor), 1);

    let tr = editor
        .state()
        .transaction()
        .set_selection(Selection::cursor(2));
    editor.dispatch(tr).unwrap();
    assert_eq!(undo_depth(&editor), 1);
    assert!(!can_redo(editor.state()));
}
