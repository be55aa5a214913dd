use vellum_core::{
    default_plugins, get_active_marks, insert_text, is_mark_active, set_mark_color, toggle_mark,
    Editor, FormattingPlugin, Mark, Plugin, Selection,
};

fn editor_with_text(text: &str) -> Editor {
    let mut editor = Editor::new(vec![Box::new(FormattingPlugin) as Box<dyn Plugin>]).unwrap();
    editor.execute(&insert_text(text)).unwrap();
    editor
}

fn select(editor: &mut Editor, anchor: usize, head: usize) {
    let tr = editor
        .state()
        .transaction()
        .set_selection(Selection::range(anchor, head));
    editor.dispatch(tr).unwrap();
}

#[test]
fn toggling_a_mark_over_the_whole_run_keeps_one_run() {
    let mut editor = editor_with_text("hello");
    select(&mut editor, 2, 7);

    assert!(editor.handle_key("Mod-B").unwrap());
    assert!(is_mark_active(editor.state(), "bold"));
    assert_eq!(editor.selection(), Selection::range(2, 7));

    let para = editor.doc().as_element().unwrap().children[0].clone();
    let runs = &para.as_element().unwrap().children;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].as_text().unwrap().marks, vec![Mark::new("bold")]);
}

#[test]
fn marking_the_middle_of_a_run_splits_it() {
    let mut editor = editor_with_text("hello");
    select(&mut editor, 3, 6);

    assert!(editor.handle_key("Mod-B").unwrap());
    assert!(is_mark_active(editor.state(), "bold"));
    assert_eq!(editor.doc().text_content(), "hello");

    let para = editor.doc().as_element().unwrap().children[0].clone();
    let runs = &para.as_element().unwrap().children;
    assert_eq!(runs.len(), 3);
    assert_eq!(runs[0].as_text().unwrap().text, "h");
    assert!(runs[0].as_text().unwrap().marks.is_empty());
    assert_eq!(runs[1].as_text().unwrap().text, "ell");
    assert_eq!(runs[1].as_text().unwrap().marks, vec![Mark::new("bold")]);
    assert_eq!(runs[2].as_text().unwrap().text, "o");
    assert!(runs[2].as_text().unwrap().marks.is_empty());
}

#[test]
fn toggling_twice_removes_the_mark() {
    let mut editor = editor_with_text("hello");
    select(&mut editor, 2, 7);

    editor.handle_key("Mod-B").unwrap();
    assert!(is_mark_active(editor.state(), "bold"));

    editor.handle_key("Mod-B").unwrap();
    assert!(!is_mark_active(editor.state(), "bold"));
    assert_eq!(editor.doc().text_content(), "hello");
}

#[test]
fn active_marks_are_the_intersection_across_the_selection() {
    let mut editor = editor_with_text("hello");
    select(&mut editor, 2, 7);
    editor.handle_key("Mod-B").unwrap();

    select(&mut editor, 2, 4);
    editor.handle_key("Mod-I").unwrap();

    select(&mut editor, 2, 7);
    let kinds: Vec<String> = get_active_marks(editor.state())
        .into_iter()
        .map(|m| m.kind)
        .collect();
    assert_eq!(kinds, vec!["bold".to_string()]);
    assert!(is_mark_active(editor.state(), "bold"));
    assert!(!is_mark_active(editor.state(), "italic"));
}

#[test]
fn cursor_inside_a_marked_run_reports_the_mark() {
    let mut editor = editor_with_text("hello");
    select(&mut editor, 2, 7);
    editor.handle_key("Mod-B").unwrap();

    let tr = editor
        .state()
        .transaction()
        .set_selection(Selection::cursor(4));
    editor.dispatch(tr).unwrap();
    assert!(is_mark_active(editor.state(), "bold"));
}

#[test]
fn toggle_is_a_no_op_on_a_cursor() {
    let mut editor = editor_with_text("hello");
    let before = editor.doc().clone();
    assert!(!editor.execute(&toggle_mark(Mark::new("bold"))).unwrap());
    assert_eq!(editor.doc(), &before);
}

#[test]
fn colored_marks_carry_their_color_attr() {
    let mut editor = editor_with_text("hello");
    select(&mut editor, 2, 7);

    assert!(editor
        .execute(&set_mark_color("text_color", Some("#ff0000".to_string())))
        .unwrap());
    let color = get_active_marks(editor.state())
        .into_iter()
        .find(|m| m.kind == "text_color")
        .and_then(|m| m.attrs.get("color").and_then(|v| v.as_str().map(String::from)));
    assert_eq!(color, Some("#ff0000".to_string()));

    assert!(editor
        .execute(&set_mark_color("text_color", None))
        .unwrap());
    assert!(!is_mark_active(editor.state(), "text_color"));
}

#[test]
fn typing_inside_a_marked_run_inherits_its_marks() {
    let mut editor = Editor::new(default_plugins()).unwrap();
    editor.execute(&insert_text("hello")).unwrap();
    select(&mut editor, 2, 7);
    editor.handle_key("Mod-B").unwrap();

    let tr = editor
        .state()
        .transaction()
        .set_selection(Selection::cursor(4));
    editor.dispatch(tr).unwrap();
    editor.execute(&insert_text("X")).unwrap();

    let para = editor.doc().as_element().unwrap().children[0].clone();
    let runs = &para.as_element().unwrap().children;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].as_text().unwrap().text, "heXllo");
    assert_eq!(runs[0].as_text().unwrap().marks, vec![Mark::new("bold")]);
}
