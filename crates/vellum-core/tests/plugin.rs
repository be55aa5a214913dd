use std::sync::{Arc, Mutex};

use vellum_core::{
    default_plugins, get_alignment, insert_table, insert_text, BlockStylePlugin, Command,
    ContentRule, Editor, EditorState, EngineError, HistoryPlugin, NodeRole, NodeSpec, Plugin,
    SchemaExtensions, Selection, TablePlugin, Transaction,
};

#[test]
fn duplicate_plugin_names_are_a_registration_error() {
    let result = Editor::new(vec![
        Box::new(HistoryPlugin::default()) as Box<dyn Plugin>,
        Box::new(HistoryPlugin::default()),
    ]);
    assert!(matches!(result, Err(EngineError::PluginConflict(_))));
}

struct WidgetPlugin(&'static str);

impl Plugin for WidgetPlugin {
    fn name(&self) -> &'static str {
        self.0
    }

    fn schema_extensions(&self) -> SchemaExtensions {
        SchemaExtensions {
            nodes: vec![NodeSpec {
                kind: "widget".to_string(),
                role: NodeRole::Block,
                content: ContentRule::None,
            }],
            marks: Vec::new(),
        }
    }
}

#[test]
fn conflicting_schema_kinds_are_a_registration_error() {
    let result = Editor::new(vec![
        Box::new(WidgetPlugin("widgets_a")) as Box<dyn Plugin>,
        Box::new(WidgetPlugin("widgets_b")),
    ]);
    assert!(matches!(result, Err(EngineError::PluginConflict(_))));
}

struct TraceFilter {
    name: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl Plugin for TraceFilter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn filter_transaction(&self, tr: Transaction, _state: &EditorState) -> Transaction {
        self.log.lock().unwrap().push(self.name);
        tr
    }
}

#[test]
fn filters_run_in_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut editor = Editor::new(vec![
        Box::new(TraceFilter {
            name: "first",
            log: log.clone(),
        }) as Box<dyn Plugin>,
        Box::new(TraceFilter {
            name: "second",
            log: log.clone(),
        }),
    ])
    .unwrap();

    editor.execute(&insert_text("x")).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
}

struct ReadOnlyPlugin;

impl Plugin for ReadOnlyPlugin {
    fn name(&self) -> &'static str {
        "read_only"
    }

    /// Swallows every edit by substituting an empty transaction.
    fn filter_transaction(&self, _tr: Transaction, state: &EditorState) -> Transaction {
        state.transaction()
    }
}

#[test]
fn a_filter_can_replace_the_transaction() {
    let mut editor = Editor::new(vec![Box::new(ReadOnlyPlugin) as Box<dyn Plugin>]).unwrap();
    let before = editor.doc().clone();

    assert!(editor.execute(&insert_text("blocked")).unwrap());
    assert_eq!(editor.doc(), &before);
}

struct TabOverride;

impl Plugin for TabOverride {
    fn name(&self) -> &'static str {
        "tab_override"
    }

    fn keymap(&self) -> Vec<(&'static str, Command)> {
        vec![(
            "Tab",
            Arc::new(
                |state: &EditorState, dispatch: Option<&mut dyn FnMut(Transaction)>| {
                    if let Some(dispatch) = dispatch {
                        dispatch(state.transaction().set_selection(Selection::cursor(2)));
                    }
                    true
                },
            ) as Command,
        )]
    }
}

#[test]
fn later_registrations_win_keymap_collisions() {
    let mut editor = Editor::new(vec![
        Box::new(TablePlugin) as Box<dyn Plugin>,
        Box::new(TabOverride),
    ])
    .unwrap();
    editor.execute(&insert_table(2, 2)).unwrap();
    assert_eq!(editor.selection(), Selection::cursor(7));

    // The override shadows the table plugin's cell navigation.
    assert!(editor.handle_key("Tab").unwrap());
    assert_eq!(editor.selection(), Selection::cursor(2));
}

struct LifecyclePlugin {
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl Plugin for LifecyclePlugin {
    fn name(&self) -> &'static str {
        "lifecycle"
    }

    fn init(&mut self, _state: &EditorState) {
        self.log.lock().unwrap().push("init");
    }

    fn destroy(&mut self) {
        self.log.lock().unwrap().push("destroy");
    }
}

#[test]
fn plugins_are_initialized_and_destroyed() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let editor = Editor::new(vec![Box::new(LifecyclePlugin { log: log.clone() })
        as Box<dyn Plugin>])
    .unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["init"]);

    drop(editor);
    assert_eq!(*log.lock().unwrap(), vec!["init", "destroy"]);
}

#[test]
fn unregistering_destroys_and_removes_the_keymap() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut editor = Editor::new(vec![
        Box::new(LifecyclePlugin { log: log.clone() }) as Box<dyn Plugin>,
        Box::new(HistoryPlugin::default()),
    ])
    .unwrap();

    assert!(editor.unregister_plugin("lifecycle"));
    assert!(log.lock().unwrap().contains(&"destroy"));
    assert!(!editor.unregister_plugin("lifecycle"));

    assert!(editor.unregister_plugin("history"));
    assert!(!editor.handle_key("Mod-Z").unwrap());
    assert!(!vellum_core::can_undo(editor.state()));
}

#[test]
fn plugins_can_be_registered_after_construction() {
    let mut editor = Editor::new(Vec::new()).unwrap();
    assert!(!editor.execute(&insert_table(2, 2)).unwrap());

    editor.register_plugin(Box::new(TablePlugin)).unwrap();
    assert!(editor.execute(&insert_table(2, 2)).unwrap());
    assert_eq!(editor.selection(), Selection::cursor(7));

    let err = editor.register_plugin(Box::new(TablePlugin)).unwrap_err();
    assert!(matches!(err, EngineError::PluginConflict(_)));
}

#[test]
fn block_style_contributes_alignment_menu_items() {
    let mut editor = Editor::new(vec![Box::new(BlockStylePlugin) as Box<dyn Plugin>]).unwrap();

    let items = editor.context_menu_items();
    let names: Vec<&str> = items.iter().map(|item| item.name.as_str()).collect();
    assert_eq!(names, vec!["align_left", "align_center", "align_right"]);
    assert!(items.iter().all(|item| item.group == "block"));

    let center = items[1].command.clone();
    assert!(editor.execute(&center).unwrap());
    assert_eq!(get_alignment(editor.state()), "center");
}

#[test]
fn aggregated_surfaces_concatenate_in_registration_order() {
    let editor = Editor::new(default_plugins()).unwrap();

    let items = editor.toolbar_items();
    let position = |name: &str| items.iter().position(|item| item.name == name).unwrap();
    assert!(position("bold") < position("block_type"));
    assert!(position("block_type") < position("insert_table"));
    assert!(position("insert_table") < position("undo"));

    let rules = editor.input_rules();
    assert!(rules.iter().any(|rule| rule.pattern == "# "));
    assert_eq!(editor.paste_rules().len(), 1);
}
