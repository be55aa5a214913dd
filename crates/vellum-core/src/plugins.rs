use std::sync::Arc;

use serde_json::Value;

use crate::command::{set_alignment, set_block_type, set_mark_color, toggle_mark, Command};
use crate::node::{Attrs, Mark};
use crate::plugin::{
    ContextMenuItem, DropdownItem, InputRule, MenuContext, PasteRule, Plugin, ToolbarItem,
};
use crate::query::{block_at, get_active_marks, get_alignment, get_block_type, is_mark_active};
use crate::schema::{ContentRule, MarkSpec, NodeRole, NodeSpec, SchemaExtensions};
use crate::state::EditorState;

fn mark_specs(kinds: &[&str]) -> Vec<MarkSpec> {
    kinds
        .iter()
        .map(|kind| MarkSpec {
            kind: kind.to_string(),
        })
        .collect()
}

fn rule(pattern: &str, command: Command) -> InputRule {
    InputRule {
        pattern: pattern.to_string(),
        handler: Arc::new(move |state, _matched, dispatch| command(state, dispatch)),
    }
}

/// Inline formatting: the standard mark kinds, their shortcuts, and the
/// toolbar toggles.
#[derive(Default)]
pub struct FormattingPlugin;

impl Plugin for FormattingPlugin {
    fn name(&self) -> &'static str {
        "formatting"
    }

    fn schema_extensions(&self) -> SchemaExtensions {
        SchemaExtensions {
            nodes: Vec::new(),
            marks: mark_specs(&[
                "bold",
                "italic",
                "underline",
                "strikethrough",
                "code",
                "text_color",
                "highlight_color",
                "link",
            ]),
        }
    }

    fn keymap(&self) -> Vec<(&'static str, Command)> {
        vec![
            ("Mod-B", toggle_mark(Mark::new("bold"))),
            ("Mod-I", toggle_mark(Mark::new("italic"))),
            ("Mod-U", toggle_mark(Mark::new("underline"))),
        ]
    }

    fn paste_rules(&self) -> Vec<PasteRule> {
        vec![PasteRule {
            pattern: r"https?://\S+".to_string(),
            handler: Arc::new(|state: &EditorState, matched: &str, dispatch| {
                let selection = state.selection();
                if selection.is_cursor() {
                    return false;
                }
                let mark = Mark::new("link").with_attr("href", Value::String(matched.to_string()));
                let Ok(tr) =
                    state
                        .transaction()
                        .add_mark(selection.from(), selection.to(), mark)
                else {
                    return false;
                };
                if let Some(dispatch) = dispatch {
                    dispatch(tr.set_selection(selection));
                }
                true
            }),
        }]
    }

    fn toolbar_items(&self) -> Vec<ToolbarItem> {
        let toggle = |name: &'static str, icon: &'static str, shortcut: &'static str| {
            ToolbarItem::button(name, toggle_mark(Mark::new(name)))
                .icon(icon)
                .shortcut(shortcut)
                .active(move |state| is_mark_active(state, name))
        };
        vec![
            toggle("bold", "bold", "Mod-B"),
            toggle("italic", "italic", "Mod-I"),
            toggle("underline", "underline", "Mod-U"),
            ToolbarItem::button("strikethrough", toggle_mark(Mark::new("strikethrough")))
                .icon("strikethrough")
                .active(|state| is_mark_active(state, "strikethrough")),
            ToolbarItem::button("code", toggle_mark(Mark::new("code")))
                .icon("code")
                .active(|state| is_mark_active(state, "code")),
            ToolbarItem::color_picker("text_color", set_mark_color("text_color", None))
                .icon("text-color")
                .value(|state| mark_color(state, "text_color")),
            ToolbarItem::color_picker("highlight_color", set_mark_color("highlight_color", None))
                .icon("highlight")
                .value(|state| mark_color(state, "highlight_color")),
        ]
    }
}

fn mark_color(state: &EditorState, kind: &str) -> Option<String> {
    get_active_marks(state)
        .into_iter()
        .find(|mark| mark.kind == kind)
        .and_then(|mark| mark.attrs.get("color").and_then(|v| v.as_str().map(String::from)))
}

fn heading_attrs(level: u64) -> Attrs {
    let mut attrs = Attrs::default();
    attrs.insert("level".to_string(), Value::Number(level.into()));
    attrs
}

/// Block-level styling: headings plus the alignment, indent and line
/// height attrs on text blocks.
#[derive(Default)]
pub struct BlockStylePlugin;

impl Plugin for BlockStylePlugin {
    fn name(&self) -> &'static str {
        "block_style"
    }

    fn schema_extensions(&self) -> SchemaExtensions {
        SchemaExtensions {
            nodes: vec![NodeSpec {
                kind: "heading".to_string(),
                role: NodeRole::Block,
                content: ContentRule::Inline,
            }],
            marks: Vec::new(),
        }
    }

    fn input_rules(&self) -> Vec<InputRule> {
        vec![
            rule("# ", set_block_type("heading", heading_attrs(1))),
            rule("## ", set_block_type("heading", heading_attrs(2))),
            rule("### ", set_block_type("heading", heading_attrs(3))),
        ]
    }

    fn toolbar_items(&self) -> Vec<ToolbarItem> {
        vec![
            ToolbarItem::dropdown(
                "block_type",
                set_block_type("paragraph", Attrs::default()),
                vec![
                    DropdownItem {
                        name: "paragraph".to_string(),
                        label: "Paragraph".to_string(),
                        command: set_block_type("paragraph", Attrs::default()),
                    },
                    DropdownItem {
                        name: "heading1".to_string(),
                        label: "Heading 1".to_string(),
                        command: set_block_type("heading", heading_attrs(1)),
                    },
                    DropdownItem {
                        name: "heading2".to_string(),
                        label: "Heading 2".to_string(),
                        command: set_block_type("heading", heading_attrs(2)),
                    },
                    DropdownItem {
                        name: "heading3".to_string(),
                        label: "Heading 3".to_string(),
                        command: set_block_type("heading", heading_attrs(3)),
                    },
                ],
            )
            .value(get_block_type),
            ToolbarItem::dropdown(
                "align",
                set_alignment("left"),
                vec![
                    DropdownItem {
                        name: "left".to_string(),
                        label: "Align left".to_string(),
                        command: set_alignment("left"),
                    },
                    DropdownItem {
                        name: "center".to_string(),
                        label: "Align center".to_string(),
                        command: set_alignment("center"),
                    },
                    DropdownItem {
                        name: "right".to_string(),
                        label: "Align right".to_string(),
                        command: set_alignment("right"),
                    },
                ],
            )
            .value(|state| Some(get_alignment(state))),
        ]
    }

    fn context_menu_items(&self, context: &MenuContext<'_>) -> Vec<ContextMenuItem> {
        if block_at(context.state).is_none() {
            return Vec::new();
        }
        vec![
            ContextMenuItem::new("align_left", "Align left", set_alignment("left"), "block", 10),
            ContextMenuItem::new(
                "align_center",
                "Align center",
                set_alignment("center"),
                "block",
                11,
            ),
            ContextMenuItem::new(
                "align_right",
                "Align right",
                set_alignment("right"),
                "block",
                12,
            ),
        ]
    }
}
