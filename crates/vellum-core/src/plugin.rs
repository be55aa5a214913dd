use std::collections::HashMap;
use std::sync::Arc;

use crate::command::Command;
use crate::schema::SchemaExtensions;
use crate::state::{EditorState, PluginValue};
use crate::transaction::Transaction;

/// Handler for input and paste rules: receives the state, the matched
/// text, and the usual optional dispatch.
pub type RuleHandler = Arc<
    dyn Fn(&EditorState, &str, Option<&mut dyn FnMut(Transaction)>) -> bool + Send + Sync,
>;

/// A trigger pattern and its handler. The engine only aggregates rules;
/// pattern matching against keystrokes or clipboard text is the view
/// layer's job.
#[derive(Clone)]
pub struct InputRule {
    pub pattern: String,
    pub handler: RuleHandler,
}

#[derive(Clone)]
pub struct PasteRule {
    pub pattern: String,
    pub handler: RuleHandler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolbarItemKind {
    Button,
    Dropdown,
    ColorPicker,
}

/// Descriptor consumed by an external toolbar renderer; the engine never
/// renders UI itself.
#[derive(Clone)]
pub struct ToolbarItem {
    pub name: String,
    pub kind: ToolbarItemKind,
    pub command: Command,
    pub is_active: Option<Arc<dyn Fn(&EditorState) -> bool + Send + Sync>>,
    pub is_enabled: Option<Arc<dyn Fn(&EditorState) -> bool + Send + Sync>>,
    pub icon: Option<String>,
    pub label: Option<String>,
    pub shortcut: Option<String>,
    pub items: Vec<DropdownItem>,
    pub current_value: Option<Arc<dyn Fn(&EditorState) -> Option<String> + Send + Sync>>,
}

impl ToolbarItem {
    pub fn button(name: impl Into<String>, command: Command) -> Self {
        Self {
            name: name.into(),
            kind: ToolbarItemKind::Button,
            command,
            is_active: None,
            is_enabled: None,
            icon: None,
            label: None,
            shortcut: None,
            items: Vec::new(),
            current_value: None,
        }
    }

    pub fn dropdown(name: impl Into<String>, command: Command, items: Vec<DropdownItem>) -> Self {
        let mut item = Self::button(name, command);
        item.kind = ToolbarItemKind::Dropdown;
        item.items = items;
        item
    }

    pub fn color_picker(name: impl Into<String>, command: Command) -> Self {
        let mut item = Self::button(name, command);
        item.kind = ToolbarItemKind::ColorPicker;
        item
    }

    pub fn active(mut self, f: impl Fn(&EditorState) -> bool + Send + Sync + 'static) -> Self {
        self.is_active = Some(Arc::new(f));
        self
    }

    pub fn enabled(mut self, f: impl Fn(&EditorState) -> bool + Send + Sync + 'static) -> Self {
        self.is_enabled = Some(Arc::new(f));
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn shortcut(mut self, shortcut: impl Into<String>) -> Self {
        self.shortcut = Some(shortcut.into());
        self
    }

    pub fn value(
        mut self,
        f: impl Fn(&EditorState) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.current_value = Some(Arc::new(f));
        self
    }
}

#[derive(Clone)]
pub struct DropdownItem {
    pub name: String,
    pub label: String,
    pub command: Command,
}

#[derive(Clone)]
pub struct ContextMenuItem {
    pub name: String,
    pub label: String,
    pub command: Command,
    pub is_enabled: Option<Arc<dyn Fn(&EditorState) -> bool + Send + Sync>>,
    pub group: String,
    pub order: u32,
}

impl ContextMenuItem {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        command: Command,
        group: impl Into<String>,
        order: u32,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            command,
            is_enabled: None,
            group: group.into(),
            order,
        }
    }

    pub fn enabled(mut self, f: impl Fn(&EditorState) -> bool + Send + Sync + 'static) -> Self {
        self.is_enabled = Some(Arc::new(f));
        self
    }
}

/// Context handed to plugins when the context menu is assembled.
pub struct MenuContext<'a> {
    pub state: &'a EditorState,
}

/// The fixed capability set a plugin may implement. Every hook has a
/// no-op default; the manager iterates the registered plugins in order
/// and calls whatever each one defines.
///
/// `filter_transaction` and `state_did_update` must not dispatch
/// reentrantly; follow-up edits belong in a later turn.
pub trait Plugin: Send + Sync {
    /// Unique name. A collision is a registration-time fatal error.
    fn name(&self) -> &'static str;

    fn init(&mut self, _state: &EditorState) {}

    fn destroy(&mut self) {}

    /// Node and mark kinds this plugin contributes to the schema.
    fn schema_extensions(&self) -> SchemaExtensions {
        SchemaExtensions::default()
    }

    /// Key spec strings ("Mod-B", "Tab", "Shift-Tab") mapped to commands.
    fn keymap(&self) -> Vec<(&'static str, Command)> {
        Vec::new()
    }

    fn input_rules(&self) -> Vec<InputRule> {
        Vec::new()
    }

    fn paste_rules(&self) -> Vec<PasteRule> {
        Vec::new()
    }

    /// May return the transaction unchanged, or a modified/replacement
    /// transaction.
    fn filter_transaction(&self, tr: Transaction, _state: &EditorState) -> Transaction {
        tr
    }

    /// Seed for this plugin's slot in `EditorState::plugin_state`.
    fn initial_state(&self) -> Option<PluginValue> {
        None
    }

    /// Computes this plugin's next state field for the state produced by
    /// `tr`. Returning `None` carries the previous value over unchanged.
    fn apply_state(
        &self,
        _tr: &Transaction,
        _value: Option<&PluginValue>,
        _old_state: &EditorState,
        _new_state: &EditorState,
    ) -> Option<PluginValue> {
        None
    }

    /// Side effects only; runs after the new state is installed.
    fn state_did_update(&self, _new_state: &EditorState, _old_state: &EditorState) {}

    fn toolbar_items(&self) -> Vec<ToolbarItem> {
        Vec::new()
    }

    fn context_menu_items(&self, _context: &MenuContext<'_>) -> Vec<ContextMenuItem> {
        Vec::new()
    }
}

/// Ordered plugin registry. Registration order is hook order; keymap
/// aggregation lets later registrations override earlier ones, while
/// item and rule aggregation concatenates without de-duplication.
#[derive(Default)]
pub struct PluginManager {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginManager {
    pub fn new(
        plugins: impl IntoIterator<Item = Box<dyn Plugin>>,
    ) -> Result<Self, crate::error::EngineError> {
        let mut manager = Self::default();
        for plugin in plugins {
            manager.register(plugin)?;
        }
        Ok(manager)
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> Result<(), crate::error::EngineError> {
        if self.plugins.iter().any(|p| p.name() == plugin.name()) {
            return Err(crate::error::EngineError::PluginConflict(format!(
                "duplicate plugin name: {}",
                plugin.name()
            )));
        }
        log::debug!("registering plugin {}", plugin.name());
        self.plugins.push(plugin);
        Ok(())
    }

    /// Removes a plugin by name, running its `destroy` hook. Schema kinds
    /// it contributed stay valid for documents already using them.
    pub fn unregister(&mut self, name: &str) -> bool {
        let Some(index) = self.plugins.iter().position(|p| p.name() == name) else {
            return false;
        };
        let mut plugin = self.plugins.remove(index);
        plugin.destroy();
        log::debug!("unregistered plugin {name}");
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Plugin> {
        self.plugins.iter().map(|p| p.as_ref())
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Plugin>> {
        self.plugins.iter_mut()
    }

    pub fn schema_extensions(&self) -> Vec<SchemaExtensions> {
        self.plugins.iter().map(|p| p.schema_extensions()).collect()
    }

    /// Merges all plugins' keymaps; later registrations win on an
    /// identical key string.
    pub fn collect_keymap(&self) -> HashMap<String, Command> {
        let mut map = HashMap::new();
        for plugin in &self.plugins {
            for (key, command) in plugin.keymap() {
                map.insert(key.to_string(), command);
            }
        }
        map
    }

    /// Concatenates in registration order; callers are responsible for
    /// unique names.
    pub fn collect_toolbar_items(&self) -> Vec<ToolbarItem> {
        self.plugins
            .iter()
            .flat_map(|p| p.toolbar_items())
            .collect()
    }

    pub fn collect_context_menu_items(&self, context: &MenuContext<'_>) -> Vec<ContextMenuItem> {
        self.plugins
            .iter()
            .flat_map(|p| p.context_menu_items(context))
            .collect()
    }

    pub fn collect_input_rules(&self) -> Vec<InputRule> {
        self.plugins.iter().flat_map(|p| p.input_rules()).collect()
    }

    pub fn collect_paste_rules(&self) -> Vec<PasteRule> {
        self.plugins.iter().flat_map(|p| p.paste_rules()).collect()
    }
}
