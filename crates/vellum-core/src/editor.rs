use std::sync::Arc;

use crate::command::Command;
use crate::error::EngineError;
use crate::node::Node;
use crate::plugin::{
    ContextMenuItem, InputRule, MenuContext, PasteRule, Plugin, PluginManager, ToolbarItem,
};
use crate::schema::Schema;
use crate::selection::Selection;
use crate::state::EditorState;
use crate::transaction::Transaction;

/// The headless editor: the current `EditorState` plus the plugin
/// registry and the dispatch pipeline tying them together.
pub struct Editor {
    state: EditorState,
    plugins: PluginManager,
    dispatching: bool,
}

impl Editor {
    /// An editor over a fresh empty document. The plugin set is fixed at
    /// construction; their schema extensions are folded into the base
    /// schema before the document exists.
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Result<Self, EngineError> {
        let plugins = PluginManager::new(plugins)?;
        let schema = Arc::new(Schema::base().with_extensions(plugins.schema_extensions())?);
        let doc = schema.empty_doc()?;
        // Position 2 is inside the initial empty paragraph.
        Self::assemble(doc, Selection::cursor(2), schema, plugins)
    }

    /// An editor over an existing document.
    pub fn with_doc(
        doc: Arc<Node>,
        selection: Selection,
        plugins: Vec<Box<dyn Plugin>>,
    ) -> Result<Self, EngineError> {
        let plugins = PluginManager::new(plugins)?;
        let schema = Arc::new(Schema::base().with_extensions(plugins.schema_extensions())?);
        Self::assemble(doc, selection, schema, plugins)
    }

    fn assemble(
        doc: Arc<Node>,
        selection: Selection,
        schema: Arc<Schema>,
        mut plugins: PluginManager,
    ) -> Result<Self, EngineError> {
        let max = doc.node_size();
        if selection.from() > max || selection.to() > max {
            return Err(EngineError::OutOfRange {
                pos: selection.to(),
                max,
            });
        }
        let mut state = EditorState::new(doc, selection, schema);
        for plugin in plugins.iter() {
            if let Some(value) = plugin.initial_state() {
                state.set_plugin_value(plugin.name().to_string(), value);
            }
        }
        for plugin in plugins.iter_mut() {
            plugin.init(&state);
        }
        Ok(Self {
            state,
            plugins,
            dispatching: false,
        })
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn doc(&self) -> &Arc<Node> {
        self.state.doc()
    }

    pub fn selection(&self) -> Selection {
        self.state.selection()
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    /// Runs a transaction through the pipeline: plugin filters in
    /// registration order, atomic state application, plugin state fields,
    /// then the update notifications. Returns `Ok(false)` when the
    /// transaction was rejected; the state is unchanged in that case.
    ///
    /// Dispatching from inside a plugin hook is a hard error.
    pub fn dispatch(&mut self, tr: Transaction) -> Result<bool, EngineError> {
        if self.dispatching {
            return Err(EngineError::ReentrantDispatch);
        }
        self.dispatching = true;
        let result = self.dispatch_inner(tr);
        self.dispatching = false;
        result
    }

    fn dispatch_inner(&mut self, mut tr: Transaction) -> Result<bool, EngineError> {
        for plugin in self.plugins.iter() {
            tr = plugin.filter_transaction(tr, &self.state);
        }

        let mut new_state = match self.state.apply(&tr) {
            Ok(state) => state,
            Err(err) => {
                log::warn!("transaction rejected: {err}");
                return Ok(false);
            }
        };

        for plugin in self.plugins.iter() {
            let previous = self.state.plugin_value(plugin.name());
            if let Some(value) = plugin.apply_state(&tr, previous, &self.state, &new_state) {
                new_state.set_plugin_value(plugin.name().to_string(), value);
            }
        }

        let old_state = std::mem::replace(&mut self.state, new_state);
        for plugin in self.plugins.iter() {
            plugin.state_did_update(&self.state, &old_state);
        }
        Ok(true)
    }

    /// Runs a command against the current state. Transactions the command
    /// produces are dispatched after it returns, so the command observes
    /// one consistent snapshot.
    pub fn execute(&mut self, command: &Command) -> Result<bool, EngineError> {
        let state = self.state.clone();
        let mut pending: Vec<Transaction> = Vec::new();
        let handled = {
            let mut sink = |tr: Transaction| pending.push(tr);
            command(&state, Some(&mut sink))
        };
        for tr in pending {
            self.dispatch(tr)?;
        }
        Ok(handled)
    }

    /// Whether `command` would handle the current state, without side
    /// effects.
    pub fn can_execute(&self, command: &Command) -> bool {
        command(&self.state, None)
    }

    /// Looks the key spec up in the merged keymap and executes the bound
    /// command. `Ok(false)` when no binding exists or the command
    /// declined.
    pub fn handle_key(&mut self, key: &str) -> Result<bool, EngineError> {
        let Some(command) = self.plugins.collect_keymap().get(key).cloned() else {
            return Ok(false);
        };
        self.execute(&command)
    }

    pub fn toolbar_items(&self) -> Vec<ToolbarItem> {
        self.plugins.collect_toolbar_items()
    }

    pub fn context_menu_items(&self) -> Vec<ContextMenuItem> {
        let context = MenuContext { state: &self.state };
        self.plugins.collect_context_menu_items(&context)
    }

    pub fn input_rules(&self) -> Vec<InputRule> {
        self.plugins.collect_input_rules()
    }

    pub fn paste_rules(&self) -> Vec<PasteRule> {
        self.plugins.collect_paste_rules()
    }

    /// Registers a plugin after construction. Its schema extensions are
    /// folded into the live schema; existing documents are unaffected.
    pub fn register_plugin(&mut self, mut plugin: Box<dyn Plugin>) -> Result<(), EngineError> {
        if self.plugins.iter().any(|p| p.name() == plugin.name()) {
            return Err(EngineError::PluginConflict(format!(
                "duplicate plugin name: {}",
                plugin.name()
            )));
        }
        let extensions = plugin.schema_extensions();
        let schema = Arc::new(self.state.schema().clone().with_extensions([extensions])?);
        let mut state = self.state.clone().with_schema(schema);
        if let Some(value) = plugin.initial_state() {
            state.set_plugin_value(plugin.name().to_string(), value);
        }
        plugin.init(&state);
        self.plugins.register(plugin)?;
        self.state = state;
        Ok(())
    }

    /// Unregisters by name, dropping the plugin's state field. Schema
    /// kinds it contributed remain valid for content already using them.
    pub fn unregister_plugin(&mut self, name: &str) -> bool {
        if !self.plugins.unregister(name) {
            return false;
        }
        self.state.remove_plugin_value(name);
        true
    }
}

impl Drop for Editor {
    fn drop(&mut self) {
        for plugin in self.plugins.iter_mut() {
            plugin.destroy();
        }
    }
}
