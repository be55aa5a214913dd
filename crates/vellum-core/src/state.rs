use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::EngineError;
use crate::node::Node;
use crate::schema::Schema;
use crate::selection::Selection;
use crate::transaction::Transaction;

/// Opaque per-plugin state stored inside an `EditorState`.
pub type PluginValue = Arc<dyn Any + Send + Sync>;

/// An immutable snapshot of the editor: document, selection, schema and
/// the plugin state map. Cloning is cheap; all heavy fields are shared.
#[derive(Clone)]
pub struct EditorState {
    doc: Arc<Node>,
    selection: Selection,
    schema: Arc<Schema>,
    plugin_state: HashMap<String, PluginValue>,
}

impl fmt::Debug for EditorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Plugin state fields are opaque; only their names are shown.
        let mut plugins: Vec<&str> = self.plugin_state.keys().map(String::as_str).collect();
        plugins.sort_unstable();
        f.debug_struct("EditorState")
            .field("doc", &self.doc)
            .field("selection", &self.selection)
            .field("plugins", &plugins)
            .finish()
    }
}

impl EditorState {
    pub fn new(doc: Arc<Node>, selection: Selection, schema: Arc<Schema>) -> Self {
        Self {
            doc,
            selection,
            schema,
            plugin_state: HashMap::new(),
        }
    }

    pub fn doc(&self) -> &Arc<Node> {
        &self.doc
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn schema_arc(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// A fresh transaction builder seeded with this state's document and
    /// schema.
    pub fn transaction(&self) -> Transaction {
        Transaction::begin(self)
    }

    /// Downcasts a plugin's opaque state field.
    pub fn plugin_field<T: 'static>(&self, plugin: &str) -> Option<&T> {
        self.plugin_state
            .get(plugin)
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub(crate) fn plugin_value(&self, plugin: &str) -> Option<&PluginValue> {
        self.plugin_state.get(plugin)
    }

    pub(crate) fn set_plugin_value(&mut self, plugin: String, value: PluginValue) {
        self.plugin_state.insert(plugin, value);
    }

    pub(crate) fn remove_plugin_value(&mut self, plugin: &str) {
        self.plugin_state.remove(plugin);
    }

    pub(crate) fn with_schema(mut self, schema: Arc<Schema>) -> Self {
        self.schema = schema;
        self
    }

    /// Replays the transaction's steps against this state's document.
    /// Either every step applies, or the whole transaction is rejected
    /// and this state remains the current one. The resulting selection is
    /// the transaction's `selection_after` if set, otherwise this state's
    /// selection mapped through the applied steps.
    pub fn apply(&self, tr: &Transaction) -> Result<EditorState, EngineError> {
        let (doc, maps) = tr.replay(&self.doc)?;
        let max = doc.node_size();
        let selection = match tr.selection_after() {
            Some(selection) => {
                if selection.from() > max || selection.to() > max {
                    return Err(EngineError::TransactionRejected(format!(
                        "selection {}..{} outside document of size {max}",
                        selection.from(),
                        selection.to()
                    )));
                }
                selection
            }
            None => self.selection.map(&maps, max),
        };
        Ok(EditorState {
            doc,
            selection,
            schema: self.schema.clone(),
            plugin_state: self.plugin_state.clone(),
        })
    }
}
