//! A headless rich-text editing engine.
//!
//! Documents are immutable trees addressed by flat integer positions.
//! All edits flow through [`Transaction`]s built from invertible steps,
//! and every capability beyond the core pipeline (formatting, tables,
//! history) ships as a [`Plugin`].

mod command;
mod editor;
mod error;
mod history;
mod node;
mod plugin;
mod plugins;
mod position;
mod query;
mod schema;
mod selection;
mod state;
mod step;
mod table;
mod transaction;
mod value;

pub use crate::command::*;
pub use crate::editor::*;
pub use crate::error::*;
pub use crate::history::*;
pub use crate::node::*;
pub use crate::plugin::*;
pub use crate::plugins::*;
pub use crate::position::*;
pub use crate::query::*;
pub use crate::schema::*;
pub use crate::selection::*;
pub use crate::state::*;
pub use crate::step::*;
pub use crate::table::*;
pub use crate::transaction::*;
pub use crate::value::*;

/// The standard plugin set: formatting, block styles, tables, history.
pub fn default_plugins() -> Vec<Box<dyn Plugin>> {
    vec![
        Box::new(FormattingPlugin),
        Box::new(BlockStylePlugin),
        Box::new(TablePlugin),
        Box::new(HistoryPlugin::default()),
    ]
}
