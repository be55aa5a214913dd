use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::node::Node;
use crate::schema::Schema;

pub const FORMAT_SCHEMA: &str = "vellum";
pub const FORMAT_VERSION: u32 = 1;

fn default_format_schema() -> String {
    FORMAT_SCHEMA.to_string()
}

fn default_format_version() -> u32 {
    FORMAT_VERSION
}

/// Serialization envelope for a document: the tree plus a schema name
/// and format version for forward compatibility. Both default when a
/// payload omits them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentValue {
    #[serde(default = "default_format_schema")]
    pub schema: String,
    #[serde(default = "default_format_version")]
    pub version: u32,
    pub document: Arc<Node>,
}

impl DocumentValue {
    pub fn new(document: Arc<Node>) -> Self {
        Self {
            schema: default_format_schema(),
            version: FORMAT_VERSION,
            document,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Checks a deserialized tree against a schema: known kinds, content
    /// rules, no empty text runs.
    pub fn validate(&self, schema: &Schema) -> Result<(), EngineError> {
        validate_node(schema, &self.document)
    }
}

fn validate_node(schema: &Schema, node: &Node) -> Result<(), EngineError> {
    match node {
        Node::Text(t) => {
            if t.text.is_empty() {
                return Err(EngineError::SchemaViolation(
                    "empty text runs are not allowed".to_string(),
                ));
            }
            for mark in &t.marks {
                if schema.mark_spec(&mark.kind).is_none() {
                    return Err(EngineError::SchemaViolation(format!(
                        "unknown mark kind: {}",
                        mark.kind
                    )));
                }
            }
            Ok(())
        }
        Node::Element(el) => {
            let spec = schema.node_spec(&el.kind).ok_or_else(|| {
                EngineError::SchemaViolation(format!("unknown node kind: {}", el.kind))
            })?;
            for child in &el.children {
                schema.check_child(spec, child)?;
                validate_node(schema, child)?;
            }
            Ok(())
        }
    }
}
