use thiserror::Error;

/// Error kinds surfaced by the engine.
///
/// `TransactionRejected` is the only one the dispatcher treats as
/// recoverable: the state is left untouched and the caller may continue.
/// The rest are construction-time or programming errors.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error("position {pos} out of range for document of size {max}")]
    OutOfRange { pos: usize, max: usize },

    #[error("transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("plugin registration conflict: {0}")]
    PluginConflict(String),

    #[error("dispatch called reentrantly from a plugin hook")]
    ReentrantDispatch,
}
