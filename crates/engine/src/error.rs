use rowforge_core::CoreError;
use rowforge_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("could not determine identity of {entity}: reload matched {matches} rows")]
    ReloadAmbiguous { entity: String, matches: usize },

    #[error("refusing {operation} on {entity} without a WHERE clause")]
    UnboundedStatement {
        entity: String,
        operation: &'static str,
    },

    #[error("invalid bulk operation: {0}")]
    InvalidBulk(String),
}
