use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{entity} property does not exist: {attribute}")]
    UnknownAttribute { entity: String, attribute: String },

    #[error("invalid primary key for {entity}: {reason}")]
    InvalidPrimaryKey { entity: String, reason: String },

    #[error("{entity} registers unknown callback `{name}` on {hook}")]
    UnknownCallback {
        entity: String,
        hook: String,
        name: String,
    },

    #[error("{entity} declares field `{field}` more than once")]
    DuplicateField { entity: String, field: String },

    #[error("no valid columns")]
    NoValidColumns,

    #[error("entry must have the column {column}")]
    MissingKeyColumn { column: String },

    #[error("placeholder collision: {0}")]
    PlaceholderCollision(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
