use thiserror::Error;

use crate::data::model::Key;

/// Failure returned by a user-supplied comparison function or reducer.
pub type FunctionError = Box<dyn std::error::Error + Send + Sync>;

/// Structural problems with a [`LabeledTable`](crate::data::model::LabeledTable).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("duplicate key {0}")]
    DuplicateKey(Key),

    #[error("key {key} has {} values, table has {expected} dimensions", .key.len())]
    KeyArity { key: Key, expected: usize },

    #[error("unknown dimension '{0}'")]
    UnknownDimension(String),

    #[error("dimension '{0}' is listed more than once")]
    DuplicateDimension(String),
}

/// Raised while building a criterion, target range or aggregator. Never
/// raised once data is being processed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("reference data has more than one row for {key} once {ignored:?} are ignored")]
    AmbiguousReference { key: Key, ignored: Vec<String> },

    #[error("dimension '{dim}' is missing from the {side} data")]
    MissingDimension { dim: String, side: &'static str },

    #[error("unknown {kind} function '{name}'")]
    UnknownFunction { kind: &'static str, name: String },

    #[error("missing required configuration field '{0}'")]
    MissingField(&'static str),

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Errors from running the engine on model data.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("model data has dimensions {found:?}, expected {expected:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("unit mismatch at {key}: model unit '{model_unit}', reference unit '{reference_unit}'")]
    UnitMismatch {
        key: Key,
        model_unit: String,
        reference_unit: String,
    },

    #[error("function '{function}' failed at {key}")]
    ComparisonFunction {
        function: String,
        key: Key,
        #[source]
        source: FunctionError,
    },
}
