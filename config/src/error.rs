//! Error taxonomy of the config manager.

use serde_json::Value;
use thiserror::Error;

use lattice_kvstore::StoreError;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A dotted path does not exist in the config type, or a scalar
    /// update targets a record.
    #[error("config field with key {path} does not exist")]
    StructuralMismatch { path: String },

    /// The runtime value is not convertible to the target field type.
    #[error("expected {expected} for key {path}, got {got}")]
    TypeMismatch {
        path: String,
        expected: String,
        got: String,
    },

    /// Two input keys make incompatible demands on the same subtree.
    #[error("conflicting keys {first} and {second}")]
    KeyConflict { first: String, second: String },

    /// A sequence index beyond the append position.
    #[error("index {index} out of range for sequence {path} of length {len}")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },

    /// A `Validatable` subtree rejected its new value.
    #[error("validation failed at {path}: {source}")]
    Validation {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The update input carries no subtree for the root config's name.
    #[error("invalid config data")]
    InvalidData,
}

impl ConfigError {
    /// A type mismatch at `path`, describing the offending value.
    pub fn type_mismatch(path: &str, expected: &str, got: &Value) -> Self {
        ConfigError::TypeMismatch {
            path: path.to_string(),
            expected: expected.to_string(),
            got: value_kind(got).to_string(),
        }
    }

    /// A structural miss: no config field at `path`.
    pub fn no_such_field(path: &str) -> Self {
        ConfigError::StructuralMismatch {
            path: path.to_string(),
        }
    }
}

/// Human name of a JSON value's kind, for error messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
