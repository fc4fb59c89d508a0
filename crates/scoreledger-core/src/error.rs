//! Error types for the scoring pipeline
//!
//! Each stage of the pipeline has its own error enum so callers can tell a
//! rejected payload apart from a broken artifact or a storage failure.
//! [`ServiceError`] is what the orchestrator hands to the transport layer.

use std::path::PathBuf;
use thiserror::Error;

use crate::validation::ValidationError;

/// Failure to load or interpret the startup schema artifacts
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Artifact file could not be read
    #[error("Failed to read schema artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Artifact file is not valid JSON of the expected shape
    #[error("Malformed schema artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Column list is empty
    #[error("Schema declares no columns")]
    Empty,

    /// Same column listed twice
    #[error("Column '{0}' is declared more than once")]
    DuplicateColumn(String),

    /// Column has no entry in the type map
    #[error("Column '{0}' has no declared type")]
    MissingType(String),

    /// Type map names a column that is not in the column list
    #[error("Type declared for unknown column '{0}'")]
    UnknownColumn(String),

    /// Type spelling is not one of the supported primitive types
    #[error("Column '{column}' has unsupported type '{dtype}'")]
    UnsupportedType { column: String, dtype: String },
}

/// A validated field could not be cast to its declared column type
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Cannot coerce field '{field}' to {expected}: got {actual}")]
pub struct CoercionError {
    /// Column that failed
    pub field: String,
    /// Declared column type
    pub expected: &'static str,
    /// Offending value, rendered as JSON
    pub actual: String,
}

/// Errors raised by a predictor or while loading its artifact
#[derive(Error, Debug)]
pub enum PredictorError {
    /// Model artifact could not be read
    #[error("Failed to read model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Model artifact is not valid JSON of the expected shape
    #[error("Malformed model artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Model references something the schema does not provide
    #[error("Model is incompatible with schema: {0}")]
    Incompatible(String),

    /// Feature row does not have the shape the model was built for
    #[error("Feature row has {actual} columns, model expects {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Model produced a score that is not a probability
    #[error("Predictor returned {0}, which is not a probability in [0, 1]")]
    InvalidProbability(f64),
}

/// Errors raised by the prediction ledger
#[derive(Error, Debug)]
pub enum LedgerError {
    /// A record for this observation already exists
    #[error("Observation ID: '{observation_id}' already exists")]
    DuplicateKey { observation_id: i64 },

    /// No record exists for this observation
    #[error("Observation ID: \"{observation_id}\" does not exist")]
    NotFound { observation_id: i64 },

    /// Value rejected before reaching storage
    #[error("Invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    /// Underlying SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection mutex was poisoned by a panicking writer
    #[error("Ledger connection lock poisoned")]
    Poisoned,
}

/// Errors returned by the scoring service to its callers
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Payload rejected by the validator; nothing was scored or written
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Payload could not be turned into a feature row
    #[error("Observation {observation_id}: {source}")]
    Coercion {
        observation_id: i64,
        #[source]
        source: CoercionError,
    },

    /// Predictor failed for this request
    #[error(transparent)]
    Predictor(#[from] PredictorError),

    /// Label update referenced an unknown observation
    #[error("Observation ID: \"{observation_id}\" does not exist")]
    NotFound { observation_id: i64 },

    /// Ledger failure other than a duplicate or a missing record
    #[error(transparent)]
    Ledger(LedgerError),

    /// Request body is not a JSON document
    #[error("Malformed request body: {0}")]
    MalformedBody(#[source] serde_json::Error),
}

impl From<LedgerError> for ServiceError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound { observation_id } => ServiceError::NotFound { observation_id },
            other => ServiceError::Ledger(other),
        }
    }
}

impl ServiceError {
    /// Check if the caller sent something wrong (vs a server-side failure)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ServiceError::Validation(_)
                | ServiceError::Coercion { .. }
                | ServiceError::NotFound { .. }
                | ServiceError::MalformedBody(_)
        )
    }
}
