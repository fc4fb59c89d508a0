//! Scoreledger Core
//!
//! Serving pipeline for a pre-trained binary classifier. Every scoring
//! decision is recorded in a durable ledger keyed by `observation_id`, and
//! ground-truth labels can be attached to those records later.
//!
//! ## Pipeline
//!
//! 1. **Schema** (`schema`): ordered columns and their types, loaded once.
//! 2. **Validation** (`validation`): fail-fast checks over the raw request.
//! 3. **Coercion** (`coercion`): typed, schema-ordered feature row.
//! 4. **Predictor** (`predictor`): feature row to probability.
//! 5. **Ledger** (`ledger`): insert-once SQLite store with label updates.
//! 6. **Service** (`service`): composes the above per request.
//!
//! ## Example
//!
//! ```rust,no_run
//! use scoreledger_core::{
//!     LedgerConfig, LogisticModel, PredictionLedger, SchemaRegistry, ScoringService,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Arc::new(SchemaRegistry::load("columns.json", "dtypes.json")?);
//! let model = LogisticModel::load("model.json", &schema)?;
//! let ledger = PredictionLedger::open(&LedgerConfig::new("predictions.db"))?;
//! let service = ScoringService::new(schema, Arc::new(model), Arc::new(ledger));
//!
//! let outcome = service.predict(
//!     r#"{"observation_id": 1, "data": {"age": 45, "sex": 1, "ca": 0, "trestbps": 120, "oldpeak": 1.0}}"#,
//! )?;
//! println!("p = {}", outcome.probability);
//! # Ok(())
//! # }
//! ```

pub mod coercion;
pub mod error;
pub mod ledger;
pub mod predictor;
pub mod schema;
pub mod service;
pub mod validation;

pub use coercion::{FeatureCoercer, FeatureRow, FeatureValue};
pub use error::{CoercionError, LedgerError, PredictorError, SchemaError, ServiceError};
pub use ledger::{LedgerConfig, PredictionLedger, PredictionRecord};
pub use predictor::{LogisticModel, Predictor, DEFAULT_THRESHOLD};
pub use schema::{Column, ColumnType, Schema, SchemaRegistry};
pub use service::{Persistence, ScoreOutcome, ScoringService};
pub use validation::{Reason, RequestValidator, ValidatedObservation, ValidationError};

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;
