//! Scoreledger HTTP server
//!
//! Exposes the scoring pipeline from `scoreledger-core` over HTTP:
//!
//! - `POST /predict` scores an observation and records it in the ledger
//! - `POST /update` attaches a ground-truth label to a recorded observation
//! - `GET /predictions/:observation_id` returns a stored record
//! - `GET /health` reports model, schema and ledger status

pub mod config;
pub mod handler;
pub mod telemetry;

pub use config::{ConfigError, LogFormat, ServerArgs, ServerConfig};
pub use handler::{create_router, ApiError, AppState, ErrorBody, HealthResponse, ScoreResponse};
pub use telemetry::init_tracing;

use anyhow::Context;
use scoreledger_core::{
    LedgerConfig, LogisticModel, PredictionLedger, SchemaRegistry, ScoringService,
};
use std::sync::Arc;

/// Load the startup artifacts and open the ledger
///
/// Any failure aborts startup before the listener is bound.
pub fn build_service(config: &ServerConfig) -> anyhow::Result<ScoringService> {
    let schema = SchemaRegistry::load(&config.columns, &config.dtypes).with_context(|| {
        format!(
            "Failed to load schema from {} and {}",
            config.columns.display(),
            config.dtypes.display()
        )
    })?;

    let model = LogisticModel::load(&config.model, &schema)
        .with_context(|| format!("Failed to load model from {}", config.model.display()))?;

    let ledger_config = LedgerConfig::new(&config.database).with_busy_timeout(config.busy_timeout());
    let ledger = PredictionLedger::open(&ledger_config).with_context(|| {
        format!("Failed to open ledger at {}", config.database.display())
    })?;

    Ok(ScoringService::new(
        Arc::new(schema),
        Arc::new(model),
        Arc::new(ledger),
    ))
}
