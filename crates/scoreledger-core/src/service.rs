//! Scoring service
//!
//! Composes validation, coercion, prediction and the ledger for one request.
//! Built once at startup from explicit parts and shared across workers; it
//! holds no mutable state of its own.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::coercion::FeatureCoercer;
use crate::error::{LedgerError, PredictorError, ServiceError};
use crate::ledger::{PredictionLedger, PredictionRecord};
use crate::predictor::Predictor;
use crate::schema::Schema;
use crate::validation::{require_observation_id, Reason, RequestValidator, ValidationError};

/// What happened to the ledger write of a scored request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Persistence {
    Recorded,
    /// A record for this id already existed; nothing was written
    Duplicate,
}

/// Result of a successful scoring request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreOutcome {
    pub observation_id: i64,
    pub prediction: bool,
    pub probability: f64,
    pub persistence: Persistence,
}

impl ScoreOutcome {
    /// Note attached to the response when the write was a duplicate
    pub fn duplicate_note(&self) -> Option<String> {
        match self.persistence {
            Persistence::Recorded => None,
            Persistence::Duplicate => Some(format!(
                "ERROR: {}",
                LedgerError::DuplicateKey {
                    observation_id: self.observation_id
                }
            )),
        }
    }
}

/// Request-level orchestration over the scoring pipeline
pub struct ScoringService {
    schema: Arc<Schema>,
    validator: RequestValidator,
    predictor: Arc<dyn Predictor>,
    ledger: Arc<PredictionLedger>,
}

impl ScoringService {
    pub fn new(
        schema: Arc<Schema>,
        predictor: Arc<dyn Predictor>,
        ledger: Arc<PredictionLedger>,
    ) -> Self {
        Self {
            schema,
            validator: RequestValidator::new(),
            predictor,
            ledger,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn predictor(&self) -> &dyn Predictor {
        self.predictor.as_ref()
    }

    pub fn ledger(&self) -> &PredictionLedger {
        &self.ledger
    }

    /// Score a request body and record it in the ledger
    ///
    /// The body text is stored verbatim. Validation failures return before
    /// anything is scored or written. A duplicate `observation_id` does not
    /// fail the request: the fresh score is returned with
    /// [`Persistence::Duplicate`].
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn predict(&self, body: &str) -> Result<ScoreOutcome, ServiceError> {
        let raw = parse_body(body)?;
        let observation = self.validator.validate(&raw).map_err(|err| {
            tracing::debug!(field = %err.field, reason = %err.reason, "Request rejected");
            err
        })?;
        let observation_id = observation.observation_id;

        let row = FeatureCoercer::coerce(&observation, &self.schema).map_err(|source| {
            ServiceError::Coercion {
                observation_id,
                source,
            }
        })?;
        let probability = self.predictor.predict_proba(&row)?;
        if !(0.0..=1.0).contains(&probability) {
            return Err(PredictorError::InvalidProbability(probability).into());
        }
        let prediction = probability >= self.predictor.threshold();

        let persistence = match self.ledger.record(observation_id, body, probability, prediction) {
            Ok(()) => Persistence::Recorded,
            Err(LedgerError::DuplicateKey { .. }) => {
                tracing::warn!(observation_id, "Observation already recorded, score not persisted");
                Persistence::Duplicate
            }
            Err(err) => return Err(err.into()),
        };

        tracing::info!(observation_id, probability, prediction, "Observation scored");
        Ok(ScoreOutcome {
            observation_id,
            prediction,
            probability,
            persistence,
        })
    }

    /// Apply a ground-truth label to a previously scored observation
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn update(&self, body: &str) -> Result<PredictionRecord, ServiceError> {
        let raw = parse_body(body)?;
        let observation_id = require_observation_id(&raw)?;
        let true_class = require_true_class(&raw, observation_id)?;

        let record = self.ledger.apply_label(observation_id, true_class)?;
        tracing::info!(observation_id, true_class, "Label applied");
        Ok(record)
    }

    /// Fetch a stored record
    pub fn lookup(&self, observation_id: i64) -> Result<PredictionRecord, ServiceError> {
        Ok(self.ledger.get(observation_id)?)
    }
}

fn parse_body(body: &str) -> Result<Value, ServiceError> {
    serde_json::from_str(body).map_err(ServiceError::MalformedBody)
}

fn require_true_class(raw: &Value, observation_id: i64) -> Result<u8, ValidationError> {
    let echoed = Value::from(observation_id);
    let value = raw
        .get("true_class")
        .ok_or_else(|| ValidationError::new(echoed.clone(), "true_class", Reason::Missing))?;
    match value.as_i64() {
        Some(0) => Ok(0),
        Some(1) => Ok(1),
        Some(other) => Err(ValidationError::new(
            echoed,
            "true_class",
            Reason::OutOfRange(other.to_string()),
        )),
        None => Err(ValidationError::new(
            echoed,
            "true_class",
            Reason::WrongType(value.to_string()),
        )),
    }
}
