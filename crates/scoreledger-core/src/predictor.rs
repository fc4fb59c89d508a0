//! Predictor seam
//!
//! The service treats the model as an opaque function from a feature row to
//! a positive-class probability. [`LogisticModel`] is the bundled
//! implementation: a logistic regression over the schema columns with
//! one-hot weights for categorical columns, read from a JSON artifact.
//!
//! ```json
//! {
//!   "name": "heart-disease-lr",
//!   "intercept": -3.1,
//!   "threshold": 0.5,
//!   "features": [
//!     {"column": "age", "weight": 0.04, "impute": 54.0},
//!     {"column": "cp", "categories": {"0": -0.9, "1": 0.4, "2": 0.8}}
//!   ]
//! }
//! ```

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::coercion::FeatureRow;
use crate::error::PredictorError;
use crate::schema::{ColumnType, Schema};

/// Default cut-off between the negative and positive class
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Opaque scoring function
///
/// Implementations are shared read-only across request workers.
pub trait Predictor: Send + Sync {
    /// Probability of the positive class for one row
    fn predict_proba(&self, row: &FeatureRow) -> Result<f64, PredictorError>;

    /// Probability at or above which the positive class is predicted
    fn threshold(&self) -> f64 {
        DEFAULT_THRESHOLD
    }

    /// Human-readable model identifier
    fn name(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct ModelArtifact {
    #[serde(default = "default_model_name")]
    name: String,
    intercept: f64,
    #[serde(default = "default_threshold")]
    threshold: f64,
    features: Vec<FeatureArtifact>,
}

#[derive(Debug, Deserialize)]
struct FeatureArtifact {
    column: String,
    #[serde(default)]
    weight: f64,
    #[serde(default)]
    impute: f64,
    #[serde(default)]
    categories: BTreeMap<String, f64>,
}

fn default_model_name() -> String {
    "logistic".to_string()
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

#[derive(Debug, Clone)]
enum Term {
    Linear { weight: f64, impute: f64 },
    OneHot { weights: HashMap<i64, f64> },
}

/// Logistic regression resolved against a schema
#[derive(Debug, Clone)]
pub struct LogisticModel {
    name: String,
    intercept: f64,
    threshold: f64,
    width: usize,
    terms: Vec<(usize, Term)>,
}

impl LogisticModel {
    /// Load a model artifact and bind its features to schema positions
    pub fn load(path: impl AsRef<Path>, schema: &Schema) -> Result<Self, PredictorError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| PredictorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: ModelArtifact =
            serde_json::from_str(&content).map_err(|source| PredictorError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let model = Self::from_artifact(artifact, schema)?;
        tracing::info!(
            model = %model.name,
            terms = model.terms.len(),
            threshold = model.threshold,
            "Model loaded"
        );
        Ok(model)
    }

    fn from_artifact(artifact: ModelArtifact, schema: &Schema) -> Result<Self, PredictorError> {
        if !(0.0..=1.0).contains(&artifact.threshold) {
            return Err(PredictorError::Incompatible(format!(
                "threshold {} is outside [0, 1]",
                artifact.threshold
            )));
        }
        if !artifact.intercept.is_finite() {
            return Err(PredictorError::Incompatible("intercept is not finite".into()));
        }

        let mut terms = Vec::with_capacity(artifact.features.len());
        for feature in artifact.features {
            let index = schema.index_of(&feature.column).ok_or_else(|| {
                PredictorError::Incompatible(format!("unknown column '{}'", feature.column))
            })?;
            let column_type = schema.columns()[index].column_type;

            let term = if feature.categories.is_empty() {
                Term::Linear {
                    weight: feature.weight,
                    impute: feature.impute,
                }
            } else {
                if column_type != ColumnType::CategoricalInteger {
                    return Err(PredictorError::Incompatible(format!(
                        "column '{}' has category weights but is {}",
                        feature.column, column_type
                    )));
                }
                let mut weights = HashMap::with_capacity(feature.categories.len());
                for (code, weight) in feature.categories {
                    let code: i64 = code.trim().parse().map_err(|_| {
                        PredictorError::Incompatible(format!(
                            "category '{}' of column '{}' is not an integer",
                            code, feature.column
                        ))
                    })?;
                    weights.insert(code, weight);
                }
                Term::OneHot { weights }
            };
            terms.push((index, term));
        }

        Ok(Self {
            name: artifact.name,
            intercept: artifact.intercept,
            threshold: artifact.threshold,
            width: schema.len(),
            terms,
        })
    }
}

impl Predictor for LogisticModel {
    fn predict_proba(&self, row: &FeatureRow) -> Result<f64, PredictorError> {
        if row.len() != self.width {
            return Err(PredictorError::ShapeMismatch {
                expected: self.width,
                actual: row.len(),
            });
        }

        let mut z = self.intercept;
        for (index, term) in &self.terms {
            let value = &row.values()[*index];
            z += match term {
                Term::Linear { weight, impute } => weight * value.as_f64().unwrap_or(*impute),
                // Unseen or missing categories contribute nothing
                Term::OneHot { weights } => value
                    .as_category()
                    .and_then(|code| weights.get(&code))
                    .copied()
                    .unwrap_or(0.0),
            };
        }

        let probability = 1.0 / (1.0 + (-z).exp());
        if probability.is_nan() {
            return Err(PredictorError::InvalidProbability(probability));
        }
        Ok(probability)
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn name(&self) -> &str {
        &self.name
    }
}
