//! End-to-end tests for the scoring pipeline
//!
//! Artifacts are written to a temporary directory and loaded the same way
//! the server does at startup:
//! - schema and model loading
//! - scoring with ledger persistence
//! - duplicate handling and label updates

use scoreledger_core::{
    LedgerConfig, LogisticModel, Persistence, PredictionLedger, SchemaRegistry,
    ScoringService, ServiceError,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

/// Helper to write the startup artifacts and build a service
fn create_service(dir: &TempDir) -> ScoringService {
    let columns = dir.path().join("columns.json");
    let dtypes = dir.path().join("dtypes.json");
    let model = dir.path().join("model.json");

    std::fs::write(
        &columns,
        r#"["age", "sex", "cp", "trestbps", "chol", "fbs", "thalach", "oldpeak", "ca", "thal"]"#,
    )
    .unwrap();
    std::fs::write(
        &dtypes,
        r#"{
            "age": "int64", "sex": "int64", "cp": "category", "trestbps": "float64",
            "chol": {"type": "float64", "default": 240.0}, "fbs": "int64",
            "thalach": "float64", "oldpeak": "float64", "ca": "int64", "thal": "category"
        }"#,
    )
    .unwrap();
    std::fs::write(
        &model,
        r#"{
            "name": "heart-lr",
            "intercept": -4.2,
            "features": [
                {"column": "age", "weight": 0.03, "impute": 54.0},
                {"column": "sex", "weight": 0.9},
                {"column": "cp", "categories": {"0": 1.1, "1": -0.4, "2": -0.7, "3": -0.2}},
                {"column": "trestbps", "weight": 0.012, "impute": 131.0},
                {"column": "chol", "weight": 0.003},
                {"column": "thalach", "weight": -0.02, "impute": 150.0},
                {"column": "oldpeak", "weight": 0.55},
                {"column": "ca", "weight": 0.8},
                {"column": "thal", "categories": {"1": -0.3, "2": -0.6, "3": 0.9}}
            ]
        }"#,
    )
    .unwrap();

    let schema = Arc::new(SchemaRegistry::load(&columns, &dtypes).unwrap());
    let model = LogisticModel::load(&model, &schema).unwrap();
    let ledger = PredictionLedger::open(&LedgerConfig::new(dir.path().join("predictions.db"))).unwrap();

    ScoringService::new(schema, Arc::new(model), Arc::new(ledger))
}

fn score_request(id: i64) -> Value {
    json!({
        "observation_id": id,
        "data": {
            "age": 45, "sex": 1, "cp": 0, "trestbps": 120, "oldpeak": 1.0, "ca": 0,
            "fbs": 0, "thalach": 150, "thal": 3
        }
    })
}

#[test]
fn test_end_to_end_score_is_recorded() {
    let dir = TempDir::new().unwrap();
    let service = create_service(&dir);

    let outcome = service.predict(&score_request(1).to_string()).unwrap();
    assert!((0.0..=1.0).contains(&outcome.probability));
    assert_eq!(outcome.prediction, outcome.probability >= 0.5);
    assert_eq!(outcome.persistence, Persistence::Recorded);

    assert_eq!(service.ledger().count().unwrap(), 1);
    let record = service.lookup(1).unwrap();
    assert_eq!(record.proba, outcome.probability);
    assert_eq!(record.predicted_class, outcome.prediction);
    assert_eq!(record.true_class, None);
}

#[test]
fn test_repeated_request_flags_duplicate() {
    let dir = TempDir::new().unwrap();
    let service = create_service(&dir);

    let first = service.predict(&score_request(1).to_string()).unwrap();

    let mut changed = score_request(1);
    changed["data"]["oldpeak"] = json!(4.5);
    let second = service.predict(&changed.to_string()).unwrap();

    assert_eq!(second.persistence, Persistence::Duplicate);
    assert!(second.duplicate_note().is_some());
    assert!(second.probability > first.probability);

    assert_eq!(service.ledger().count().unwrap(), 1);
    assert_eq!(service.lookup(1).unwrap().proba, first.probability);
}

#[test]
fn test_missing_data_is_rejected_without_write() {
    let dir = TempDir::new().unwrap();
    let service = create_service(&dir);

    let err = service.predict(r#"{"observation_id": 12}"#).unwrap_err();
    match err {
        ServiceError::Validation(v) => {
            assert_eq!(v.field, "data");
            assert_eq!(v.observation_id, json!(12));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(service.ledger().count().unwrap(), 0);
}

#[test]
fn test_label_lifecycle() {
    let dir = TempDir::new().unwrap();
    let service = create_service(&dir);

    let err = service
        .update(r#"{"observation_id": 999, "true_class": 1}"#)
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { observation_id: 999 }));
    assert_eq!(service.ledger().count().unwrap(), 0);

    service.predict(&score_request(1).to_string()).unwrap();
    service
        .update(r#"{"observation_id": 1, "true_class": 1}"#)
        .unwrap();
    assert_eq!(service.lookup(1).unwrap().true_class, Some(1));
}

#[test]
fn test_concurrent_scoring_of_same_id_records_once() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(create_service(&dir));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            thread::spawn(move || service.predict(&score_request(77).to_string()).unwrap().persistence)
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let recorded = outcomes
        .iter()
        .filter(|p| **p == Persistence::Recorded)
        .count();
    assert_eq!(recorded, 1);
    assert_eq!(service.ledger().count().unwrap(), 1);
}
