//! Router tests for the Scoreledger server
//!
//! Each test builds the service from artifacts in a temporary directory and
//! drives the router in-process with `tower::ServiceExt::oneshot`.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use scoreledger_api::{build_service, create_router, AppState, ServerConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn write_artifacts(dir: &TempDir, threshold: f64) -> ServerConfig {
    let config = ServerConfig {
        database: dir.path().join("predictions.db"),
        columns: dir.path().join("columns.json"),
        dtypes: dir.path().join("dtypes.json"),
        model: dir.path().join("model.json"),
        max_body_size: 4 * 1024,
        ..ServerConfig::default()
    };

    std::fs::write(
        &config.columns,
        r#"["age", "sex", "cp", "trestbps", "oldpeak", "ca", "thal"]"#,
    )
    .unwrap();
    std::fs::write(
        &config.dtypes,
        r#"{"age": "int64", "sex": "int64", "cp": "category", "trestbps": "float64",
            "oldpeak": "float64", "ca": "int64", "thal": "category"}"#,
    )
    .unwrap();
    let model = r#"{
            "name": "heart-lr",
            "intercept": -3.0,
            "threshold": THRESHOLD,
            "features": [
                {"column": "age", "weight": 0.03, "impute": 54.0},
                {"column": "sex", "weight": 0.9},
                {"column": "cp", "categories": {"0": 1.1, "1": -0.4}},
                {"column": "trestbps", "weight": 0.005, "impute": 131.0},
                {"column": "oldpeak", "weight": 0.55},
                {"column": "ca", "weight": 0.8},
                {"column": "thal", "categories": {"3": 0.9, "7": 1.4}}
            ]
        }"#;
    std::fs::write(&config.model, model.replace("THRESHOLD", &threshold.to_string())).unwrap();

    config
}

fn create_app(dir: &TempDir) -> Router {
    create_app_with_threshold(dir, 0.5)
}

fn create_app_with_threshold(dir: &TempDir, threshold: f64) -> Router {
    let config = write_artifacts(dir, threshold);
    let service = build_service(&config).unwrap();
    create_router(AppState::new(Arc::new(service)), &config)
}

async fn send_text(app: &Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn score_request(id: i64) -> Value {
    json!({
        "observation_id": id,
        "data": {"age": 63, "sex": 1, "cp": 0, "trestbps": 145, "oldpeak": 2.3, "ca": 0, "thal": 7}
    })
}

#[tokio::test]
async fn test_predict_returns_score() {
    let dir = TempDir::new().unwrap();
    let app = create_app(&dir);

    let (status, body) = send(&app, Method::POST, "/predict", Some(score_request(1))).await;
    assert_eq!(status, StatusCode::OK);

    let probability = body["probability"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&probability));
    assert_eq!(body["prediction"].as_bool().unwrap(), probability >= 0.5);
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_repeated_predict_flags_duplicate() {
    let dir = TempDir::new().unwrap();
    let app = create_app(&dir);

    let (_, first) = send(&app, Method::POST, "/predict", Some(score_request(7))).await;
    let (status, second) = send(&app, Method::POST, "/predict", Some(score_request(7))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["probability"], first["probability"]);
    assert_eq!(second["error"], "ERROR: Observation ID: '7' already exists");

    let (_, health) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(health["ledger_records"], 1);
}

#[tokio::test]
async fn test_validation_failure_is_unprocessable() {
    let dir = TempDir::new().unwrap();
    let app = create_app(&dir);

    let mut request = score_request(3);
    request["data"]["sex"] = json!(3);
    let (status, body) = send(&app, Method::POST, "/predict", Some(request)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["observation_id"], 3);
    assert_eq!(body["error"], "sex");
    assert_eq!(body["reason"], "out_of_range");
    assert_eq!(body["value"], "3");

    let (status, _) = send(&app, Method::GET, "/predictions/3", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_data_is_rejected() {
    let dir = TempDir::new().unwrap();
    let app = create_app(&dir);

    let (status, body) = send(
        &app,
        Method::POST,
        "/predict",
        Some(json!({"observation_id": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "data");
    assert_eq!(body["reason"], "missing");
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let app = create_app(&dir);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"observation_id\": "))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, body) = send_text(&app, "/update", "true_class=1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Malformed request body"));
}

#[tokio::test]
async fn test_ledger_stores_wire_body_verbatim() {
    let dir = TempDir::new().unwrap();
    let app = create_app(&dir);

    let wire = r#"{"observation_id":21,"data":{"sex":1,"age":45,"trestbps":120,"oldpeak":1.0,"ca":0}}"#;
    let (status, _) = send_text(&app, "/predict", wire).await;
    assert_eq!(status, StatusCode::OK);

    let (_, record) = send(&app, Method::GET, "/predictions/21", None).await;
    assert_eq!(record["observation"], wire);
}

#[tokio::test]
async fn test_stored_class_matches_response_under_model_threshold() {
    let dir = TempDir::new().unwrap();
    let app = create_app_with_threshold(&dir, 0.999);

    let (_, body) = send(&app, Method::POST, "/predict", Some(score_request(22))).await;
    assert!(body["probability"].as_f64().unwrap() > 0.5);
    assert_eq!(body["prediction"], false);

    let (_, record) = send(&app, Method::GET, "/predictions/22", None).await;
    assert_eq!(record["predicted_class"], body["prediction"]);
}

#[tokio::test]
async fn test_update_then_lookup() {
    let dir = TempDir::new().unwrap();
    let app = create_app(&dir);

    send(&app, Method::POST, "/predict", Some(score_request(11))).await;
    let (status, record) = send(
        &app,
        Method::POST,
        "/update",
        Some(json!({"observation_id": 11, "true_class": 1})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["observation_id"], 11);
    assert_eq!(record["true_class"], 1);
    let stored: Value = serde_json::from_str(record["observation"].as_str().unwrap()).unwrap();
    assert_eq!(stored, score_request(11));

    let (status, fetched) = send(&app, Method::GET, "/predictions/11", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["true_class"], 1);
    assert_eq!(fetched["proba"], record["proba"]);
}

#[tokio::test]
async fn test_update_unknown_id_is_not_found() {
    let dir = TempDir::new().unwrap();
    let app = create_app(&dir);

    let (status, body) = send(
        &app,
        Method::POST,
        "/update",
        Some(json!({"observation_id": 999, "true_class": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Observation ID: \"999\" does not exist");

    let (status, _) = send(&app, Method::GET, "/predictions/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_rejects_bad_label() {
    let dir = TempDir::new().unwrap();
    let app = create_app(&dir);

    send(&app, Method::POST, "/predict", Some(score_request(12))).await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/update",
        Some(json!({"observation_id": 12, "true_class": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "true_class");
}

#[tokio::test]
async fn test_body_limit() {
    let dir = TempDir::new().unwrap();
    let app = create_app(&dir);

    let mut request = score_request(13);
    request["data"]["padding"] = json!("x".repeat(8 * 1024));
    let (status, _) = send(&app, Method::POST, "/predict", Some(request)).await;
    assert!(status.is_client_error());

    let (status, _) = send(&app, Method::GET, "/predictions/13", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_check() {
    let dir = TempDir::new().unwrap();
    let app = create_app(&dir);

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model"], "heart-lr");
    assert_eq!(body["schema_columns"], 7);
    assert_eq!(body["ledger_records"], 0);
}
