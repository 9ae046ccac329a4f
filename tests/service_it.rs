use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use demandcast::prelude::*;
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;

fn trained_state() -> Arc<AppState<RandomForestForecastModel>> {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("feed.csv");
    common::write_csv(&data, &common::records(10));

    let builder = DatasetBuilder::new(2);
    let raw = DataSource::Local(data).fetch().unwrap();
    let pair = builder.build(&raw).unwrap();

    let mut model = RandomForestForecastModel::new(
        ForestParams::default()
            .with_n_estimators(4)
            .with_max_depth(Some(6)),
    )
    .unwrap();
    model.train(pair.features(), pair.target()).unwrap();
    Arc::new(AppState::new(model, builder))
}

async fn post_predict(
    state: Arc<AppState<RandomForestForecastModel>>,
    body: &Value,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = create_router(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_predict_returns_one_horizon_per_complete_row() {
    let state = trained_state();
    // 4 days of half-hourly records = 96 hours; 47 lag and 24 lead hours drop out
    let body = common::to_json(&common::records(4));

    let (status, value) = post_predict(state, &body).await;
    assert_eq!(status, StatusCode::OK);

    let rows = value.as_array().unwrap();
    assert_eq!(rows.len(), 96 - 47 - 24);
    for row in rows {
        let row = row.as_array().unwrap();
        assert_eq!(row.len(), 24);
        assert!(row.iter().all(|v| v.as_f64().is_some_and(f64::is_finite)));
    }
}

#[tokio::test]
async fn test_predict_does_not_need_future_demand() {
    let state = trained_state();
    let records = common::records(4);
    let body_full = common::to_json(&records);

    // blank out demand that only the target would have used
    let mut body = common::to_json(&records);
    for record in body.as_array_mut().unwrap().iter_mut().skip(48 * 3 + 2) {
        record["Demand"] = Value::Null;
    }

    let (status_full, full) = post_predict(state.clone(), &body_full).await;
    let (status, partial) = post_predict(state, &body).await;
    assert_eq!(status_full, StatusCode::OK);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(partial, full);
}

#[tokio::test]
async fn test_missing_column_is_a_bad_request() {
    let state = trained_state();
    let mut body = common::to_json(&common::records(4));
    for record in body.as_array_mut().unwrap() {
        record.as_object_mut().unwrap().remove("Temperature");
    }

    let (status, value) = post_predict(state, &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"], json!(true));
    assert!(value["message"].as_str().unwrap().contains("Temperature"));
}

#[tokio::test]
async fn test_short_history_is_a_bad_request() {
    let state = trained_state();
    let body = common::to_json(&common::records(2));

    let (status, value) = post_predict(state, &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(value["message"].as_str().unwrap().contains("Insufficient history"));
}

#[tokio::test]
async fn test_health_reports_model() {
    let state = trained_state();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = create_router(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["model_kind"], json!(RandomForestForecastModel::KIND));
    assert_eq!(value["n_lag_days"], json!(2));
}
