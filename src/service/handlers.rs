use std::{sync::Arc, time::Instant};

use axum::{Json, extract::State};
use serde_json::{Value, json};
use tracing::info;

use super::{
    AppState,
    error::{ServiceError, ServiceResult},
};
use crate::model::ForecastModel;

/// `POST /predict`: raw table in, one row of 24 hourly forecasts per
/// complete feature row out.
pub async fn predict<M: ForecastModel + 'static>(
    State(state): State<Arc<AppState<M>>>,
    Json(body): Json<Value>,
) -> ServiceResult<Json<Vec<Vec<f64>>>> {
    let started = Instant::now();

    let forecast = tokio::task::spawn_blocking(move || state.predict(&body))
        .await
        .map_err(|e| ServiceError::Internal(format!("Task Join Error: {e}")))??;

    let rows: Vec<Vec<f64>> = forecast.outer_iter().map(|row| row.to_vec()).collect();
    info!(
        rows = rows.len(),
        elapsed = %humantime::format_duration(started.elapsed()),
        "Served forecast"
    );
    Ok(Json(rows))
}

pub async fn health<M: ForecastModel + 'static>(
    State(state): State<Arc<AppState<M>>>,
) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "model_kind": M::KIND,
        "n_lag_days": state.builder().n_lag_days(),
    }))
}
