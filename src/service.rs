//! HTTP prediction service over a single trained model.

mod error;
mod handlers;
pub mod payload;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
    Router,
    routing::{get, post},
};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

pub use error::{ServiceError, ServiceResult};

use crate::{
    data::{dataset::DatasetBuilder, schema::CalendarSet},
    error::DemandResult,
    model::ForecastModel,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub n_lag_days: usize,
    /// Must match the calendar set the model was trained with.
    pub calendar: CalendarSet,
}

impl ServiceConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            model_path: model_path.into(),
            n_lag_days: 2,
            calendar: CalendarSet::default(),
        }
    }

    pub fn with_host(self, host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..self
        }
    }

    pub fn with_port(self, port: u16) -> Self {
        Self { port, ..self }
    }

    pub fn with_n_lag_days(self, n_lag_days: usize) -> Self {
        Self { n_lag_days, ..self }
    }

    pub fn with_calendar(self, calendar: CalendarSet) -> Self {
        Self { calendar, ..self }
    }

    pub fn dataset_builder(&self) -> DatasetBuilder {
        DatasetBuilder::new(self.n_lag_days).with_calendar(self.calendar)
    }
}

/// Shared, read-only request state: the model is loaded once at startup.
#[derive(Debug)]
pub struct AppState<M> {
    model: M,
    builder: DatasetBuilder,
}

impl<M: ForecastModel> AppState<M> {
    pub fn new(model: M, builder: DatasetBuilder) -> Self {
        Self { model, builder }
    }

    pub fn load(config: &ServiceConfig) -> DemandResult<Self> {
        let model = M::load(&config.model_path)?;
        Ok(Self::new(model, config.dataset_builder()))
    }

    pub fn builder(&self) -> &DatasetBuilder {
        &self.builder
    }

    /// Feature step then forecast; rows without a complete feature window
    /// are dropped before the model sees them.
    pub fn predict(&self, body: &Value) -> DemandResult<Array2<f64>> {
        let raw = payload::frame_from_json(body)?;
        let frame = self.builder.build_features(&raw)?;
        self.model.forecast(frame.features())
    }
}

pub fn create_router<M: ForecastModel + 'static>(state: Arc<AppState<M>>) -> Router {
    Router::new()
        .route("/predict", post(handlers::predict::<M>))
        .route("/health", get(handlers::health::<M>))
        .with_state(state)
}

/// Loads the model, binds `host:port` and serves until ctrl+c.
pub async fn serve<M: ForecastModel + 'static>(config: ServiceConfig) -> anyhow::Result<()> {
    let state = Arc::new(AppState::<M>::load(&config)?);
    info!(
        model = %config.model_path.display(),
        kind = M::KIND,
        n_lag_days = config.n_lag_days,
        "Loaded model"
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = create_router(state);

    let shutdown_signal = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping server gracefully"),
            Err(e) => {
                tracing::error!(error = %e, "Failed to install ctrl+c handler");
                std::future::pending::<()>().await;
            }
        }
    };

    info!(%addr, "Prediction service listening (press ctrl+c to stop)");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}
