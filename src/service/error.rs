use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::error::DemandError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Demand(#[from] DemandError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServiceError::Demand(e) if e.is_input_error() => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            ServiceError::Demand(e) => {
                tracing::error!(detail = %e, "Prediction failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
            ServiceError::Internal(msg) => {
                tracing::error!(detail = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": true,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
