//! HTTP error mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::core::RechnungError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Pipeline(#[from] RechnungError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Pipeline(e) => match e {
                RechnungError::UnsupportedDocument(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                RechnungError::ExtractionUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                RechnungError::ExtractionTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                RechnungError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Pipeline(e) => e.kind(),
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Pipeline(e @ RechnungError::Generation(_)) => {
                tracing::error!(error = %e, "generation failed");
                "Invoice generation failed".to_string()
            }
            ApiError::Pipeline(e @ RechnungError::Packaging(_)) => {
                tracing::error!(error = %e, "packaging failed");
                "PDF packaging failed".to_string()
            }
            ApiError::Pipeline(e @ RechnungError::Storage { .. }) => {
                tracing::error!(error = %e, "storage failed");
                "Storage error".to_string()
            }
            ApiError::Pipeline(e) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = %e, "internal error");
                "Internal error".to_string()
            }
            other => other.to_string(),
        };

        let mut body = json!({
            "error": message,
            "kind": self.kind(),
            "status": status.as_u16(),
        });
        if let ApiError::Pipeline(e) = &self {
            if !e.violations().is_empty() {
                body["violations"] = json!(e.violations());
            }
        }

        (status, Json(body)).into_response()
    }
}
