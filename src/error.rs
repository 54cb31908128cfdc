/*
 * Responsibility
 * - アプリ共通の AppError 定義
 * - IntoResponse 実装 (HTTP status / JSON error body)
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("disallowed CORS {}", .failures.join(", "))]
    PreflightRejected { failures: Vec<&'static str> },
    #[error("request timed out")]
    Timeout,
    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn preflight_rejected(failures: Vec<&'static str>) -> Self {
        Self::PreflightRejected { failures }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::PreflightRejected { .. } => {
                (StatusCode::BAD_REQUEST, "CORS_PREFLIGHT_REJECTED")
            }
            AppError::Timeout => (StatusCode::REQUEST_TIMEOUT, "REQUEST_TIMEOUT"),
            AppError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR"),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code,
                message: self.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    #[tokio::test]
    async fn preflight_rejection_renders_json_body() {
        let response = AppError::preflight_rejected(vec!["origin", "method"]).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "CORS_PREFLIGHT_REJECTED");
        assert_eq!(body["error"]["message"], "disallowed CORS origin, method");
    }

    #[test]
    fn timeout_maps_to_408() {
        assert_eq!(
            AppError::Timeout.into_response().status(),
            StatusCode::REQUEST_TIMEOUT
        );
    }
}
