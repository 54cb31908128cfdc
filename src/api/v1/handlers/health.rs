/*
 * Responsibility
 * - GET /api/v1/health (疎通用、CORS の確認にも使う)
 */
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({"status": "ok", "env": state.app_env.as_str()})),
    )
}
