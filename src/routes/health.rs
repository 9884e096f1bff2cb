use crate::state::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "conference-portal",
        "env": state.config.gateway.env,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
