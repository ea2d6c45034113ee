use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;

use crate::chat::ChatState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub provider: HealthCheck,
    pub checked_at: String,
}

/// Sessions live in process memory and the fallback provider is only dialed
/// mid-conversation, so readiness is simply "the runtime is up". The
/// provider check reports which backend is configured, not its liveness.
pub async fn health(State(state): State<ChatState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "haggle-server runtime initialized".to_string(),
        },
        provider: HealthCheck {
            status: "configured",
            detail: format!("fallback provider: {}", state.llm_provider),
        },
        checked_at: Utc::now().to_rfc3339(),
    })
}
