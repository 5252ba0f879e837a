use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// GET /health: liveness plus the identity this instance stamps.
pub async fn health(State(app): State<AppState>) -> Json<serde_json::Value> {
    let orchestrator = &app.orchestrator;
    Json(serde_json::json!({
        "status": "ok",
        "service": orchestrator.service_name(),
        "backends": orchestrator.executor().gateway().backend_names(),
    }))
}
