use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use nestcall_core::Envelope;

use crate::error::AppError;
use crate::state::AppState;

/// POST /: run every action in the envelope and return it annotated.
///
/// Always 200 once the envelope is accepted; per-action failures are
/// reported through each action's `status`.
pub async fn nested_call(
    State(app): State<AppState>,
    body: Result<Json<Envelope>, JsonRejection>,
) -> Result<Json<Envelope>, AppError> {
    let Json(envelope) = body.map_err(|e| AppError::bad_request(e.body_text()))?;
    envelope.check_limits(&app.limits)?;

    let processed = app.orchestrator.process(envelope).await;
    Ok(Json(processed.envelope))
}
