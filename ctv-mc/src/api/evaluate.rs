//! Live workout evaluation endpoints
//!
//! The TV display posts each phase it enters and gets back the music action
//! plus, for a specific track, where playback should start.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::error::Result;
use crate::service::{EvaluateRequest, EvaluateResponse};
use crate::AppState;

/// POST /api/sessions/:session_id/evaluate
///
/// Body: `{ "phaseKey": "exercise-0-0-1", "context": { "musicEnabled": true,
/// "paused": false, "currentSet": 1, "totalSets": 3 } }`
pub async fn evaluate_phase(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>> {
    Ok(Json(state.service.evaluate(&session_id, &request).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    /// Keep consumed countdown phases blocked
    #[serde(default)]
    pub triggered_only: bool,
}

/// POST /api/sessions/:session_id/evaluate/reset
pub async fn reset_runtime(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ResetRequest>,
) -> StatusCode {
    state
        .service
        .reset_runtime(&session_id, request.triggered_only)
        .await;
    StatusCode::NO_CONTENT
}
