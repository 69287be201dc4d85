//! Round phase and music configuration endpoints
//!
//! Editors read a round's phases, its stored and effective music
//! configuration, and per-phase track candidates. Changes come in two forms:
//! - `PUT .../music` replaces the whole round as-is
//! - `POST .../music/apply` merges one phase's draft and runs the cascade

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::compat::TrackCandidate;
use crate::error::Result;
use crate::service::{
    ApplyRequest, CandidateMode, DefaultPreset, RoundMusicView, RoundPhases, RoundSummary,
    SaveReport,
};
use crate::session::ApplyReport;
use crate::triggers::RoundMusicConfig;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CandidateParams {
    #[serde(default)]
    pub mode: CandidateMode,
}

#[derive(Debug, Deserialize)]
pub struct PresetRequest {
    pub preset: DefaultPreset,
}

/// GET /api/sessions/:session_id/rounds
pub async fn list_rounds(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<RoundSummary>>> {
    Ok(Json(state.service.list_rounds(&session_id).await?))
}

/// GET /api/sessions/:session_id/rounds/:round/phases
pub async fn get_phases(
    State(state): State<AppState>,
    Path((session_id, round)): Path<(String, u32)>,
) -> Result<Json<RoundPhases>> {
    Ok(Json(state.service.phases(&session_id, round).await?))
}

/// GET /api/sessions/:session_id/rounds/:round/music
pub async fn get_music(
    State(state): State<AppState>,
    Path((session_id, round)): Path<(String, u32)>,
) -> Result<Json<RoundMusicView>> {
    Ok(Json(state.service.music(&session_id, round).await?))
}

/// PUT /api/sessions/:session_id/rounds/:round/music
///
/// Full replace. `persisted: false` means the store rejected the write and
/// the service is running on its in-memory copy.
pub async fn put_music(
    State(state): State<AppState>,
    Path((session_id, round)): Path<(String, u32)>,
    Json(config): Json<RoundMusicConfig>,
) -> Result<Json<SaveReport>> {
    Ok(Json(
        state
            .service
            .replace_music(&session_id, round, config)
            .await?,
    ))
}

/// POST /api/sessions/:session_id/rounds/:round/music/defaults
///
/// Body: `{ "preset": "minimal" }` or `{ "preset": "full" }`
pub async fn apply_defaults(
    State(state): State<AppState>,
    Path((session_id, round)): Path<(String, u32)>,
    Json(request): Json<PresetRequest>,
) -> Result<Json<SaveReport>> {
    Ok(Json(
        state
            .service
            .apply_preset(&session_id, round, request.preset)
            .await?,
    ))
}

/// POST /api/sessions/:session_id/rounds/:round/music/apply
///
/// Body: `{ "phaseKey": "r1-p3-exercise1", "enabled": true,
/// "track": { "mode": "random" }, "naturalEnding": true, "dryRun": false }`
pub async fn apply_trigger_update(
    State(state): State<AppState>,
    Path((session_id, round)): Path<(String, u32)>,
    Json(request): Json<ApplyRequest>,
) -> Result<Json<ApplyReport>> {
    Ok(Json(state.service.apply(&session_id, round, &request).await?))
}

/// GET /api/sessions/:session_id/rounds/:round/phases/:phase_key/candidates?mode=naturalEnding
pub async fn get_candidates(
    State(state): State<AppState>,
    Path((session_id, round, phase_key)): Path<(String, u32, String)>,
    Query(params): Query<CandidateParams>,
) -> Result<Json<Vec<TrackCandidate>>> {
    Ok(Json(
        state
            .service
            .candidates(&session_id, round, &phase_key, params.mode)
            .await?,
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadResponse {
    pub session_id: String,
    pub rounds: usize,
}

/// POST /api/sessions/:session_id/reload
///
/// Discards local changes the store never accepted.
pub async fn reload_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ReloadResponse>> {
    let rounds = state.service.reload(&session_id).await?;
    Ok(Json(ReloadResponse { session_id, rounds }))
}
