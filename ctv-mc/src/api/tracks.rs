//! Track library listing

use axum::{
    extract::{Query, State},
    Json,
};

use crate::error::Result;
use crate::library::{Track, TrackFilter};
use crate::AppState;

/// GET /api/tracks?energy=high&search=drop&minDurationMs=120000
///
/// Tracks ordered by name, each with its energy segments.
pub async fn list_tracks(
    State(state): State<AppState>,
    Query(filter): Query<TrackFilter>,
) -> Result<Json<Vec<Track>>> {
    Ok(Json(state.service.list_tracks(&filter).await?))
}
