//! ctv-mc library - Music Cue service
//!
//! Attaches music triggers to the phases of a circuit-training workout and
//! decides, as the workout runs, what the music should do:
//! - `phases` / `timing` derive the round timeline from its template
//! - `compat` judges whether a track can end naturally or rise from a rest
//! - `triggers` holds per-phase configuration and the apply cascade
//! - `runtime` evaluates phase visits and plans playback cues

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod compat;
pub mod error;
pub mod library;
pub mod persistence;
pub mod phases;
pub mod runtime;
pub mod service;
pub mod session;
pub mod template;
pub mod timing;
pub mod triggers;

pub use error::{Error, Result};
pub use service::MusicCueService;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MusicCueService>,
}

impl AppState {
    pub fn new(service: MusicCueService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let sessions = Router::new()
        .route("/api/sessions/:session_id/rounds", get(api::list_rounds))
        .route(
            "/api/sessions/:session_id/rounds/:round/phases",
            get(api::get_phases),
        )
        .route(
            "/api/sessions/:session_id/rounds/:round/music",
            get(api::get_music).put(api::put_music),
        )
        .route(
            "/api/sessions/:session_id/rounds/:round/music/defaults",
            post(api::apply_defaults),
        )
        .route(
            "/api/sessions/:session_id/rounds/:round/music/apply",
            post(api::apply_trigger_update),
        )
        .route(
            "/api/sessions/:session_id/rounds/:round/phases/:phase_key/candidates",
            get(api::get_candidates),
        )
        .route("/api/sessions/:session_id/reload", post(api::reload_session))
        .route("/api/sessions/:session_id/evaluate", post(api::evaluate_phase))
        .route(
            "/api/sessions/:session_id/evaluate/reset",
            post(api::reset_runtime),
        );

    let public = Router::new()
        .route("/api/buildinfo", get(api::get_build_info))
        .route("/api/tracks", get(api::list_tracks))
        .route("/api/events", get(api::event_stream))
        .merge(api::health_routes());

    Router::new()
        .merge(sessions)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
