//! HTTP API handlers for ctv-mc

pub mod buildinfo;
pub mod evaluate;
pub mod health;
pub mod rounds;
pub mod sse;
pub mod tracks;

pub use buildinfo::get_build_info;
pub use evaluate::{evaluate_phase, reset_runtime};
pub use health::health_routes;
pub use rounds::{
    apply_defaults, apply_trigger_update, get_candidates, get_music, get_phases, list_rounds,
    put_music, reload_session,
};
pub use sse::event_stream;
pub use tracks::list_tracks;
