//! Server-Sent Events for configuration changes
//!
//! Streams every CueEvent so the TV display and other editors reload rounds
//! as soon as they change.

use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

/// GET /api/events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    ctv_common::sse::create_event_sse_stream("ctv-mc", state.service.events())
}
