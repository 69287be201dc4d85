//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE implementations for CTV services.

use crate::events::EventBus;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

/// Create an SSE stream that forwards every CueEvent on `bus`
///
/// The first message is a `ConnectionStatus: connected` event; lagged
/// receivers skip dropped events instead of closing the stream.
pub fn create_event_sse_stream(
    service_name: &'static str,
    bus: &EventBus,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = bus.subscribe();
    info!(
        "New SSE client connected to {} events ({} subscribers)",
        service_name,
        bus.subscriber_count()
    );
    let connected = futures::stream::once(async {
        Ok::<Event, Infallible>(Event::default().event("ConnectionStatus").data("connected"))
    });

    let events = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => {
                    debug!("Broadcasting SSE event: {}", event.event_type());
                    Some(Ok(Event::default().event(event.event_type()).data(json)))
                }
                Err(e) => {
                    warn!("Failed to serialize event: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("SSE stream error: {:?}", e);
                None
            }
        }
    });

    Sse::new(connected.chain(events)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
