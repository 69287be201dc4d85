//! Event types for the CTV event system
//!
//! Provides shared event definitions and the EventBus used to fan events out
//! to SSE clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Where a round configuration change came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    /// An apply operation in this service
    Apply,
    /// A full-round replacement pushed from outside
    External,
}

/// CTV event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CueEvent {
    /// A round's music configuration was replaced
    ///
    /// Triggers:
    /// - SSE: TV display and editors reload the round snapshot
    RoundMusicConfigChanged {
        session_id: String,
        round_number: u32,
        source: ChangeSource,
        timestamp: DateTime<Utc>,
    },

    /// Arming a natural ending changed other triggers
    ///
    /// Triggers:
    /// - SSE: editor shows "N later triggers were turned off"
    CascadeApplied {
        session_id: String,
        round_number: u32,
        phase_key: String,
        disabled_triggers_count: usize,
        next_preview_armed: bool,
        timestamp: DateTime<Utc>,
    },

    /// Saving a round snapshot failed; the in-memory copy is still authoritative
    PersistenceFailed {
        session_id: String,
        round_number: u32,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl CueEvent {
    /// Event name used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            CueEvent::RoundMusicConfigChanged { .. } => "RoundMusicConfigChanged",
            CueEvent::CascadeApplied { .. } => "CascadeApplied",
            CueEvent::PersistenceFailed { .. } => "PersistenceFailed",
        }
    }
}

/// Broadcast bus for CueEvents
///
/// Slow subscribers lose the oldest events once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CueEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CueEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns the number of subscribers that received it (0 when nobody is
    /// listening, which is not an error for this bus).
    pub fn emit(&self, event: CueEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
