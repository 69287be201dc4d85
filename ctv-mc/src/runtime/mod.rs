//! Live workout evaluation
//!
//! The editor side configures triggers; this side consumes them while the TV
//! display runs a workout.

pub mod controller;
pub mod cues;

pub use controller::{EvaluationContext, PhaseKey, SkipReason, TriggerAction, TriggerController};
pub use cues::{plan_cue, plan_rise_from_rest, PlaybackCue};
