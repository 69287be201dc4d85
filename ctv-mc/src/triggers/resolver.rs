//! Trigger resolver
//!
//! `apply_trigger` merges a draft update into one phase's trigger and runs the
//! cascade rules when a natural ending is armed:
//!
//! 1. every enabled trigger strictly after the phase, in the same round, is
//!    disabled and counted
//! 2. when the round is not the last, the next round's preview is enabled at
//!    high energy unless it already is
//!
//! The function is pure. The caller persists `round_config` and
//! `next_round_config` together as one atomic write.
//!
//! `validate_round` holds a whole-round replacement to the same rules.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::compat::{check_natural_ending_for, IncompatibilityReason};
use crate::library::{Energy, Track};
use crate::phases::{exercise_count, Phase, PhaseType};
use crate::template::RoundPlan;
use crate::timing::TimingCalculator;

use super::{
    tracks_used_elsewhere, RoundMusicConfig, TrackSelection, Trigger, TriggerSlot, TriggerUpdate,
    WorkoutMusic,
};

/// Rejected trigger updates
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApplyError {
    #[error("useBuildup and showHighCountdown cannot both be enabled")]
    ConflictingCountdownFlags,

    #[error("Unknown track: {0}")]
    UnknownTrack(String),

    #[error("Track {track_id} cannot end naturally here: {reason}")]
    IncompatibleTrack {
        track_id: String,
        reason: IncompatibilityReason,
    },

    #[error("No track in the library can end naturally from phase {0}")]
    NoCompatibleTrack(String),

    #[error("Phase {0} is not part of this round")]
    PhaseNotInRound(String),

    #[error("Natural ending on {0} needs a specific track")]
    RandomNaturalEnding(String),

    #[error("Phase {phase} follows the natural ending armed on {armed} and cannot be enabled")]
    TriggerAfterNaturalEnding { phase: String, armed: String },
}

/// Everything `apply_trigger` reads
pub struct ApplyContext<'a> {
    pub plan: &'a RoundPlan,
    /// Phases of `plan`, in generation order
    pub phases: &'a [Phase],
    pub total_rounds: u32,
    pub tracks: &'a [Track],
    /// Current configuration of every round in the workout
    pub workout: &'a WorkoutMusic,
    pub timing: &'a TimingCalculator,
}

/// Result of one apply
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub round_number: u32,
    pub round_config: RoundMusicConfig,
    /// Present only when the next round's preview was armed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_round_config: Option<RoundMusicConfig>,
    /// The merged trigger as stored
    pub trigger: Trigger,
    pub disabled_triggers_count: usize,
    pub next_preview_armed: bool,
    /// Track picked automatically for a random natural-ending trigger
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_track_id: Option<String>,
}

/// Merge `update` into the trigger for `phase` and run the cascade rules
pub fn apply_trigger<R: Rng + ?Sized>(
    ctx: &ApplyContext<'_>,
    phase: &Phase,
    update: &TriggerUpdate,
    rng: &mut R,
) -> Result<ApplyOutcome, ApplyError> {
    let template = &ctx.plan.template;
    let round_number = template.round_number;

    let position = ctx
        .phases
        .iter()
        .position(|p| p.key == phase.key)
        .ok_or_else(|| ApplyError::PhaseNotInRound(phase.key.clone()))?;

    if update.use_buildup == Some(true) && update.show_high_countdown == Some(true) {
        return Err(ApplyError::ConflictingCountdownFlags);
    }

    let mut round_config = ctx.workout.get(&round_number).cloned().unwrap_or_default();
    let mut trigger = round_config
        .trigger(phase.phase_type, phase.index)
        .cloned()
        .unwrap_or_else(|| Trigger::disabled_for(phase.phase_type));

    merge_update(&mut trigger, update, ctx.tracks)?;
    normalize_flags(&mut trigger, phase.phase_type, template.has_multiple_sets());

    if trigger.enabled {
        if let Some(earlier) = armed_natural_ending(&round_config, &ctx.phases[..position]) {
            return Err(ApplyError::TriggerAfterNaturalEnding {
                phase: phase.key.clone(),
                armed: earlier.key.clone(),
            });
        }
    }

    let armed = trigger.enabled && trigger.natural_ending;
    let mut resolved_track_id = None;

    if armed {
        let remaining =
            ctx.timing
                .remaining_set_duration(phase, template, exercise_count(ctx.plan));
        let slot = TriggerSlot {
            round_number,
            phase_type: phase.phase_type,
            index: phase.index,
        };

        match trigger.track_id.as_deref() {
            Some(track_id) => {
                let track = find_track(ctx.tracks, track_id)?;
                let verdict = check_natural_ending_for(track, remaining);
                if let Some(reason) = verdict.reason {
                    return Err(ApplyError::IncompatibleTrack {
                        track_id: track_id.to_string(),
                        reason,
                    });
                }
            }
            None => {
                let used = tracks_used_elsewhere(ctx.workout, Some(slot));
                let compatible: Vec<&Track> = ctx
                    .tracks
                    .iter()
                    .filter(|t| check_natural_ending_for(t, remaining).compatible)
                    .collect();
                let unused: Vec<&Track> = compatible
                    .iter()
                    .copied()
                    .filter(|t| !used.contains(&t.id))
                    .collect();
                let pool = if unused.is_empty() { &compatible } else { &unused };

                let picked = pool
                    .choose(rng)
                    .ok_or_else(|| ApplyError::NoCompatibleTrack(phase.key.clone()))?;

                debug!(
                    "Resolved random natural ending on {} to track {} ({} candidates)",
                    phase.key,
                    picked.id,
                    pool.len()
                );
                trigger.track_id = Some(picked.id.clone());
                trigger.track_name = Some(picked.name.clone());
                resolved_track_id = Some(picked.id.clone());
            }
        }
    }

    *round_config.slot_mut(phase.phase_type, phase.index) = trigger.clone();

    let mut disabled_triggers_count = 0;
    let mut next_round_config = None;

    if armed {
        for later in &ctx.phases[position + 1..] {
            if let Some(t) = round_config.trigger_mut(later.phase_type, later.index) {
                if t.enabled {
                    t.enabled = false;
                    disabled_triggers_count += 1;
                }
            }
        }

        if round_number < ctx.total_rounds {
            let next_number = round_number + 1;
            let mut next = ctx.workout.get(&next_number).cloned().unwrap_or_default();
            let preview_enabled = next.round_preview.as_ref().is_some_and(|t| t.enabled);

            if !preview_enabled {
                let preview = next.slot_mut(PhaseType::Preview, 0);
                preview.enabled = true;
                preview.energy = Some(Energy::High);
                next_round_config = Some(next);
            }
        }

        info!(
            "Natural ending armed on round {} {}: disabled {} later triggers, next preview armed: {}",
            round_number,
            phase.key,
            disabled_triggers_count,
            next_round_config.is_some()
        );
    }

    Ok(ApplyOutcome {
        round_number,
        round_config,
        next_preview_armed: next_round_config.is_some(),
        next_round_config,
        trigger,
        disabled_triggers_count,
        resolved_track_id,
    })
}

/// Check a whole-round replacement against the rules `apply_trigger` enforces
///
/// Flags are normalized as on apply and track names are filled in from the
/// library. Unlike apply, nothing is cascaded: an enabled trigger after an
/// armed natural ending is rejected.
pub fn validate_round(
    plan: &RoundPlan,
    phases: &[Phase],
    tracks: &[Track],
    timing: &TimingCalculator,
    mut config: RoundMusicConfig,
) -> Result<RoundMusicConfig, ApplyError> {
    let template = &plan.template;

    if let Some((phase_type, index, _)) = config
        .triggers()
        .find(|(phase_type, index, _)| {
            !phases
                .iter()
                .any(|p| p.phase_type == *phase_type && p.index == *index)
        })
    {
        return Err(ApplyError::PhaseNotInRound(format!("{}{}", phase_type, index)));
    }

    let mut armed_at: Option<&Phase> = None;
    for phase in phases {
        let Some(trigger) = config.trigger_mut(phase.phase_type, phase.index) else {
            continue;
        };

        if trigger.use_buildup && trigger.show_high_countdown {
            return Err(ApplyError::ConflictingCountdownFlags);
        }
        normalize_flags(trigger, phase.phase_type, template.has_multiple_sets());

        let track = match trigger.track_id.as_deref() {
            Some(track_id) => Some(find_track(tracks, track_id)?),
            None => None,
        };
        trigger.track_name = track.map(|t| t.name.clone());

        if !trigger.enabled {
            continue;
        }
        if let Some(armed) = armed_at {
            return Err(ApplyError::TriggerAfterNaturalEnding {
                phase: phase.key.clone(),
                armed: armed.key.clone(),
            });
        }

        if trigger.natural_ending {
            let track = track.ok_or_else(|| ApplyError::RandomNaturalEnding(phase.key.clone()))?;
            let remaining = timing.remaining_set_duration(phase, template, exercise_count(plan));
            if let Some(reason) = check_natural_ending_for(track, remaining).reason {
                return Err(ApplyError::IncompatibleTrack {
                    track_id: track.id.clone(),
                    reason,
                });
            }
            armed_at = Some(phase);
        }
    }

    Ok(config)
}

/// First phase in `earlier` whose trigger is an enabled natural ending
fn armed_natural_ending<'p>(config: &RoundMusicConfig, earlier: &'p [Phase]) -> Option<&'p Phase> {
    earlier.iter().find(|p| {
        config
            .trigger(p.phase_type, p.index)
            .is_some_and(|t| t.enabled && t.natural_ending)
    })
}

fn find_track<'t>(tracks: &'t [Track], track_id: &str) -> Result<&'t Track, ApplyError> {
    tracks
        .iter()
        .find(|t| t.id == track_id)
        .ok_or_else(|| ApplyError::UnknownTrack(track_id.to_string()))
}

fn merge_update(trigger: &mut Trigger, update: &TriggerUpdate, tracks: &[Track]) -> Result<(), ApplyError> {
    if let Some(enabled) = update.enabled {
        trigger.enabled = enabled;
    }

    match &update.track {
        Some(TrackSelection::Random) => {
            trigger.track_id = None;
            trigger.track_name = None;
        }
        Some(TrackSelection::Specific { track_id }) => {
            let track = find_track(tracks, track_id)?;
            trigger.track_id = Some(track.id.clone());
            trigger.track_name = Some(track.name.clone());
        }
        None => {}
    }

    if let Some(energy) = update.energy {
        trigger.energy = Some(energy);
    }

    // Turning one countdown on turns the other off
    if let Some(use_buildup) = update.use_buildup {
        trigger.use_buildup = use_buildup;
        if use_buildup {
            trigger.show_high_countdown = false;
        }
    }
    if let Some(show_high) = update.show_high_countdown {
        trigger.show_high_countdown = show_high;
        if show_high {
            trigger.use_buildup = false;
        }
    }

    if let Some(repeat) = update.repeat_on_all_sets {
        trigger.repeat_on_all_sets = repeat;
    }
    if let Some(natural_ending) = update.natural_ending {
        trigger.natural_ending = natural_ending;
    }

    Ok(())
}

fn normalize_flags(trigger: &mut Trigger, phase_type: PhaseType, multiple_sets: bool) {
    if !phase_type.allows_countdown() {
        trigger.use_buildup = false;
        trigger.show_high_countdown = false;
    }

    // Stored documents may predate the exclusivity rule
    if trigger.use_buildup && trigger.show_high_countdown {
        trigger.show_high_countdown = false;
    }

    if !multiple_sets {
        trigger.repeat_on_all_sets = false;
    }
}
