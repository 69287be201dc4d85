//! Trigger controller
//!
//! Decides, each time the live workout enters a phase, what the music should
//! do. Deduplication keeps a phase from firing twice:
//! - triggered phases are skipped until the round changes or music is re-enabled
//! - consumed phases (manual countdowns) stay blocked until the round changes

use ctv_common::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::library::Energy;
use crate::phases::PhaseType;
use crate::triggers::{CountdownType, RoundMusicConfig, Trigger};

/// Identity of one phase visit in the live workout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhaseKey {
    pub phase_type: PhaseType,
    /// Zero-based round position in the workout
    pub round_index: u32,
    /// Index among same-typed phases in the round
    pub phase_index: usize,
    /// 1-based set number
    pub set_number: u32,
}

impl PhaseKey {
    pub fn new(phase_type: PhaseType, round_index: u32, phase_index: usize, set_number: u32) -> Self {
        Self {
            phase_type,
            round_index,
            phase_index,
            set_number,
        }
    }

    pub fn round_number(&self) -> u32 {
        self.round_index.saturating_add(1)
    }
}

/// `type-round-phase-set`, e.g. `exercise-0-2-1`
impl fmt::Display for PhaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.phase_type, self.round_index, self.phase_index, self.set_number
        )
    }
}

impl FromStr for PhaseKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidInput(format!("invalid phase key: {}", s));

        let parts: Vec<&str> = s.split('-').collect();
        let [phase_type, round_index, phase_index, set_number] = parts.as_slice() else {
            return Err(invalid());
        };

        // round_index + 1 must still be a round number
        let round_index: u32 = round_index.parse().map_err(|_| invalid())?;
        if round_index == u32::MAX {
            return Err(invalid());
        }

        Ok(Self {
            phase_type: PhaseType::parse(phase_type).ok_or_else(invalid)?,
            round_index,
            phase_index: phase_index.parse().map_err(|_| invalid())?,
            set_number: set_number.parse().map_err(|_| invalid())?,
        })
    }
}

impl Serialize for PhaseKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PhaseKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Live workout state consulted during evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationContext {
    pub music_enabled: bool,
    pub paused: bool,
    pub current_set: u32,
    pub total_sets: u32,
    /// Wall-clock time (ms since epoch) at which the current set ends
    #[serde(default)]
    pub round_end_time_ms: Option<u64>,
}

impl EvaluationContext {
    pub fn is_last_set(&self) -> bool {
        self.current_set >= self.total_sets
    }
}

/// Why a phase visit produced no music change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    MusicDisabled,
    WorkoutPaused,
    PhaseConsumed,
    AlreadyTriggered,
    TriggerNotEnabled,
    NaturalEndingNotLastSet,
    NotRepeatingOnAllSets,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            SkipReason::MusicDisabled => "music disabled",
            SkipReason::WorkoutPaused => "workout paused",
            SkipReason::PhaseConsumed => "phase consumed",
            SkipReason::AlreadyTriggered => "phase already triggered",
            SkipReason::TriggerNotEnabled => "trigger not enabled",
            SkipReason::NaturalEndingNotLastSet => "natural ending - not last set",
            SkipReason::NotRepeatingOnAllSets => "not repeating on all sets",
        };
        f.write_str(message)
    }
}

/// What the playback sink should do on entering a phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TriggerAction {
    None {
        reason: SkipReason,
    },
    #[serde(rename_all = "camelCase")]
    Play {
        energy: Energy,
        track_id: Option<String>,
        use_buildup: bool,
        natural_ending: bool,
        /// Set end time for a precise natural ending
        round_end_time_ms: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    RiseCountdown { track_id: Option<String> },
    #[serde(rename_all = "camelCase")]
    HighCountdown {
        track_id: Option<String>,
        duration_ms: u64,
    },
}

impl TriggerAction {
    fn skip(reason: SkipReason) -> Self {
        TriggerAction::None { reason }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, TriggerAction::None { .. })
    }

    pub fn track_id(&self) -> Option<&str> {
        match self {
            TriggerAction::None { .. } => None,
            TriggerAction::Play { track_id, .. }
            | TriggerAction::RiseCountdown { track_id }
            | TriggerAction::HighCountdown { track_id, .. } => track_id.as_deref(),
        }
    }
}

/// Per-display evaluation and deduplication state
#[derive(Debug, Clone)]
pub struct TriggerController {
    triggered: HashSet<PhaseKey>,
    consumed: HashSet<PhaseKey>,
    current_round: Option<u32>,
    high_countdown_ms: u64,
}

impl TriggerController {
    pub fn new(high_countdown_ms: u64) -> Self {
        Self {
            triggered: HashSet::new(),
            consumed: HashSet::new(),
            current_round: None,
            high_countdown_ms,
        }
    }

    pub fn mark_triggered(&mut self, phase: PhaseKey) {
        self.triggered.insert(phase);
    }

    pub fn is_triggered(&self, phase: &PhaseKey) -> bool {
        self.triggered.contains(phase)
    }

    /// Block a phase even if the workout re-enters it
    pub fn consume_phase(&mut self, phase: PhaseKey) {
        self.consumed.insert(phase);
        self.triggered.insert(phase);
    }

    pub fn is_consumed(&self, phase: &PhaseKey) -> bool {
        self.consumed.contains(phase)
    }

    /// Clear all state when a different round starts
    ///
    /// Re-entering the same round keeps consumed phases blocked.
    pub fn reset_for_round(&mut self, round_index: u32) {
        if self.current_round != Some(round_index) {
            debug!(
                "Trigger controller entering round {} (was {:?})",
                round_index, self.current_round
            );
            self.triggered.clear();
            self.consumed.clear();
            self.current_round = Some(round_index);
        }
    }

    pub fn reset(&mut self) {
        self.triggered.clear();
        self.consumed.clear();
        self.current_round = None;
    }

    /// Let ordinary triggers fire again, keeping consumed phases blocked
    pub fn clear_triggered_only(&mut self) {
        self.triggered.clear();
    }

    /// Decide the action for entering `phase` without recording it
    pub fn evaluate(
        &mut self,
        phase: &PhaseKey,
        config: Option<&RoundMusicConfig>,
        ctx: &EvaluationContext,
    ) -> TriggerAction {
        if !ctx.music_enabled {
            return TriggerAction::skip(SkipReason::MusicDisabled);
        }
        if ctx.paused {
            return TriggerAction::skip(SkipReason::WorkoutPaused);
        }

        if self.is_consumed(phase) {
            self.mark_triggered(*phase);
            return TriggerAction::skip(SkipReason::PhaseConsumed);
        }
        if self.is_triggered(phase) {
            return TriggerAction::skip(SkipReason::AlreadyTriggered);
        }

        let Some(trigger) = enabled_trigger(config, phase) else {
            return TriggerAction::skip(SkipReason::TriggerNotEnabled);
        };

        if matches!(phase.phase_type, PhaseType::Exercise | PhaseType::Rest) {
            if trigger.natural_ending && !ctx.is_last_set() {
                return TriggerAction::skip(SkipReason::NaturalEndingNotLastSet);
            }
            if !trigger.natural_ending && ctx.current_set > 1 && !trigger.repeat_on_all_sets {
                return TriggerAction::skip(SkipReason::NotRepeatingOnAllSets);
            }
        }

        if phase.phase_type == PhaseType::Exercise && phase.phase_index == 0 {
            match trigger.countdown_type() {
                Some(CountdownType::Rise) => {
                    return TriggerAction::RiseCountdown {
                        track_id: trigger.track_id.clone(),
                    };
                }
                Some(CountdownType::High) => {
                    return TriggerAction::HighCountdown {
                        track_id: trigger.track_id.clone(),
                        duration_ms: self.high_countdown_ms,
                    };
                }
                None => {}
            }
        }

        let natural_ending = trigger.natural_ending && ctx.is_last_set();
        TriggerAction::Play {
            energy: trigger.effective_energy(phase.phase_type),
            track_id: trigger.track_id.clone(),
            use_buildup: trigger.use_buildup && !trigger.natural_ending,
            natural_ending,
            round_end_time_ms: if natural_ending {
                ctx.round_end_time_ms
            } else {
                None
            },
        }
    }

    /// Evaluate and record the visit
    ///
    /// Countdowns consume the phase; plays mark it triggered.
    pub fn fire(
        &mut self,
        phase: &PhaseKey,
        config: Option<&RoundMusicConfig>,
        ctx: &EvaluationContext,
    ) -> TriggerAction {
        if phase.phase_type == PhaseType::Preview {
            self.reset_for_round(phase.round_index);
        }

        let action = self.evaluate(phase, config, ctx);
        match action {
            TriggerAction::RiseCountdown { .. } | TriggerAction::HighCountdown { .. } => {
                self.consume_phase(*phase)
            }
            TriggerAction::Play { .. } => self.mark_triggered(*phase),
            TriggerAction::None { .. } => {}
        }

        debug!("Evaluated {}: {:?}", phase, action);
        action
    }

    /// Countdown that entering `phase` would start, ahead of the transition
    pub fn should_trigger_countdown(
        &self,
        phase: &PhaseKey,
        config: Option<&RoundMusicConfig>,
    ) -> Option<CountdownType> {
        if phase.phase_type != PhaseType::Exercise || phase.phase_index != 0 {
            return None;
        }
        if self.is_consumed(phase) {
            return None;
        }
        enabled_trigger(config, phase).and_then(Trigger::countdown_type)
    }
}

/// Countdown configured on a round's first exercise, for display
pub fn countdown_info(config: Option<&RoundMusicConfig>) -> Option<CountdownType> {
    config
        .and_then(|c| c.exercises.first())
        .filter(|t| t.enabled)
        .and_then(Trigger::countdown_type)
}

fn enabled_trigger<'c>(config: Option<&'c RoundMusicConfig>, phase: &PhaseKey) -> Option<&'c Trigger> {
    config
        .and_then(|c| c.trigger(phase.phase_type, phase.phase_index))
        .filter(|t| t.enabled)
}
