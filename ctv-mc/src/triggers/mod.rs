//! Trigger store
//!
//! A trigger is the music behaviour attached to one phase. A round's triggers
//! live in a [`RoundMusicConfig`], addressed by phase type and index, and are
//! persisted as one JSON document per round.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::library::Energy;
use crate::phases::PhaseType;

pub mod defaults;
pub mod resolver;

pub use resolver::{apply_trigger, validate_round, ApplyContext, ApplyError, ApplyOutcome};

/// Music behaviour for one phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub enabled: bool,
    /// `None` selects a track at random by energy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<Energy>,
    /// Rise: start at the build-up before the drop
    #[serde(default)]
    pub use_buildup: bool,
    #[serde(default)]
    pub show_high_countdown: bool,
    #[serde(default)]
    pub repeat_on_all_sets: bool,
    #[serde(default)]
    pub natural_ending: bool,
}

impl Trigger {
    /// A disabled trigger carrying the phase's default energy
    pub fn disabled_for(phase_type: PhaseType) -> Self {
        Self {
            energy: Some(defaults::default_energy(phase_type)),
            ..Self::default()
        }
    }

    pub fn is_random(&self) -> bool {
        self.track_id.is_none()
    }

    /// Energy to play, falling back to the phase default
    pub fn effective_energy(&self, phase_type: PhaseType) -> Energy {
        self.energy
            .unwrap_or_else(|| defaults::default_energy(phase_type))
    }

    /// Countdown overlay implied by the flags
    pub fn countdown_type(&self) -> Option<CountdownType> {
        if self.use_buildup {
            Some(CountdownType::Rise)
        } else if self.show_high_countdown && self.energy == Some(Energy::High) {
            Some(CountdownType::High)
        } else {
            None
        }
    }
}

/// Countdown overlay shown before the first exercise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CountdownType {
    /// Build-up from medium into the high-energy drop
    Rise,
    /// Duck the current music, count down, drop to high
    High,
}

/// All triggers of one round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundMusicConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_preview: Option<Trigger>,
    #[serde(default)]
    pub exercises: Vec<Trigger>,
    #[serde(default)]
    pub rests: Vec<Trigger>,
    #[serde(default)]
    pub set_breaks: Vec<Trigger>,
}

/// Music configuration of a whole workout, keyed by round number
pub type WorkoutMusic = BTreeMap<u32, RoundMusicConfig>;

impl RoundMusicConfig {
    /// Trigger configured for a phase slot, if any
    pub fn trigger(&self, phase_type: PhaseType, index: usize) -> Option<&Trigger> {
        match phase_type {
            PhaseType::Preview => self.round_preview.as_ref(),
            PhaseType::Exercise => self.exercises.get(index),
            PhaseType::Rest => self.rests.get(index),
            PhaseType::SetBreak => self.set_breaks.get(index),
        }
    }

    /// Existing trigger for a slot, or `None` without creating one
    pub fn trigger_mut(&mut self, phase_type: PhaseType, index: usize) -> Option<&mut Trigger> {
        match phase_type {
            PhaseType::Preview => self.round_preview.as_mut(),
            PhaseType::Exercise => self.exercises.get_mut(index),
            PhaseType::Rest => self.rests.get_mut(index),
            PhaseType::SetBreak => self.set_breaks.get_mut(index),
        }
    }

    /// Trigger for a slot, growing the array with disabled defaults as needed
    pub fn slot_mut(&mut self, phase_type: PhaseType, index: usize) -> &mut Trigger {
        let list = match phase_type {
            PhaseType::Preview => {
                return self
                    .round_preview
                    .get_or_insert_with(|| Trigger::disabled_for(PhaseType::Preview));
            }
            PhaseType::Exercise => &mut self.exercises,
            PhaseType::Rest => &mut self.rests,
            PhaseType::SetBreak => &mut self.set_breaks,
        };

        if list.len() <= index {
            list.resize_with(index + 1, || Trigger::disabled_for(phase_type));
        }
        &mut list[index]
    }

    /// True when any trigger in the round is enabled
    pub fn has_music_config(&self) -> bool {
        self.triggers().any(|(_, _, t)| t.enabled)
    }

    /// Every configured trigger with its slot
    pub fn triggers(&self) -> impl Iterator<Item = (PhaseType, usize, &Trigger)> {
        let preview = self
            .round_preview
            .iter()
            .map(|t| (PhaseType::Preview, 0, t));
        let exercises = self
            .exercises
            .iter()
            .enumerate()
            .map(|(i, t)| (PhaseType::Exercise, i, t));
        let rests = self
            .rests
            .iter()
            .enumerate()
            .map(|(i, t)| (PhaseType::Rest, i, t));
        let set_breaks = self
            .set_breaks
            .iter()
            .enumerate()
            .map(|(i, t)| (PhaseType::SetBreak, i, t));

        preview.chain(exercises).chain(rests).chain(set_breaks)
    }
}

/// Slot of one trigger in a workout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerSlot {
    pub round_number: u32,
    pub phase_type: PhaseType,
    pub index: usize,
}

/// Track ids referenced by any trigger in the workout except `exclude`
pub fn tracks_used_elsewhere(workout: &WorkoutMusic, exclude: Option<TriggerSlot>) -> HashSet<String> {
    workout
        .iter()
        .flat_map(|(round_number, config)| {
            config
                .triggers()
                .filter(move |(phase_type, index, _)| {
                    exclude
                        != Some(TriggerSlot {
                            round_number: *round_number,
                            phase_type: *phase_type,
                            index: *index,
                        })
                })
                .filter_map(|(_, _, t)| t.track_id.clone())
        })
        .collect()
}

/// How an update picks the track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum TrackSelection {
    /// Energy-driven selection at playback time
    Random,
    #[serde(rename_all = "camelCase")]
    Specific { track_id: String },
}

/// Draft edits for one trigger; unset fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerUpdate {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub track: Option<TrackSelection>,
    #[serde(default)]
    pub energy: Option<Energy>,
    #[serde(default)]
    pub use_buildup: Option<bool>,
    #[serde(default)]
    pub show_high_countdown: Option<bool>,
    #[serde(default)]
    pub repeat_on_all_sets: Option<bool>,
    #[serde(default)]
    pub natural_ending: Option<bool>,
}

impl TriggerUpdate {
    pub fn enable() -> Self {
        Self {
            enabled: Some(true),
            ..Self::default()
        }
    }

    pub fn disable() -> Self {
        Self {
            enabled: Some(false),
            ..Self::default()
        }
    }

    pub fn with_natural_ending(mut self, natural_ending: bool) -> Self {
        self.natural_ending = Some(natural_ending);
        self
    }

    pub fn with_track(mut self, track_id: &str) -> Self {
        self.track = Some(TrackSelection::Specific {
            track_id: track_id.to_string(),
        });
        self
    }

    pub fn with_energy(mut self, energy: Energy) -> Self {
        self.energy = Some(energy);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persisted_shape_is_camel_case() {
        let config = RoundMusicConfig {
            round_preview: Some(Trigger {
                enabled: true,
                energy: Some(Energy::Low),
                ..Trigger::default()
            }),
            exercises: vec![Trigger {
                enabled: true,
                track_id: Some("t1".to_string()),
                track_name: Some("Song".to_string()),
                energy: Some(Energy::High),
                use_buildup: true,
                ..Trigger::default()
            }],
            ..RoundMusicConfig::default()
        };

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["roundPreview"]["energy"], "low");
        assert_eq!(json["exercises"][0]["trackId"], "t1");
        assert_eq!(json["exercises"][0]["useBuildup"], true);
        assert_eq!(json["setBreaks"], serde_json::json!([]));
    }

    #[test]
    fn test_sparse_document_deserializes() {
        let config: RoundMusicConfig =
            serde_json::from_str(r#"{ "exercises": [{ "enabled": true }] }"#).unwrap();

        assert!(config.round_preview.is_none());
        assert_eq!(config.exercises.len(), 1);
        assert!(config.exercises[0].is_random());
        assert_eq!(config.exercises[0].effective_energy(PhaseType::Exercise), Energy::High);
        assert!(config.rests.is_empty());
    }

    #[test]
    fn test_slot_mut_grows_with_disabled_defaults() {
        let mut config = RoundMusicConfig::default();
        config.slot_mut(PhaseType::Rest, 2).enabled = true;

        assert_eq!(config.rests.len(), 3);
        assert!(!config.rests[0].enabled);
        assert_eq!(config.rests[0].energy, Some(Energy::Low));
        assert!(config.rests[2].enabled);
    }

    #[test]
    fn test_has_music_config() {
        let mut config = RoundMusicConfig::default();
        assert!(!config.has_music_config());

        config.slot_mut(PhaseType::SetBreak, 0);
        assert!(!config.has_music_config());

        config.slot_mut(PhaseType::SetBreak, 0).enabled = true;
        assert!(config.has_music_config());
    }

    #[test]
    fn test_countdown_inference() {
        let mut trigger = Trigger {
            enabled: true,
            energy: Some(Energy::High),
            ..Trigger::default()
        };
        assert_eq!(trigger.countdown_type(), None);

        trigger.show_high_countdown = true;
        assert_eq!(trigger.countdown_type(), Some(CountdownType::High));

        trigger.energy = Some(Energy::Low);
        assert_eq!(trigger.countdown_type(), None);

        trigger.use_buildup = true;
        assert_eq!(trigger.countdown_type(), Some(CountdownType::Rise));
    }

    #[test]
    fn test_tracks_used_elsewhere_skips_excluded_slot() {
        let mut workout = WorkoutMusic::new();
        let mut round1 = RoundMusicConfig::default();
        round1.slot_mut(PhaseType::Exercise, 1).track_id = Some("a".to_string());
        let mut round2 = RoundMusicConfig::default();
        round2.slot_mut(PhaseType::Preview, 0).track_id = Some("b".to_string());
        workout.insert(1, round1);
        workout.insert(2, round2);

        let all = tracks_used_elsewhere(&workout, None);
        assert_eq!(all.len(), 2);

        let excluded = tracks_used_elsewhere(
            &workout,
            Some(TriggerSlot {
                round_number: 1,
                phase_type: PhaseType::Exercise,
                index: 1,
            }),
        );
        assert!(!excluded.contains("a"));
        assert!(excluded.contains("b"));
    }

    #[test]
    fn test_update_track_selection_json() {
        let update: TriggerUpdate = serde_json::from_str(
            r#"{ "enabled": true, "track": { "mode": "specific", "trackId": "t9" } }"#,
        )
        .unwrap();
        assert_eq!(
            update.track,
            Some(TrackSelection::Specific {
                track_id: "t9".to_string()
            })
        );

        let random: TriggerUpdate =
            serde_json::from_str(r#"{ "track": { "mode": "random" } }"#).unwrap();
        assert_eq!(random.track, Some(TrackSelection::Random));
    }
}
