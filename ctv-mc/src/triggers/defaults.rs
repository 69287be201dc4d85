//! Default trigger configurations
//!
//! Two starting points for a round:
//! - minimal: low-energy preview plus a high-energy first exercise with build-up
//! - full: every phase enabled with the phase-type energy default
//!
//! The effective config of a round is its stored triggers with every missing
//! phase slot filled by a disabled trigger, the same base the resolver edits.

use crate::library::Energy;
use crate::phases::PhaseType;
use crate::template::{RoundTemplate, RoundType};

use super::{RoundMusicConfig, Trigger};

/// Energy a phase plays when its trigger does not say
pub fn default_energy(phase_type: PhaseType) -> Energy {
    match phase_type {
        PhaseType::Exercise => Energy::High,
        PhaseType::Preview | PhaseType::Rest | PhaseType::SetBreak => Energy::Low,
    }
}

/// Enabled trigger with the phase default energy
pub fn default_trigger(phase_type: PhaseType) -> Trigger {
    Trigger {
        enabled: true,
        energy: Some(default_energy(phase_type)),
        ..Trigger::default()
    }
}

pub fn minimal_config() -> RoundMusicConfig {
    RoundMusicConfig {
        round_preview: Some(default_trigger(PhaseType::Preview)),
        exercises: vec![Trigger {
            use_buildup: true,
            ..default_trigger(PhaseType::Exercise)
        }],
        rests: Vec::new(),
        set_breaks: Vec::new(),
    }
}

/// Every phase of `template` enabled
///
/// `exercise_count` is the number of exercise slots in the round.
pub fn full_config(template: &RoundTemplate, exercise_count: usize) -> RoundMusicConfig {
    if template.round_type == RoundType::Amrap {
        return RoundMusicConfig {
            round_preview: Some(default_trigger(PhaseType::Preview)),
            exercises: vec![default_trigger(PhaseType::Exercise)],
            rests: Vec::new(),
            set_breaks: Vec::new(),
        };
    }

    let set_breaks = if template.has_multiple_sets() { 1 } else { 0 };

    RoundMusicConfig {
        round_preview: Some(default_trigger(PhaseType::Preview)),
        exercises: vec![default_trigger(PhaseType::Exercise); exercise_count],
        rests: vec![default_trigger(PhaseType::Rest); exercise_count.saturating_sub(1)],
        set_breaks: vec![default_trigger(PhaseType::SetBreak); set_breaks],
    }
}

/// One trigger per phase slot of `template`: stored where present, else disabled
///
/// Slots the round does not have are dropped.
pub fn effective_config(
    template: &RoundTemplate,
    exercise_count: usize,
    stored: Option<&RoundMusicConfig>,
) -> RoundMusicConfig {
    let shape = full_config(template, exercise_count);
    let stored = stored.cloned().unwrap_or_default();

    fn fill(stored: &[Trigger], len: usize, phase_type: PhaseType) -> Vec<Trigger> {
        (0..len)
            .map(|i| {
                stored
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| Trigger::disabled_for(phase_type))
            })
            .collect()
    }

    RoundMusicConfig {
        round_preview: Some(
            stored
                .round_preview
                .unwrap_or_else(|| Trigger::disabled_for(PhaseType::Preview)),
        ),
        exercises: fill(&stored.exercises, shape.exercises.len(), PhaseType::Exercise),
        rests: fill(&stored.rests, shape.rests.len(), PhaseType::Rest),
        set_breaks: fill(&stored.set_breaks, shape.set_breaks.len(), PhaseType::SetBreak),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::test_support::{amrap, circuit};

    #[test]
    fn test_minimal_config() {
        let config = minimal_config();
        let preview = config.round_preview.unwrap();
        assert!(preview.enabled);
        assert_eq!(preview.energy, Some(Energy::Low));
        assert_eq!(config.exercises.len(), 1);
        assert!(config.exercises[0].use_buildup);
        assert_eq!(config.exercises[0].energy, Some(Energy::High));
        assert!(config.rests.is_empty());
    }

    #[test]
    fn test_full_config_matches_phase_shape() {
        let config = full_config(&circuit(1, 4, 45.0, 15.0, 3), 4);
        assert_eq!(config.exercises.len(), 4);
        assert_eq!(config.rests.len(), 3);
        assert_eq!(config.set_breaks.len(), 1);
        assert!(config.rests.iter().all(|t| t.energy == Some(Energy::Low)));
        assert!(config.has_music_config());
    }

    #[test]
    fn test_full_config_for_amrap() {
        let config = full_config(&amrap(1, 600.0), 1);
        assert_eq!(config.exercises.len(), 1);
        assert!(config.rests.is_empty());
        assert!(config.set_breaks.is_empty());
    }

    #[test]
    fn test_effective_config_fills_missing_slots_disabled() {
        let template = circuit(1, 3, 45.0, 15.0, 2);
        let stored = RoundMusicConfig {
            exercises: vec![default_trigger(PhaseType::Exercise)],
            ..RoundMusicConfig::default()
        };

        let effective = effective_config(&template, 3, Some(&stored));
        assert_eq!(effective.exercises.len(), 3);
        assert!(effective.exercises[0].enabled);
        assert!(!effective.exercises[1].enabled);
        assert_eq!(effective.rests.len(), 2);
        assert!(effective.rests.iter().all(|t| !t.enabled));
        assert_eq!(effective.set_breaks.len(), 1);
        assert!(!effective.round_preview.unwrap().enabled);

        let never_edited = effective_config(&template, 3, None);
        assert!(!never_edited.has_music_config());
    }

    #[test]
    fn test_effective_config_drops_slots_outside_round() {
        let stored = RoundMusicConfig {
            rests: vec![default_trigger(PhaseType::Rest); 4],
            ..RoundMusicConfig::default()
        };
        let effective = effective_config(&amrap(1, 600.0), 1, Some(&stored));
        assert!(effective.rests.is_empty());
        assert_eq!(effective.exercises.len(), 1);
    }
}
