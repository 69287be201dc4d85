//! Timing calculator
//!
//! Wall-clock time from the start of a phase to the end of the set in
//! progress. Only one set is modelled: natural endings fire on the last set.
//! A fixed transition buffer is added once per phase boundary crossed to
//! match playback latency.

use ctv_common::config::DEFAULT_TRANSITION_BUFFER_SECS;

use crate::phases::{Phase, PhaseType};
use crate::template::{RoundTemplate, RoundType};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingCalculator {
    transition_buffer_secs: f64,
}

impl Default for TimingCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSITION_BUFFER_SECS)
    }
}

impl TimingCalculator {
    pub fn new(transition_buffer_secs: f64) -> Self {
        Self {
            transition_buffer_secs: transition_buffer_secs.max(0.0),
        }
    }

    /// Seconds from the start of `phase` to the end of the current set
    pub fn remaining_set_duration(
        &self,
        phase: &Phase,
        template: &RoundTemplate,
        exercise_count: usize,
    ) -> f64 {
        if template.round_type == RoundType::Amrap {
            return template
                .amrap_duration_sec
                .unwrap_or(template.work_duration_sec);
        }

        let work = template.work_duration_sec;
        let rest = template.rest_duration_sec;
        let n = exercise_count;

        let (work_count, rest_count, boundaries) = match phase.phase_type {
            PhaseType::Preview | PhaseType::SetBreak => {
                (n, n.saturating_sub(1), n + n.saturating_sub(1) + 1)
            }
            PhaseType::Exercise => {
                let remaining = n.saturating_sub(phase.index);
                let after = remaining.saturating_sub(1);
                (remaining, after, after + after + 1)
            }
            PhaseType::Rest => {
                // The rest itself plus everything after it
                let after = n.saturating_sub(phase.index + 1);
                let rests_after = n.saturating_sub(phase.index + 2);
                (after, 1 + rests_after, after + rests_after + 1)
            }
        };

        work * work_count as f64
            + rest * rest_count as f64
            + self.transition_buffer_secs * boundaries as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::generate_phases;
    use crate::template::test_support::{amrap, circuit};
    use crate::template::RoundPlan;

    fn phases_for(template: RoundTemplate) -> Vec<Phase> {
        generate_phases(Some(&RoundPlan {
            template,
            exercises: vec![],
        }))
    }

    #[test]
    fn test_full_set_from_preview() {
        let template = circuit(1, 4, 45.0, 15.0, 1);
        let phases = phases_for(template.clone());
        let timing = TimingCalculator::default();

        // 45*4 + 15*3 + 8 boundaries * 1.5
        assert_eq!(timing.remaining_set_duration(&phases[0], &template, 4), 237.0);
    }

    #[test]
    fn test_from_exercise_and_rest() {
        let template = circuit(1, 4, 45.0, 15.0, 1);
        let phases = phases_for(template.clone());
        let timing = TimingCalculator::default();

        // exercise index 2: 2 work + 1 rest + (1 + 1 + 1) boundaries
        let ex2 = phases.iter().find(|p| p.key == "r1-p5-exercise2").unwrap();
        assert_eq!(timing.remaining_set_duration(ex2, &template, 4), 90.0 + 15.0 + 4.5);

        // rest index 1: rest + 2 work + 1 rest + (2 + 1 + 1) boundaries
        let rest1 = phases.iter().find(|p| p.key == "r1-p4-rest1").unwrap();
        assert_eq!(
            timing.remaining_set_duration(rest1, &template, 4),
            15.0 + 90.0 + 15.0 + 6.0
        );

        // last exercise: one work block and the leading boundary
        let ex3 = phases.iter().find(|p| p.key == "r1-p7-exercise3").unwrap();
        assert_eq!(timing.remaining_set_duration(ex3, &template, 4), 46.5);
    }

    #[test]
    fn test_set_break_models_full_set() {
        let template = circuit(1, 3, 30.0, 10.0, 2);
        let phases = phases_for(template.clone());
        let timing = TimingCalculator::default();

        let set_break = phases.last().unwrap();
        assert_eq!(set_break.phase_type, PhaseType::SetBreak);
        assert_eq!(
            timing.remaining_set_duration(set_break, &template, 3),
            timing.remaining_set_duration(&phases[0], &template, 3)
        );
    }

    #[test]
    fn test_non_increasing_through_the_set() {
        for n in 1..=8u32 {
            let template = circuit(1, n, 40.0, 20.0, 1);
            let phases = phases_for(template.clone());
            let timing = TimingCalculator::default();

            let durations: Vec<f64> = phases
                .iter()
                .map(|p| timing.remaining_set_duration(p, &template, n as usize))
                .collect();
            for pair in durations.windows(2) {
                assert!(pair[0] >= pair[1], "n={}: {:?}", n, durations);
            }
        }
    }

    #[test]
    fn test_amrap_is_fixed_total() {
        let template = amrap(2, 720.0);
        let phases = phases_for(template.clone());
        let timing = TimingCalculator::default();

        for phase in &phases {
            assert_eq!(timing.remaining_set_duration(phase, &template, 1), 720.0);
        }
    }

    #[test]
    fn test_custom_buffer_and_empty_round() {
        let template = circuit(1, 0, 45.0, 15.0, 1);
        let phases = phases_for(template.clone());
        let timing = TimingCalculator::new(2.0);

        // no exercises: only the leading boundary remains
        assert_eq!(timing.remaining_set_duration(&phases[0], &template, 0), 2.0);
    }
}
