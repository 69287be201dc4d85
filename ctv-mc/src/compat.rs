//! Track compatibility checks
//!
//! Two independent predicates decide whether a track can serve a timing mode:
//!
//! - **Natural Ending**: seeking to `duration - remaining` makes the track end
//!   exactly when the set ends; the seek point must land in an active section.
//! - **Rise from Rest**: starting at `drop - rest` when the rest begins makes a
//!   high-energy drop land exactly as the next exercise starts.
//!
//! Incompatibility is an ordinary result carrying a reason, never an error.

use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;

use crate::library::{Energy, Track};
use crate::phases::{Phase, PhaseType};
use crate::template::{RoundTemplate, RoundType};
use crate::timing::TimingCalculator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncompatibilityReason {
    TrackTooShort,
    StartsInLowEnergy,
    NoEnergySegments,
    NoRestBeforeExercise,
    RestTooLong,
    UsedElsewhere,
}

impl IncompatibilityReason {
    pub fn code(&self) -> &'static str {
        match self {
            IncompatibilityReason::TrackTooShort => "track_too_short",
            IncompatibilityReason::StartsInLowEnergy => "starts_in_low_energy",
            IncompatibilityReason::NoEnergySegments => "no_energy_segments",
            IncompatibilityReason::NoRestBeforeExercise => "no_rest_before_exercise",
            IncompatibilityReason::RestTooLong => "rest_too_long",
            IncompatibilityReason::UsedElsewhere => "used_elsewhere",
        }
    }
}

impl fmt::Display for IncompatibilityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            IncompatibilityReason::TrackTooShort => "track too short",
            IncompatibilityReason::StartsInLowEnergy => "starts in low energy",
            IncompatibilityReason::NoEnergySegments => "track has no energy segments",
            IncompatibilityReason::NoRestBeforeExercise => "no rest before exercise",
            IncompatibilityReason::RestTooLong => "rest too long — no valid drop points",
            IncompatibilityReason::UsedElsewhere => "track already used in this workout",
        };
        f.write_str(message)
    }
}

impl Serialize for IncompatibilityReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Outcome of one compatibility predicate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityVerdict {
    pub compatible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<IncompatibilityReason>,
    /// Playback start position that satisfies the mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seek_point_sec: Option<f64>,
    /// Qualifying drop timestamps (Rise from Rest only)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub drop_points_sec: Vec<f64>,
}

impl CompatibilityVerdict {
    fn compatible(seek_point_sec: f64, drop_points_sec: Vec<f64>) -> Self {
        Self {
            compatible: true,
            reason: None,
            seek_point_sec: Some(seek_point_sec),
            drop_points_sec,
        }
    }

    fn incompatible(reason: IncompatibilityReason) -> Self {
        Self {
            compatible: false,
            reason: Some(reason),
            seek_point_sec: None,
            drop_points_sec: Vec::new(),
        }
    }
}

/// Natural Ending check for a set with `remaining_sec` left
pub fn check_natural_ending_for(track: &Track, remaining_sec: f64) -> CompatibilityVerdict {
    let seek_point = track.duration_sec() - remaining_sec;
    if seek_point < 0.0 {
        return CompatibilityVerdict::incompatible(IncompatibilityReason::TrackTooShort);
    }

    match track.segment_at(seek_point) {
        None => CompatibilityVerdict::incompatible(IncompatibilityReason::NoEnergySegments),
        Some(segment) if segment.energy == Energy::Low => {
            CompatibilityVerdict::incompatible(IncompatibilityReason::StartsInLowEnergy)
        }
        Some(_) => CompatibilityVerdict::compatible(seek_point, Vec::new()),
    }
}

/// Natural Ending check for a track started at `phase`
pub fn check_natural_ending(
    track: &Track,
    phase: &Phase,
    template: &RoundTemplate,
    exercise_count: usize,
    timing: &TimingCalculator,
) -> CompatibilityVerdict {
    let remaining = timing.remaining_set_duration(phase, template, exercise_count);
    check_natural_ending_for(track, remaining)
}

/// Rise from Rest check for a rest of `rest_duration_sec`
pub fn check_rise_from_rest(track: &Track, rest_duration_sec: f64) -> CompatibilityVerdict {
    if rest_duration_sec <= 0.0 {
        return CompatibilityVerdict::incompatible(IncompatibilityReason::NoRestBeforeExercise);
    }

    let drops: Vec<f64> = track
        .segments
        .iter()
        .filter(|s| s.energy == Energy::High && s.timestamp_sec >= rest_duration_sec)
        .map(|s| s.timestamp_sec)
        .collect();

    match drops.first() {
        None => CompatibilityVerdict::incompatible(IncompatibilityReason::RestTooLong),
        Some(first) => CompatibilityVerdict::compatible(first - rest_duration_sec, drops),
    }
}

/// Rest that precedes an exercise phase
///
/// The first exercise follows the preview, not a rest; AMRAP has no rests.
pub fn rest_before(phase: &Phase, template: &RoundTemplate) -> f64 {
    match (template.round_type, phase.phase_type) {
        (RoundType::Amrap, _) => 0.0,
        (_, PhaseType::Exercise) if phase.index > 0 => template.rest_duration_sec,
        _ => 0.0,
    }
}

/// Compatibility of one track for one phase, as offered to an editor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackCandidate {
    pub track_id: String,
    pub track_name: String,
    pub artist: String,
    pub duration_ms: u64,
    pub natural_ending: CompatibilityVerdict,
    /// Present for exercise phases only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rise_from_rest: Option<CompatibilityVerdict>,
    /// Used by another trigger somewhere in the workout
    pub used_elsewhere: bool,
}

/// Inputs shared by every candidate evaluation for one phase
pub struct CandidateQuery<'a> {
    pub phase: &'a Phase,
    pub template: &'a RoundTemplate,
    pub exercise_count: usize,
    pub timing: &'a TimingCalculator,
    /// Track ids referenced by any other trigger in the workout
    pub used_elsewhere: &'a HashSet<String>,
}

/// Evaluate every track for a phase
///
/// Tracks already used elsewhere in the workout never qualify for Rise from
/// Rest, so back-to-back drops of the same song are avoided.
pub fn evaluate_candidates(tracks: &[Track], query: &CandidateQuery<'_>) -> Vec<TrackCandidate> {
    let remaining =
        query
            .timing
            .remaining_set_duration(query.phase, query.template, query.exercise_count);
    let rest = rest_before(query.phase, query.template);
    let is_exercise = query.phase.phase_type == PhaseType::Exercise;

    tracks
        .iter()
        .map(|track| {
            let used_elsewhere = query.used_elsewhere.contains(&track.id);
            let rise_from_rest = is_exercise.then(|| {
                if used_elsewhere {
                    CompatibilityVerdict::incompatible(IncompatibilityReason::UsedElsewhere)
                } else {
                    check_rise_from_rest(track, rest)
                }
            });

            TrackCandidate {
                track_id: track.id.clone(),
                track_name: track.name.clone(),
                artist: track.artist.clone(),
                duration_ms: track.duration_ms,
                natural_ending: check_natural_ending_for(track, remaining),
                rise_from_rest,
                used_elsewhere,
            }
        })
        .collect()
}

/// Tracks that can end naturally from `phase`
pub fn natural_ending_candidates<'t>(
    tracks: &'t [Track],
    phase: &Phase,
    template: &RoundTemplate,
    exercise_count: usize,
    timing: &TimingCalculator,
) -> Vec<&'t Track> {
    let remaining = timing.remaining_set_duration(phase, template, exercise_count);
    tracks
        .iter()
        .filter(|t| check_natural_ending_for(t, remaining).compatible)
        .collect()
}

/// Tracks whose drop can land at the end of a `rest_duration_sec` rest
pub fn rise_from_rest_candidates<'t>(
    tracks: &'t [Track],
    rest_duration_sec: f64,
    used_elsewhere: &HashSet<String>,
) -> Vec<&'t Track> {
    tracks
        .iter()
        .filter(|t| !used_elsewhere.contains(&t.id))
        .filter(|t| check_rise_from_rest(t, rest_duration_sec).compatible)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::test_support::{segment, track};
    use crate::phases::generate_phases;
    use crate::template::test_support::circuit;
    use crate::template::RoundPlan;

    #[test]
    fn test_rise_from_rest_examples() {
        let t = track(
            "t1",
            200,
            vec![segment(0.0, Energy::Low), segment(40.0, Energy::High)],
        );

        let ok = check_rise_from_rest(&t, 20.0);
        assert!(ok.compatible);
        assert_eq!(ok.drop_points_sec, vec![40.0]);
        assert_eq!(ok.seek_point_sec, Some(20.0));

        let too_long = check_rise_from_rest(&t, 50.0);
        assert!(!too_long.compatible);
        assert_eq!(too_long.reason, Some(IncompatibilityReason::RestTooLong));
        assert_eq!(
            too_long.reason.unwrap().to_string(),
            "rest too long — no valid drop points"
        );
    }

    #[test]
    fn test_rise_from_rest_requires_rest() {
        let t = track("t1", 200, vec![segment(40.0, Energy::High)]);
        let verdict = check_rise_from_rest(&t, 0.0);
        assert_eq!(verdict.reason, Some(IncompatibilityReason::NoRestBeforeExercise));
    }

    #[test]
    fn test_rise_from_rest_drop_exactly_at_rest_length() {
        let t = track("t1", 200, vec![segment(20.0, Energy::High)]);
        let verdict = check_rise_from_rest(&t, 20.0);
        assert!(verdict.compatible);
        assert_eq!(verdict.seek_point_sec, Some(0.0));
    }

    #[test]
    fn test_natural_ending_too_short() {
        let t = track("t1", 100, vec![segment(0.0, Energy::High)]);
        let verdict = check_natural_ending_for(&t, 237.0);
        assert_eq!(verdict.reason, Some(IncompatibilityReason::TrackTooShort));
    }

    #[test]
    fn test_natural_ending_low_energy_start() {
        let t = track(
            "t1",
            300,
            vec![segment(0.0, Energy::Low), segment(120.0, Energy::High)],
        );

        // seek point 63 s lands in the low intro
        let low = check_natural_ending_for(&t, 237.0);
        assert_eq!(low.reason, Some(IncompatibilityReason::StartsInLowEnergy));

        // seek point 200 s lands in the high section
        let high = check_natural_ending_for(&t, 100.0);
        assert!(high.compatible);
        assert_eq!(high.seek_point_sec, Some(200.0));
    }

    #[test]
    fn test_natural_ending_before_first_segment_uses_first() {
        let t = track("t1", 300, vec![segment(100.0, Energy::Medium)]);
        let verdict = check_natural_ending_for(&t, 250.0);
        assert!(verdict.compatible);
    }

    #[test]
    fn test_natural_ending_without_segments() {
        let t = track("t1", 300, vec![]);
        let verdict = check_natural_ending_for(&t, 100.0);
        assert_eq!(verdict.reason, Some(IncompatibilityReason::NoEnergySegments));
    }

    #[test]
    fn test_natural_ending_is_idempotent() {
        let template = circuit(1, 4, 45.0, 15.0, 1);
        let phases = generate_phases(Some(&RoundPlan {
            template: template.clone(),
            exercises: vec![],
        }));
        let t = track(
            "t1",
            260,
            vec![segment(0.0, Energy::Low), segment(20.0, Energy::High)],
        );
        let timing = TimingCalculator::default();

        for phase in &phases {
            let first = check_natural_ending(&t, phase, &template, 4, &timing);
            let second = check_natural_ending(&t, phase, &template, 4, &timing);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_rest_before_exercise() {
        let template = circuit(1, 3, 45.0, 15.0, 1);
        let phases = generate_phases(Some(&RoundPlan {
            template: template.clone(),
            exercises: vec![],
        }));

        assert_eq!(rest_before(&phases[1], &template), 0.0);
        assert_eq!(rest_before(&phases[3], &template), 15.0);
        assert_eq!(rest_before(&phases[2], &template), 0.0);
    }

    #[test]
    fn test_candidates_exclude_used_tracks_from_rise() {
        let template = circuit(1, 3, 45.0, 15.0, 1);
        let phases = generate_phases(Some(&RoundPlan {
            template: template.clone(),
            exercises: vec![],
        }));
        let tracks = vec![
            track("fresh", 200, vec![segment(40.0, Energy::High)]),
            track("used", 200, vec![segment(40.0, Energy::High)]),
        ];
        let used: HashSet<String> = ["used".to_string()].into_iter().collect();
        let timing = TimingCalculator::default();

        let query = CandidateQuery {
            phase: &phases[3],
            template: &template,
            exercise_count: 3,
            timing: &timing,
            used_elsewhere: &used,
        };
        let candidates = evaluate_candidates(&tracks, &query);

        assert!(candidates[0].rise_from_rest.as_ref().unwrap().compatible);
        assert!(candidates[1].used_elsewhere);
        assert_eq!(
            candidates[1].rise_from_rest.as_ref().unwrap().reason,
            Some(IncompatibilityReason::UsedElsewhere)
        );

        let rise = rise_from_rest_candidates(&tracks, 15.0, &used);
        assert_eq!(rise.len(), 1);
        assert_eq!(rise[0].id, "fresh");
    }

    #[test]
    fn test_candidates_for_rest_phase_have_no_rise_verdict() {
        let template = circuit(1, 2, 45.0, 15.0, 1);
        let phases = generate_phases(Some(&RoundPlan {
            template: template.clone(),
            exercises: vec![],
        }));
        let tracks = vec![track("t", 200, vec![segment(0.0, Energy::High)])];
        let timing = TimingCalculator::default();
        let used = HashSet::new();

        let query = CandidateQuery {
            phase: &phases[2],
            template: &template,
            exercise_count: 2,
            timing: &timing,
            used_elsewhere: &used,
        };
        let candidates = evaluate_candidates(&tracks, &query);
        assert!(candidates[0].rise_from_rest.is_none());
        assert!(candidates[0].natural_ending.compatible);
    }
}
