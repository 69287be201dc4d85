//! Playback cue planning
//!
//! Turns a trigger action and a concrete track into a start position for the
//! playback sink. Three seek rules:
//! - build-up: `max(0, drop - buildup)`
//! - natural ending: `duration - remaining`
//! - rise from rest: `drop - rest`

use serde::Serialize;

use crate::compat::check_rise_from_rest;
use crate::library::{Energy, Segment, Track};

use super::controller::TriggerAction;

/// Start instruction handed to the playback sink
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackCue {
    pub track_id: String,
    pub start_position_sec: f64,
    /// Track position of the drop the cue is aimed at
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_at_sec: Option<f64>,
    /// Seconds of playback until the track ends
    pub plays_for_sec: f64,
}

impl PlaybackCue {
    fn new(track: &Track, start_position_sec: f64, drop_at_sec: Option<f64>) -> Self {
        Self {
            track_id: track.id.clone(),
            start_position_sec,
            drop_at_sec,
            plays_for_sec: (track.duration_sec() - start_position_sec).max(0.0),
        }
    }
}

/// Where playback starts so the build-up leads into `segment`
pub fn buildup_start(segment: &Segment) -> f64 {
    (segment.timestamp_sec - segment.buildup_duration_sec.unwrap_or(0.0)).max(0.0)
}

/// Start position that ends the track after `remaining_sec`, if long enough
pub fn natural_ending_seek(track: &Track, remaining_sec: f64) -> Option<f64> {
    let seek = track.duration_sec() - remaining_sec;
    (seek >= 0.0).then_some(seek)
}

/// Start position that lands `drop_sec` at the end of a `rest_sec` rest
pub fn rise_from_rest_seek(drop_sec: f64, rest_sec: f64) -> Option<f64> {
    let seek = drop_sec - rest_sec;
    (rest_sec > 0.0 && seek >= 0.0).then_some(seek)
}

fn first_segment(track: &Track, energy: Energy) -> Option<&Segment> {
    track.segments.iter().find(|s| s.energy == energy)
}

/// Cue for an action evaluated against `track`
///
/// `remaining_sec` is the time left in the set, required for natural endings.
pub fn plan_cue(action: &TriggerAction, track: &Track, remaining_sec: Option<f64>) -> Option<PlaybackCue> {
    match action {
        TriggerAction::None { .. } => None,
        TriggerAction::Play {
            energy,
            use_buildup,
            natural_ending,
            ..
        } => {
            if *natural_ending {
                let seek = natural_ending_seek(track, remaining_sec?)?;
                return Some(PlaybackCue::new(track, seek, None));
            }

            match first_segment(track, *energy) {
                Some(segment) if *use_buildup => Some(PlaybackCue::new(
                    track,
                    buildup_start(segment),
                    Some(segment.timestamp_sec),
                )),
                Some(segment) => Some(PlaybackCue::new(track, segment.timestamp_sec, None)),
                None => Some(PlaybackCue::new(track, 0.0, None)),
            }
        }
        TriggerAction::RiseCountdown { .. } => {
            let drop = first_segment(track, Energy::High)?;
            Some(PlaybackCue::new(
                track,
                buildup_start(drop),
                Some(drop.timestamp_sec),
            ))
        }
        TriggerAction::HighCountdown { .. } => {
            let drop = first_segment(track, Energy::High)?;
            Some(PlaybackCue::new(
                track,
                drop.timestamp_sec,
                Some(drop.timestamp_sec),
            ))
        }
    }
}

/// Cue that starts at the beginning of a rest so the first valid drop lands
/// as the next exercise begins
pub fn plan_rise_from_rest(track: &Track, rest_sec: f64) -> Option<PlaybackCue> {
    let verdict = check_rise_from_rest(track, rest_sec);
    let drop = *verdict.drop_points_sec.first()?;
    let seek = rise_from_rest_seek(drop, rest_sec)?;
    Some(PlaybackCue::new(track, seek, Some(drop)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::test_support::{segment, track};
    use crate::runtime::controller::SkipReason;

    fn drop_track() -> Track {
        let mut high = segment(40.0, Energy::High);
        high.buildup_duration_sec = Some(8.0);
        track(
            "t1",
            200,
            vec![segment(0.0, Energy::Low), segment(20.0, Energy::Medium), high],
        )
    }

    #[test]
    fn test_buildup_start_clamps_at_zero() {
        let mut s = segment(5.0, Energy::High);
        s.buildup_duration_sec = Some(12.0);
        assert_eq!(buildup_start(&s), 0.0);

        s.buildup_duration_sec = None;
        assert_eq!(buildup_start(&s), 5.0);
    }

    #[test]
    fn test_seek_rules() {
        let t = drop_track();
        assert_eq!(natural_ending_seek(&t, 150.0), Some(50.0));
        assert_eq!(natural_ending_seek(&t, 250.0), None);
        assert_eq!(rise_from_rest_seek(40.0, 15.0), Some(25.0));
        assert_eq!(rise_from_rest_seek(40.0, 0.0), None);
        assert_eq!(rise_from_rest_seek(10.0, 15.0), None);
    }

    #[test]
    fn test_plan_play_with_buildup() {
        let action = TriggerAction::Play {
            energy: Energy::High,
            track_id: Some("t1".to_string()),
            use_buildup: true,
            natural_ending: false,
            round_end_time_ms: None,
        };
        let cue = plan_cue(&action, &drop_track(), None).unwrap();
        assert_eq!(cue.start_position_sec, 32.0);
        assert_eq!(cue.drop_at_sec, Some(40.0));
        assert_eq!(cue.plays_for_sec, 168.0);
    }

    #[test]
    fn test_plan_play_natural_ending() {
        let action = TriggerAction::Play {
            energy: Energy::High,
            track_id: Some("t1".to_string()),
            use_buildup: false,
            natural_ending: true,
            round_end_time_ms: Some(99),
        };
        let cue = plan_cue(&action, &drop_track(), Some(120.0)).unwrap();
        assert_eq!(cue.start_position_sec, 80.0);
        assert_eq!(cue.plays_for_sec, 120.0);

        assert!(plan_cue(&action, &drop_track(), None).is_none());
    }

    #[test]
    fn test_plan_play_low_energy_starts_at_segment() {
        let action = TriggerAction::Play {
            energy: Energy::Medium,
            track_id: None,
            use_buildup: false,
            natural_ending: false,
            round_end_time_ms: None,
        };
        let cue = plan_cue(&action, &drop_track(), None).unwrap();
        assert_eq!(cue.start_position_sec, 20.0);
    }

    #[test]
    fn test_plan_countdowns() {
        let rise = plan_cue(&TriggerAction::RiseCountdown { track_id: None }, &drop_track(), None).unwrap();
        assert_eq!(rise.start_position_sec, 32.0);

        let high = plan_cue(
            &TriggerAction::HighCountdown {
                track_id: None,
                duration_ms: 4500,
            },
            &drop_track(),
            None,
        )
        .unwrap();
        assert_eq!(high.start_position_sec, 40.0);

        let none = TriggerAction::None {
            reason: SkipReason::TriggerNotEnabled,
        };
        assert!(plan_cue(&none, &drop_track(), None).is_none());
    }

    #[test]
    fn test_plan_rise_from_rest() {
        let cue = plan_rise_from_rest(&drop_track(), 15.0).unwrap();
        assert_eq!(cue.start_position_sec, 25.0);
        assert_eq!(cue.drop_at_sec, Some(40.0));

        assert!(plan_rise_from_rest(&drop_track(), 50.0).is_none());
    }
}
