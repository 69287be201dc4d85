//! Phase generation
//!
//! Expands a round template and its live exercise list into the ordered
//! phases of one set:
//!
//! - circuit / stations: preview, then exercise and rest alternating (no rest
//!   after the last slot), then one set break when the round repeats
//! - amrap: preview, then one continuous work phase
//!
//! Phases are derived on every call and never stored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::template::{ExerciseAssignment, RoundPlan, RoundType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PhaseType {
    Preview,
    Exercise,
    Rest,
    SetBreak,
}

impl PhaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseType::Preview => "preview",
            PhaseType::Exercise => "exercise",
            PhaseType::Rest => "rest",
            PhaseType::SetBreak => "setBreak",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "preview" => Some(PhaseType::Preview),
            "exercise" => Some(PhaseType::Exercise),
            "rest" => Some(PhaseType::Rest),
            "setBreak" => Some(PhaseType::SetBreak),
            _ => None,
        }
    }

    /// Countdown overlays only make sense where the music rises into work
    pub fn allows_countdown(&self) -> bool {
        matches!(self, PhaseType::Preview | PhaseType::Exercise)
    }
}

impl fmt::Display for PhaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discrete segment of a round's timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    /// `r{round}-p{position}-{type}{index}`, stable for a given template
    pub key: String,
    pub label: String,
    pub phase_type: PhaseType,
    /// Zero-based position among phases of the same type
    pub index: usize,
    /// Zero-based position in generation order
    pub position: usize,
}

impl Phase {
    fn new(round_number: u32, position: usize, phase_type: PhaseType, index: usize, label: String) -> Self {
        Self {
            key: format!("r{}-p{}-{}{}", round_number, position, phase_type, index),
            label,
            phase_type,
            index,
            position,
        }
    }
}

/// Exercise slots in order
///
/// Slots are distinct `order_index` values; exercises sharing a slot are
/// joined into one label. With no assignments the template's
/// `exercises_per_round` unnamed slots are used.
pub fn exercise_slots(plan: &RoundPlan) -> Vec<Option<String>> {
    if plan.exercises.is_empty() {
        return vec![None; plan.template.exercises_per_round as usize];
    }

    let mut slots: BTreeMap<u32, Vec<&str>> = BTreeMap::new();
    for ExerciseAssignment {
        order_index,
        exercise_name,
    } in &plan.exercises
    {
        let names = slots.entry(*order_index).or_default();
        if !names.contains(&exercise_name.as_str()) {
            names.push(exercise_name);
        }
    }

    slots
        .into_values()
        .map(|names| Some(names.join(" / ")).filter(|label| !label.trim().is_empty()))
        .collect()
}

/// Number of exercise phases the round generates
pub fn exercise_count(plan: &RoundPlan) -> usize {
    match plan.template.round_type {
        RoundType::Amrap => 1,
        RoundType::Circuit | RoundType::Stations => exercise_slots(plan).len(),
    }
}

/// Ordered phases of one set of the round
///
/// An absent plan yields no phases.
pub fn generate_phases(plan: Option<&RoundPlan>) -> Vec<Phase> {
    let Some(plan) = plan else {
        return Vec::new();
    };
    let round = plan.template.round_number;

    let mut phases = vec![Phase::new(round, 0, PhaseType::Preview, 0, "Round Preview".to_string())];

    match plan.template.round_type {
        RoundType::Amrap => {
            let label = exercise_slots(plan)
                .into_iter()
                .flatten()
                .next()
                .map(|name| format!("AMRAP: {}", name))
                .unwrap_or_else(|| "AMRAP".to_string());
            phases.push(Phase::new(round, 1, PhaseType::Exercise, 0, label));
        }
        RoundType::Circuit | RoundType::Stations => {
            let slots = exercise_slots(plan);
            let last = slots.len().saturating_sub(1);

            for (i, name) in slots.into_iter().enumerate() {
                let label = name.unwrap_or_else(|| format!("Exercise {}", i + 1));
                phases.push(Phase::new(round, phases.len(), PhaseType::Exercise, i, label));

                if i < last {
                    phases.push(Phase::new(
                        round,
                        phases.len(),
                        PhaseType::Rest,
                        i,
                        format!("Rest {}", i + 1),
                    ));
                }
            }

            if plan.template.has_multiple_sets() {
                phases.push(Phase::new(
                    round,
                    phases.len(),
                    PhaseType::SetBreak,
                    0,
                    "Set Break".to_string(),
                ));
            }
        }
    }

    phases
}

/// Find a phase by its key
pub fn find_phase<'a>(phases: &'a [Phase], key: &str) -> Option<&'a Phase> {
    phases.iter().find(|p| p.key == key)
}
