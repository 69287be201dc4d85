//! Editing session
//!
//! Holds the optimistic local copy of a session's music configuration. Every
//! committed change lands in memory first and is then written through the
//! gateway; a failed write is reported but never rolls the local copy back.
//! Changes pushed from outside replace whole rounds, they are never merged.

use ctv_common::events::{ChangeSource, CueEvent, EventBus};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::library::Track;
use crate::persistence::MusicConfigGateway;
use crate::phases::Phase;
use crate::template::RoundPlan;
use crate::timing::TimingCalculator;
use crate::triggers::{
    apply_trigger, ApplyContext, ApplyOutcome, RoundMusicConfig, TriggerUpdate, WorkoutMusic,
};

/// Inputs describing the round being edited
pub struct RoundContext<'a> {
    pub plan: &'a RoundPlan,
    pub phases: &'a [Phase],
    pub total_rounds: u32,
    pub tracks: &'a [Track],
    pub timing: &'a TimingCalculator,
}

/// Result of a committed apply
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    #[serde(flatten)]
    pub outcome: ApplyOutcome,
    /// False when the store rejected the write; local state still holds it
    pub persisted: bool,
    /// False for a dry run
    pub committed: bool,
}

pub struct EditingSession {
    session_id: String,
    workout: WorkoutMusic,
    gateway: Arc<dyn MusicConfigGateway>,
    events: EventBus,
}

impl EditingSession {
    /// Load every stored round of `session_id`
    pub async fn load(
        session_id: &str,
        gateway: Arc<dyn MusicConfigGateway>,
        events: EventBus,
    ) -> Result<Self> {
        let workout = gateway
            .get_all(session_id)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        info!(
            "Loaded music configuration for session {} ({} rounds)",
            session_id,
            workout.len()
        );
        Ok(Self {
            session_id: session_id.to_string(),
            workout,
            gateway,
            events,
        })
    }

    pub fn workout(&self) -> &WorkoutMusic {
        &self.workout
    }

    pub fn round(&self, round_number: u32) -> Option<&RoundMusicConfig> {
        self.workout.get(&round_number)
    }

    /// Run the resolver against local state and, unless `dry_run`, commit
    ///
    /// A dry run returns the would-be outcome and leaves nothing behind.
    pub async fn apply<R: Rng + ?Sized>(
        &mut self,
        round: &RoundContext<'_>,
        phase: &Phase,
        update: &TriggerUpdate,
        dry_run: bool,
        rng: &mut R,
    ) -> Result<ApplyReport> {
        let ctx = ApplyContext {
            plan: round.plan,
            phases: round.phases,
            total_rounds: round.total_rounds,
            tracks: round.tracks,
            workout: &self.workout,
            timing: round.timing,
        };

        let outcome = apply_trigger(&ctx, phase, update, rng).map_err(|e| {
            warn!(
                "Rejected trigger update on session {} {}: {}",
                self.session_id, phase.key, e
            );
            e
        })?;

        if dry_run {
            return Ok(ApplyReport {
                outcome,
                persisted: false,
                committed: false,
            });
        }

        let mut writes = vec![(outcome.round_number, outcome.round_config.clone())];
        if let Some(next) = &outcome.next_round_config {
            writes.push((outcome.round_number + 1, next.clone()));
        }
        for (round_number, config) in &writes {
            self.workout.insert(*round_number, config.clone());
        }

        let persisted = self.persist(&writes).await;

        for (round_number, _) in &writes {
            self.events.emit(CueEvent::RoundMusicConfigChanged {
                session_id: self.session_id.clone(),
                round_number: *round_number,
                source: ChangeSource::Apply,
                timestamp: ctv_common::time::now(),
            });
        }
        if outcome.trigger.enabled && outcome.trigger.natural_ending {
            self.events.emit(CueEvent::CascadeApplied {
                session_id: self.session_id.clone(),
                round_number: outcome.round_number,
                phase_key: phase.key.clone(),
                disabled_triggers_count: outcome.disabled_triggers_count,
                next_preview_armed: outcome.next_preview_armed,
                timestamp: ctv_common::time::now(),
            });
        }

        Ok(ApplyReport {
            outcome,
            persisted,
            committed: true,
        })
    }

    /// Replace one round wholesale, e.g. a save from another editor
    ///
    /// Returns whether the write reached the store.
    pub async fn replace_round(&mut self, round_number: u32, config: RoundMusicConfig) -> bool {
        self.workout.insert(round_number, config.clone());
        let persisted = self.persist(&[(round_number, config)]).await;

        self.events.emit(CueEvent::RoundMusicConfigChanged {
            session_id: self.session_id.clone(),
            round_number,
            source: ChangeSource::External,
            timestamp: ctv_common::time::now(),
        });
        persisted
    }

    /// Overwrite local state with whatever the store holds now
    pub async fn reload(&mut self) -> Result<()> {
        self.workout = self
            .gateway
            .get_all(&self.session_id)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(())
    }

    async fn persist(&self, writes: &[(u32, RoundMusicConfig)]) -> bool {
        match self.gateway.put_many(&self.session_id, writes).await {
            Ok(()) => true,
            Err(e) => {
                let rounds: Vec<u32> = writes.iter().map(|(r, _)| *r).collect();
                warn!(
                    "Failed to persist session {} rounds {:?}, keeping local copy: {}",
                    self.session_id, rounds, e
                );
                for round_number in rounds {
                    self.events.emit(CueEvent::PersistenceFailed {
                        session_id: self.session_id.clone(),
                        round_number,
                        message: e.to_string(),
                        timestamp: ctv_common::time::now(),
                    });
                }
                false
            }
        }
    }
}
