//! Music cue service
//!
//! Ties the engine to its stores. Editing sessions are loaded lazily, one per
//! workout session, and each sits behind its own lock so edits to a session
//! are serialized. Trigger controllers for live evaluation are kept per
//! session as well.

use ctv_common::config::EngineConfig;
use ctv_common::events::EventBus;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::compat::{evaluate_candidates, CandidateQuery, TrackCandidate};
use crate::error::{Error, Result};
use crate::library::{Energy, Track, TrackFilter, TrackLibrary};
use crate::persistence::MusicConfigGateway;
use crate::phases::{exercise_count, find_phase, generate_phases, Phase, PhaseType};
use crate::runtime::{
    plan_cue, plan_rise_from_rest, EvaluationContext, PhaseKey, PlaybackCue, TriggerAction,
    TriggerController,
};
use crate::session::{ApplyReport, EditingSession, RoundContext};
use crate::template::{RoundPlan, RoundTemplate, RoundType, TemplateStore};
use crate::timing::TimingCalculator;
use crate::triggers::defaults::{effective_config, full_config, minimal_config};
use crate::triggers::{
    tracks_used_elsewhere, validate_round, CountdownType, RoundMusicConfig, TriggerSlot,
    TriggerUpdate,
};

/// Phases of one round
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundPhases {
    pub round_number: u32,
    pub round_type: RoundType,
    pub total_rounds: u32,
    pub phases: Vec<Phase>,
}

/// A round's stored configuration next to what playback would use
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundMusicView {
    pub round_number: u32,
    /// As stored, absent until the round is first edited
    pub config: Option<RoundMusicConfig>,
    /// Stored triggers with missing slots disabled, as edits and playback see them
    pub effective: RoundMusicConfig,
    pub has_music_config: bool,
    /// Countdown configured on the first exercise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown: Option<CountdownType>,
}

/// One round as listed for a session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSummary {
    #[serde(flatten)]
    pub template: RoundTemplate,
    pub has_music_config: bool,
}

/// Starting configuration an editor can reset a round to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DefaultPreset {
    Minimal,
    Full,
}

/// Result of a full-round save
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReport {
    pub round_number: u32,
    pub persisted: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub phase_key: String,
    #[serde(flatten)]
    pub update: TriggerUpdate,
    /// Compute the outcome without committing it
    #[serde(default)]
    pub dry_run: bool,
}

/// Which candidates to return for a phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CandidateMode {
    #[default]
    All,
    NaturalEnding,
    RiseFromRest,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    pub phase_key: PhaseKey,
    pub context: EvaluationContext,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponse {
    pub action: TriggerAction,
    /// Start instruction when the action names a specific track
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cue: Option<PlaybackCue>,
    /// On a preview, the countdown the first exercise will start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_countdown: Option<CountdownType>,
}

pub struct MusicCueService {
    library: Arc<dyn TrackLibrary>,
    templates: TemplateStore,
    gateway: Arc<dyn MusicConfigGateway>,
    events: EventBus,
    timing: TimingCalculator,
    high_countdown_ms: u64,
    editors: Mutex<HashMap<String, Arc<Mutex<EditingSession>>>>,
    controllers: Mutex<HashMap<String, TriggerController>>,
}

impl MusicCueService {
    pub fn new(
        library: Arc<dyn TrackLibrary>,
        templates: TemplateStore,
        gateway: Arc<dyn MusicConfigGateway>,
        events: EventBus,
        engine: &EngineConfig,
    ) -> Self {
        Self {
            library,
            templates,
            gateway,
            events,
            timing: TimingCalculator::new(engine.transition_buffer_secs),
            high_countdown_ms: engine.high_countdown_ms,
            editors: Mutex::new(HashMap::new()),
            controllers: Mutex::new(HashMap::new()),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub async fn list_tracks(&self, filter: &TrackFilter) -> Result<Vec<Track>> {
        Ok(self.library.list_tracks(filter).await?)
    }

    async fn round_plan(&self, session_id: &str, round_number: u32) -> Result<RoundPlan> {
        self.templates
            .load_round(session_id, round_number)
            .await?
            .ok_or_else(|| Error::TemplateNotFound {
                session_id: session_id.to_string(),
                round: round_number,
            })
    }

    async fn editor(&self, session_id: &str) -> Result<Arc<Mutex<EditingSession>>> {
        if let Some(editor) = self.editors.lock().await.get(session_id) {
            return Ok(editor.clone());
        }

        // Load without holding the map so other sessions are not held up
        let session =
            EditingSession::load(session_id, self.gateway.clone(), self.events.clone()).await?;

        // A concurrent first load may have won the race; keep its session
        let mut editors = self.editors.lock().await;
        let editor = editors
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(session)));
        Ok(editor.clone())
    }

    pub async fn list_rounds(&self, session_id: &str) -> Result<Vec<RoundSummary>> {
        let templates = self.templates.list_templates(session_id).await?;
        let editor = self.editor(session_id).await?;
        let editor = editor.lock().await;

        Ok(templates
            .into_iter()
            .map(|template| RoundSummary {
                has_music_config: editor
                    .round(template.round_number)
                    .is_some_and(RoundMusicConfig::has_music_config),
                template,
            })
            .collect())
    }

    pub async fn phases(&self, session_id: &str, round_number: u32) -> Result<RoundPhases> {
        let plan = self.round_plan(session_id, round_number).await?;
        let total_rounds = self.templates.total_rounds(session_id).await?;

        Ok(RoundPhases {
            round_number,
            round_type: plan.template.round_type,
            total_rounds,
            phases: generate_phases(Some(&plan)),
        })
    }

    pub async fn music(&self, session_id: &str, round_number: u32) -> Result<RoundMusicView> {
        let plan = self.round_plan(session_id, round_number).await?;
        let editor = self.editor(session_id).await?;
        let config = editor.lock().await.round(round_number).cloned();

        let effective = effective_config(&plan.template, exercise_count(&plan), config.as_ref());
        let countdown = crate::runtime::controller::countdown_info(config.as_ref());

        Ok(RoundMusicView {
            round_number,
            has_music_config: config.as_ref().is_some_and(RoundMusicConfig::has_music_config),
            config,
            effective,
            countdown,
        })
    }

    /// Full replace of one round's configuration
    ///
    /// The round is checked against the same rules as an apply, but nothing
    /// cascades: a config that would need one is rejected.
    pub async fn replace_music(
        &self,
        session_id: &str,
        round_number: u32,
        config: RoundMusicConfig,
    ) -> Result<SaveReport> {
        let plan = self.round_plan(session_id, round_number).await?;
        let phases = generate_phases(Some(&plan));
        let tracks = self.library.list_tracks(&TrackFilter::default()).await?;

        let config = validate_round(&plan, &phases, &tracks, &self.timing, config).map_err(|e| {
            warn!(
                "Rejected music for session {} round {}: {}",
                session_id, round_number, e
            );
            e
        })?;

        let editor = self.editor(session_id).await?;
        let persisted = editor.lock().await.replace_round(round_number, config).await;
        Ok(SaveReport {
            round_number,
            persisted,
        })
    }

    /// Replace a round with one of the default configurations
    pub async fn apply_preset(
        &self,
        session_id: &str,
        round_number: u32,
        preset: DefaultPreset,
    ) -> Result<SaveReport> {
        let plan = self.round_plan(session_id, round_number).await?;
        let config = match preset {
            DefaultPreset::Minimal => minimal_config(),
            DefaultPreset::Full => full_config(&plan.template, exercise_count(&plan)),
        };
        debug!(
            "Resetting session {} round {} to {:?} defaults",
            session_id, round_number, preset
        );
        self.replace_music(session_id, round_number, config).await
    }

    pub async fn apply(
        &self,
        session_id: &str,
        round_number: u32,
        request: &ApplyRequest,
    ) -> Result<ApplyReport> {
        let plan = self.round_plan(session_id, round_number).await?;
        let phases = generate_phases(Some(&plan));
        let phase = find_phase(&phases, &request.phase_key)
            .cloned()
            .ok_or_else(|| Error::PhaseNotFound(request.phase_key.clone()))?;
        let total_rounds = self.templates.total_rounds(session_id).await?;
        let tracks = self.library.list_tracks(&TrackFilter::default()).await?;

        let round = RoundContext {
            plan: &plan,
            phases: &phases,
            total_rounds,
            tracks: &tracks,
            timing: &self.timing,
        };

        let editor = self.editor(session_id).await?;
        let mut editor = editor.lock().await;
        let mut rng = StdRng::from_entropy();
        editor
            .apply(&round, &phase, &request.update, request.dry_run, &mut rng)
            .await
    }

    pub async fn candidates(
        &self,
        session_id: &str,
        round_number: u32,
        phase_key: &str,
        mode: CandidateMode,
    ) -> Result<Vec<TrackCandidate>> {
        let plan = self.round_plan(session_id, round_number).await?;
        let phases = generate_phases(Some(&plan));
        let phase = find_phase(&phases, phase_key)
            .ok_or_else(|| Error::PhaseNotFound(phase_key.to_string()))?;
        let tracks = self.library.list_tracks(&TrackFilter::default()).await?;

        let used = {
            let editor = self.editor(session_id).await?;
            let editor = editor.lock().await;
            tracks_used_elsewhere(
                editor.workout(),
                Some(TriggerSlot {
                    round_number,
                    phase_type: phase.phase_type,
                    index: phase.index,
                }),
            )
        };

        let query = CandidateQuery {
            phase,
            template: &plan.template,
            exercise_count: exercise_count(&plan),
            timing: &self.timing,
            used_elsewhere: &used,
        };

        let candidates = evaluate_candidates(&tracks, &query)
            .into_iter()
            .filter(|c| match mode {
                CandidateMode::All => true,
                CandidateMode::NaturalEnding => c.natural_ending.compatible,
                CandidateMode::RiseFromRest => {
                    c.rise_from_rest.as_ref().is_some_and(|v| v.compatible)
                }
            })
            .collect::<Vec<_>>();

        debug!(
            "{} candidates for {} ({:?}) out of {} tracks",
            candidates.len(),
            phase_key,
            mode,
            tracks.len()
        );
        Ok(candidates)
    }

    /// Decide what the music does as the live workout enters a phase
    pub async fn evaluate(&self, session_id: &str, request: &EvaluateRequest) -> Result<EvaluateResponse> {
        let key = request.phase_key;
        let round_number = key.round_number();

        let config = {
            let editor = self.editor(session_id).await?;
            let editor = editor.lock().await;
            editor.round(round_number).cloned()
        };

        let (action, next_countdown) = {
            let mut controllers = self.controllers.lock().await;
            let controller = controllers
                .entry(session_id.to_string())
                .or_insert_with(|| TriggerController::new(self.high_countdown_ms));
            let action = controller.fire(&key, config.as_ref(), &request.context);

            let next_countdown = (key.phase_type == PhaseType::Preview)
                .then(|| {
                    let first = PhaseKey::new(PhaseType::Exercise, key.round_index, 0, key.set_number);
                    controller.should_trigger_countdown(&first, config.as_ref())
                })
                .flatten();
            (action, next_countdown)
        };

        let cue = match action.track_id() {
            Some(track_id) => self.cue_for(session_id, &key, &action, track_id, &request.context).await?,
            None => None,
        };

        Ok(EvaluateResponse {
            action,
            cue,
            next_countdown,
        })
    }

    /// Drop unpersisted local changes and re-read the store
    pub async fn reload(&self, session_id: &str) -> Result<usize> {
        let editor = self.editor(session_id).await?;
        let mut editor = editor.lock().await;
        editor.reload().await?;
        info!("Reloaded music configuration for session {}", session_id);
        Ok(editor.workout().len())
    }

    /// Forget runtime deduplication state for a session
    ///
    /// `triggered_only` keeps consumed countdown phases blocked, as when music
    /// is switched back on mid-round.
    pub async fn reset_runtime(&self, session_id: &str, triggered_only: bool) {
        let mut controllers = self.controllers.lock().await;
        if let Some(controller) = controllers.get_mut(session_id) {
            if triggered_only {
                controller.clear_triggered_only();
            } else {
                controller.reset();
            }
        }
    }

    async fn cue_for(
        &self,
        session_id: &str,
        key: &PhaseKey,
        action: &TriggerAction,
        track_id: &str,
        context: &EvaluationContext,
    ) -> Result<Option<PlaybackCue>> {
        let Some(track) = self.library.get_track(track_id).await? else {
            warn!("Trigger on {} references missing track {}", key, track_id);
            return Ok(None);
        };

        let plan = self.templates.load_round(session_id, key.round_number()).await?;
        let phase = plan.as_ref().and_then(|plan| {
            generate_phases(Some(plan))
                .into_iter()
                .find(|p| p.phase_type == key.phase_type && p.index == key.phase_index)
        });

        // A high-energy rest track rises so its drop lands on the next exercise
        if let (TriggerAction::Play { energy: Energy::High, natural_ending: false, .. }, Some(plan)) =
            (action, plan.as_ref())
        {
            if key.phase_type == PhaseType::Rest {
                if let Some(cue) = plan_rise_from_rest(&track, plan.template.rest_duration_sec) {
                    return Ok(Some(cue));
                }
            }
        }

        let remaining = context
            .round_end_time_ms
            .map(|end| {
                let now = ctv_common::time::now().timestamp_millis().max(0) as u64;
                ctv_common::time::millis_to_secs(end.saturating_sub(now))
            })
            .or_else(|| {
                let plan = plan.as_ref()?;
                let phase = phase.as_ref()?;
                Some(
                    self.timing
                        .remaining_set_duration(phase, &plan.template, exercise_count(plan)),
                )
            });

        Ok(plan_cue(action, &track, remaining))
    }
}
