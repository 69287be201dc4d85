//! JSON seed catalog import
//!
//! A seed file carries the track catalog and, optionally, round templates for
//! demo sessions:
//!
//! ```json
//! {
//!   "tracks": [{ "id": "t1", "name": "…", "durationMs": 200000, "segments": [...] }],
//!   "sessions": [{ "sessionId": "demo", "rounds": [{ "template": {...}, "exercises": [...] }] }]
//! }
//! ```

use ctv_common::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::{SqliteTrackLibrary, Track};
use crate::template::{RoundPlan, TemplateStore};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedCatalog {
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub sessions: Vec<SeedSession>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSession {
    pub session_id: String,
    #[serde(default)]
    pub rounds: Vec<RoundPlan>,
}

/// Counts reported after an import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub tracks: usize,
    pub rounds: usize,
}

impl SeedCatalog {
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

/// Write every track and round in `catalog` to the database
///
/// Existing rows with the same keys are replaced.
pub async fn import_catalog(
    catalog: &SeedCatalog,
    library: &SqliteTrackLibrary,
    templates: &TemplateStore,
) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for track in &catalog.tracks {
        library.upsert_track(track).await?;
        summary.tracks += 1;
    }

    for session in &catalog.sessions {
        for plan in &session.rounds {
            templates.save_round(&session.session_id, plan).await?;
            summary.rounds += 1;
        }
    }

    info!(
        "Imported seed catalog: {} tracks, {} rounds",
        summary.tracks, summary.rounds
    );
    Ok(summary)
}
