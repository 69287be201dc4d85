//! Track library
//!
//! A flat catalog of music tracks, each annotated with timestamped energy
//! segments. The engine only reads it; imports happen through
//! [`catalog::import_catalog`].

use async_trait::async_trait;
use ctv_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

pub mod catalog;
pub mod sqlite;

pub use sqlite::SqliteTrackLibrary;

/// Musical intensity of a track region, also the energy a trigger asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Energy {
    Low,
    Medium,
    High,
}

impl Energy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Energy::Low => "low",
            Energy::Medium => "medium",
            Energy::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Energy::Low),
            "medium" => Some(Energy::Medium),
            "high" => Some(Energy::High),
            _ => None,
        }
    }
}

/// Start of an energy zone inside a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub timestamp_sec: f64,
    pub energy: Energy,
    /// Seconds of build-up leading into this segment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buildup_duration_sec: Option<f64>,
}

/// A catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artist: String,
    pub duration_ms: u64,
    /// Sorted ascending by timestamp, timestamps unique and non-negative
    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl Track {
    pub fn duration_sec(&self) -> f64 {
        ctv_common::time::millis_to_secs(self.duration_ms)
    }

    /// Segment in effect at `position_sec`
    ///
    /// A position before the first segment resolves to the first segment.
    pub fn segment_at(&self, position_sec: f64) -> Option<&Segment> {
        self.segments
            .iter()
            .rev()
            .find(|s| s.timestamp_sec <= position_sec)
            .or_else(|| self.segments.first())
    }

    pub fn has_energy(&self, energy: Energy) -> bool {
        self.segments.iter().any(|s| s.energy == energy)
    }

    /// Sort segments and check the timestamp invariants
    pub fn normalize(&mut self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidInput("track id must not be empty".to_string()));
        }

        if let Some(bad) = self
            .segments
            .iter()
            .find(|s| !s.timestamp_sec.is_finite() || s.timestamp_sec < 0.0)
        {
            return Err(Error::InvalidInput(format!(
                "track {}: segment timestamp {} must be >= 0",
                self.id, bad.timestamp_sec
            )));
        }

        self.segments
            .sort_by(|a, b| a.timestamp_sec.total_cmp(&b.timestamp_sec));

        if self
            .segments
            .windows(2)
            .any(|pair| pair[0].timestamp_sec == pair[1].timestamp_sec)
        {
            return Err(Error::InvalidInput(format!(
                "track {}: duplicate segment timestamps",
                self.id
            )));
        }

        Ok(())
    }
}

/// Optional narrowing for `list_tracks`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackFilter {
    /// Keep tracks that contain at least one segment of this energy
    pub energy: Option<Energy>,
    /// Case-insensitive substring of name or artist
    pub search: Option<String>,
    pub min_duration_ms: Option<u64>,
}

impl TrackFilter {
    pub fn matches(&self, track: &Track) -> bool {
        if let Some(energy) = self.energy {
            if !track.has_energy(energy) {
                return false;
            }
        }

        if let Some(min) = self.min_duration_ms {
            if track.duration_ms < min {
                return false;
            }
        }

        if let Some(search) = self.search.as_deref() {
            let needle = search.to_lowercase();
            if !track.name.to_lowercase().contains(&needle)
                && !track.artist.to_lowercase().contains(&needle)
            {
                return false;
            }
        }

        true
    }
}

/// Read access to the catalog
#[async_trait]
pub trait TrackLibrary: Send + Sync {
    /// Tracks matching `filter`, ordered by name then id
    async fn list_tracks(&self, filter: &TrackFilter) -> Result<Vec<Track>>;

    async fn get_track(&self, id: &str) -> Result<Option<Track>>;
}

/// Catalog held in memory (tests and seeded demos)
#[derive(Default)]
pub struct InMemoryTrackLibrary {
    tracks: RwLock<HashMap<String, Track>>,
}

impl InMemoryTrackLibrary {
    pub fn new(tracks: Vec<Track>) -> Result<Self> {
        let library = Self::default();
        for track in tracks {
            library.insert(track)?;
        }
        Ok(library)
    }

    pub fn insert(&self, mut track: Track) -> Result<()> {
        track.normalize()?;
        let mut tracks = self
            .tracks
            .write()
            .map_err(|_| Error::Internal("track library lock poisoned".to_string()))?;
        tracks.insert(track.id.clone(), track);
        Ok(())
    }
}

#[async_trait]
impl TrackLibrary for InMemoryTrackLibrary {
    async fn list_tracks(&self, filter: &TrackFilter) -> Result<Vec<Track>> {
        let tracks = self
            .tracks
            .read()
            .map_err(|_| Error::Internal("track library lock poisoned".to_string()))?;
        let mut matching: Vec<Track> = tracks
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        sort_tracks(&mut matching);
        Ok(matching)
    }

    async fn get_track(&self, id: &str) -> Result<Option<Track>> {
        let tracks = self
            .tracks
            .read()
            .map_err(|_| Error::Internal("track library lock poisoned".to_string()))?;
        Ok(tracks.get(id).cloned())
    }
}

pub(crate) fn sort_tracks(tracks: &mut [Track]) {
    tracks.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn segment(timestamp_sec: f64, energy: Energy) -> Segment {
        Segment {
            timestamp_sec,
            energy,
            buildup_duration_sec: None,
        }
    }

    pub fn track(id: &str, duration_sec: u64, segments: Vec<Segment>) -> Track {
        Track {
            id: id.to_string(),
            name: format!("Track {}", id),
            artist: "Test Artist".to_string(),
            duration_ms: duration_sec * 1000,
            segments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_segment_at_picks_last_segment_before_position() {
        let t = track(
            "t1",
            200,
            vec![
                segment(0.0, Energy::Low),
                segment(30.0, Energy::Medium),
                segment(60.0, Energy::High),
            ],
        );

        assert_eq!(t.segment_at(45.0).map(|s| s.energy), Some(Energy::Medium));
        assert_eq!(t.segment_at(60.0).map(|s| s.energy), Some(Energy::High));
        assert_eq!(t.segment_at(199.0).map(|s| s.energy), Some(Energy::High));
    }

    #[test]
    fn test_segment_at_before_first_uses_first() {
        let t = track("t1", 200, vec![segment(10.0, Energy::High)]);
        assert_eq!(t.segment_at(2.0).map(|s| s.timestamp_sec), Some(10.0));
    }

    #[test]
    fn test_normalize_sorts_and_rejects_duplicates() {
        let mut t = track(
            "t1",
            200,
            vec![segment(60.0, Energy::High), segment(0.0, Energy::Low)],
        );
        t.normalize().unwrap();
        assert_eq!(t.segments[0].timestamp_sec, 0.0);

        let mut dup = track(
            "t2",
            200,
            vec![segment(5.0, Energy::High), segment(5.0, Energy::Low)],
        );
        assert!(matches!(dup.normalize(), Err(Error::InvalidInput(_))));

        let mut negative = track("t3", 200, vec![segment(-1.0, Energy::High)]);
        assert!(matches!(negative.normalize(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_filter_matches() {
        let mut t = track("t1", 200, vec![segment(0.0, Energy::Low)]);
        t.name = "Thunderstruck".to_string();

        let by_search = TrackFilter {
            search: Some("THUNDER".to_string()),
            ..Default::default()
        };
        assert!(by_search.matches(&t));

        let by_energy = TrackFilter {
            energy: Some(Energy::High),
            ..Default::default()
        };
        assert!(!by_energy.matches(&t));

        let by_duration = TrackFilter {
            min_duration_ms: Some(300_000),
            ..Default::default()
        };
        assert!(!by_duration.matches(&t));
    }

    #[tokio::test]
    async fn test_in_memory_library_lists_sorted() {
        let mut b = track("b", 100, vec![]);
        b.name = "Beta".to_string();
        let mut a = track("a", 100, vec![]);
        a.name = "Alpha".to_string();

        let library = InMemoryTrackLibrary::new(vec![b, a]).unwrap();
        let listed = library.list_tracks(&TrackFilter::default()).await.unwrap();

        let names: Vec<&str> = listed.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
        assert!(library.get_track("a").await.unwrap().is_some());
        assert!(library.get_track("zzz").await.unwrap().is_none());
    }
}
