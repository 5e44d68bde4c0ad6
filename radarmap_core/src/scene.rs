//! Scene output: what the visualization engine receives each update cycle.
//!
//! The core owns no rendering. After a cycle that changed the cache, the
//! runtime builds a [`SceneSnapshot`] and hands it to a [`SceneSink`]. The
//! engine behind the sink maps each `TrackView` to a scene object keyed by
//! `id`, creating, moving or deleting objects to match.

use crate::radarmap_tracking::{Track, TrackCache};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info};

/// Renderer-facing view of one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackView {
    /// Stable scene key, `"<road_id>:<object_id>"`
    pub id: String,
    pub road_id: u32,
    pub object_id: u64,
    pub lat: f64,
    pub lng: f64,
    /// Degrees clockwise from north
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_code: Option<u8>,
    /// Styling label (`vehicle`, `pedestrian`, ...)
    pub class: String,
}

impl From<&Track> for TrackView {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id.to_string(),
            road_id: track.id.road_id,
            object_id: track.id.object_id,
            lat: track.position.lat,
            lng: track.position.lng,
            heading_deg: track.heading_deg,
            class_code: track.class_code,
            class: track.class().label().to_string(),
        }
    }
}

/// Complete set of live tracks at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    /// Increments with every published snapshot
    pub generation: u64,
    /// Context time in milliseconds
    pub time_ms: u64,
    /// Tracks ordered by id
    pub tracks: Vec<TrackView>,
}

impl SceneSnapshot {
    pub fn from_cache(cache: &TrackCache, generation: u64, now: Duration) -> Self {
        Self {
            generation,
            time_ms: now.as_millis() as u64,
            tracks: cache.sorted_tracks().into_iter().map(TrackView::from).collect(),
        }
    }

    pub fn track(&self, id: &str) -> Option<&TrackView> {
        self.tracks.iter().find(|t| t.id == id)
    }
}

/// Consumer of scene snapshots (the visualization collaborator).
pub trait SceneSink {
    fn publish(&mut self, snapshot: &SceneSnapshot) -> Result<(), SceneError>;
}

impl<S: SceneSink + ?Sized> SceneSink for Box<S> {
    fn publish(&mut self, snapshot: &SceneSnapshot) -> Result<(), SceneError> {
        (**self).publish(snapshot)
    }
}

// ============================================================================
// SINKS
// ============================================================================

/// Keeps every snapshot in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub snapshots: Vec<SceneSnapshot>,
}

impl RecordingSink {
    pub fn latest(&self) -> Option<&SceneSnapshot> {
        self.snapshots.last()
    }
}

impl SceneSink for RecordingSink {
    fn publish(&mut self, snapshot: &SceneSnapshot) -> Result<(), SceneError> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }
}

/// Logs a summary line per snapshot, and each track at debug level.
#[derive(Debug, Default)]
pub struct LogSink;

impl SceneSink for LogSink {
    fn publish(&mut self, snapshot: &SceneSnapshot) -> Result<(), SceneError> {
        info!(
            generation = snapshot.generation,
            tracks = snapshot.tracks.len(),
            "scene updated"
        );
        for t in &snapshot.tracks {
            debug!(
                id = %t.id,
                lat = t.lat,
                lng = t.lng,
                heading = ?t.heading_deg,
                class = %t.class,
                "track"
            );
        }
        Ok(())
    }
}

/// Writes one JSON document per snapshot, newline-delimited.
///
/// Typical writer: stdout piped into the rendering process.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> SceneSink for JsonLinesSink<W> {
    fn publish(&mut self, snapshot: &SceneSnapshot) -> Result<(), SceneError> {
        serde_json::to_writer(&mut self.writer, snapshot)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors raised while handing a snapshot to the visualization side.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Renderer error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radarmap_geo::LocalOffset;
    use crate::radarmap_site::{Detector, Road};
    use crate::radarmap_tracking::Observation;

    fn populated_cache() -> TrackCache {
        let mut cache = TrackCache::with_defaults();
        let road = Road {
            road_id: 1,
            name: "North".to_string(),
            detector: Detector::new(35.8358, 129.2844, 0.0),
        };
        for (object_id, object_type) in [(2, Some(2)), (1, Some(1))] {
            let observation = Observation {
                object_id,
                offset: LocalOffset::new(30.0 * object_id as f64, 0.0),
                heading: Some(0.0),
                object_type,
            };
            cache.upsert(&road, observation, Duration::from_millis(1500)).unwrap();
        }
        cache
    }

    #[test]
    fn test_snapshot_from_cache() {
        let snapshot = SceneSnapshot::from_cache(&populated_cache(), 4, Duration::from_millis(2500));

        assert_eq!(snapshot.generation, 4);
        assert_eq!(snapshot.time_ms, 2500);
        assert_eq!(snapshot.tracks.len(), 2);

        // Ordered by id
        assert_eq!(snapshot.tracks[0].id, "1:1");
        assert_eq!(snapshot.tracks[0].class, "vehicle");
        assert_eq!(snapshot.track("1:2").unwrap().class, "pedestrian");
    }

    #[test]
    fn test_recording_sink() {
        let mut sink = RecordingSink::default();
        let snapshot = SceneSnapshot::from_cache(&populated_cache(), 1, Duration::ZERO);
        sink.publish(&snapshot).unwrap();

        assert_eq!(sink.latest(), Some(&snapshot));
    }

    #[test]
    fn test_json_lines_sink() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let snapshot = SceneSnapshot::from_cache(&populated_cache(), 1, Duration::ZERO);
        sink.publish(&snapshot).unwrap();
        sink.publish(&snapshot).unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let decoded: SceneSnapshot = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(decoded.generation, snapshot.generation);
        assert_eq!(decoded.tracks.len(), 2);
        assert_eq!(decoded.tracks[1].id, "1:2");
        assert!((decoded.tracks[1].lat - snapshot.tracks[1].lat).abs() < 1e-12);
    }

    #[test]
    fn test_boxed_sink() {
        let mut sink: Box<dyn SceneSink> = Box::new(LogSink);
        let snapshot = SceneSnapshot::from_cache(&populated_cache(), 1, Duration::ZERO);
        assert!(sink.publish(&snapshot).is_ok());
    }
}
