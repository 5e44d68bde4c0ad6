//! JSON exporter for offline visualization.
//!
//! Exports simulation frames (ground truth + the agent's scene) as JSON so a
//! run can be replayed in an external viewer.

use radarmap_core::{GeoPoint, TrackView};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// Ground truth object positions
    pub ground_truth: Vec<TruthPosition>,

    /// Tracks held by the agent
    pub tracks: Vec<TrackView>,

    /// Events (dropouts, injections, etc.)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

/// True position of an object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruthPosition {
    pub road_id: u32,
    pub object_id: u64,
    pub lat: f64,
    pub lng: f64,
}

impl TruthPosition {
    pub fn new(road_id: u32, object_id: u64, position: GeoPoint) -> Self {
        Self {
            road_id,
            object_id,
            lat: position.lat,
            lng: position.lng,
        }
    }
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: Some("warn".to_string()),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    /// Final RMS error if applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_rms_error: Option<f64>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            final_rms_error: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, rms_error: Option<f64>) {
        self.passed = passed;
        self.final_rms_error = rms_error;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_tracks_duration_and_skips_empty_events() {
        let mut export = SimExport::new("dropout", 7);
        export.add_frame(SimFrame {
            time_sec: 1.5,
            ground_truth: vec![TruthPosition::new(1, 3, GeoPoint::new(35.0, 129.0))],
            tracks: Vec::new(),
            events: Vec::new(),
        });
        export.finalize(true, Some(0.4));

        assert_eq!(export.duration_sec, 1.5);

        let json = serde_json::to_string(&export).unwrap();
        assert!(!json.contains("events"));
        assert!(json.contains("\"final_rms_error\":0.4"));
    }
}
