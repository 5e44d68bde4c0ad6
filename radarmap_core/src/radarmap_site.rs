//! Static site configuration: where the detectors are and which way they face.
//!
//! The embedding application supplies a site descriptor:
//!
//! ```json
//! {
//!   "lat": 35.8358, "lng": 129.2844,
//!   "roads": [
//!     { "road_id": 1, "name": "Northbound",
//!       "detector": { "lat": 35.8358, "lng": 129.2844, "direction_deg": 0.0 } }
//!   ]
//! }
//! ```
//!
//! Detectors are immutable once loaded. Each road owns exactly one detector,
//! and the road id is the detector id used by the feed.

use crate::radarmap_geo::GeoPoint;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Detectors closer to a pole than this are rejected (`cos(lat)` blows up).
pub const MAX_DETECTOR_LATITUDE: f64 = 89.0;

/// A fixed radar with known position and facing direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detector {
    /// Latitude in degrees
    pub lat: f64,

    /// Longitude in degrees
    pub lng: f64,

    /// Boresight direction, degrees clockwise from north
    pub direction_deg: f64,
}

impl Detector {
    pub fn new(lat: f64, lng: f64, direction_deg: f64) -> Self {
        Self { lat, lng, direction_deg }
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// A monitored road and the detector covering it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Road {
    pub road_id: u32,
    pub name: String,
    pub detector: Detector,
}

/// The full site descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Site centre latitude (camera home / scene origin)
    pub lat: f64,

    /// Site centre longitude
    pub lng: f64,

    /// Monitored roads
    pub roads: Vec<Road>,
}

impl Site {
    /// Parses and validates a site descriptor from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, SiteError> {
        let site: Site = serde_json::from_str(json)?;
        site.validate()?;
        Ok(site)
    }

    /// Reads, parses and validates a site descriptor file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SiteError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SiteError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    /// Site centre as a point.
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }

    /// Looks up the road (and hence detector) for a feed `road_id`.
    pub fn road(&self, road_id: u32) -> Option<&Road> {
        self.roads.iter().find(|r| r.road_id == road_id)
    }

    /// Shortcut for `road(road_id).map(|r| &r.detector)`.
    pub fn detector(&self, road_id: u32) -> Option<&Detector> {
        self.road(road_id).map(|r| &r.detector)
    }

    /// Checks the invariants the transform relies on.
    ///
    /// - site centre is a valid coordinate
    /// - road ids are unique
    /// - every detector is finite, within latitude range and away from the poles
    pub fn validate(&self) -> Result<(), SiteError> {
        if !self.center().is_valid() {
            return Err(SiteError::InvalidCenter { lat: self.lat, lng: self.lng });
        }

        let mut seen = HashSet::new();
        for road in &self.roads {
            if !seen.insert(road.road_id) {
                return Err(SiteError::DuplicateRoad(road.road_id));
            }

            let d = &road.detector;
            if !d.position().is_valid() {
                return Err(SiteError::invalid_detector(road.road_id, "coordinates out of range"));
            }
            if d.lat.abs() > MAX_DETECTOR_LATITUDE {
                return Err(SiteError::invalid_detector(road.road_id, "too close to a pole"));
            }
            if !d.direction_deg.is_finite() {
                return Err(SiteError::invalid_detector(road.road_id, "direction is not finite"));
            }
        }

        Ok(())
    }
}

/// Errors raised while loading a site descriptor.
#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error("Failed to read site file: {0}")]
    Io(String),

    #[error("Malformed site descriptor: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid site centre ({lat}, {lng})")]
    InvalidCenter { lat: f64, lng: f64 },

    #[error("Duplicate road id: {0}")]
    DuplicateRoad(u32),

    #[error("Invalid detector on road {road_id}: {reason}")]
    InvalidDetector { road_id: u32, reason: String },
}

impl SiteError {
    fn invalid_detector(road_id: u32, reason: &str) -> Self {
        Self::InvalidDetector { road_id, reason: reason.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE_JSON: &str = r#"{
        "lat": 35.8358,
        "lng": 129.2844,
        "roads": [
            { "road_id": 1, "name": "North approach",
              "detector": { "lat": 35.8358, "lng": 129.2844, "direction_deg": 0.0 } },
            { "road_id": 2, "name": "East approach",
              "detector": { "lat": 35.8360, "lng": 129.2850, "direction_deg": 90.0 } }
        ]
    }"#;

    #[test]
    fn test_parse_site() {
        let site = Site::from_json_str(SITE_JSON).unwrap();
        assert_eq!(site.roads.len(), 2);
        assert_eq!(site.road(2).unwrap().name, "East approach");
        assert_eq!(site.detector(1).unwrap().direction_deg, 0.0);
        assert!(site.detector(3).is_none());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("radarmap_site_{}.json", std::process::id()));
        std::fs::write(&path, SITE_JSON).unwrap();

        let site = Site::load(&path).unwrap();
        assert_eq!(site.center(), GeoPoint::new(35.8358, 129.2844));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file() {
        let result = Site::load("/nonexistent/radarmap/site.json");
        assert!(matches!(result, Err(SiteError::Io(_))));
    }

    #[test]
    fn test_malformed_json() {
        let result = Site::from_json_str("{ \"lat\": 1.0, ");
        assert!(matches!(result, Err(SiteError::Parse(_))));
    }

    #[test]
    fn test_duplicate_road_rejected() {
        let mut site = Site::from_json_str(SITE_JSON).unwrap();
        site.roads[1].road_id = 1;
        assert!(matches!(site.validate(), Err(SiteError::DuplicateRoad(1))));
    }

    #[test]
    fn test_polar_detector_rejected() {
        let mut site = Site::from_json_str(SITE_JSON).unwrap();
        site.roads[0].detector.lat = 89.5;
        assert!(matches!(
            site.validate(),
            Err(SiteError::InvalidDetector { road_id: 1, .. })
        ));
    }

    #[test]
    fn test_non_finite_direction_rejected() {
        let mut site = Site::from_json_str(SITE_JSON).unwrap();
        site.roads[1].detector.direction_deg = f64::INFINITY;
        assert!(matches!(
            site.validate(),
            Err(SiteError::InvalidDetector { road_id: 2, .. })
        ));
    }

    #[test]
    fn test_invalid_center_rejected() {
        let mut site = Site::from_json_str(SITE_JSON).unwrap();
        site.lat = 120.0;
        assert!(matches!(site.validate(), Err(SiteError::InvalidCenter { .. })));
    }

    #[test]
    fn test_bundled_demo_site() {
        let site = Site::from_json_str(include_str!("../../sites/demo_site.json")).unwrap();
        assert_eq!(site.roads.len(), 4);
        assert_eq!(site.road(4).unwrap().detector.direction_deg, 270.0);
    }
}
