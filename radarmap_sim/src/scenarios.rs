//! Simulation scenarios and the demo site they run on.

use radarmap_core::{Detector, Road, Site};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: Continuous traffic on every road
    SteadyTraffic,

    /// SIM-002: One detector goes silent mid-run
    Dropout,

    /// SIM-003: Corrupted payloads interleaved with the feed
    MalformedFeed,

    /// SIM-004: Messages for a road that is not configured
    UnknownRoad,

    /// SIM-005: Traffic converging on the site centre from all approaches
    Intersection,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SteadyTraffic,
            ScenarioId::Dropout,
            ScenarioId::MalformedFeed,
            ScenarioId::UnknownRoad,
            ScenarioId::Intersection,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SteadyTraffic => "steady_traffic",
            ScenarioId::Dropout => "dropout",
            ScenarioId::MalformedFeed => "malformed_feed",
            ScenarioId::UnknownRoad => "unknown_road",
            ScenarioId::Intersection => "intersection",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SteadyTraffic => "4 detectors, continuous traffic, verify coverage and position error",
            ScenarioId::Dropout => "Road 1 stops reporting, verify its tracks are swept",
            ScenarioId::MalformedFeed => "20% corrupted payloads, verify the cache is never touched by them",
            ScenarioId::UnknownRoad => "Messages for an unconfigured road, verify they are ignored",
            ScenarioId::Intersection => "Approaching traffic on all roads, verify headings and error",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady_traffic" | "steadytraffic" | "sim-001" => Ok(ScenarioId::SteadyTraffic),
            "dropout" | "sim-002" => Ok(ScenarioId::Dropout),
            "malformed_feed" | "malformedfeed" | "sim-003" => Ok(ScenarioId::MalformedFeed),
            "unknown_road" | "unknownroad" | "sim-004" => Ok(ScenarioId::UnknownRoad),
            "intersection" | "sim-005" => Ok(ScenarioId::Intersection),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

/// A four-approach junction with one detector per road, each facing away
/// from the centre.
pub fn demo_site() -> Site {
    let (lat, lng) = (35.8358, 129.2844);
    let road = |road_id, name: &str, d_lat: f64, d_lng: f64, direction_deg| Road {
        road_id,
        name: name.to_string(),
        detector: Detector::new(lat + d_lat, lng + d_lng, direction_deg),
    };

    Site {
        lat,
        lng,
        roads: vec![
            road(1, "North approach", 0.0001, 0.0, 0.0),
            road(2, "East approach", 0.0, 0.00012, 90.0),
            road(3, "South approach", -0.0001, 0.0, 180.0),
            road(4, "West approach", 0.0, -0.00012, 270.0),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_names_round_trip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert_eq!("SIM-002".parse::<ScenarioId>(), Ok(ScenarioId::Dropout));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_demo_site_is_valid() {
        let site = demo_site();
        assert!(site.validate().is_ok());
        assert_eq!(site.roads.len(), 4);
        assert_eq!(site.detector(2).unwrap().direction_deg, 90.0);
    }
}
