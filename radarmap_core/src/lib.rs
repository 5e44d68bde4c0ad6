//! RadarMap Core - Live map of radar-detected road users
//!
//! Fixed roadside radars report objects as forward/lateral offsets in their
//! own frame. This library places those objects on the globe and keeps a
//! live, self-cleaning set of tracks for a 3D map renderer:
//! 1. **Transform**: detector-local offset → latitude/longitude + heading
//! 2. **Track cache**: upsert by `(road_id, object_id)`, H3 spatial index
//! 3. **Sweep**: tracks not refreshed within the timeout are evicted
//! 4. **Runtime**: one feed subscription and one sweep timer, torn down together

pub mod radarmap_geo;
pub mod radarmap_site;
pub mod radarmap_feed;
pub mod radarmap_tracking;
pub mod metrics;
pub mod scene;
pub mod agent_runtime;

#[cfg(feature = "visualization")]
pub mod visualization;

// Re-export key types for convenience
pub use radarmap_geo::{GeoPoint, LocalOffset, EARTH_RADIUS_M};
pub use radarmap_site::{Detector, Road, Site, SiteError};
pub use radarmap_feed::{Detection, FeedError, ObjectClass, ObservationMessage, ParsedMessage};
pub use radarmap_tracking::{Track, TrackCache, TrackId, TrackingConfig, TrackingError};
pub use metrics::FeedStats;
pub use scene::{JsonLinesSink, LogSink, RecordingSink, SceneError, SceneSink, SceneSnapshot, TrackView};
pub use agent_runtime::{AgentConfig, FeedOutcome, MapAgent, RunSummary, StopReason};

#[cfg(feature = "visualization")]
pub use visualization::RerunSink;
