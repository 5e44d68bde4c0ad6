//! The "TRACKING" Engine - Live Track Cache
//!
//! Keeps the latest known state of every object the detectors report:
//! - Insert-or-overwrite by `(road_id, object_id)` on each observation
//! - Time-based staleness eviction (`sweep`)
//! - H3 cell index for viewport / radius queries
//!
//! The source assigns object ids, so no association step is needed: the
//! identifier alone decides whether an observation updates an existing
//! track or creates a new one.

use crate::radarmap_feed::{Detection, ObjectClass};
use crate::radarmap_geo::{self, GeoPoint, LocalOffset};
use crate::radarmap_site::Road;
use geo::{HaversineDistance, Point};
use h3o::{CellIndex, LatLng, Resolution};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Above this k-ring size a radius query scans every track instead.
const MAX_QUERY_RING: u32 = 48;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the TrackCache
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    /// H3 resolution for spatial indexing (default: Resolution::Eleven ~25m edges)
    pub h3_resolution: Resolution,

    /// Default staleness timeout used by [`TrackCache::sweep_expired`] (default: 3s)
    pub track_timeout: Duration,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            h3_resolution: Resolution::Eleven,
            track_timeout: Duration::from_secs(3),
        }
    }
}

// ============================================================================
// IDENTITY & INPUT
// ============================================================================

/// Track identifier: the reporting detector plus the source's object id.
///
/// Object ids are only unique per detector, so two roads may both report
/// object 7 without colliding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId {
    pub road_id: u32,
    pub object_id: u64,
}

impl TrackId {
    pub fn new(road_id: u32, object_id: u64) -> Self {
        Self { road_id, object_id }
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.road_id, self.object_id)
    }
}

/// One object as seen in its detector's frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub object_id: u64,
    pub offset: LocalOffset,
    /// Heading relative to the detector boresight (degrees)
    pub heading: Option<f64>,
    pub object_type: Option<u8>,
}

impl From<&Detection> for Observation {
    fn from(d: &Detection) -> Self {
        Self {
            object_id: d.object_id,
            offset: d.offset(),
            heading: d.heading,
            object_type: d.object_type,
        }
    }
}

// ============================================================================
// TRACK (Internal State)
// ============================================================================

/// Latest known state of one tracked object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,

    /// World position
    pub position: GeoPoint,

    /// World heading, degrees clockwise from north
    pub heading_deg: Option<f64>,

    /// Raw classification code as reported
    pub class_code: Option<u8>,

    /// Context time of the latest observation
    pub last_update: Duration,

    /// Context time of the first observation
    pub first_seen: Duration,

    /// Number of observations applied
    pub update_count: u64,

    /// Current H3 cell for spatial indexing
    pub h3_cell: CellIndex,
}

impl Track {
    pub fn class(&self) -> ObjectClass {
        ObjectClass::from(self.class_code)
    }

    /// Time since the latest observation.
    pub fn staleness(&self, now: Duration) -> Duration {
        now.saturating_sub(self.last_update)
    }
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

// ============================================================================
// TRACK CACHE (The Engine)
// ============================================================================

/// Identifier-keyed store of live tracks with an H3 side index.
pub struct TrackCache {
    /// All live tracks
    tracks: HashMap<TrackId, Track>,

    /// Maps H3 cells to the set of track IDs within that cell
    spatial_index: HashMap<CellIndex, HashSet<TrackId>>,

    /// Runtime configuration
    config: TrackingConfig,
}

impl TrackCache {
    /// Create a new TrackCache with the given configuration.
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            tracks: HashMap::new(),
            spatial_index: HashMap::new(),
            config,
        }
    }

    /// Create a new TrackCache with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(TrackingConfig::default())
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    // ========================================================================
    // SPATIAL INDEX OPERATIONS
    // ========================================================================

    /// Convert a WGS84 position to an H3 cell index.
    pub fn position_to_cell(&self, position: GeoPoint) -> Result<CellIndex, TrackingError> {
        if !position.is_valid() {
            return Err(TrackingError::InvalidCoordinates(format!(
                "({}, {})",
                position.lat, position.lng
            )));
        }
        let latlng = LatLng::new(position.lat, position.lng)
            .map_err(|e| TrackingError::InvalidCoordinates(format!("{:?}", e)))?;
        Ok(latlng.to_cell(self.config.h3_resolution))
    }

    fn spatial_index_insert(&mut self, cell: CellIndex, track_id: TrackId) {
        self.spatial_index
            .entry(cell)
            .or_default()
            .insert(track_id);
    }

    fn spatial_index_remove(&mut self, cell: CellIndex, track_id: TrackId) {
        if let Some(set) = self.spatial_index.get_mut(&cell) {
            set.remove(&track_id);
            // Clean up empty cells
            if set.is_empty() {
                self.spatial_index.remove(&cell);
            }
        }
    }

    /// All track IDs within a cell and its k-ring neighbors.
    pub fn spatial_query_kring(&self, cell: CellIndex, k: u32) -> HashSet<TrackId> {
        let mut result = HashSet::new();
        for neighbor_cell in cell.grid_disk_safe(k) {
            if let Some(track_ids) = self.spatial_index.get(&neighbor_cell) {
                result.extend(track_ids.iter().copied());
            }
        }
        result
    }

    /// Tracks within `radius_m` metres (great-circle) of `center`.
    ///
    /// Candidates come from an H3 k-ring sized to the radius, then are
    /// filtered by haversine distance. Very large radii fall back to a scan.
    pub fn query_radius(&self, center: GeoPoint, radius_m: f64) -> Vec<&Track> {
        let Ok(center_cell) = self.position_to_cell(center) else {
            return Vec::new();
        };

        let origin = Point::new(center.lng, center.lat);
        let within = |track: &&Track| {
            let p = Point::new(track.position.lng, track.position.lat);
            origin.haversine_distance(&p) <= radius_m
        };

        // Each ring adds at least 1.5 edge lengths of guaranteed coverage
        let edge = self.config.h3_resolution.edge_length_m();
        let k = ((radius_m.max(0.0) + edge) / (1.5 * edge)).ceil() as u32 + 1;

        if k > MAX_QUERY_RING {
            return self.tracks.values().filter(within).collect();
        }

        self.spatial_query_kring(center_cell, k)
            .iter()
            .filter_map(|id| self.tracks.get(id))
            .filter(within)
            .collect()
    }

    // ========================================================================
    // TRACK LIFECYCLE
    // ========================================================================

    /// Insert or overwrite the track for `(road.road_id, observation.object_id)`.
    ///
    /// The world position comes from the road's detector pose and the local offset;
    /// the world heading, when reported, is the detector direction plus the
    /// relative heading. An existing track keeps its identifier and
    /// `first_seen`; position, heading and class are fully replaced.
    ///
    /// On error the cache is left untouched.
    pub fn upsert(
        &mut self,
        road: &Road,
        observation: Observation,
        now: Duration,
    ) -> Result<Upsert, TrackingError> {
        let track_id = TrackId::new(road.road_id, observation.object_id);
        let detector = &road.detector;

        let position = radarmap_geo::offset_to_world(
            detector.position(),
            detector.direction_deg,
            observation.offset,
        );
        let cell = self.position_to_cell(position)?;
        let heading_deg = observation
            .heading
            .filter(|h| h.is_finite())
            .map(|h| radarmap_geo::offset_to_world_heading(detector.direction_deg, h));

        let previous_cell = match self.tracks.get_mut(&track_id) {
            Some(track) => {
                let old_cell = track.h3_cell;
                track.position = position;
                track.heading_deg = heading_deg;
                track.class_code = observation.object_type;
                track.last_update = now;
                track.update_count += 1;
                track.h3_cell = cell;
                Some(old_cell)
            }
            None => {
                self.tracks.insert(track_id, Track {
                    id: track_id,
                    position,
                    heading_deg,
                    class_code: observation.object_type,
                    last_update: now,
                    first_seen: now,
                    update_count: 1,
                    h3_cell: cell,
                });
                None
            }
        };

        match previous_cell {
            Some(old_cell) => {
                if old_cell != cell {
                    self.spatial_index_remove(old_cell, track_id);
                    self.spatial_index_insert(cell, track_id);
                }
                Ok(Upsert::Updated)
            }
            None => {
                self.spatial_index_insert(cell, track_id);
                Ok(Upsert::Created)
            }
        }
    }

    /// Remove every track with `now - last_update > timeout`.
    ///
    /// Returns the removed identifiers (empty when nothing was stale).
    pub fn evict_stale(&mut self, now: Duration, timeout: Duration) -> Vec<TrackId> {
        let to_remove: Vec<(TrackId, CellIndex)> = self.tracks
            .values()
            .filter(|track| track.staleness(now) > timeout)
            .map(|track| (track.id, track.h3_cell))
            .collect();

        for (track_id, cell) in &to_remove {
            self.spatial_index_remove(*cell, *track_id);
            self.tracks.remove(track_id);
        }

        to_remove.into_iter().map(|(id, _)| id).collect()
    }

    /// Evict stale tracks; true if anything was removed.
    ///
    /// Idempotent: a second call with the same arguments removes nothing.
    pub fn sweep(&mut self, now: Duration, timeout: Duration) -> bool {
        !self.evict_stale(now, timeout).is_empty()
    }

    /// [`sweep`](Self::sweep) with the configured timeout.
    pub fn sweep_expired(&mut self, now: Duration) -> bool {
        let timeout = self.config.track_timeout;
        self.sweep(now, timeout)
    }

    /// Drop every track.
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.spatial_index.clear();
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn get(&self, id: &TrackId) -> Option<&Track> {
        self.tracks.get(id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    /// Tracks ordered by identifier (stable output for renderers and tests).
    pub fn sorted_tracks(&self) -> Vec<&Track> {
        let mut tracks: Vec<&Track> = self.tracks.values().collect();
        tracks.sort_by_key(|t| t.id);
        tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Get statistics about the spatial index.
    pub fn spatial_stats(&self) -> SpatialIndexStats {
        let total_cells = self.spatial_index.len();
        let total_entries: usize = self.spatial_index.values().map(|s| s.len()).sum();
        let avg_per_cell = if total_cells > 0 {
            total_entries as f64 / total_cells as f64
        } else {
            0.0
        };

        SpatialIndexStats {
            total_cells,
            total_entries,
            avg_per_cell,
        }
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Statistics about the spatial index.
#[derive(Debug, Clone)]
pub struct SpatialIndexStats {
    pub total_cells: usize,
    pub total_entries: usize,
    pub avg_per_cell: f64,
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors that can occur during tracking operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TrackingError {
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
}

// ============================================================================
// TESTS
// ============================================================================
