//! The "GEO" Engine - Detector-Local to World Coordinate Transform
//!
//! Maps a detection expressed in a radar's own frame (metres forward along
//! the boresight, metres to the right of it) onto WGS84 latitude/longitude.
//!
//! Two steps:
//! 1. Rotate the local offset by the detector orientation (clockwise from
//!    north) into an east/north displacement.
//! 2. Convert east/north metres to a lat/lng delta on a sphere of radius
//!    [`EARTH_RADIUS_M`].
//!
//! The spherical approximation is accurate enough for sub-kilometre radar
//! ranges. `cos(lat)` degenerates at the poles; callers keep detectors away
//! from them (see `radarmap_site`).

use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};

/// Mean earth radius used by the transform (metres).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when both components are finite and latitude is within ±90°.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite() && self.lat.abs() <= 90.0
    }
}

/// A detection offset in the detector's frame (metres).
///
/// `forward` runs along the detector orientation, positive `lateral`
/// points to the detector's right.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LocalOffset {
    pub forward: f64,
    pub lateral: f64,
}

impl LocalOffset {
    pub fn new(forward: f64, lateral: f64) -> Self {
        Self { forward, lateral }
    }

    /// Straight-line range from the detector (metres).
    pub fn range(&self) -> f64 {
        self.forward.hypot(self.lateral)
    }
}

/// A horizontal displacement in metres on the local tangent plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EastNorth {
    pub east: f64,
    pub north: f64,
}

impl EastNorth {
    pub fn new(east: f64, north: f64) -> Self {
        Self { east, north }
    }

    pub fn norm(&self) -> f64 {
        self.east.hypot(self.north)
    }
}

/// Rotates a detector-frame offset into east/north metres.
///
/// With θ the orientation clockwise from north:
/// ```text
/// east  = forward·sin θ + lateral·cos θ
/// north = forward·cos θ − lateral·sin θ
/// ```
/// i.e. a clockwise rotation of the `(lateral, forward)` vector.
pub fn rotate_offset(offset: LocalOffset, direction_deg: f64) -> EastNorth {
    let rotation = Rotation2::new(-direction_deg.to_radians());
    let v = rotation * Vector2::new(offset.lateral, offset.forward);
    EastNorth::new(v.x, v.y)
}

/// Displaces `origin` by an east/north vector on the spherical earth.
pub fn displace(origin: GeoPoint, displacement: EastNorth) -> GeoPoint {
    let lat0 = origin.lat.to_radians();
    let lng0 = origin.lng.to_radians();

    let d_lat = displacement.north / EARTH_RADIUS_M;
    let d_lng = displacement.east / (EARTH_RADIUS_M * lat0.cos());

    GeoPoint::new(
        (lat0 + d_lat).to_degrees(),
        normalize_longitude((lng0 + d_lng).to_degrees()),
    )
}

/// Maps a detector-frame offset to a world position.
///
/// Pure and deterministic. An offset of `(0, 0)` returns `origin`.
pub fn offset_to_world(origin: GeoPoint, direction_deg: f64, offset: LocalOffset) -> GeoPoint {
    displace(origin, rotate_offset(offset, direction_deg))
}

/// World heading (degrees clockwise from north) of an object whose heading
/// is reported relative to the detector boresight.
pub fn offset_to_world_heading(direction_deg: f64, heading_offset_deg: f64) -> f64 {
    normalize_degrees(direction_deg + heading_offset_deg)
}

/// Inverse of [`displace`]: east/north metres from `origin` to `point`.
pub fn east_north_between(origin: GeoPoint, point: GeoPoint) -> EastNorth {
    let lat0 = origin.lat.to_radians();
    let d_lat = (point.lat - origin.lat).to_radians();
    let d_lng = normalize_longitude(point.lng - origin.lng).to_radians();

    EastNorth::new(
        d_lng * EARTH_RADIUS_M * lat0.cos(),
        d_lat * EARTH_RADIUS_M,
    )
}

/// Wraps an angle into `[0, 360)`.
pub fn normalize_degrees(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negatives
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Wraps a longitude into `[-180, 180)`.
pub fn normalize_longitude(lng: f64) -> f64 {
    let wrapped = (lng + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped >= 180.0 { -180.0 } else { wrapped }
}
