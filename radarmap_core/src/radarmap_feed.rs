//! The inbound wire format: one JSON observation message per detector scan.
//!
//! ```json
//! { "road_id": 1,
//!   "data": [ { "object_id": 7, "xpos": 42.0, "ypos": -1.5,
//!               "heading": 3.0, "object_type": 1 } ] }
//! ```
//!
//! `xpos` is the forward offset along the detector boresight and `ypos` the
//! lateral offset (positive to the right), both in metres. `heading` is the
//! object's heading relative to the boresight in degrees.
//!
//! The envelope must be well formed. Individual detections that cannot be
//! read (a missing offset, a class code outside 0-255) are skipped and
//! counted, and the rest of the scan is kept.

use crate::radarmap_geo::LocalOffset;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// WIRE TYPES
// ============================================================================

/// A single scan reported by one detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationMessage {
    /// Detector (road) that produced the scan
    pub road_id: u32,

    /// Objects detected in the scan
    #[serde(default)]
    pub data: Vec<Detection>,
}

/// One object in a detector's local frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Source-assigned id, stable while the object stays in view
    pub object_id: u64,

    /// Forward offset (metres)
    pub xpos: f64,

    /// Lateral offset (metres, positive right)
    pub ypos: f64,

    /// Heading relative to the detector boresight (degrees)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,

    /// Classification code, see [`ObjectClass`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<u8>,
}

impl Detection {
    pub fn offset(&self) -> LocalOffset {
        LocalOffset::new(self.xpos, self.ypos)
    }
}

/// Envelope as read off the wire, before detections are checked.
#[derive(Deserialize)]
struct RawMessage {
    road_id: u32,
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

/// A decoded scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub message: ObservationMessage,

    /// Entries of `data` that were skipped
    pub invalid_detections: usize,
}

/// Parses one raw message.
///
/// Fails only when the envelope itself is unusable; unreadable detections
/// are dropped and counted in [`ParsedMessage::invalid_detections`].
pub fn parse_message(payload: &str) -> Result<ParsedMessage, FeedError> {
    let raw: RawMessage = serde_json::from_str(payload)?;

    let mut data = Vec::with_capacity(raw.data.len());
    let mut invalid_detections = 0;
    for entry in raw.data {
        match serde_json::from_value::<Detection>(entry) {
            Ok(detection) => data.push(detection),
            Err(e) => {
                invalid_detections += 1;
                debug!(road_id = raw.road_id, error = %e, "skipping unreadable detection");
            }
        }
    }

    Ok(ParsedMessage {
        message: ObservationMessage {
            road_id: raw.road_id,
            data,
        },
        invalid_detections,
    })
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Object classes the feed distinguishes.
///
/// Codes: 0=Unknown, 1=Vehicle, 2=Pedestrian, 3=Cyclist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectClass {
    Unknown,
    Vehicle,
    Pedestrian,
    Cyclist,
    Other(u8),
}

impl ObjectClass {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ObjectClass::Unknown,
            1 => ObjectClass::Vehicle,
            2 => ObjectClass::Pedestrian,
            3 => ObjectClass::Cyclist,
            other => ObjectClass::Other(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            ObjectClass::Unknown => 0,
            ObjectClass::Vehicle => 1,
            ObjectClass::Pedestrian => 2,
            ObjectClass::Cyclist => 3,
            ObjectClass::Other(code) => *code,
        }
    }

    /// Short label for scene styling.
    pub fn label(&self) -> &'static str {
        match self {
            ObjectClass::Unknown => "unknown",
            ObjectClass::Vehicle => "vehicle",
            ObjectClass::Pedestrian => "pedestrian",
            ObjectClass::Cyclist => "cyclist",
            ObjectClass::Other(_) => "other",
        }
    }
}

impl From<Option<u8>> for ObjectClass {
    fn from(code: Option<u8>) -> Self {
        code.map(ObjectClass::from_code).unwrap_or(ObjectClass::Unknown)
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors raised while decoding a feed message.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}
