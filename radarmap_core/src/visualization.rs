//! Rerun.io scene sink.
//!
//! Tracks are drawn in a local east/north/up frame (metres) centred on the
//! site origin:
//! - one point per track, coloured by object class and labelled with its id
//! - one arrow per track with a known heading
//!
//! Each publish replaces the whole `world/tracks` batch, so evicted tracks
//! disappear without an explicit delete.
//!
//! Enable with the `visualization` feature flag.

use crate::radarmap_geo::{self, GeoPoint};
use crate::scene::{SceneError, SceneSink, SceneSnapshot, TrackView};
use rerun::{RecordingStream, RecordingStreamBuilder};

/// Heading arrow length in metres
const ARROW_LENGTH_M: f32 = 4.0;

/// Rerun-based visualizer for the live track map
pub struct RerunSink {
    rec: RecordingStream,
    origin: GeoPoint,
}

impl RerunSink {
    /// Create a sink that spawns the Rerun viewer
    pub fn new(app_id: &str, origin: GeoPoint) -> Result<Self, SceneError> {
        let rec = RecordingStreamBuilder::new(app_id).spawn().map_err(backend)?;
        Self::with_stream(rec, origin)
    }

    /// Create a sink that saves to a `.rrd` file
    pub fn new_to_file(app_id: &str, path: &str, origin: GeoPoint) -> Result<Self, SceneError> {
        let rec = RecordingStreamBuilder::new(app_id).save(path).map_err(backend)?;
        Self::with_stream(rec, origin)
    }

    fn with_stream(rec: RecordingStream, origin: GeoPoint) -> Result<Self, SceneError> {
        rec.log_static("world", &rerun::ViewCoordinates::RIGHT_HAND_Z_UP())
            .map_err(backend)?;
        Ok(Self { rec, origin })
    }

    /// Position of a track in site-local metres (east, north, up).
    fn local_position(&self, track: &TrackView) -> [f32; 3] {
        let en = radarmap_geo::east_north_between(self.origin, GeoPoint::new(track.lat, track.lng));
        [en.east as f32, en.north as f32, 0.0]
    }
}

impl SceneSink for RerunSink {
    fn publish(&mut self, snapshot: &SceneSnapshot) -> Result<(), SceneError> {
        self.rec.set_time_sequence("generation", snapshot.generation as i64);

        let positions: Vec<[f32; 3]> = snapshot.tracks.iter().map(|t| self.local_position(t)).collect();
        let colors: Vec<[u8; 4]> = snapshot.tracks.iter().map(|t| class_color(&t.class)).collect();
        let radii: Vec<f32> = snapshot.tracks.iter().map(|t| class_radius(&t.class)).collect();
        let labels: Vec<String> = snapshot.tracks.iter().map(|t| t.id.clone()).collect();

        self.rec
            .log(
                "world/tracks",
                &rerun::Points3D::new(positions.clone())
                    .with_colors(colors)
                    .with_radii(radii)
                    .with_labels(labels),
            )
            .map_err(backend)?;

        let (origins, vectors): (Vec<[f32; 3]>, Vec<[f32; 3]>) = snapshot
            .tracks
            .iter()
            .zip(positions)
            .filter_map(|(t, origin)| {
                let heading = t.heading_deg?.to_radians() as f32;
                Some((origin, [heading.sin() * ARROW_LENGTH_M, heading.cos() * ARROW_LENGTH_M, 0.0]))
            })
            .unzip();

        self.rec
            .log(
                "world/headings",
                &rerun::Arrows3D::from_vectors(vectors)
                    .with_origins(origins)
                    .with_colors([[255, 200, 0, 255]]),
            )
            .map_err(backend)?;

        Ok(())
    }
}

fn class_color(class: &str) -> [u8; 4] {
    match class {
        "vehicle" => [0, 212, 255, 255],
        "pedestrian" => [255, 100, 100, 255],
        "cyclist" => [120, 255, 120, 255],
        _ => [200, 200, 200, 255],
    }
}

fn class_radius(class: &str) -> f32 {
    match class {
        "vehicle" => 1.5,
        "pedestrian" | "cyclist" => 0.5,
        _ => 1.0,
    }
}

fn backend(e: impl std::fmt::Display) -> SceneError {
    SceneError::Backend(e.to_string())
}
