//! Scenario runner - drives a `MapAgent` against the oracle on a virtual clock.
//!
//! Every scenario shares one loop per tick:
//! 1. advance physics and the virtual clock
//! 2. run any sweeps that came due
//! 3. feed this tick's detector scans (plus scenario-specific injections)
//! 4. measure track error against ground truth

use crate::context::SimContext;
use crate::exporter::{SimEvent, SimExport, SimFrame, TruthPosition};
use crate::oracle::Oracle;
use crate::scenarios::{demo_site, ScenarioId};

use radarmap_core::radarmap_geo::normalize_degrees;
use radarmap_core::{AgentConfig, FeedOutcome, FeedStats, MapAgent, ObservationMessage, RecordingSink, TrackId};
use radarmap_env::RadarContext;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// RMS position error allowed against ground truth (metres)
const MAX_RMS_ERROR_M: f64 = 1.5;

/// Heading tolerance (degrees)
const HEADING_TOLERANCE_DEG: f64 = 1e-6;

/// RNG stream for oracle noise and traffic generation
const PHYSICS_STREAM: u64 = 1;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Number of objects in view at end
    pub final_object_count: usize,

    /// Number of tracks in the cache at end
    pub final_track_count: usize,

    /// RMS distance between tracks and ground truth
    pub rms_error_m: Option<f64>,

    /// Worst single distance between a track and ground truth
    pub max_error_m: Option<f64>,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Agent feed counters
    pub stats: FeedStats,

    /// Recorded frames, when export was requested
    pub export: Option<SimExport>,
}

/// Runs simulation scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Detector scan rate in Hz
    tick_rate_hz: u32,

    /// Duration in seconds
    max_duration_secs: f64,

    /// Agent under test
    agent_config: AgentConfig,

    /// Record a frame per simulated second
    record_frames: bool,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            tick_rate_hz: 10,
            max_duration_secs: 30.0,
            agent_config: AgentConfig {
                name: "sim-agent".to_string(),
                ..AgentConfig::default()
            },
            record_frames: false,
        }
    }

    /// Sets the tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz.max(1);
        self
    }

    /// Sets the duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Overrides the agent configuration.
    pub fn with_agent_config(mut self, config: AgentConfig) -> Self {
        self.agent_config = config;
        self
    }

    /// Records frames for JSON export.
    pub fn with_export(mut self, enabled: bool) -> Self {
        self.record_frames = enabled;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let result = match scenario {
            ScenarioId::SteadyTraffic => self.run_steady_traffic(),
            ScenarioId::Dropout => self.run_dropout(),
            ScenarioId::MalformedFeed => self.run_malformed_feed(),
            ScenarioId::UnknownRoad => self.run_unknown_road(),
            ScenarioId::Intersection => self.run_intersection(),
        };

        if result.passed {
            info!(
                "✓ {} passed: {} tracks, RMS error {}",
                scenario.name(),
                result.final_track_count,
                format_error(result.rms_error_m)
            );
        } else {
            warn!(
                "✗ {} failed: {}",
                scenario.name(),
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
        }

        result
    }

    fn target_ticks(&self) -> u64 {
        (self.max_duration_secs * self.tick_rate_hz as f64) as u64
    }

    /// SIM-001: SteadyTraffic - continuous flow on all four roads.
    ///
    /// **Assertions**: every object in view has a track, RMS error below
    /// threshold, no track outlives timeout + sweep interval.
    fn run_steady_traffic(&self) -> ScenarioResult {
        let mut harness = Harness::new(self, ScenarioId::SteadyTraffic, TrafficMix::Mixed);

        for _ in 0..self.target_ticks() {
            harness.advance();
            harness.spawn_traffic(0.08);
            harness.feed_all(|_| true);
            harness.measure();
            harness.record_frame(Vec::new());
        }

        harness.finish()
    }

    /// SIM-002: Dropout - road 1 goes silent after a third of the run.
    ///
    /// **Assertions**: all road 1 tracks are evicted, other roads stay
    /// covered, eviction happens within timeout + sweep interval.
    fn run_dropout(&self) -> ScenarioResult {
        let mut harness = Harness::new(self, ScenarioId::Dropout, TrafficMix::Mixed);
        let silent_road = 1;
        let dropout_tick = self.target_ticks() / 3;

        for tick in 0..self.target_ticks() {
            harness.advance();
            harness.spawn_traffic(0.08);

            let silent = tick >= dropout_tick;
            let mut events = Vec::new();
            if tick == dropout_tick {
                info!("  ⚡ Road {} stops reporting at t={:.1}s", silent_road, harness.oracle.time());
                events.push(SimEvent::warn(format!("road {} silent", silent_road)));
            }

            harness.feed_all(|road_id| !(silent && road_id == silent_road));
            harness.measure();
            harness.record_frame(events);
        }

        let remaining = harness
            .agent
            .tracks()
            .tracks()
            .filter(|t| t.id.road_id == silent_road)
            .count();
        if remaining > 0 {
            harness.fail(format!("{} tracks from silent road {} survived", remaining, silent_road));
        }
        if harness.agent.stats().tracks_evicted == 0 {
            harness.fail("no tracks evicted after dropout".to_string());
        }

        harness.finish()
    }

    /// SIM-003: MalformedFeed - 20% of ticks carry a corrupted payload.
    ///
    /// **Assertion**: corrupted payloads are counted and never change the cache.
    fn run_malformed_feed(&self) -> ScenarioResult {
        let mut harness = Harness::new(self, ScenarioId::MalformedFeed, TrafficMix::Mixed);
        let mut injected = 0u64;

        for _ in 0..self.target_ticks() {
            harness.advance();
            harness.spawn_traffic(0.08);
            harness.feed_all(|_| true);

            if harness.oracle.rng().gen_bool(0.2) {
                let payload = harness.corrupt_payload();
                let before = harness.agent.snapshot().tracks;
                let outcome = harness.agent.handle_message(&payload);
                injected += 1;

                if outcome != FeedOutcome::Malformed {
                    harness.fail(format!("corrupted payload accepted: {}", payload));
                }
                if harness.agent.snapshot().tracks != before {
                    harness.fail(format!("corrupted payload mutated the cache: {}", payload));
                }
            }

            harness.measure();
            harness.record_frame(Vec::new());
        }

        let counted = harness.agent.stats().malformed_messages;
        if counted != injected {
            harness.fail(format!("injected {} malformed payloads, counted {}", injected, counted));
        }

        harness.finish()
    }

    /// SIM-004: UnknownRoad - a rogue detector reports on road 99.
    ///
    /// **Assertion**: its messages are counted and never create tracks.
    fn run_unknown_road(&self) -> ScenarioResult {
        let mut harness = Harness::new(self, ScenarioId::UnknownRoad, TrafficMix::Mixed);
        let rogue_road = 99;
        let mut injected = 0u64;

        for tick in 0..self.target_ticks() {
            harness.advance();
            harness.spawn_traffic(0.08);
            harness.feed_all(|_| true);

            // Replay road 2's scan under an unconfigured id
            let mut rogue = harness.oracle.observe(2);
            rogue.road_id = rogue_road;
            let before = harness.agent.snapshot().tracks;
            let outcome = harness.feed(&rogue);
            injected += 1;

            if outcome != FeedOutcome::UnknownDetector(rogue_road) {
                harness.fail(format!("tick {}: rogue message outcome {:?}", tick, outcome));
            }
            if harness.agent.snapshot().tracks != before {
                harness.fail(format!("tick {}: rogue message mutated the cache", tick));
            }

            harness.measure();
            harness.record_frame(Vec::new());
        }

        if harness.agent.tracks().tracks().any(|t| t.id.road_id == rogue_road) {
            harness.fail(format!("track created for unknown road {}", rogue_road));
        }
        let counted = harness.agent.stats().unknown_detector_messages;
        if counted != injected {
            harness.fail(format!("injected {} rogue messages, counted {}", injected, counted));
        }

        harness.finish()
    }

    /// SIM-005: Intersection - all traffic approaches the junction.
    ///
    /// **Assertions**: every track heading equals its detector direction + 180°,
    /// RMS error below threshold.
    fn run_intersection(&self) -> ScenarioResult {
        let mut harness = Harness::new(self, ScenarioId::Intersection, TrafficMix::Approaching);

        for _ in 0..self.target_ticks() {
            harness.advance();
            harness.spawn_traffic(0.1);
            harness.feed_all(|_| true);
            harness.measure();
            harness.check_approach_headings();
            harness.record_frame(Vec::new());
        }

        harness.finish()
    }
}

// ============================================================================
// HARNESS
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TrafficMix {
    /// Half leaving from the detector, half approaching from range
    Mixed,
    /// Everything approaching
    Approaching,
}

/// Distances between tracks and ground truth.
#[derive(Debug, Default)]
struct ErrorAccumulator {
    sum_sq: f64,
    count: u64,
    max: f64,
}

impl ErrorAccumulator {
    fn add(&mut self, error_m: f64) {
        self.sum_sq += error_m * error_m;
        self.count += 1;
        self.max = self.max.max(error_m);
    }

    fn rms(&self) -> Option<f64> {
        (self.count > 0).then(|| (self.sum_sq / self.count as f64).sqrt())
    }

    fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }
}

/// One scenario in progress.
struct Harness {
    scenario: ScenarioId,
    seed: u64,
    context: Arc<SimContext>,
    oracle: Oracle,
    mix: TrafficMix,
    agent: MapAgent<SimContext>,
    sink: RecordingSink,
    dt: Duration,
    ticks: u64,
    next_sweep: Duration,
    staleness_bound: Duration,
    errors: ErrorAccumulator,
    failures: Vec<String>,
    export: Option<SimExport>,
    ticks_per_frame: u64,
}

impl Harness {
    fn new(runner: &ScenarioRunner, scenario: ScenarioId, mix: TrafficMix) -> Self {
        let context = SimContext::shared(runner.seed);
        let site = demo_site();

        // Every road starts with traffic in view
        let mut oracle = Oracle::with_rng(context.derive_rng(PHYSICS_STREAM), site.clone());
        for road in &site.roads {
            oracle.spawn_object(road.road_id, 200.0, 1.5, -10.0, 1);
            if matches!(mix, TrafficMix::Mixed) {
                oracle.spawn_object(road.road_id, 20.0, -1.5, 10.0, 1);
            }
        }

        let agent = MapAgent::new(Arc::clone(&context), site, runner.agent_config.clone());
        let dt = Duration::from_secs(1) / runner.tick_rate_hz;

        Self {
            scenario,
            seed: runner.seed,
            next_sweep: runner.agent_config.sweep_interval,
            staleness_bound: runner.agent_config.track_timeout + runner.agent_config.sweep_interval + dt,
            context,
            oracle,
            mix,
            agent,
            sink: RecordingSink::default(),
            dt,
            ticks: 0,
            errors: ErrorAccumulator::default(),
            failures: Vec::new(),
            export: runner
                .record_frames
                .then(|| SimExport::new(scenario.name(), runner.seed)),
            ticks_per_frame: runner.tick_rate_hz as u64,
        }
    }

    fn fail(&mut self, reason: String) {
        debug!("  ✗ {}", reason);
        self.failures.push(reason);
    }

    /// Steps physics and the clock, then runs due sweeps.
    fn advance(&mut self) {
        self.ticks += 1;
        self.oracle.step(self.dt.as_secs_f64());
        self.context.advance_time(self.dt);

        let now = self.context.now();
        if let Some(oldest) = self.agent.tracks().tracks().map(|t| t.staleness(now)).max() {
            if oldest > self.staleness_bound {
                self.fail(format!(
                    "t={:.1}s: track unseen for {:?} (bound {:?})",
                    now.as_secs_f64(),
                    oldest,
                    self.staleness_bound
                ));
            }
        }

        while now >= self.next_sweep {
            if self.agent.sweep() {
                self.agent.publish(&mut self.sink);
            }
            self.next_sweep += self.agent.config.sweep_interval;
        }

        if self.ticks % self.ticks_per_frame == 0 {
            debug!(
                "  t={:.1}s | objects={} | tracks={}",
                self.oracle.time(),
                self.oracle.active_objects().count(),
                self.agent.tracks().len()
            );
        }
    }

    /// Randomly spawns objects on every road.
    fn spawn_traffic(&mut self, probability: f64) {
        let mix = self.mix;
        let road_ids: Vec<u32> = self.oracle.site().roads.iter().map(|r| r.road_id).collect();
        let max_range = self.oracle.max_range();

        for road_id in road_ids {
            let rng = self.oracle.rng();
            if !rng.gen_bool(probability) {
                continue;
            }

            let approaching = match mix {
                TrafficMix::Mixed => rng.gen_bool(0.5),
                TrafficMix::Approaching => true,
            };
            let speed = rng.gen_range(6.0..16.0);
            let lateral = rng.gen_range(-4.0..4.0);
            let object_type = [1, 1, 1, 2, 3][rng.gen_range(0..5)];

            if approaching {
                let forward = rng.gen_range(0.6 * max_range..max_range);
                self.oracle.spawn_object(road_id, forward, lateral, -speed, object_type);
            } else {
                let forward = rng.gen_range(1.0..10.0);
                self.oracle.spawn_object(road_id, forward, lateral, speed, object_type);
            }
        }
    }

    /// Serializes and feeds one message, publishing if the cache changed.
    fn feed(&mut self, message: &ObservationMessage) -> FeedOutcome {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                self.fail(format!("could not encode message: {}", e));
                return FeedOutcome::Malformed;
            }
        };

        let outcome = self.agent.handle_message(&payload);
        if outcome.changed() {
            self.agent.publish(&mut self.sink);
        }
        outcome
    }

    /// Feeds this tick's scan from every reporting road and checks coverage.
    fn feed_all(&mut self, reporting: impl Fn(u32) -> bool) {
        for message in self.oracle.observe_all() {
            if !reporting(message.road_id) {
                continue;
            }

            self.feed(&message);

            let missing = message
                .data
                .iter()
                .filter(|d| self.agent.tracks().get(&TrackId::new(message.road_id, d.object_id)).is_none())
                .count();
            if missing > 0 {
                self.fail(format!("road {}: {} reported objects have no track", message.road_id, missing));
            }
        }
    }

    /// Accumulates distance from each reported object's track to its true position.
    fn measure(&mut self) {
        let mut distances = Vec::new();
        for object in self.oracle.active_objects() {
            let Some(track) = self.agent.tracks().get(&TrackId::new(object.road_id, object.object_id)) else {
                continue;
            };
            // Only tracks refreshed this tick are comparable
            if track.last_update != self.context.now() {
                continue;
            }
            if let Some(truth) = self.oracle.true_position(object) {
                distances.push(Oracle::distance_m(track.position, truth));
            }
        }

        for distance in distances {
            self.errors.add(distance);
        }
    }

    fn check_approach_headings(&mut self) {
        let mut mismatches = Vec::new();
        for track in self.agent.tracks().tracks() {
            let Some(detector) = self.oracle.site().detector(track.id.road_id) else {
                continue;
            };
            let expected = normalize_degrees(detector.direction_deg + 180.0);
            match track.heading_deg {
                Some(heading) if (heading - expected).abs() < HEADING_TOLERANCE_DEG => {}
                other => mismatches.push(format!("track {} heading {:?}, expected {}", track.id, other, expected)),
            }
        }

        for mismatch in mismatches {
            self.fail(mismatch);
        }
    }

    /// A payload that must be rejected as malformed.
    fn corrupt_payload(&mut self) -> String {
        let scan = self.oracle.observe(1);
        match self.oracle.rng().gen_range(0..4) {
            0 => {
                let full = serde_json::to_string(&scan).unwrap_or_default();
                let cut = full.len() / 2;
                full[..cut].to_string()
            }
            1 => r#"{"road_id":"north","data":[]}"#.to_string(),
            2 => r#"{"road_id":1,"data":{"object_id":1}}"#.to_string(),
            _ => "\u{0}radar reboot\u{0}".to_string(),
        }
    }

    fn record_frame(&mut self, events: Vec<SimEvent>) {
        if self.export.is_none() || (events.is_empty() && self.ticks % self.ticks_per_frame != 0) {
            return;
        }

        let ground_truth = self
            .oracle
            .active_objects()
            .filter_map(|o| {
                let position = self.oracle.true_position(o)?;
                Some(TruthPosition::new(o.road_id, o.object_id, position))
            })
            .collect();

        let frame = SimFrame {
            time_sec: self.oracle.time(),
            ground_truth,
            tracks: self.agent.snapshot().tracks,
            events,
        };

        if let Some(export) = self.export.as_mut() {
            export.add_frame(frame);
        }
    }

    fn finish(mut self) -> ScenarioResult {
        let rms = self.errors.rms();
        if let Some(rms) = rms {
            if rms > MAX_RMS_ERROR_M {
                self.fail(format!("RMS error {:.2}m exceeds threshold {:.1}m", rms, MAX_RMS_ERROR_M));
            }
        }

        // Deduplicate repeated per-tick failures for the summary line
        self.failures.dedup();
        let passed = self.failures.is_empty();
        let failure_reason = (!passed).then(|| self.failures.join("; "));

        if let Some(export) = self.export.as_mut() {
            export.finalize(passed, rms);
        }

        debug!("  published {} snapshots", self.sink.snapshots.len());

        ScenarioResult {
            scenario: self.scenario,
            seed: self.seed,
            passed,
            total_ticks: self.ticks,
            final_time_secs: self.oracle.time(),
            final_object_count: self.oracle.active_objects().count(),
            final_track_count: self.agent.tracks().len(),
            rms_error_m: rms,
            max_error_m: self.errors.max(),
            failure_reason,
            stats: self.agent.stats().clone(),
            export: self.export,
        }
    }
}

fn format_error(error: Option<f64>) -> String {
    error.map(|e| format!("{:.2}m", e)).unwrap_or_else(|| "n/a".to_string())
}
