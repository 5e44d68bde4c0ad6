//! Agent Runtime - Drives the track cache from a message source and a timer.
//!
//! This module is the integration layer between the pure engines
//! (transform, cache) and the environment abstraction (`RadarContext`,
//! `MessageSource`).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         MapAgent                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │              Context: RadarContext                   │   │
//! │  │  • now()   → track timestamps, sweep deadlines       │   │
//! │  │  • sleep() → sweep timer                             │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                              │                              │
//! │  ┌──────────────┐   ┌──────────────┐   ┌────────────────┐   │
//! │  │ MessageSource│──►│  TrackCache  │──►│   SceneSink    │   │
//! │  │  (socket)    │   │ upsert/sweep │   │ (visualizer)   │   │
//! │  └──────────────┘   └──────────────┘   └────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Messages and sweeps are multiplexed on one `select!` loop, so they never
//! interleave and the cache needs no lock.
//!
//! # Usage
//!
//! ```ignore
//! use radarmap_core::agent_runtime::{MapAgent, AgentConfig};
//! use radarmap_env::{TokioContext, TcpLineSource};
//!
//! let mut agent = MapAgent::new(TokioContext::shared(), site, AgentConfig::default());
//! let mut source = TcpLineSource::connect("127.0.0.1:9000").await?;
//! let summary = agent.run(&mut source, &mut sink, shutdown).await;
//! ```

use crate::metrics::FeedStats;
use crate::radarmap_feed::{self, ObservationMessage, ParsedMessage};
use crate::radarmap_site::Site;
use crate::radarmap_tracking::{Observation, TrackCache, TrackingConfig, Upsert};
use crate::scene::{SceneSink, SceneSnapshot};
use radarmap_env::{MessageSource, RadarContext};

use h3o::Resolution;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for a map agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Agent's logical name (for logging)
    pub name: String,

    /// How often stale tracks are swept (default: 1s)
    pub sweep_interval: Duration,

    /// Tracks unseen for longer than this are evicted (default: 3s)
    pub track_timeout: Duration,

    /// H3 resolution for spatial indexing (default: 11)
    pub h3_resolution: u8,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "radarmap-agent".to_string(),
            sweep_interval: Duration::from_secs(1),
            track_timeout: Duration::from_secs(3),
            h3_resolution: 11,
        }
    }
}

/// Result of handling one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Message matched a detector; counts per detection
    Applied {
        created: usize,
        updated: usize,
        rejected: usize,
    },
    /// Payload was not a valid observation message
    Malformed,
    /// `road_id` is not part of the site
    UnknownDetector(u32),
}

impl FeedOutcome {
    /// True if the cache was modified.
    pub fn changed(&self) -> bool {
        matches!(self, FeedOutcome::Applied { created, updated, .. } if created + updated > 0)
    }
}

/// Why [`MapAgent::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown was requested
    Cancelled,
    /// The source reached end-of-stream
    SourceClosed,
    /// The source failed
    SourceError(String),
}

/// Returned by [`MapAgent::run`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub reason: StopReason,
    pub stats: FeedStats,
    pub tracks_at_exit: usize,
}

/// A map agent: site configuration, track cache and feed statistics.
///
/// Generic over the context so the same agent code runs in production
/// (tokio) and in the simulation harness.
pub struct MapAgent<Ctx>
where
    Ctx: RadarContext,
{
    /// Environment context
    pub context: Arc<Ctx>,

    /// Configuration
    pub config: AgentConfig,

    /// Detector layout
    site: Site,

    /// Live tracks
    track_cache: TrackCache,

    /// Feed counters
    stats: FeedStats,

    /// Number of snapshots published so far
    generation: u64,
}

impl<Ctx> MapAgent<Ctx>
where
    Ctx: RadarContext,
{
    /// Creates a new agent for a validated site.
    pub fn new(context: Arc<Ctx>, site: Site, config: AgentConfig) -> Self {
        let resolution = match Resolution::try_from(config.h3_resolution) {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!(
                    agent = %config.name,
                    requested = config.h3_resolution,
                    error = %e,
                    "invalid H3 resolution, using 11"
                );
                Resolution::Eleven
            }
        };

        let track_cache = TrackCache::new(TrackingConfig {
            h3_resolution: resolution,
            track_timeout: config.track_timeout,
        });

        Self {
            context,
            config,
            site,
            track_cache,
            stats: FeedStats::default(),
            generation: 0,
        }
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn tracks(&self) -> &TrackCache {
        &self.track_cache
    }

    pub fn stats(&self) -> &FeedStats {
        &self.stats
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the current context time.
    pub fn now(&self) -> Duration {
        self.context.now()
    }

    // ========================================================================
    // MESSAGE HANDLING
    // ========================================================================

    /// Parses and applies one raw message.
    ///
    /// Malformed payloads and unknown detectors are dropped without touching
    /// the cache. Unreadable detections inside an otherwise valid scan count
    /// as rejected.
    pub fn handle_message(&mut self, payload: &str) -> FeedOutcome {
        self.stats.messages_received += 1;

        match radarmap_feed::parse_message(payload) {
            Ok(ParsedMessage { message, invalid_detections }) => match self.apply_message(&message) {
                FeedOutcome::Applied { created, updated, rejected } => {
                    self.stats.detections_rejected += invalid_detections as u64;
                    FeedOutcome::Applied {
                        created,
                        updated,
                        rejected: rejected + invalid_detections,
                    }
                }
                other => other,
            },
            Err(e) => {
                self.stats.malformed_messages += 1;
                debug!(agent = %self.config.name, error = %e, "dropping malformed message");
                FeedOutcome::Malformed
            }
        }
    }

    /// Applies an already-decoded message, stamping tracks with `now()`.
    pub fn apply_message(&mut self, message: &ObservationMessage) -> FeedOutcome {
        let Some(road) = self.site.road(message.road_id) else {
            self.stats.unknown_detector_messages += 1;
            debug!(agent = %self.config.name, road_id = message.road_id, "ignoring message for unknown detector");
            return FeedOutcome::UnknownDetector(message.road_id);
        };

        let now = self.context.now();
        let (mut created, mut updated, mut rejected) = (0, 0, 0);

        for detection in &message.data {
            match self.track_cache.upsert(road, Observation::from(detection), now) {
                Ok(Upsert::Created) => created += 1,
                Ok(Upsert::Updated) => updated += 1,
                Err(e) => {
                    rejected += 1;
                    warn!(
                        road_id = message.road_id,
                        object_id = detection.object_id,
                        error = %e,
                        "skipping detection"
                    );
                }
            }
        }

        self.stats.messages_applied += 1;
        self.stats.detections_applied += (created + updated) as u64;
        self.stats.detections_rejected += rejected as u64;
        self.stats.tracks_created += created as u64;
        self.stats.tracks_updated += updated as u64;

        FeedOutcome::Applied { created, updated, rejected }
    }

    // ========================================================================
    // SWEEP & PUBLISH
    // ========================================================================

    /// Evicts tracks older than the configured timeout.
    ///
    /// Returns true if any track was removed (a redraw is needed).
    pub fn sweep(&mut self) -> bool {
        let now = self.context.now();
        let evicted = self.track_cache.evict_stale(now, self.config.track_timeout);

        self.stats.sweeps += 1;
        self.stats.tracks_evicted += evicted.len() as u64;

        if !evicted.is_empty() {
            debug!(agent = %self.config.name, count = evicted.len(), "evicted stale tracks");
        }

        !evicted.is_empty()
    }

    /// Current cache contents as a snapshot (does not bump the generation).
    pub fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot::from_cache(&self.track_cache, self.generation, self.context.now())
    }

    /// Publishes a new snapshot generation to `sink`.
    ///
    /// Sink failures are logged and counted; they never stop the agent.
    pub fn publish<K>(&mut self, sink: &mut K)
    where
        K: SceneSink + ?Sized,
    {
        self.generation += 1;
        let snapshot = self.snapshot();

        match sink.publish(&snapshot) {
            Ok(()) => self.stats.snapshots_published += 1,
            Err(e) => {
                self.stats.snapshots_failed += 1;
                warn!(agent = %self.config.name, generation = self.generation, error = %e, "scene publish failed");
            }
        }
    }

    // ========================================================================
    // EVENT LOOP
    // ========================================================================

    /// Runs the feed/sweep loop until cancelled or the source ends.
    ///
    /// On every exit path the sweep timer is dropped and `source.close()` is
    /// awaited before returning.
    pub async fn run<S, K>(
        &mut self,
        source: &mut S,
        sink: &mut K,
        shutdown: CancellationToken,
    ) -> RunSummary
    where
        S: MessageSource,
        K: SceneSink + ?Sized,
    {
        let context = Arc::clone(&self.context);
        let interval = self.config.sweep_interval;
        let mut next_sweep = context.now() + interval;

        info!(agent = %self.config.name, source = %source.describe(), "map agent started");

        let reason = loop {
            // Checked before select! so a source that is always ready cannot
            // hold the sweep off
            let now = context.now();
            if now >= next_sweep {
                next_sweep += interval;
                if next_sweep <= now {
                    // Fell behind; skip missed ticks
                    next_sweep = now + interval;
                }

                if self.sweep() {
                    self.publish(sink);
                }
            }

            let wait = next_sweep.saturating_sub(context.now());

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break StopReason::Cancelled,

                // Wakes the loop; the sweep itself runs at the top
                _ = context.sleep(wait) => {}

                received = source.recv() => match received {
                    Ok(Some(payload)) => {
                        if self.handle_message(&payload).changed() {
                            self.publish(sink);
                        }
                    }
                    Ok(None) => {
                        warn!(agent = %self.config.name, source = %source.describe(), "feed disconnected");
                        break StopReason::SourceClosed;
                    }
                    Err(e) => {
                        warn!(agent = %self.config.name, source = %source.describe(), error = %e, "feed failed");
                        break StopReason::SourceError(e.to_string());
                    }
                },
            }
        };

        source.close().await;

        info!(agent = %self.config.name, reason = ?reason, "map agent stopped");
        self.stats.log_summary(&self.config.name);

        RunSummary {
            reason,
            stats: self.stats.clone(),
            tracks_at_exit: self.track_cache.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radarmap_geo::{self, LocalOffset};
    use crate::radarmap_site::{Detector, Road};
    use crate::radarmap_tracking::TrackId;
    use crate::scene::{RecordingSink, SceneError};
    use async_trait::async_trait;
    use radarmap_env::{ChannelSource, EnvError, TcpLineSource, TokioContext};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn test_site() -> Site {
        Site {
            lat: 35.8358,
            lng: 129.2844,
            roads: vec![
                Road {
                    road_id: 1,
                    name: "North".to_string(),
                    detector: Detector::new(35.8358, 129.2844, 0.0),
                },
                Road {
                    road_id: 2,
                    name: "East".to_string(),
                    detector: Detector::new(35.8360, 129.2850, 90.0),
                },
            ],
        }
    }

    fn agent() -> MapAgent<TokioContext> {
        MapAgent::new(TokioContext::shared(), test_site(), AgentConfig::default())
    }

    struct FailingSource;

    #[async_trait]
    impl MessageSource for FailingSource {
        async fn recv(&mut self) -> Result<Option<String>, EnvError> {
            Err(EnvError::read("connection reset"))
        }
        async fn close(&mut self) {}
        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    /// Clock that moves forward a fixed step every time it is read.
    struct SteppingClock {
        elapsed_us: AtomicU64,
        step_us: u64,
    }

    #[async_trait]
    impl RadarContext for SteppingClock {
        fn now(&self) -> Duration {
            Duration::from_micros(self.elapsed_us.fetch_add(self.step_us, Ordering::SeqCst) + self.step_us)
        }

        async fn sleep(&self, duration: Duration) {
            tokio::time::sleep(duration).await;
        }
    }

    struct FailingSink;

    impl SceneSink for FailingSink {
        fn publish(&mut self, _snapshot: &SceneSnapshot) -> Result<(), SceneError> {
            Err(SceneError::Backend("renderer gone".to_string()))
        }
    }

    #[test]
    fn test_agent_config_default() {
        let config = AgentConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
        assert_eq!(config.track_timeout, Duration::from_secs(3));
        assert_eq!(config.h3_resolution, 11);
    }

    #[tokio::test]
    async fn test_handle_message_applies_detections() {
        let mut agent = agent();
        let outcome = agent.handle_message(
            r#"{"road_id":1,"data":[{"object_id":7,"xpos":100,"ypos":0,"object_type":1}]}"#,
        );

        assert_eq!(outcome, FeedOutcome::Applied { created: 1, updated: 0, rejected: 0 });
        assert!(outcome.changed());

        let snapshot = agent.snapshot();
        let track = snapshot.track("1:7").unwrap();
        assert!((track.lat - 35.8367).abs() < 1e-4);
        assert_eq!(track.class, "vehicle");
    }

    #[tokio::test]
    async fn test_out_of_range_resolution_falls_back_to_eleven() {
        let config = AgentConfig { h3_resolution: 99, ..AgentConfig::default() };
        let agent = MapAgent::new(TokioContext::shared(), test_site(), config);
        assert_eq!(agent.tracks().config().h3_resolution, Resolution::Eleven);

        let config = AgentConfig { h3_resolution: 9, ..AgentConfig::default() };
        let agent = MapAgent::new(TokioContext::shared(), test_site(), config);
        assert_eq!(agent.tracks().config().h3_resolution, Resolution::Nine);
    }

    #[tokio::test]
    async fn test_unreadable_detection_keeps_rest_of_scan() {
        let mut agent = agent();
        let outcome = agent.handle_message(
            r#"{"road_id":1,"data":[
                {"object_id":1,"xpos":10,"ypos":0,"object_type":300},
                {"object_id":2,"xpos":20,"ypos":0,"object_type":2}
            ]}"#,
        );

        assert_eq!(outcome, FeedOutcome::Applied { created: 1, updated: 0, rejected: 1 });
        assert!(agent.tracks().get(&TrackId::new(1, 2)).is_some());
        assert!(agent.tracks().get(&TrackId::new(1, 1)).is_none());
        assert_eq!(agent.stats().detections_rejected, 1);
        assert_eq!(agent.stats().malformed_messages, 0);
    }

    #[tokio::test]
    async fn test_handle_message_uses_detector_pose() {
        let mut agent = agent();
        agent.handle_message(r#"{"road_id":2,"data":[{"object_id":1,"xpos":50,"ypos":0,"heading":0}]}"#);

        let detector = test_site().detector(2).cloned().unwrap();
        let expected = radarmap_geo::offset_to_world(detector.position(), 90.0, LocalOffset::new(50.0, 0.0));

        let snapshot = agent.snapshot();
        let track = snapshot.track("2:1").unwrap();
        assert_eq!((track.lat, track.lng), (expected.lat, expected.lng));
        assert_eq!(track.heading_deg, Some(90.0));
    }

    #[tokio::test]
    async fn test_malformed_message_is_dropped() {
        let mut agent = agent();
        agent.handle_message(r#"{"road_id":1,"data":[{"object_id":1,"xpos":1,"ypos":0}]}"#);

        let outcome = agent.handle_message("{\"road_id\":1,\"data\":[{");
        assert_eq!(outcome, FeedOutcome::Malformed);
        assert!(!outcome.changed());
        assert_eq!(agent.tracks().len(), 1);
        assert_eq!(agent.stats().malformed_messages, 1);
    }

    #[tokio::test]
    async fn test_unknown_detector_is_ignored() {
        let mut agent = agent();
        let outcome = agent.handle_message(r#"{"road_id":99,"data":[{"object_id":1,"xpos":1,"ypos":0}]}"#);

        assert_eq!(outcome, FeedOutcome::UnknownDetector(99));
        assert!(agent.tracks().is_empty());
        assert_eq!(agent.stats().unknown_detector_messages, 1);
    }

    #[tokio::test]
    async fn test_empty_scan_changes_nothing() {
        let mut agent = agent();
        let outcome = agent.handle_message(r#"{"road_id":1,"data":[]}"#);
        assert_eq!(outcome, FeedOutcome::Applied { created: 0, updated: 0, rejected: 0 });
        assert!(!outcome.changed());
    }

    #[tokio::test]
    async fn test_publish_bumps_generation_and_counts_failures() {
        let mut agent = agent();
        let mut recording = RecordingSink::default();

        agent.publish(&mut recording);
        agent.publish(&mut FailingSink);

        assert_eq!(agent.generation(), 2);
        assert_eq!(recording.snapshots[0].generation, 1);
        assert_eq!(agent.stats().snapshots_published, 1);
        assert_eq!(agent.stats().snapshots_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_source_closes() {
        let mut agent = agent();
        let (tx, mut source) = ChannelSource::new(16);

        tx.send(r#"{"road_id":1,"data":[{"object_id":7,"xpos":50,"ypos":0}]}"#.to_string()).await.unwrap();
        tx.send("garbage".to_string()).await.unwrap();
        tx.send(r#"{"road_id":1,"data":[{"object_id":7,"xpos":55,"ypos":0}]}"#.to_string()).await.unwrap();
        drop(tx);

        let mut sink = RecordingSink::default();
        let summary = agent.run(&mut source, &mut sink, CancellationToken::new()).await;

        assert_eq!(summary.reason, StopReason::SourceClosed);
        assert_eq!(summary.stats.messages_received, 3);
        assert_eq!(summary.stats.malformed_messages, 1);
        assert_eq!(summary.tracks_at_exit, 1);

        // One snapshot per changing message
        assert_eq!(sink.snapshots.len(), 2);
        assert_eq!(sink.latest().unwrap().tracks.len(), 1);
        assert!(source.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_evicts_stale_tracks_then_cancels() {
        let mut agent = agent();
        let (tx, mut source) = ChannelSource::new(16);
        tx.send(r#"{"road_id":1,"data":[{"object_id":7,"xpos":50,"ypos":0}]}"#.to_string()).await.unwrap();

        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                token.cancel();
            }
        };

        let mut sink = RecordingSink::default();
        let (summary, ()) = tokio::join!(agent.run(&mut source, &mut sink, token), canceller);

        assert_eq!(summary.reason, StopReason::Cancelled);
        assert_eq!(summary.stats.tracks_evicted, 1);
        assert_eq!(summary.tracks_at_exit, 0);
        assert!(summary.stats.sweeps >= 9);

        // Insert, then eviction; empty sweeps publish nothing
        assert_eq!(sink.snapshots.len(), 2);
        assert_eq!(sink.snapshots[0].tracks.len(), 1);
        assert!(sink.snapshots[1].tracks.is_empty());

        // Subscription was released
        assert!(source.is_closed());
        assert!(tx.send("late".to_string()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshed_track_survives_sweeps() {
        let mut agent = agent();
        let (tx, mut source) = ChannelSource::new(16);
        let token = CancellationToken::new();

        let feeder = {
            let token = token.clone();
            async move {
                // Report every 2s for 10s, well inside the 3s timeout
                for i in 0..5 {
                    let msg = format!(r#"{{"road_id":1,"data":[{{"object_id":3,"xpos":{},"ypos":0}}]}}"#, i * 10);
                    tx.send(msg).await.unwrap();
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
                token.cancel();
            }
        };

        let mut sink = RecordingSink::default();
        let (summary, ()) = tokio::join!(agent.run(&mut source, &mut sink, token.clone()), feeder);

        assert_eq!(summary.reason, StopReason::Cancelled);
        assert_eq!(summary.stats.tracks_evicted, 0);
        assert_eq!(summary.stats.tracks_created, 1);
        assert_eq!(summary.stats.tracks_updated, 4);
        assert_eq!(summary.tracks_at_exit, 1);
    }

    #[tokio::test]
    async fn test_busy_feed_does_not_starve_sweep() {
        let clock = Arc::new(SteppingClock { elapsed_us: AtomicU64::new(0), step_us: 1_000 });
        let config = AgentConfig {
            sweep_interval: Duration::from_millis(5),
            track_timeout: Duration::from_millis(10),
            ..AgentConfig::default()
        };
        let mut agent = MapAgent::new(clock, test_site(), config);

        // Object 2 reports once, then object 1 keeps the source ready
        let (tx, mut source) = ChannelSource::new(1024);
        tx.send(r#"{"road_id":1,"data":[{"object_id":2,"xpos":80,"ypos":0}]}"#.to_string()).await.unwrap();
        for i in 0..500 {
            let msg = format!(r#"{{"road_id":1,"data":[{{"object_id":1,"xpos":{},"ypos":0}}]}}"#, 10 + i % 50);
            tx.send(msg).await.unwrap();
        }
        drop(tx);

        let mut sink = RecordingSink::default();
        let summary = agent.run(&mut source, &mut sink, CancellationToken::new()).await;

        assert_eq!(summary.reason, StopReason::SourceClosed);
        assert_eq!(summary.stats.messages_received, 501);
        assert!(summary.stats.sweeps > 0);
        assert_eq!(summary.stats.tracks_evicted, 1);
        assert!(agent.tracks().get(&TrackId::new(1, 2)).is_none());
        assert!(agent.tracks().get(&TrackId::new(1, 1)).is_some());
    }

    #[tokio::test]
    async fn test_run_over_tcp_hangs_up_on_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(b"{\"road_id\":1,\"data\":[{\"object_id\":7,\"xpos\":50,\"ypos\":0}]}\n")
                .await
                .unwrap();
            // Returns once the agent shuts the connection down
            let mut rest = Vec::new();
            socket.read_to_end(&mut rest).await.map(|_| rest.len())
        });

        let mut agent = agent();
        let mut source = TcpLineSource::connect_timeout(&addr, Duration::from_secs(2)).await.unwrap();
        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                token.cancel();
            }
        };

        let mut sink = RecordingSink::default();
        let (summary, ()) = tokio::join!(agent.run(&mut source, &mut sink, token), canceller);

        assert_eq!(summary.reason, StopReason::Cancelled);
        assert_eq!(summary.stats.tracks_created, 1);
        assert!(source.is_closed());

        let peer = tokio::time::timeout(Duration::from_secs(2), server).await.unwrap().unwrap();
        assert_eq!(peer.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_source_error() {
        let mut agent = agent();
        let mut sink = RecordingSink::default();
        let summary = agent.run(&mut FailingSource, &mut sink, CancellationToken::new()).await;

        assert!(matches!(summary.reason, StopReason::SourceError(_)));
        assert!(sink.snapshots.is_empty());
    }

    #[tokio::test]
    async fn test_run_cancelled_before_start() {
        let mut agent = agent();
        let (_tx, mut source) = ChannelSource::new(1);
        let token = CancellationToken::new();
        token.cancel();

        let mut sink = RecordingSink::default();
        let summary = agent.run(&mut source, &mut sink, token).await;

        assert_eq!(summary.reason, StopReason::Cancelled);
        assert!(source.is_closed());
    }
}
