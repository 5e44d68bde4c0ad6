//! RadarMap Feed Metrics
//! =====================
//!
//! Counters describing how the inbound feed was handled:
//! - **Message outcomes**: applied, malformed, unknown detector
//! - **Track lifecycle**: created, updated, evicted
//! - **Scene output**: snapshots published / failed
//!
//! Counters only grow; `drop_rate` summarises feed health.

use serde::{Deserialize, Serialize};
use tracing::info;

/// Running counters for one map agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedStats {
    /// Raw messages taken from the source
    pub messages_received: u64,
    /// Messages that parsed and matched a configured detector
    pub messages_applied: u64,
    /// Messages dropped because they were not valid JSON / schema
    pub malformed_messages: u64,
    /// Messages dropped because the road id is not configured
    pub unknown_detector_messages: u64,
    /// Detections written to the cache
    pub detections_applied: u64,
    /// Detections skipped because their world position was invalid
    pub detections_rejected: u64,
    pub tracks_created: u64,
    pub tracks_updated: u64,
    pub tracks_evicted: u64,
    /// Sweep passes executed
    pub sweeps: u64,
    pub snapshots_published: u64,
    pub snapshots_failed: u64,
}

impl FeedStats {
    /// Fraction of received messages that were dropped.
    pub fn drop_rate(&self) -> f64 {
        if self.messages_received == 0 {
            return 0.0;
        }
        let dropped = self.malformed_messages + self.unknown_detector_messages;
        dropped as f64 / self.messages_received as f64
    }

    /// Logs a one-line summary.
    pub fn log_summary(&self, agent_name: &str) {
        info!(
            agent = agent_name,
            received = self.messages_received,
            applied = self.messages_applied,
            malformed = self.malformed_messages,
            unknown_detector = self.unknown_detector_messages,
            created = self.tracks_created,
            evicted = self.tracks_evicted,
            snapshots = self.snapshots_published,
            "feed summary (drop rate {:.1}%)",
            self.drop_rate() * 100.0
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_rate_empty() {
        assert_eq!(FeedStats::default().drop_rate(), 0.0);
    }

    #[test]
    fn test_drop_rate_counts_both_kinds() {
        let stats = FeedStats {
            messages_received: 10,
            messages_applied: 6,
            malformed_messages: 3,
            unknown_detector_messages: 1,
            ..FeedStats::default()
        };
        assert!((stats.drop_rate() - 0.4).abs() < 1e-12);
    }
}
