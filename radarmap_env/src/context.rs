//! Core environment context trait for RadarMap agents.

use async_trait::async_trait;
use std::time::Duration;

/// The central interface for Environment Interaction.
///
/// This trait abstracts the "real world" clock so that the map agent can run
/// in production (tokio) and in the deterministic simulation harness.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` - manually advanced virtual clock
#[async_trait]
pub trait RadarContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Track timestamps and sweep deadlines are expressed on this clock.
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;
    
    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances virtual clock
    async fn sleep(&self, duration: Duration);
}
