//! RadarMap Deterministic Simulation Harness
//!
//! This crate runs the real `MapAgent` against simulated detectors on a
//! virtual clock, so feed handling, eviction and position accuracy can be
//! checked reproducibly.
//!
//! # Core Principle
//!
//! All sources of non-determinism are controlled:
//! - **Time**: `SimContext` clock advances only when the runner steps it
//! - **Randomness**: traffic and measurement noise derive from one 64-bit seed
//! - **Feed**: messages are delivered in-process, in order
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                         │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (virtual clock)                           │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                                                     │
//! │  ┌────▼─────────────┐   JSON scans   ┌─────────────────┐    │
//! │  │     Oracle       │───────────────►│    MapAgent     │    │
//! │  │ (ground truth)   │                │ (cache + sweep) │    │
//! │  └──────────────────┘                └─────────────────┘    │
//! │            │    haversine error vs. track positions  │      │
//! │            └──────────────────────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use radarmap_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42).with_duration(20.0).run(ScenarioId::Dropout);
//! assert!(result.passed);
//! ```

mod context;
mod oracle;
mod runner;
mod exporter;
pub mod scenarios;

pub use context::SimContext;
pub use oracle::{GroundTruthObject, Oracle};
pub use runner::{ScenarioResult, ScenarioRunner};
pub use exporter::{SimEvent, SimExport, SimFrame, TruthPosition};
pub use scenarios::{demo_site, ScenarioId};
