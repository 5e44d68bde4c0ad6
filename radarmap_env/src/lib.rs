//! RadarMap Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seam that lets the RadarMap core run
//! both in **Production** (tokio sockets, wall clock) and in the
//! **Simulation** harness (virtual clock, in-process feeds).
//!
//! # Core Concept
//!
//! The map agent never touches a socket or a clock directly. It asks:
//! - a [`RadarContext`] for time (`now()`, `sleep()`)
//! - a [`MessageSource`] for the next raw observation message (`recv()`)
//!
//! # Example
//!
//! ```ignore
//! use radarmap_env::{RadarContext, MessageSource};
//!
//! async fn agent_loop<Ctx: RadarContext, Src: MessageSource>(ctx: &Ctx, src: &mut Src) {
//!     loop {
//!         tokio::select! {
//!             msg = src.recv() => handle_message(msg),
//!             _ = ctx.sleep(Duration::from_secs(1)) => sweep(),
//!         }
//!     }
//! }
//! ```

mod context;
mod source;
mod types;
mod error;
mod tokio_impl;

pub use context::RadarContext;
pub use source::MessageSource;
pub use types::FeedEndpoint;
pub use error::EnvError;
pub use tokio_impl::{ChannelSource, StdinLineSource, TcpLineSource, TokioContext};
