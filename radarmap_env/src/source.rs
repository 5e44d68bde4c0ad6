//! Inbound message source abstraction.

use async_trait::async_trait;
use crate::error::EnvError;

/// A subscription delivering raw observation messages, one at a time.
///
/// # Implementations
///
/// - **Production**: `TcpLineSource`, `StdinLineSource` (newline-delimited JSON)
/// - **Embedding / Simulation**: `ChannelSource` (in-process `mpsc`)
///
/// Messages are opaque strings here; parsing belongs to the core.
#[async_trait]
pub trait MessageSource: Send + 'static {
    /// Waits for the next message.
    ///
    /// # Returns
    /// * `Ok(Some(payload))` - A message arrived
    /// * `Ok(None)` - The source reached end-of-stream (peer disconnected)
    /// * `Err(EnvError::ReadError)` - The underlying transport failed
    async fn recv(&mut self) -> Result<Option<String>, EnvError>;
    
    /// Releases the subscription. Further `recv` calls return `Ok(None)`.
    ///
    /// Must be safe to call more than once.
    async fn close(&mut self);
    
    /// Human-readable description of the source (for logging).
    fn describe(&self) -> String;
}
