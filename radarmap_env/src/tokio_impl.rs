//! Production implementations backed by Tokio.

use crate::{EnvError, MessageSource, RadarContext};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

/// Production context backed by the Tokio clock.
///
/// Uses `tokio::time::Instant` so that tests running with a paused clock
/// observe the same time as `sleep()`.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
    
    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RadarContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
    
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Runs `future`, failing with [`EnvError::Timeout`] once `limit` elapses.
async fn with_timeout<T, F>(limit: Duration, future: F) -> Result<T, EnvError>
where
    F: Future<Output = Result<T, EnvError>>,
{
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| EnvError::Timeout(limit.as_millis() as u64))?
}

/// Reads the next non-blank line.
async fn next_line<R>(lines: &mut Lines<R>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match lines.next_line().await? {
            Some(line) if line.trim().is_empty() => continue,
            other => return Ok(other),
        }
    }
}

// ============================================================================
// TCP
// ============================================================================

/// Newline-delimited JSON subscription over TCP.
pub struct TcpLineSource {
    peer: String,
    lines: Option<Lines<BufReader<TcpStream>>>,
}

impl TcpLineSource {
    /// Connects to `addr` (`host:port`).
    pub async fn connect(addr: &str) -> Result<Self, EnvError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| EnvError::connection(format!("{}: {}", addr, e)))?;
        
        debug!(peer = addr, "feed connected");
        
        Ok(Self {
            peer: addr.to_string(),
            lines: Some(BufReader::new(stream).lines()),
        })
    }
    
    /// Connects to `addr`, giving up after `timeout`.
    pub async fn connect_timeout(addr: &str, timeout: Duration) -> Result<Self, EnvError> {
        with_timeout(timeout, Self::connect(addr)).await
    }
    
    /// Returns true once the peer disconnected or `close()` was called.
    pub fn is_closed(&self) -> bool {
        self.lines.is_none()
    }
}

#[async_trait]
impl MessageSource for TcpLineSource {
    async fn recv(&mut self) -> Result<Option<String>, EnvError> {
        let Some(lines) = self.lines.as_mut() else {
            return Ok(None);
        };
        
        match next_line(lines).await {
            Ok(Some(line)) => Ok(Some(line)),
            Ok(None) => {
                self.lines = None;
                Ok(None)
            }
            Err(e) => Err(EnvError::read(e)),
        }
    }
    
    async fn close(&mut self) {
        if let Some(lines) = self.lines.take() {
            let mut stream = lines.into_inner().into_inner();
            // Peer may already be gone
            let _ = stream.shutdown().await;
            debug!(peer = %self.peer, "feed closed");
        }
    }
    
    fn describe(&self) -> String {
        format!("tcp://{}", self.peer)
    }
}

// ============================================================================
// STDIN
// ============================================================================

/// Newline-delimited JSON read from standard input.
pub struct StdinLineSource {
    lines: Option<Lines<BufReader<Stdin>>>,
}

impl StdinLineSource {
    pub fn new() -> Self {
        Self {
            lines: Some(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    /// Returns true once stdin hit EOF or `close()` was called.
    pub fn is_closed(&self) -> bool {
        self.lines.is_none()
    }
}

impl Default for StdinLineSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageSource for StdinLineSource {
    async fn recv(&mut self) -> Result<Option<String>, EnvError> {
        let Some(lines) = self.lines.as_mut() else {
            return Ok(None);
        };
        
        match next_line(lines).await {
            Ok(Some(line)) => Ok(Some(line)),
            Ok(None) => {
                self.lines = None;
                Ok(None)
            }
            Err(e) => Err(EnvError::read(e)),
        }
    }
    
    async fn close(&mut self) {
        self.lines = None;
    }
    
    fn describe(&self) -> String {
        "stdin".to_string()
    }
}

// ============================================================================
// CHANNEL
// ============================================================================

/// In-process source fed through an `mpsc` channel.
///
/// Lets an embedding application push messages it received on its own
/// transport (e.g. a WebSocket handler).
pub struct ChannelSource {
    rx: mpsc::Receiver<String>,
    closed: bool,
}

impl ChannelSource {
    /// Creates a bounded channel and returns the sending half with the source.
    pub fn new(capacity: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::from_receiver(rx))
    }
    
    /// Wraps an existing receiver.
    pub fn from_receiver(rx: mpsc::Receiver<String>) -> Self {
        Self { rx, closed: false }
    }
    
    /// Returns true once `close()` was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn recv(&mut self) -> Result<Option<String>, EnvError> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.rx.recv().await)
    }
    
    async fn close(&mut self) {
        self.rx.close();
        self.closed = true;
    }
    
    fn describe(&self) -> String {
        "channel".to_string()
    }
}
