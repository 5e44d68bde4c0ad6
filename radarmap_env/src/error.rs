//! Error types for the RadarMap environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Connecting to the message source failed
    #[error("Connection error: {0}")]
    ConnectionError(String),
    
    /// Reading from an established source failed
    #[error("Read error: {0}")]
    ReadError(String),
    
    /// The feed endpoint string could not be parsed
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    
    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }
    
    /// Creates a read error.
    pub fn read(msg: impl std::fmt::Display) -> Self {
        Self::ReadError(msg.to_string())
    }
}
