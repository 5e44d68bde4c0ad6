//! Common types for the RadarMap environment abstraction.

use crate::error::EnvError;
use serde::{Deserialize, Serialize};

/// Where the observation feed comes from.
///
/// Parsed from strings of the form `tcp://host:port`, `stdin` or `-`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedEndpoint {
    /// Newline-delimited JSON over a TCP connection (`host:port`)
    Tcp(String),
    
    /// Newline-delimited JSON on standard input
    Stdin,
}

impl FeedEndpoint {
    /// Returns the `host:port` address for TCP endpoints.
    pub fn tcp_addr(&self) -> Option<&str> {
        match self {
            FeedEndpoint::Tcp(addr) => Some(addr),
            FeedEndpoint::Stdin => None,
        }
    }
}

impl std::str::FromStr for FeedEndpoint {
    type Err = EnvError;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "-" || s.eq_ignore_ascii_case("stdin") {
            return Ok(FeedEndpoint::Stdin);
        }
        
        let addr = s.strip_prefix("tcp://").unwrap_or(s);
        
        // Require host:port with a numeric port
        match addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(FeedEndpoint::Tcp(addr.to_string()))
            }
            _ => Err(EnvError::InvalidEndpoint(s.to_string())),
        }
    }
}

impl std::fmt::Display for FeedEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedEndpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
            FeedEndpoint::Stdin => write!(f, "stdin"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_parse_tcp_endpoint() {
        let ep: FeedEndpoint = "tcp://127.0.0.1:9000".parse().unwrap();
        assert_eq!(ep, FeedEndpoint::Tcp("127.0.0.1:9000".to_string()));
        assert_eq!(ep.tcp_addr(), Some("127.0.0.1:9000"));
        
        // Scheme is optional
        let bare: FeedEndpoint = "radar.local:7001".parse().unwrap();
        assert_eq!(bare, FeedEndpoint::Tcp("radar.local:7001".to_string()));
    }
    
    #[test]
    fn test_parse_stdin_endpoint() {
        assert_eq!("-".parse::<FeedEndpoint>().unwrap(), FeedEndpoint::Stdin);
        assert_eq!("STDIN".parse::<FeedEndpoint>().unwrap(), FeedEndpoint::Stdin);
    }
    
    #[test]
    fn test_parse_invalid_endpoint() {
        assert!("tcp://no-port".parse::<FeedEndpoint>().is_err());
        assert!("tcp://:9000".parse::<FeedEndpoint>().is_err());
        assert!("host:notaport".parse::<FeedEndpoint>().is_err());
    }
    
    #[test]
    fn test_display_roundtrips_through_parse() {
        let ep = FeedEndpoint::Tcp("10.0.0.5:5555".to_string());
        assert_eq!(ep.to_string(), "tcp://10.0.0.5:5555");
        assert_eq!(ep.to_string().parse::<FeedEndpoint>().unwrap(), ep);
    }
}
