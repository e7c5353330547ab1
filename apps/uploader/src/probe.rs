//! One-shot reachability check for the API host.

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

/// Checks connectivity by opening a TCP connection to the API host.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: Duration::from_secs(3),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns whether a connection could be established in time.
    pub async fn probe(&self) -> bool {
        let addr = (self.host.as_str(), self.port);
        match tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(host = %self.host, port = self.port, error = %e, "API host unreachable");
                false
            }
            Err(_) => {
                debug!(host = %self.host, port = self.port, "API host probe timed out");
                false
            }
        }
    }
}
