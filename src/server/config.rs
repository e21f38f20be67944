//! Ingest server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::protocol::constants::*;

/// RTMP listener options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Outbound chunk size announced after connect
    pub chunk_size: u32,

    pub window_ack_size: u32,

    pub peer_bandwidth: u32,

    /// Handshake must complete within this time
    pub connection_timeout: Duration,

    /// Disconnect when nothing is received for this long
    pub idle_timeout: Duration,

    pub tcp_nodelay: bool,

    /// Initial capacity of the connection read buffer
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 1935)),
            max_connections: 0,
            chunk_size: RECOMMENDED_CHUNK_SIZE,
            window_ack_size: DEFAULT_WINDOW_ACK_SIZE,
            peer_bandwidth: DEFAULT_PEER_BANDWIDTH,
            connection_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(30),
            tcp_nodelay: true,
            read_buffer_size: 64 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Clamped to the protocol range
    pub fn chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    pub fn window_ack_size(mut self, size: u32) -> Self {
        self.window_ack_size = size;
        self
    }

    pub fn peer_bandwidth(mut self, size: u32) -> Self {
        self.peer_bandwidth = size;
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 1935);
        assert!(config.bind_addr.ip().is_unspecified());
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.chunk_size, RECOMMENDED_CHUNK_SIZE);
        assert_eq!(config.window_ack_size, 786_432);
        assert_eq!(config.peer_bandwidth, 786_432);
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_builder() {
        let addr: SocketAddr = "127.0.0.1:1936".parse().unwrap();
        let config = ServerConfig::with_addr(addr)
            .max_connections(4)
            .chunk_size(0)
            .idle_timeout(Duration::from_secs(5))
            .tcp_nodelay(false);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
        assert!(!config.tcp_nodelay);
    }

    #[test]
    fn test_chunk_size_upper_bound() {
        let config = ServerConfig::default().chunk_size(u32::MAX);
        assert_eq!(config.chunk_size, MAX_CHUNK_SIZE);
    }
}
