//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::dispatch::DispatchConfig;
use crate::protocol::constants::*;
use crate::protocol::frame::HeaderProfile;
use crate::stream::SinkConfig;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Interval between server-initiated keepalives
    pub keepalive_interval: Duration,

    /// Idle timeout (disconnect if no data received)
    pub idle_timeout: Duration,

    /// How often the idle timeout is checked
    pub idle_check_interval: Duration,

    /// Delay before the live video request that follows MEDIATASKSTART
    pub request_delay: Duration,

    /// Consecutive bad signals tolerated before closing (0 = unlimited)
    pub max_protocol_errors: u32,

    /// Protocol version advertised in CONNECT responses
    pub protocol_version: String,

    /// Media endpoint (IPANDPORT) advertised in live video requests
    pub media_endpoint: String,

    /// Frame header layout
    pub header_profile: HeaderProfile,

    /// Per-channel sink settings
    pub sink: SinkConfig,

    /// Directory for recorded channels (None = discard media)
    pub record_dir: Option<PathBuf>,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Application-level read buffer size
    pub read_buffer_size: usize,

    /// Application-level write buffer size
    pub write_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            keepalive_interval: Duration::from_secs(20),
            idle_timeout: Duration::from_secs(60),
            idle_check_interval: Duration::from_secs(5),
            request_delay: Duration::from_millis(500),
            max_protocol_errors: 8,
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            media_endpoint: format!("0.0.0.0:{}", DEFAULT_PORT),
            header_profile: HeaderProfile::default(),
            sink: SinkConfig::default(),
            record_dir: None,
            tcp_nodelay: true,
            read_buffer_size: 64 * 1024, // 64KB
            write_buffer_size: 64 * 1024,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set keepalive interval
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set how often idle connections are checked
    pub fn idle_check_interval(mut self, interval: Duration) -> Self {
        self.idle_check_interval = interval;
        self
    }

    /// Set the delay before live video requests
    pub fn request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Set the protocol error budget
    pub fn max_protocol_errors(mut self, max: u32) -> Self {
        self.max_protocol_errors = max;
        self
    }

    /// Set the advertised media endpoint
    pub fn media_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.media_endpoint = endpoint.into();
        self
    }

    /// Set the frame header layout
    pub fn header_profile(mut self, profile: HeaderProfile) -> Self {
        self.header_profile = profile;
        self
    }

    /// Set sink settings
    pub fn sink(mut self, sink: SinkConfig) -> Self {
        self.sink = sink;
        self
    }

    /// Record channels under the given directory
    pub fn record_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.record_dir = Some(dir.into());
        self
    }

    /// Settings for the signal dispatcher
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            protocol_version: self.protocol_version.clone(),
            media_endpoint: self.media_endpoint.clone(),
            request_delay: self.request_delay,
        }
    }
}
