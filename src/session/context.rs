//! Handler context
//!
//! Context passed to handler callbacks containing connection information.

use std::net::SocketAddr;

use super::state::SessionPhase;
use crate::protocol::signal::DeviceInfo;
use crate::stats::ConnectionStats;

/// Context passed to N9mHandler callbacks
///
/// A read-only snapshot of the connection at the time of the callback.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    /// Unique connection ID
    pub connection_id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Session key, once CONNECT was accepted
    pub session_id: Option<String>,

    /// Device identity, once CONNECT was accepted
    pub device: Option<DeviceInfo>,

    /// Phase at snapshot time
    pub phase: SessionPhase,

    /// Connection statistics
    pub stats: ConnectionStats,
}

impl ConnectionContext {
    /// Device serial number if available
    pub fn serial(&self) -> Option<&str> {
        self.device.as_ref().map(|d| d.serial.as_str())
    }
}
