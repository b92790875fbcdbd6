//! Connection state machine
//!
//! Tracks one device connection from accept to close. The state object is
//! owned by the connection task and passed by `&mut` into every handler, so
//! the "current session" of a connection is never shared or captured.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::context::ConnectionContext;
use crate::protocol::signal::DeviceInfo;
use crate::stats::ConnectionStats;

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Transport connected, no CONNECT accepted yet
    Unregistered,
    /// CONNECT accepted
    Connected,
    /// A media task was started
    Streaming,
    /// Session closed
    Closed,
}

/// How this connection relates to its session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    /// Registered the session with CONNECT and owns it
    Owner,
    /// Joined an existing session to carry media
    Media,
}

/// Complete per-connection state
#[derive(Debug)]
pub struct ConnectionState {
    /// Unique connection ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: SessionPhase,

    /// Connection start time
    pub connected_at: Instant,

    /// Last time bytes arrived from the device
    pub last_activity: Instant,

    /// Session this connection belongs to
    session_id: Option<String>,

    /// Owner or media attachment
    attachment: Option<Attachment>,

    /// Identity from the latest CONNECT on this connection
    pub device: Option<DeviceInfo>,

    /// Consecutive protocol errors since the last good signal
    pub protocol_errors: u32,

    /// Traffic counters
    pub stats: ConnectionStats,
}

impl ConnectionState {
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Unregistered,
            connected_at: now,
            last_activity: now,
            session_id: None,
            attachment: None,
            device: None,
            protocol_errors: 0,
            stats: ConnectionStats::default(),
        }
    }

    /// Handle an accepted CONNECT
    pub fn on_connect(&mut self, session_id: String, device: DeviceInfo) {
        self.session_id = Some(session_id);
        self.attachment = Some(Attachment::Owner);
        self.device = Some(device);
        self.phase = SessionPhase::Connected;
    }

    /// Join an existing session as a media connection
    pub fn attach_media(&mut self, session_id: String) {
        self.session_id = Some(session_id);
        self.attachment = Some(Attachment::Media);
        self.phase = SessionPhase::Connected;
    }

    /// Handle a started media task
    pub fn start_streaming(&mut self) {
        if matches!(self.phase, SessionPhase::Connected | SessionPhase::Streaming) {
            self.phase = SessionPhase::Streaming;
        }
    }

    /// Bytes arrived from the device
    pub fn on_bytes_received(&mut self, n: usize) {
        self.stats.bytes_received += n as u64;
        self.last_activity = Instant::now();
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn attachment(&self) -> Option<Attachment> {
        self.attachment
    }

    /// Check if a CONNECT (or media attach) was accepted
    pub fn is_registered(&self) -> bool {
        self.session_id.is_some() && self.phase != SessionPhase::Closed
    }

    /// Check if this connection owns its session
    pub fn is_owner(&self) -> bool {
        self.attachment == Some(Attachment::Owner)
    }

    /// Time since bytes last arrived
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Get connection duration
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Mark the connection closed and return its session id
    pub fn close(&mut self) -> Option<String> {
        self.phase = SessionPhase::Closed;
        self.session_id.clone()
    }

    /// Read-only view for handler callbacks
    pub fn context(&self) -> ConnectionContext {
        let mut stats = self.stats.clone();
        stats.duration = self.duration();
        stats.calculate_bitrate();

        ConnectionContext {
            connection_id: self.id,
            peer_addr: self.peer_addr,
            session_id: self.session_id.clone(),
            device: self.device.clone(),
            phase: self.phase,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5556)
    }

    #[test]
    fn test_connection_lifecycle() {
        let mut state = ConnectionState::new(1, addr());
        assert_eq!(state.phase, SessionPhase::Unregistered);
        assert!(!state.is_registered());

        // Streaming requires a registered session
        state.start_streaming();
        assert_eq!(state.phase, SessionPhase::Unregistered);

        state.on_connect("s1".into(), DeviceInfo::default());
        assert_eq!(state.phase, SessionPhase::Connected);
        assert!(state.is_registered());
        assert!(state.is_owner());

        state.start_streaming();
        assert_eq!(state.phase, SessionPhase::Streaming);

        assert_eq!(state.close().as_deref(), Some("s1"));
        assert_eq!(state.phase, SessionPhase::Closed);
        assert!(!state.is_registered());
    }

    #[test]
    fn test_media_attachment() {
        let mut state = ConnectionState::new(2, addr());
        state.attach_media("s1".into());

        assert!(state.is_registered());
        assert!(!state.is_owner());
        assert_eq!(state.attachment(), Some(Attachment::Media));
    }

    #[test]
    fn test_context_snapshot() {
        let mut state = ConnectionState::new(3, addr());
        state.on_bytes_received(128);
        state.on_connect("s9".into(), DeviceInfo::default());

        let ctx = state.context();
        assert_eq!(ctx.connection_id, 3);
        assert_eq!(ctx.session_id.as_deref(), Some("s9"));
        assert_eq!(ctx.stats.bytes_received, 128);
        assert_eq!(ctx.phase, SessionPhase::Connected);
    }

    #[test]
    fn test_context_reports_bitrate() {
        let mut state = ConnectionState::new(4, addr());
        state.connected_at = Instant::now()
            .checked_sub(Duration::from_secs(2))
            .unwrap();
        state.on_bytes_received(1000);

        let ctx = state.context();
        assert!(ctx.stats.duration >= Duration::from_secs(2));
        // 1000 bytes * 8 bits over 2 seconds
        assert_eq!(ctx.stats.bitrate, 4000);
    }
}
