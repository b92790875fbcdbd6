//! Statistics for N9M connections

use std::time::Duration;

/// Connection-level statistics
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Total bytes received
    pub bytes_received: u64,
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Connection duration
    pub duration: Duration,
    /// Signal frames received
    pub signal_frames: u64,
    /// Metadata frames received
    pub metadata_frames: u64,
    /// Media frames received
    pub media_frames: u64,
    /// Frames with a reserved payload type
    pub ignored_frames: u64,
    /// Media frames that did not reach a sink
    pub dropped_frames: u64,
    /// Signals rejected with a protocol error
    pub protocol_errors: u64,
    /// Bitrate estimate (bits/sec)
    pub bitrate: u64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate bitrate from bytes and duration
    pub fn calculate_bitrate(&mut self) {
        let secs = self.duration.as_secs();
        if secs > 0 {
            self.bitrate = (self.bytes_received * 8) / secs;
        }
    }

    /// Total frames received
    pub fn frames_received(&self) -> u64 {
        self.signal_frames + self.metadata_frames + self.media_frames + self.ignored_frames
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Total connections ever accepted
    pub total_connections: u64,
    /// Current open connections
    pub active_connections: u64,
    /// Connections refused by the connection limit
    pub rejected_connections: u64,
    /// Registered sessions
    pub active_sessions: u64,
    /// Uptime
    pub uptime: Duration,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_stats_new() {
        let stats = ConnectionStats::new();
        assert_eq!(stats.bytes_received, 0);
        assert_eq!(stats.bytes_sent, 0);
        assert_eq!(stats.frames_received(), 0);
        assert_eq!(stats.dropped_frames, 0);
        assert_eq!(stats.bitrate, 0);
    }

    #[test]
    fn test_calculate_bitrate() {
        let mut stats = ConnectionStats::new();
        stats.bytes_received = 1_000_000;
        stats.duration = Duration::from_secs(10);

        stats.calculate_bitrate();

        // 1,000,000 bytes * 8 bits / 10 seconds = 800,000 bps
        assert_eq!(stats.bitrate, 800_000);
    }

    #[test]
    fn test_calculate_bitrate_zero_duration() {
        let mut stats = ConnectionStats::new();
        stats.bytes_received = 1_000_000;

        stats.calculate_bitrate();

        assert_eq!(stats.bitrate, 0);
    }

    #[test]
    fn test_frames_received_sums_kinds() {
        let stats = ConnectionStats {
            signal_frames: 3,
            metadata_frames: 1,
            media_frames: 10,
            ignored_frames: 2,
            ..Default::default()
        };
        assert_eq!(stats.frames_received(), 16);
    }

    #[test]
    fn test_server_stats_new() {
        let stats = ServerStats::new();
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.active_sessions, 0);
    }
}
