//! Session entry
//!
//! Per-session state stored in the registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::protocol::signal::DeviceInfo;
use crate::session::state::SessionPhase;
use crate::stream::sink::Sink;

/// Shared handle to a registry entry
pub type SessionHandle = Arc<RwLock<Session>>;

/// Server-side state for one device session
#[derive(Debug)]
pub struct Session {
    /// Opaque session key
    pub id: String,

    /// Identity from the latest CONNECT
    pub device: DeviceInfo,

    /// Token issued in the latest CONNECT response
    pub token: String,

    /// State machine phase
    pub phase: SessionPhase,

    /// Connection that owns the session
    pub owner: u64,

    /// When the session was first created
    pub created_at: Instant,

    /// Last signal or refresh
    pub last_activity: Instant,

    /// Per-channel sinks, created lazily by the demuxer
    pub channels: HashMap<u32, Arc<Sink>>,
}

impl Session {
    pub(super) fn new(id: String, device: DeviceInfo, token: String, owner: u64) -> Self {
        let now = Instant::now();
        Self {
            id,
            device,
            token,
            phase: SessionPhase::Connected,
            owner,
            created_at: now,
            last_activity: now,
            channels: HashMap::new(),
        }
    }

    /// Refresh the activity timestamp
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Time since the last activity
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Sorted list of channels that currently have a sink
    pub fn channel_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.channels.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Mark the session closed and hand back its sinks
    ///
    /// After this the demuxer no longer creates sinks for the session.
    pub fn take_channels(&mut self) -> Vec<Arc<Sink>> {
        self.phase = SessionPhase::Closed;
        self.channels.drain().map(|(_, sink)| sink).collect()
    }
}

/// Snapshot of a session for observers
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub device: DeviceInfo,
    pub phase: SessionPhase,
    pub owner: u64,
    pub channels: Vec<u32>,
    pub idle_for: Duration,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            device: session.device.clone(),
            phase: session.phase,
            owner: session.owner,
            channels: session.channel_ids(),
            idle_for: session.idle_for(),
        }
    }
}
