//! Channel key

/// Identifies one channel (ssrc) within one session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    /// Owning session key
    pub session_id: String,
    /// Channel (ssrc) id
    pub channel: u32,
}

impl ChannelKey {
    pub fn new(session_id: impl Into<String>, channel: u32) -> Self {
        Self {
            session_id: session_id.into(),
            channel,
        }
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.session_id, self.channel)
    }
}
