//! Media demultiplexer
//!
//! Routes media payloads by (session, channel) to the channel's sink,
//! creating sinks on first use. Appends never wait on IO, so a slow channel
//! cannot hold up the others.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::broadcast;

use super::key::ChannelKey;
use super::sink::{Sink, SinkConfig, SinkStats};
use super::store::ArtifactStore;
use crate::error::SinkError;
use crate::registry::{SessionHandle, SessionRegistry};
use crate::session::state::SessionPhase;

/// What happened to a routed payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Appended to the channel sink
    Delivered,
    /// No such session; the payload was dropped
    UnknownSession,
    /// The sink rejected the payload
    Dropped(SinkError),
}

/// Routes media frames to per-channel sinks
pub struct StreamDemuxer {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn ArtifactStore>,
    config: SinkConfig,
}

impl StreamDemuxer {
    pub fn new(
        registry: Arc<SessionRegistry>,
        store: Arc<dyn ArtifactStore>,
        config: SinkConfig,
    ) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    /// Route one media payload
    pub async fn route(&self, session_id: &str, channel: u32, payload: Bytes) -> RouteOutcome {
        let sink = match self.sink_for(session_id, channel).await {
            Ok(Some(sink)) => sink,
            Ok(None) => {
                tracing::debug!(
                    session_id = %session_id,
                    channel = channel,
                    len = payload.len(),
                    "Media for unknown session dropped"
                );
                return RouteOutcome::UnknownSession;
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    channel = channel,
                    error = %e,
                    "Media dropped, sink unavailable"
                );
                return RouteOutcome::Dropped(e);
            }
        };

        match sink.append(payload) {
            Ok(()) => RouteOutcome::Delivered,
            Err(e) => {
                tracing::warn!(channel = %sink.key(), error = %e, "Media frame dropped");
                RouteOutcome::Dropped(e)
            }
        }
    }

    /// Attach a live viewer to a channel
    ///
    /// Creates the channel's sink if the session exists but has not sent
    /// media on that channel yet.
    pub async fn subscribe(
        &self,
        session_id: &str,
        channel: u32,
    ) -> Option<broadcast::Receiver<Bytes>> {
        match self.sink_for(session_id, channel).await {
            Ok(Some(sink)) => sink.subscribe(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    channel = channel,
                    error = %e,
                    "Subscribe failed"
                );
                None
            }
        }
    }

    /// Stats for one channel sink
    pub async fn channel_stats(&self, session_id: &str, channel: u32) -> Option<SinkStats> {
        let entry = self.registry.get(session_id).await?;
        let entry = entry.read().await;
        entry.channels.get(&channel).map(|sink| sink.stats())
    }

    /// Close every sink of a session that has left the registry
    ///
    /// Returns the number of sinks closed.
    pub async fn close_session(&self, entry: &SessionHandle) -> usize {
        let (session_id, sinks) = {
            let mut session = entry.write().await;
            (session.id.clone(), session.take_channels())
        };

        for sink in &sinks {
            sink.close().await;
        }

        if !sinks.is_empty() {
            tracing::info!(session_id = %session_id, sinks = sinks.len(), "Session sinks closed");
        }
        sinks.len()
    }

    /// Find or lazily create the sink for a channel
    async fn sink_for(
        &self,
        session_id: &str,
        channel: u32,
    ) -> Result<Option<Arc<Sink>>, SinkError> {
        let entry = match self.registry.get(session_id).await {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let mut session = entry.write().await;
        if session.phase == SessionPhase::Closed {
            return Ok(None);
        }

        if let Some(sink) = session.channels.get(&channel) {
            return Ok(Some(Arc::clone(sink)));
        }

        let key = ChannelKey::new(session_id, channel);
        let sink = Arc::new(Sink::open(key, self.store.as_ref(), &self.config)?);
        session.channels.insert(channel, Arc::clone(&sink));

        tracing::info!(
            session_id = %session_id,
            channel = channel,
            channels = session.channels.len(),
            "Channel created"
        );

        Ok(Some(sink))
    }
}
