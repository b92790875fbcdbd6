//! Signal dispatcher
//!
//! Interprets signal frames for one connection and drives its state
//! machine:
//!
//! ```text
//!  Unregistered ──CONNECT──► Connected ──MEDIATASKSTART──► Streaming
//!        │                      │                              │
//!        └──────────────────────┴──── close / idle ────────────┴──► Closed
//! ```
//!
//! The dispatcher never writes to the transport. It returns the frames to
//! send, each with a delay, and the connection task schedules them on its
//! own timers so that closing the connection cancels anything pending.
//! Inbound frames are audited here; outbound frames are audited when the
//! connection writes them.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::protocol::constants::*;
use crate::protocol::frame::Frame;
use crate::protocol::signal::{
    success, success_body, DeviceInfo, MediaTaskParams, Signal, SignalKind,
};
use crate::registry::{SessionRegistry, UpsertOutcome};
use crate::server::handler::{FrameDirection, N9mHandler};
use crate::session::state::{ConnectionState, SessionPhase};
use crate::stream::StreamDemuxer;

/// A frame the connection should send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub frame: Frame,
    /// Wait this long before sending
    pub delay: Duration,
}

impl Outbound {
    pub fn now(frame: Frame) -> Self {
        Self {
            frame,
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(frame: Frame, delay: Duration) -> Self {
        Self { frame, delay }
    }
}

/// Dispatcher settings
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// PRO advertised when the device does not ask for one
    pub protocol_version: String,

    /// IPANDPORT sent in live video requests
    pub media_endpoint: String,

    /// Delay before the live video request that follows MEDIATASKSTART
    pub request_delay: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            media_endpoint: format!("0.0.0.0:{}", DEFAULT_PORT),
            request_delay: Duration::from_millis(500),
        }
    }
}

/// Interprets signals and produces responses
pub struct SignalDispatcher<H: N9mHandler> {
    config: DispatchConfig,
    handler: Arc<H>,
    registry: Arc<SessionRegistry>,
    demuxer: Arc<StreamDemuxer>,
}

impl<H: N9mHandler> SignalDispatcher<H> {
    pub fn new(
        config: DispatchConfig,
        handler: Arc<H>,
        registry: Arc<SessionRegistry>,
        demuxer: Arc<StreamDemuxer>,
    ) -> Self {
        Self {
            config,
            handler,
            registry,
            demuxer,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn demuxer(&self) -> &Arc<StreamDemuxer> {
        &self.demuxer
    }

    /// Process one signal frame
    ///
    /// The inbound frame and every frame returned are passed to the
    /// handler's `on_frame` hook. A `ProtocolError` rejects this frame only.
    pub async fn dispatch(
        &self,
        state: &mut ConnectionState,
        frame: &Frame,
    ) -> Result<Vec<Outbound>, ProtocolError> {
        let signal = match frame.parse_signal() {
            Ok(signal) => signal,
            Err(e) => {
                let session_id = state.session_id().unwrap_or_default();
                self.audit(session_id, FrameDirection::Inbound, frame);
                return Err(e);
            }
        };

        let audit_id = match state.session_id() {
            Some(id) => id.to_string(),
            None => signal.session.clone(),
        };
        self.audit(&audit_id, FrameDirection::Inbound, frame);

        let kind = signal.kind();
        tracing::debug!(
            connection = state.id,
            session_id = %audit_id,
            module = %signal.module,
            operation = %signal.operation,
            "Signal received"
        );

        let outbound = match kind {
            SignalKind::Connect => self.on_connect(state, frame.channel, &signal).await?,
            SignalKind::CreateStream if !state.is_registered() => {
                self.on_attach(state, frame.channel, &signal).await?
            }
            SignalKind::Unrecognized { module, operation } => {
                tracing::info!(
                    connection = state.id,
                    module = %module,
                    operation = %operation,
                    "Unclassified signal ignored"
                );
                Vec::new()
            }
            kind => {
                let session_id = match state.session_id() {
                    Some(id) => id.to_string(),
                    None => {
                        return Err(ProtocolError::NotRegistered {
                            module: signal.module.clone(),
                            operation: signal.operation.clone(),
                        })
                    }
                };
                self.registry.touch(&session_id).await;
                self.on_registered(state, &session_id, frame.channel, kind, &signal)
                    .await?
            }
        };

        state.protocol_errors = 0;
        Ok(outbound)
    }

    /// Signals that require a registered session
    async fn on_registered(
        &self,
        state: &mut ConnectionState,
        session_id: &str,
        channel: u32,
        kind: SignalKind,
        signal: &Signal,
    ) -> Result<Vec<Outbound>, ProtocolError> {
        let is_answer = signal.response.is_some();

        let outbound = match kind {
            SignalKind::Keepalive => {
                if is_answer {
                    Vec::new()
                } else {
                    let reply = Signal::reply(
                        MODULE_CERTIFICATE,
                        OP_KEEPALIVE,
                        session_id,
                        Value::Object(Default::default()),
                    );
                    vec![Outbound::now(Frame::signal(channel, &reply))]
                }
            }
            SignalKind::CreateStream | SignalKind::Verify | SignalKind::Login => {
                if is_answer {
                    Vec::new()
                } else {
                    let reply = Signal::reply(
                        MODULE_CERTIFICATE,
                        kind.name(),
                        session_id,
                        success(),
                    );
                    vec![Outbound::now(Frame::signal(channel, &reply))]
                }
            }
            SignalKind::MediaTaskStart => {
                let params = MediaTaskParams::from_signal(signal)?;
                state.start_streaming();
                self.registry
                    .set_phase(session_id, SessionPhase::Streaming)
                    .await;

                tracing::info!(
                    session_id = %session_id,
                    channel = params.channel,
                    stream_type = params.stream_type,
                    "Media task started"
                );

                let request = self.live_video_request(session_id, params);
                vec![Outbound::delayed(
                    Frame::signal(channel, &request),
                    self.config.request_delay,
                )]
            }
            SignalKind::RequestStream
            | SignalKind::RequestAliveVideo
            | SignalKind::ControlStream => {
                match signal.error_code() {
                    Some(code) if code != u64::from(ERRORCODE_SUCCESS) => tracing::warn!(
                        session_id = %session_id,
                        operation = kind.name(),
                        error_code = code,
                        "Device rejected stream request"
                    ),
                    _ => tracing::debug!(
                        session_id = %session_id,
                        operation = kind.name(),
                        "Device acknowledged stream request"
                    ),
                }
                Vec::new()
            }
            SignalKind::Connect | SignalKind::Unrecognized { .. } => Vec::new(),
        };

        Ok(outbound)
    }

    /// CERTIFICATE/CONNECT: create or overwrite the session
    async fn on_connect(
        &self,
        state: &mut ConnectionState,
        channel: u32,
        signal: &Signal,
    ) -> Result<Vec<Outbound>, ProtocolError> {
        let device = DeviceInfo::from_connect(signal)?;

        let session_id = if !signal.session.is_empty() {
            signal.session.clone()
        } else if let Some(current) = state.session_id() {
            current.to_string()
        } else {
            Uuid::new_v4().simple().to_string()
        };

        // A connection that switches keys gives up the session it held
        if let Some(previous) = state.session_id().map(str::to_string) {
            if previous != session_id && state.is_owner() {
                if let Some(entry) = self.registry.release(&previous, state.id).await {
                    self.demuxer.close_session(&entry).await;
                }
            }
        }

        let token = Uuid::new_v4().simple().to_string();
        let outcome = self
            .registry
            .upsert(&session_id, device.clone(), token.clone(), state.id)
            .await;

        if let UpsertOutcome::Updated { previous_owner } = outcome {
            if previous_owner != state.id {
                tracing::warn!(
                    session_id = %session_id,
                    connection = state.id,
                    previous_owner = previous_owner,
                    "Session taken over by new connection"
                );
            }
        }

        let negotiated = device
            .protocol_version
            .clone()
            .unwrap_or_else(|| self.config.protocol_version.clone());

        state.on_connect(session_id.clone(), device.clone());

        tracing::info!(
            connection = state.id,
            session_id = %session_id,
            serial = %device.serial,
            device_type = %device.device_type,
            protocol = %negotiated,
            "Device connected"
        );

        self.handler.on_connect(&state.context(), &device).await;

        let reply = Signal::reply(
            MODULE_CERTIFICATE,
            OP_CONNECT,
            session_id,
            success_body([("PRO", json!(negotiated)), ("TOKEN", json!(token))]),
        );
        Ok(vec![Outbound::now(Frame::signal(channel, &reply))])
    }

    /// CERTIFICATE/CREATESTREAM on a fresh connection: join an existing
    /// session to carry its media
    async fn on_attach(
        &self,
        state: &mut ConnectionState,
        channel: u32,
        signal: &Signal,
    ) -> Result<Vec<Outbound>, ProtocolError> {
        let not_registered = || ProtocolError::NotRegistered {
            module: signal.module.clone(),
            operation: signal.operation.clone(),
        };

        if signal.session.is_empty() || !self.registry.touch(&signal.session).await {
            return Err(not_registered());
        }

        state.attach_media(signal.session.clone());
        tracing::info!(
            connection = state.id,
            session_id = %signal.session,
            "Media connection attached"
        );

        let reply = Signal::reply(
            MODULE_CERTIFICATE,
            OP_CREATESTREAM,
            signal.session.clone(),
            success(),
        );
        Ok(vec![Outbound::now(Frame::signal(channel, &reply))])
    }

    /// Build MEDIASTREAMMODEL/REQUESTALIVEVIDEO for a started media task
    fn live_video_request(&self, session_id: &str, params: MediaTaskParams) -> Signal {
        Signal::request(MODULE_MEDIASTREAMMODEL, OP_REQUESTALIVEVIDEO, session_id).with_parameter(
            json!({
                "CHANNEL": params.channel,
                "SSRC": params.channel,
                "STREAMTYPE": params.stream_type,
                "AVTYPE": 1,
                "STREAMNAME": format!("{}-{}", session_id, params.channel),
                "IPANDPORT": self.config.media_endpoint,
            }),
        )
    }

    /// Server-initiated keepalive for a registered session
    pub fn keepalive_request(&self, session_id: &str) -> Frame {
        let signal = Signal::request(MODULE_CERTIFICATE, OP_KEEPALIVE, session_id);
        Frame::signal(0, &signal)
    }

    /// Pass a frame to the audit hook
    pub fn audit(&self, session_id: &str, direction: FrameDirection, frame: &Frame) {
        self.handler.on_frame(session_id, direction, frame);
    }
}
