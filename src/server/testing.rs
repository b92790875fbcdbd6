//! Test doubles for handler and dispatcher tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;

use super::handler::{FrameDirection, N9mHandler};
use crate::dispatch::{DispatchConfig, SignalDispatcher};
use crate::protocol::constants::*;
use crate::protocol::frame::{Frame, PayloadType};
use crate::protocol::signal::{DeviceInfo, Signal};
use crate::registry::SessionRegistry;
use crate::session::ConnectionContext;
use crate::stream::testing::MemoryStore;
use crate::stream::{SinkConfig, StreamDemuxer};

/// Counts callbacks and records audited frames
#[derive(Default)]
pub(crate) struct RecordingHandler {
    pub(crate) connects: AtomicUsize,
    pub(crate) disconnects: AtomicUsize,
    pub(crate) frames: Mutex<Vec<(String, FrameDirection, PayloadType)>>,
    pub(crate) reject: bool,
}

impl RecordingHandler {
    pub(crate) fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    pub(crate) fn count(&self, direction: FrameDirection) -> usize {
        let frames = self.frames.lock().unwrap();
        frames.iter().filter(|(_, d, _)| *d == direction).count()
    }
}

impl N9mHandler for RecordingHandler {
    async fn on_connection(&self, _ctx: &ConnectionContext) -> bool {
        !self.reject
    }

    async fn on_connect(&self, _ctx: &ConnectionContext, _device: &DeviceInfo) {
        self.connects.fetch_add(1, Ordering::SeqCst);
    }

    fn on_frame(&self, session_id: &str, direction: FrameDirection, frame: &Frame) {
        let mut frames = self.frames.lock().unwrap();
        frames.push((session_id.to_string(), direction, frame.payload_type));
    }

    async fn on_disconnect(&self, _ctx: &ConnectionContext) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Dispatcher wired to an in-memory store
pub(crate) fn dispatcher(
    config: DispatchConfig,
) -> (
    Arc<SignalDispatcher<RecordingHandler>>,
    Arc<RecordingHandler>,
    MemoryStore,
) {
    dispatcher_with(config, RecordingHandler::default())
}

pub(crate) fn dispatcher_with(
    config: DispatchConfig,
    handler: RecordingHandler,
) -> (
    Arc<SignalDispatcher<RecordingHandler>>,
    Arc<RecordingHandler>,
    MemoryStore,
) {
    let registry = Arc::new(SessionRegistry::new());
    let store = MemoryStore::new();
    let demuxer = Arc::new(StreamDemuxer::new(
        Arc::clone(&registry),
        Arc::new(store.clone()),
        SinkConfig::default(),
    ));
    let handler = Arc::new(handler);
    let dispatcher = Arc::new(SignalDispatcher::new(
        config,
        Arc::clone(&handler),
        registry,
        demuxer,
    ));
    (dispatcher, handler, store)
}

/// CERTIFICATE/CONNECT with the required identity fields
pub(crate) fn connect_frame(session: &str, serial: &str) -> Frame {
    let signal = Signal::request(MODULE_CERTIFICATE, OP_CONNECT, session).with_parameter(json!({
        "DSNO": serial,
        "DEVTYPE": 1,
        "DEVCLASS": 4,
        "NET": "4G",
    }));
    Frame::signal(0, &signal)
}

pub(crate) fn request_frame(module: &str, operation: &str, session: &str) -> Frame {
    Frame::signal(0, &Signal::request(module, operation, session))
}
