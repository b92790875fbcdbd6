//! Application callbacks
//!
//! Implement [`N9mHandler`] to observe device connections. Every method
//! has a default so handlers only override what they need.

use std::future::Future;

use crate::protocol::frame::Frame;
use crate::protocol::signal::DeviceInfo;
use crate::session::ConnectionContext;

/// Direction of an audited frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDirection {
    /// Received from the device
    Inbound,
    /// Sent to the device
    Outbound,
}

/// Hooks invoked by the server during a connection's lifetime
pub trait N9mHandler: Send + Sync + 'static {
    /// A transport connection was accepted
    ///
    /// Return `false` to close it immediately.
    fn on_connection(&self, _ctx: &ConnectionContext) -> impl Future<Output = bool> + Send {
        async { true }
    }

    /// A device completed CERTIFICATE/CONNECT
    fn on_connect(
        &self,
        _ctx: &ConnectionContext,
        _device: &DeviceInfo,
    ) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Audit hook for signal and metadata frames in both directions
    ///
    /// Runs inline on the connection task, so keep it cheap.
    fn on_frame(&self, _session_id: &str, _direction: FrameDirection, _frame: &Frame) {}

    /// The connection closed, after its session cleanup finished
    fn on_disconnect(&self, _ctx: &ConnectionContext) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Handler that accepts everything and does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHandler;

impl N9mHandler for DefaultHandler {}
