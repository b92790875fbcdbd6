//! N9M wire protocol
//!
//! - Frame header layout and header profiles
//! - Stateless frame codec plus a carry-over frame buffer
//! - JSON signal envelope and the known module/operation set

pub mod codec;
pub mod constants;
pub mod frame;
pub mod signal;

pub use codec::{FrameBuffer, FrameCodec};
pub use frame::{ChannelWidth, Frame, HeaderProfile, PayloadType, ReservedWidth};
pub use signal::{DeviceInfo, MediaTaskParams, Signal, SignalKind};
