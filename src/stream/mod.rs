//! Media routing
//!
//! - `StreamDemuxer`: routes media payloads by (session, channel)
//! - `Sink`: per-channel durable append plus live fan-out
//! - `ArtifactStore`: where durable appends land
//!
//! # Zero-Copy Design
//!
//! Payloads are `bytes::Bytes` split straight off the connection's read
//! buffer. The durable queue and every live subscriber share the same
//! allocation; only the reference count changes.

pub mod demuxer;
pub mod key;
pub mod sink;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use demuxer::{RouteOutcome, StreamDemuxer};
pub use key::ChannelKey;
pub use sink::{Sink, SinkConfig, SinkStats};
pub use store::{ArtifactStore, ArtifactWriter, FileArtifactStore, NullArtifactStore};
