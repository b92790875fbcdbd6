//! N9M device ingest server
//!
//! Accepts TCP connections from mobile video recorders speaking the N9M
//! framing, registers each device session through the JSON signalling
//! exchange, and records every media channel to its own artifact while
//! fanning it out to live subscribers.
//!
//! # Architecture
//!
//! ```text
//!   device ──TCP──► Connection ──► FrameBuffer ──► Frame
//!                       │                            │
//!                       │           ┌────────────────┼──────────────┐
//!                       │           ▼                ▼              ▼
//!                       │     SignalDispatcher    (audit)     StreamDemuxer
//!                       │       │       │                           │
//!                       │       ▼       ▼                           ▼
//!                       │  SessionRegistry  Outbound ──► device   Sink per channel
//!                       │                                          │       │
//!                       └── keepalive / idle / delayed             ▼       ▼
//!                                                          ArtifactStore  broadcast
//! ```
//!
//! # Example
//!
//! ```no_run
//! use n9m_rs::{N9mServer, ServerConfig};
//! use n9m_rs::server::DefaultHandler;
//!
//! # async fn run() -> n9m_rs::Result<()> {
//! let config = ServerConfig::default().record_to("recordings");
//! let server = N9mServer::new(config, DefaultHandler);
//! server.run().await
//! # }
//! ```

pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;
pub mod stream;

pub use error::{Error, Result};
pub use server::{N9mHandler, N9mServer, ServerConfig};
