//! N9M server
//!
//! - `N9mServer`: accept loop, connection limit, server-wide stats
//! - `Connection`: one device transport and its timers
//! - `N9mHandler`: application callbacks

pub mod config;
pub mod connection;
pub mod handler;
pub mod listener;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ServerConfig;
pub use handler::{DefaultHandler, FrameDirection, N9mHandler};
pub use listener::N9mServer;
