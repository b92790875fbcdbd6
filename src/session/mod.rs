//! Per-connection session state
//!
//! - `ConnectionState`: the mutable state threaded through every handler
//! - `ConnectionContext`: the read-only snapshot given to callbacks

pub mod context;
pub mod state;

pub use context::ConnectionContext;
pub use state::{Attachment, ConnectionState, SessionPhase};
