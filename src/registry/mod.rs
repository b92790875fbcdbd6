//! Session registry
//!
//! The registry maps session keys to per-session state shared between
//! connection tasks and the demuxer.
//!
//! # Architecture
//!
//! ```text
//!                      Arc<SessionRegistry>
//!                 ┌───────────────────────────┐
//!                 │ sessions: HashMap<String, │
//!                 │   Session {               │
//!                 │     device, phase, owner, │
//!                 │     channels: ch -> Sink, │
//!                 │   }                       │
//!                 │ >                         │
//!                 └─────────────┬─────────────┘
//!                               │
//!         ┌─────────────────────┼─────────────────────┐
//!         │                     │                     │
//!         ▼                     ▼                     ▼
//!   [Dispatcher]           [Demuxer]            [Connection]
//!   upsert on CONNECT      route() -> Sink      release() on close
//! ```
//!
//! # Ownership
//!
//! Every session has one owning connection. A second CONNECT presenting the
//! same key overwrites the identity fields and takes ownership (last write
//! wins). Only the current owner's close releases the entry.

pub mod entry;
pub mod store;

pub use entry::{Session, SessionHandle, SessionSummary};
pub use store::{SessionRegistry, UpsertOutcome};
