//! Sink registry
//!
//! Connects the single WebRTC viewer to the single active publishing
//! session.
//!
//! ```text
//!   Negotiator ── install_viewer ──┐
//!   peer failure ─ detach_viewer ──┤
//!                                  ▼
//!                       Arc<SinkRegistry>
//!                  ┌──────────────────────────┐
//!                  │ viewer: (id, SinkPair)   │
//!                  │ holder: session id       │
//!                  └────────────┬─────────────┘
//!                               │ bind / resolve / release
//!                               ▼
//!                     [Session] ── write_sample ──► tracks
//! ```
//!
//! A new viewer replaces (and closes) the old one; a new publish takes the
//! holder slot, and the superseded session is torn down as soon as its
//! lease sees the takeover.

pub mod error;
pub mod store;

pub use error::RegistryError;
pub use store::{BoundSinks, SessionId, SinkLease, SinkRegistry, ViewerId};
