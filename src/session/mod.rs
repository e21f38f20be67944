//! Ingest sessions
//!
//! One [`SessionHandler`] per connection. A publish creates the session that
//! runs media through the reframer and the audio bridge into the bound
//! sinks.

pub mod context;
pub mod handler;

use thiserror::Error;

use crate::error::MediaError;
use crate::media::DemuxError;
use crate::registry::RegistryError;
use crate::transcode::BridgeError;

pub use context::SessionContext;
pub use handler::{BridgeHandlerFactory, HandlerFactory, IngestHandler, SessionHandler};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("publish rejected: stream name is empty")]
    InvalidPublishRequest,

    #[error("media received before publish")]
    NotPublishing,

    #[error("session is closed")]
    Closed,

    #[error(transparent)]
    Demux(#[from] DemuxError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Superseded(#[from] RegistryError),
}

impl SessionError {
    /// Errors after which the connection must not process further messages
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::InvalidPublishRequest | SessionError::Closed | SessionError::Superseded(_)
        )
    }
}
