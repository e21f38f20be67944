//! Registry error types

use thiserror::Error;

use super::store::SessionId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Another session bound the sink pair after this one
    #[error("session {session_id} no longer holds the sink pair (holder: {holder:?})")]
    Superseded {
        session_id: SessionId,
        holder: Option<SessionId>,
    },
}
