//! Connection context
//!
//! Identity of one ingest connection, handed to the handler factory.

use std::net::SocketAddr;

use crate::registry::SessionId;

#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: SessionId,
    pub peer_addr: SocketAddr,
}

impl SessionContext {
    pub fn new(session_id: SessionId, peer_addr: SocketAddr) -> Self {
        Self {
            session_id,
            peer_addr,
        }
    }
}
