//! Crate-level error types
//!
//! Transport errors (handshake, chunking, AMF) live here. Pipeline errors
//! are defined next to the component that raises them:
//! [`DemuxError`](crate::media::DemuxError),
//! [`BridgeError`](crate::transcode::BridgeError) and
//! [`SessionError`](crate::session::SessionError).

use thiserror::Error;

use crate::session::SessionError;

/// Top-level error for the ingest transport
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("AMF error: {0}")]
    Amf(#[from] AmfError),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("timed out: {0}")]
    Timeout(&'static str),

    #[error("connection closed by peer")]
    ConnectionClosed,
}

/// Handshake failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("unsupported RTMP version {0}")]
    InvalidVersion(u8),
}

/// Chunk stream and message layer failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("chunk header references unknown chunk stream {0}")]
    UnknownChunkStream(u32),

    #[error("invalid chunk size {0}")]
    InvalidChunkSize(u32),

    #[error("message of {0} bytes exceeds limit")]
    MessageTooLarge(u32),

    #[error("chunk stream {csid} declares {length} bytes after {received} were received")]
    LengthMismatch {
        csid: u32,
        length: u32,
        received: usize,
    },

    #[error("malformed {0} message")]
    MalformedMessage(&'static str),

    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

/// AMF0 decoding failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmfError {
    #[error("unexpected end of AMF data")]
    UnexpectedEof,

    #[error("AMF nesting too deep")]
    NestingTooDeep,

    #[error("invalid UTF-8 in AMF string")]
    InvalidUtf8,

    #[error("unknown AMF0 marker 0x{0:02x}")]
    UnknownMarker(u8),
}

/// Codec configuration parsing failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaError {
    #[error("invalid AVC decoder configuration record")]
    InvalidAvcPacket,

    #[error("invalid AAC audio specific config")]
    InvalidAacPacket,
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, Error>;
