//! RTMP transport: handshake, chunk stream and message layer

pub mod chunk;
pub mod constants;
pub mod handshake;
pub mod message;

pub use chunk::{ChunkDecoder, ChunkEncoder, RawMessage};
pub use handshake::ServerHandshake;
pub use message::{Command, ConnectParams, PublishParams, RtmpMessage};
