//! Per-connection task
//!
//! ```text
//! handshake ──> read loop ──┬─> control messages (chunk size, abort, window)
//!                           ├─> commands ──> IngestHandler + replies
//!                           └─> audio/video ──> IngestHandler::on_media
//! ```
//!
//! Replies are queued in a write buffer and flushed once per read, so a burst
//! of commands is answered with one write.

use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::media::InboundMessage;
use crate::protocol::chunk::{ChunkDecoder, ChunkEncoder, RawMessage};
use crate::protocol::constants::*;
use crate::protocol::handshake::ServerHandshake;
use crate::protocol::message::{self, Command, ConnectParams, PublishParams, RtmpMessage};
use crate::registry::SessionId;
use crate::server::config::ServerConfig;
use crate::session::{IngestHandler, SessionError};

/// Message stream id handed out by `createStream`
const PUBLISH_STREAM_ID: u32 = 1;

enum Flow {
    Continue,
    Close,
}

/// One RTMP publisher connection driving an [`IngestHandler`]
pub struct Connection<H: IngestHandler> {
    session_id: SessionId,
    peer_addr: SocketAddr,
    socket: TcpStream,
    config: ServerConfig,
    handler: H,

    read_buf: BytesMut,
    write_buf: BytesMut,
    decoder: ChunkDecoder,
    encoder: ChunkEncoder,

    bytes_received: u64,
    last_ack: u64,
    /// Window announced by the peer; 0 until it sends one
    peer_window: u32,
}

impl<H: IngestHandler> Connection<H> {
    pub fn new(
        session_id: SessionId,
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: ServerConfig,
        handler: H,
    ) -> Self {
        let read_buf = BytesMut::with_capacity(config.read_buffer_size);
        Self {
            session_id,
            peer_addr,
            socket,
            config,
            handler,
            read_buf,
            write_buf: BytesMut::with_capacity(4096),
            decoder: ChunkDecoder::new(),
            encoder: ChunkEncoder::new(),
            bytes_received: 0,
            last_ack: 0,
            peer_window: 0,
        }
    }

    /// Serve the connection until it ends. The handler is closed on every path.
    pub async fn run(mut self) -> Result<()> {
        let result = self.serve().await;
        self.handler.on_close().await;
        let _ = self.socket.shutdown().await;

        tracing::debug!(
            session_id = self.session_id,
            peer = %self.peer_addr,
            bytes = self.bytes_received,
            "Connection finished"
        );
        result
    }

    async fn serve(&mut self) -> Result<()> {
        timeout(self.config.connection_timeout, self.handshake())
            .await
            .map_err(|_| Error::Timeout("handshake"))??;
        tracing::debug!(session_id = self.session_id, "Handshake complete");

        loop {
            while let Some(raw) = self.decoder.decode(&mut self.read_buf)? {
                if let Flow::Close = self.handle_raw(raw).await? {
                    self.flush().await?;
                    return Ok(());
                }
            }
            self.flush().await?;

            let read = timeout(
                self.config.idle_timeout,
                self.socket.read_buf(&mut self.read_buf),
            );
            let n = tokio::select! {
                read = read => read.map_err(|_| Error::Timeout("idle"))??,
                err = self.handler.superseded() => {
                    tracing::info!(session_id = self.session_id, "Output taken over by another publisher");
                    return Err(err.into());
                }
            };
            self.bytes_received += n as u64;
            if n == 0 {
                tracing::debug!(session_id = self.session_id, "Peer closed connection");
                return Ok(());
            }
            self.maybe_acknowledge();
        }
    }

    async fn handshake(&mut self) -> Result<()> {
        let mut handshake = ServerHandshake::new();
        loop {
            if let Some(reply) = handshake.process(&mut self.read_buf)? {
                self.socket.write_all(&reply).await?;
            }
            if handshake.is_done() {
                return Ok(());
            }
            if self.read_buf.len() < handshake.bytes_needed() && self.read_more().await? == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    async fn read_more(&mut self) -> Result<usize> {
        let n = self.socket.read_buf(&mut self.read_buf).await?;
        self.bytes_received += n as u64;
        Ok(n)
    }

    fn maybe_acknowledge(&mut self) {
        if self.peer_window == 0 {
            return;
        }
        if self.bytes_received - self.last_ack >= u64::from(self.peer_window) {
            self.last_ack = self.bytes_received;
            // Sequence number wraps at 32 bits
            self.queue(message::acknowledgement(self.bytes_received as u32));
        }
    }

    fn queue(&mut self, msg: RawMessage) {
        self.encoder.encode(&msg, &mut self.write_buf);
    }

    async fn flush(&mut self) -> Result<()> {
        if !self.write_buf.is_empty() {
            self.socket.write_all(&self.write_buf).await?;
            self.write_buf.clear();
        }
        Ok(())
    }

    async fn handle_raw(&mut self, raw: RawMessage) -> Result<Flow> {
        match RtmpMessage::from_raw(raw)? {
            RtmpMessage::SetChunkSize(size) => {
                self.decoder.set_chunk_size(size)?;
                tracing::debug!(session_id = self.session_id, size = size, "Peer chunk size");
            }
            RtmpMessage::Abort { csid } => self.decoder.abort(csid),
            RtmpMessage::WindowAckSize(size) => {
                self.peer_window = size;
            }
            RtmpMessage::Acknowledgement { .. }
            | RtmpMessage::SetPeerBandwidth { .. }
            | RtmpMessage::UserControl { .. } => {}
            RtmpMessage::Command(cmd) => return self.handle_command(cmd).await,
            RtmpMessage::Data(values) => {
                tracing::debug!(
                    session_id = self.session_id,
                    name = values.first().and_then(|v| v.as_str()).unwrap_or_default(),
                    "Data message ignored"
                );
            }
            RtmpMessage::Audio { timestamp, payload } => {
                return self.media(InboundMessage::audio(timestamp, payload)).await;
            }
            RtmpMessage::Video { timestamp, payload } => {
                return self.media(InboundMessage::video(timestamp, payload)).await;
            }
            RtmpMessage::Unknown { type_id, .. } => {
                tracing::debug!(
                    session_id = self.session_id,
                    type_id = type_id,
                    "Unknown message type"
                );
            }
        }
        Ok(Flow::Continue)
    }

    async fn media(&mut self, msg: InboundMessage) -> Result<Flow> {
        let kind = msg.kind;
        match self.handler.on_media(msg).await {
            Ok(()) => Ok(Flow::Continue),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(SessionError::Bridge(e)) => {
                tracing::debug!(session_id = self.session_id, error = %e, "Audio unit dropped");
                Ok(Flow::Continue)
            }
            Err(e) => {
                tracing::warn!(
                    session_id = self.session_id,
                    kind = %kind,
                    error = %e,
                    "Media message dropped"
                );
                Ok(Flow::Continue)
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) -> Result<Flow> {
        tracing::trace!(
            session_id = self.session_id,
            command = %cmd.name,
            transaction_id = cmd.transaction_id,
            "Command"
        );

        match cmd.name.as_str() {
            CMD_CONNECT => {
                let params = ConnectParams::from_command(&cmd);
                self.handler.on_connect(&params).await?;

                self.queue(message::window_ack_size(self.config.window_ack_size));
                self.queue(message::set_peer_bandwidth(
                    self.config.peer_bandwidth,
                    BANDWIDTH_LIMIT_DYNAMIC,
                ));
                self.queue(message::set_chunk_size(self.config.chunk_size));
                self.encoder.set_chunk_size(self.config.chunk_size);
                self.queue(message::connect_result(cmd.transaction_id));

                tracing::info!(
                    session_id = self.session_id,
                    peer = %self.peer_addr,
                    app = %params.app,
                    "Publisher connected"
                );
            }
            CMD_CREATE_STREAM => {
                self.handler.on_create_stream().await?;
                self.queue(message::create_stream_result(
                    cmd.transaction_id,
                    PUBLISH_STREAM_ID,
                ));
            }
            CMD_RELEASE_STREAM | CMD_FC_PUBLISH | CMD_FC_UNPUBLISH => {
                self.queue(message::empty_result(cmd.transaction_id));
            }
            CMD_PUBLISH => return self.publish(&cmd).await,
            CMD_DELETE_STREAM | CMD_CLOSE_STREAM => {
                tracing::info!(
                    session_id = self.session_id,
                    command = %cmd.name,
                    "Publisher ended stream"
                );
                return Ok(Flow::Close);
            }
            _ => {
                tracing::debug!(
                    session_id = self.session_id,
                    command = %cmd.name,
                    "Ignoring command"
                );
            }
        }
        Ok(Flow::Continue)
    }

    async fn publish(&mut self, cmd: &Command) -> Result<Flow> {
        let params = PublishParams::from_command(cmd);
        let stream_id = if params.stream_id == 0 {
            PUBLISH_STREAM_ID
        } else {
            params.stream_id
        };

        match self.handler.on_publish(&params).await {
            Ok(()) => {
                self.queue(message::stream_begin(stream_id));
                self.queue(message::on_status(
                    stream_id,
                    "status",
                    NS_PUBLISH_START,
                    &format!("{} is now published.", params.stream_name),
                ));
                Ok(Flow::Continue)
            }
            Err(SessionError::InvalidPublishRequest) => {
                self.queue(message::on_status(
                    stream_id,
                    "error",
                    NS_PUBLISH_BAD_NAME,
                    "Stream name is required.",
                ));
                Ok(Flow::Close)
            }
            Err(e) => Err(e.into()),
        }
    }
}
