//! Session handler
//!
//! Receives connection lifecycle events and media messages in order, one at
//! a time, from the connection task that owns it.

use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;

use super::{SessionContext, SessionError};
use crate::media::{
    demux, reframe, AacPacketType, AudioTag, AvcConfig, AvcPacketType, InboundMessage, MediaKind,
    TaggedPayload, VideoTag,
};
use crate::protocol::message::{ConnectParams, PublishParams};
use crate::registry::{SessionId, SinkLease, SinkRegistry, ViewerId};
use crate::sink::TimedSample;
use crate::stats::SessionStats;
use crate::transcode::{AudioBridge, CodecFactory};

/// Connection lifecycle callbacks
///
/// Implementations may use `async fn`.
pub trait IngestHandler: Send {
    fn on_connect(
        &mut self,
        params: &ConnectParams,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    fn on_create_stream(&mut self) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Called for `publish`; an error rejects the publish
    fn on_publish(
        &mut self,
        params: &PublishParams,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// One audio or video message, in arrival order
    fn on_media(
        &mut self,
        msg: InboundMessage,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Always called once when the connection ends
    fn on_close(&mut self) -> impl Future<Output = ()> + Send;

    /// Resolves with a fatal error once another connection takes over this
    /// handler's output. Pending while nothing is published.
    fn superseded(&mut self) -> impl Future<Output = SessionError> + Send;
}

/// Creates one handler per accepted connection
pub trait HandlerFactory: Send + Sync + 'static {
    type Handler: IngestHandler + 'static;

    fn new_handler(&self, ctx: &SessionContext) -> Self::Handler;
}

/// Factory for [`SessionHandler`]s sharing one registry and codec backend
#[derive(Clone)]
pub struct BridgeHandlerFactory {
    registry: Arc<SinkRegistry>,
    codecs: Arc<dyn CodecFactory>,
}

impl BridgeHandlerFactory {
    pub fn new(registry: Arc<SinkRegistry>, codecs: Arc<dyn CodecFactory>) -> Self {
        Self { registry, codecs }
    }
}

impl HandlerFactory for BridgeHandlerFactory {
    type Handler = SessionHandler;

    fn new_handler(&self, ctx: &SessionContext) -> SessionHandler {
        SessionHandler::new(ctx.session_id, self.registry.clone(), self.codecs.clone())
    }
}

/// State of one publish
struct Session {
    stream_name: String,
    lease: SinkLease,
    bridge: AudioBridge,
    /// SPS + PPS in Annex-B, prepended to keyframes that lack them
    parameter_sets: Bytes,
    viewer_id: Option<ViewerId>,
    stats: SessionStats,
}

/// Bridges one publishing connection to the registry's sink pair
pub struct SessionHandler {
    session_id: SessionId,
    app: String,
    registry: Arc<SinkRegistry>,
    codecs: Arc<dyn CodecFactory>,
    session: Option<Session>,
    closed: bool,
}

impl SessionHandler {
    pub fn new(
        session_id: SessionId,
        registry: Arc<SinkRegistry>,
        codecs: Arc<dyn CodecFactory>,
    ) -> Self {
        Self {
            session_id,
            app: String::new(),
            registry,
            codecs,
            session: None,
            closed: false,
        }
    }

    pub fn is_publishing(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn stats(&self) -> Option<&SessionStats> {
        self.session.as_ref().map(|s| &s.stats)
    }

    /// PCM bytes buffered in the audio bridge
    pub fn buffered_audio(&self) -> usize {
        self.session
            .as_ref()
            .map(|s| s.bridge.buffered_bytes())
            .unwrap_or(0)
    }

    async fn end_session(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.bridge.reset();
        self.registry.release(session.lease).await;

        let stats = &session.stats;
        tracing::info!(
            session_id = self.session_id,
            stream = %session.stream_name,
            duration_secs = stats.duration().as_secs(),
            bitrate = stats.bitrate(),
            video_messages = stats.video_messages,
            audio_messages = stats.audio_messages,
            access_units = stats.access_units,
            keyframes = stats.keyframes,
            audio_samples = stats.audio_samples,
            dropped = stats.dropped_units,
            undelivered = stats.undelivered_samples,
            sink_errors = stats.sink_errors,
            "Session ended"
        );
    }
}

impl IngestHandler for SessionHandler {
    async fn on_connect(&mut self, params: &ConnectParams) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        self.app = params.app.clone();
        tracing::debug!(
            session_id = self.session_id,
            app = %params.app,
            tc_url = ?params.tc_url,
            "Connect"
        );
        Ok(())
    }

    async fn on_create_stream(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    async fn on_publish(&mut self, params: &PublishParams) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        if params.stream_name.is_empty() {
            tracing::warn!(session_id = self.session_id, "Publish without stream name rejected");
            return Err(SessionError::InvalidPublishRequest);
        }

        // A second publish on the same connection starts over
        self.end_session().await;

        let lease = self.registry.bind(self.session_id).await;
        self.session = Some(Session {
            stream_name: params.stream_name.clone(),
            lease,
            bridge: AudioBridge::new(self.codecs.clone()),
            parameter_sets: Bytes::new(),
            viewer_id: None,
            stats: SessionStats::new(),
        });

        tracing::info!(
            session_id = self.session_id,
            app = %self.app,
            stream = %params.stream_name,
            publish_type = %params.publish_type,
            "Publishing"
        );
        Ok(())
    }

    async fn on_media(&mut self, msg: InboundMessage) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        let session = self.session.as_mut().ok_or(SessionError::NotPublishing)?;
        if let Err(e) = session.lease.check() {
            tracing::info!(session_id = self.session_id, error = %e, "Session superseded");
            self.end_session().await;
            return Err(e.into());
        }
        session.stats.record_message(msg.kind, msg.payload.len());

        let result = match demux(&msg) {
            Ok(TaggedPayload::Video(tag)) => session.handle_video(&self.registry, tag).await,
            Ok(TaggedPayload::Audio(tag)) => session.handle_audio(&self.registry, tag).await,
            Err(e) => Err(e.into()),
        };

        match &result {
            Err(e) if e.is_fatal() => self.end_session().await,
            Err(_) => session.stats.dropped_units += 1,
            Ok(()) => {}
        }
        result
    }

    async fn on_close(&mut self) {
        if self.closed {
            return;
        }
        self.end_session().await;
        self.closed = true;
        tracing::debug!(session_id = self.session_id, "Handler closed");
    }

    async fn superseded(&mut self) -> SessionError {
        match self.session.as_mut() {
            Some(session) => session.lease.superseded().await.into(),
            None => std::future::pending().await,
        }
    }
}

impl Session {
    async fn handle_video(
        &mut self,
        registry: &SinkRegistry,
        tag: VideoTag,
    ) -> Result<(), SessionError> {
        match tag.packet_type {
            AvcPacketType::SequenceHeader => {
                let config = AvcConfig::parse(tag.data)?;
                self.parameter_sets = config.annexb_parameter_sets();
                tracing::info!(
                    stream = %self.stream_name,
                    profile = config.profile_name(),
                    level = config.level,
                    sps_count = config.sps.len(),
                    pps_count = config.pps.len(),
                    "AVC sequence header"
                );
                Ok(())
            }
            AvcPacketType::EndOfSequence => {
                tracing::debug!(stream = %self.stream_name, "AVC end of sequence");
                Ok(())
            }
            AvcPacketType::Nalu => {
                let mut au = reframe(&tag.data);
                if au.is_empty() {
                    return Ok(());
                }

                let keyframe = tag.is_keyframe() || au.has_idr;
                if keyframe {
                    self.stats.keyframes += 1;
                    if !au.has_parameter_sets {
                        au = au.with_prefix(&self.parameter_sets);
                    }
                }
                self.stats.access_units += 1;

                self.deliver(registry, MediaKind::Video, TimedSample::new(au.data, au.duration))
                    .await
            }
        }
    }

    async fn handle_audio(
        &mut self,
        registry: &SinkRegistry,
        tag: AudioTag,
    ) -> Result<(), SessionError> {
        match tag.packet_type {
            AacPacketType::SequenceHeader => {
                let config = self.bridge.configure(tag.data)?;
                tracing::info!(
                    stream = %self.stream_name,
                    profile = config.profile_name(),
                    sample_rate = config.sampling_frequency,
                    channels = config.channels(),
                    "AAC sequence header, audio bridge ready"
                );
                Ok(())
            }
            AacPacketType::Raw => {
                let samples = self.bridge.push_access_unit(&tag.data)?;
                for sample in samples {
                    self.stats.audio_samples += 1;
                    self.deliver(
                        registry,
                        MediaKind::Audio,
                        TimedSample::new(sample.data, sample.duration),
                    )
                    .await?;
                }
                Ok(())
            }
        }
    }

    /// Write to the current viewer. Sink failures are logged, not returned.
    async fn deliver(
        &mut self,
        registry: &SinkRegistry,
        kind: MediaKind,
        sample: TimedSample,
    ) -> Result<(), SessionError> {
        let Some(bound) = registry.resolve(&self.lease).await? else {
            self.stats.undelivered_samples += 1;
            return Ok(());
        };

        if self.viewer_id != Some(bound.viewer_id) {
            tracing::info!(
                session_id = self.lease.session_id(),
                stream = %self.stream_name,
                viewer = bound.viewer_id,
                "Delivering to viewer"
            );
            self.viewer_id = Some(bound.viewer_id);
        }

        let sink = match kind {
            MediaKind::Video => &bound.sinks.video,
            MediaKind::Audio => &bound.sinks.audio,
        };
        if let Err(e) = sink.write_sample(sample).await {
            self.stats.sink_errors += 1;
            tracing::warn!(
                stream = %self.stream_name,
                kind = %kind,
                error = %e,
                "Sink write failed"
            );
        }
        Ok(())
    }
}
