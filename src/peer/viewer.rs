//! Peer connection as a [`Viewer`]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use webrtc::media::Sample;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::sink::{MediaSink, SinkError, SinkPair, TimedSample, Viewer};

/// Writes samples to a local track; the track packetizes them into RTP
pub struct TrackSink {
    track: Arc<TrackLocalStaticSample>,
}

impl TrackSink {
    pub fn new(track: Arc<TrackLocalStaticSample>) -> Self {
        Self { track }
    }
}

#[async_trait]
impl MediaSink for TrackSink {
    async fn write_sample(&self, sample: TimedSample) -> Result<(), SinkError> {
        let sample = Sample {
            data: sample.data,
            duration: sample.duration,
            ..Default::default()
        };
        self.track
            .write_sample(&sample)
            .await
            .map_err(|e| SinkError::Write(e.to_string()))
    }
}

/// One WebRTC peer with an H.264 and an Opus track
pub struct PeerViewer {
    pc: Arc<RTCPeerConnection>,
    sinks: SinkPair,
    closed: AtomicBool,
}

impl PeerViewer {
    pub fn new(
        pc: Arc<RTCPeerConnection>,
        video: Arc<TrackLocalStaticSample>,
        audio: Arc<TrackLocalStaticSample>,
    ) -> Self {
        Self {
            pc,
            sinks: SinkPair {
                video: Arc::new(TrackSink::new(video)),
                audio: Arc::new(TrackSink::new(audio)),
            },
            closed: AtomicBool::new(false),
        }
    }

    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }
}

#[async_trait]
impl Viewer for PeerViewer {
    fn sinks(&self) -> SinkPair {
        self.sinks.clone()
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.pc.close().await {
            tracing::warn!(error = %e, "Failed to close peer connection");
        }
    }
}
