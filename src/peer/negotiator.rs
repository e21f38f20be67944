//! Offer/answer negotiation
//!
//! Each offer gets a fresh peer connection with one H.264 and one Opus
//! track. The answer is returned only after ICE gathering completes, so the
//! viewer needs no trickle channel. Negotiations run one at a time; the
//! latest viewer replaces the previous one in the registry.

use std::sync::{Arc, Weak};

use tokio::sync::Mutex;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264, MIME_TYPE_OPUS};
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use super::viewer::PeerViewer;
use super::NegotiationError;
use crate::registry::{SinkRegistry, ViewerId};
use crate::transcode::CLOCK_RATE;

const STREAM_ID: &str = "rtmp-bridge";

pub struct Negotiator {
    api: API,
    rtc_config: RTCConfiguration,
    registry: Arc<SinkRegistry>,
    lock: Mutex<()>,
}

impl Negotiator {
    /// `ice_servers` are STUN/TURN URLs; empty means host candidates only
    pub fn new(registry: Arc<SinkRegistry>, ice_servers: &[String]) -> Result<Self, NegotiationError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let interceptors = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptors)
            .build();

        let ice_servers = if ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: ice_servers.to_vec(),
                ..Default::default()
            }]
        };

        Ok(Self {
            api,
            rtc_config: RTCConfiguration {
                ice_servers,
                ..Default::default()
            },
            registry,
            lock: Mutex::new(()),
        })
    }

    /// Answer `offer` and install the new peer as the viewer
    pub async fn negotiate(
        &self,
        offer: RTCSessionDescription,
    ) -> Result<RTCSessionDescription, NegotiationError> {
        let _guard = self.lock.lock().await;

        let pc = Arc::new(self.api.new_peer_connection(self.rtc_config.clone()).await?);
        let (viewer, answer) = match self.answer(&pc, offer).await {
            Ok(ok) => ok,
            Err(e) => {
                let _ = pc.close().await;
                return Err(e);
            }
        };

        let viewer_id = self.registry.install_viewer(Arc::new(viewer)).await;
        watch_state(&pc, viewer_id, Arc::downgrade(&self.registry));
        if matches!(
            pc.connection_state(),
            RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed
        ) {
            self.registry.detach_viewer(viewer_id).await;
            return Err(NegotiationError::PeerFailed);
        }

        tracing::info!(viewer = viewer_id, "Viewer negotiated");
        Ok(answer)
    }

    async fn answer(
        &self,
        pc: &Arc<RTCPeerConnection>,
        offer: RTCSessionDescription,
    ) -> Result<(PeerViewer, RTCSessionDescription), NegotiationError> {
        let video = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_H264.to_owned(),
                ..Default::default()
            },
            "video".to_owned(),
            STREAM_ID.to_owned(),
        ));
        let audio = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: CLOCK_RATE,
                channels: 2,
                ..Default::default()
            },
            "audio".to_owned(),
            STREAM_ID.to_owned(),
        ));

        let sender = pc
            .add_track(Arc::clone(&video) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;
        drain_rtcp(sender);
        let sender = pc
            .add_track(Arc::clone(&audio) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;
        drain_rtcp(sender);

        pc.set_remote_description(offer)
            .await
            .map_err(NegotiationError::InvalidOffer)?;
        let answer = pc.create_answer(None).await?;

        let mut gathered = pc.gathering_complete_promise().await;
        pc.set_local_description(answer).await?;
        let _ = gathered.recv().await;

        let local = pc
            .local_description()
            .await
            .ok_or(NegotiationError::NoLocalDescription)?;

        Ok((PeerViewer::new(Arc::clone(pc), video, audio), local))
    }
}

/// Detach the viewer once its connection fails or closes
fn watch_state(pc: &RTCPeerConnection, viewer_id: ViewerId, registry: Weak<SinkRegistry>) {
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let registry = registry.clone();
        Box::pin(async move {
            tracing::info!(viewer = viewer_id, state = %state, "Peer connection state");
            if !matches!(
                state,
                RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed
            ) {
                return;
            }
            // The registry may be closing this very viewer under its lock
            if let Some(registry) = registry.upgrade() {
                tokio::spawn(async move {
                    registry.detach_viewer(viewer_id).await;
                });
            }
        })
    }));
}

/// RTCP must be read for interceptors (NACK, reports) to run
fn drain_rtcp(sender: Arc<RTCRtpSender>) {
    tokio::spawn(async move {
        let mut buf = vec![0u8; 1500];
        while sender.read(&mut buf).await.is_ok() {}
    });
}
