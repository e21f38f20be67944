//! WebRTC viewer transport

pub mod negotiator;
pub mod viewer;

use thiserror::Error;

pub use negotiator::Negotiator;
pub use viewer::{PeerViewer, TrackSink};

#[derive(Error, Debug)]
pub enum NegotiationError {
    #[error("webrtc: {0}")]
    Rtc(#[from] webrtc::Error),

    /// The offer could not be applied as the remote description
    #[error("offer rejected: {0}")]
    InvalidOffer(#[source] webrtc::Error),

    #[error("no local description after ICE gathering")]
    NoLocalDescription,

    #[error("peer connection failed during negotiation")]
    PeerFailed,
}
