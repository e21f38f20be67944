//! Inbound media handling
//!
//! - FLV sub-header demultiplexing
//! - H.264 AVCC to Annex-B reframing and parameter sets
//! - AAC AudioSpecificConfig parsing

pub mod aac;
pub mod flv;
pub mod h264;

pub use aac::{AacPacketType, AudioSpecificConfig};
pub use flv::{demux, AudioTag, DemuxError, InboundMessage, MediaKind, TaggedPayload, VideoTag};
pub use h264::{reframe, AccessUnit, AvcConfig, AvcPacketType, NaluType, FRAME_DURATION};
