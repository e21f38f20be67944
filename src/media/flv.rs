//! FLV audio/video tag demultiplexing
//!
//! Each RTMP audio or video message body is an FLV tag body without the
//! tag header. The first byte(s) form a codec sub-header; the rest is the
//! elementary payload.
//!
//! Video:
//! ```text
//! +-----------+---------+---------------+-------------------+--------
//! | FrameType | CodecID | AVCPacketType | CompositionTime   | Data
//! | (4 bits)  | (4 bits)| (1 byte)      | (3 bytes, SI24)   |
//! +-----------+---------+---------------+-------------------+--------
//! ```
//!
//! Audio:
//! ```text
//! +-------------+-----------+-----------+-----------+---------------+------
//! | SoundFormat | SoundRate | SoundSize | SoundType | AACPacketType | Data
//! | (4 bits)    | (2 bits)  | (1 bit)   | (1 bit)   | (1 byte)      |
//! +-------------+-----------+-----------+-----------+---------------+------
//! ```
//!
//! Only AAC audio and AVC video are accepted.

use bytes::Bytes;
use thiserror::Error;

use super::aac::AacPacketType;
use super::h264::AvcPacketType;

/// SoundFormat value for AAC
pub const SOUND_FORMAT_AAC: u8 = 10;

/// CodecID value for AVC
pub const CODEC_ID_AVC: u8 = 7;

const AUDIO_HEADER_LEN: usize = 2;
const VIDEO_HEADER_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// One audio or video message as delivered by the ingest transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Message timestamp in milliseconds
    pub timestamp: u32,
    pub kind: MediaKind,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn audio(timestamp: u32, payload: Bytes) -> Self {
        Self {
            timestamp,
            kind: MediaKind::Audio,
            payload,
        }
    }

    pub fn video(timestamp: u32, payload: Bytes) -> Self {
        Self {
            timestamp,
            kind: MediaKind::Video,
            payload,
        }
    }
}

/// Video frame type (upper 4 bits of the first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    Keyframe,
    InterFrame,
    DisposableInterFrame,
    GeneratedKeyframe,
    /// Video info/command frame
    Info,
}

impl VideoFrameType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            1 => Some(VideoFrameType::Keyframe),
            2 => Some(VideoFrameType::InterFrame),
            3 => Some(VideoFrameType::DisposableInterFrame),
            4 => Some(VideoFrameType::GeneratedKeyframe),
            5 => Some(VideoFrameType::Info),
            _ => None,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(
            self,
            VideoFrameType::Keyframe | VideoFrameType::GeneratedKeyframe
        )
    }
}

/// Audio sub-header fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTag {
    /// Nominal rate from SoundRate; AAC streams always claim 44100
    pub sound_rate: u32,
    pub sixteen_bit: bool,
    pub stereo: bool,
    pub packet_type: AacPacketType,
    /// AudioSpecificConfig or one raw AAC access unit
    pub data: Bytes,
}

/// Video sub-header fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTag {
    pub frame_type: VideoFrameType,
    pub packet_type: AvcPacketType,
    pub composition_time: i32,
    /// AVCDecoderConfigurationRecord or length-prefixed NAL units
    pub data: Bytes,
}

impl VideoTag {
    pub fn is_keyframe(&self) -> bool {
        self.frame_type.is_keyframe()
    }
}

/// Codec sub-header plus elementary bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaggedPayload {
    Audio(AudioTag),
    Video(VideoTag),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DemuxError {
    #[error("{kind} sub-header truncated ({len} bytes)")]
    Truncated { kind: MediaKind, len: usize },

    #[error("unsupported sound format {0}, only AAC is accepted")]
    UnsupportedAudioFormat(u8),

    #[error("unsupported video codec {0}, only AVC is accepted")]
    UnsupportedVideoCodec(u8),

    #[error("unknown {kind} packet type {value}")]
    UnknownPacketType { kind: MediaKind, value: u8 },

    #[error("unknown video frame type {0}")]
    UnknownFrameType(u8),

    #[error("audio message carries no data")]
    Empty,
}

/// Split a message into its codec sub-header and elementary payload.
///
/// The elementary bytes share the message's buffer.
pub fn demux(msg: &InboundMessage) -> Result<TaggedPayload, DemuxError> {
    match msg.kind {
        MediaKind::Audio => demux_audio(&msg.payload).map(TaggedPayload::Audio),
        MediaKind::Video => demux_video(&msg.payload).map(TaggedPayload::Video),
    }
}

fn demux_audio(payload: &Bytes) -> Result<AudioTag, DemuxError> {
    let Some(&first) = payload.first() else {
        return Err(DemuxError::Empty);
    };

    let format = first >> 4;
    if format != SOUND_FORMAT_AAC {
        return Err(DemuxError::UnsupportedAudioFormat(format));
    }
    if payload.len() < AUDIO_HEADER_LEN {
        return Err(DemuxError::Truncated {
            kind: MediaKind::Audio,
            len: payload.len(),
        });
    }

    let packet_type =
        AacPacketType::from_byte(payload[1]).ok_or(DemuxError::UnknownPacketType {
            kind: MediaKind::Audio,
            value: payload[1],
        })?;

    if payload.len() == AUDIO_HEADER_LEN {
        return Err(DemuxError::Empty);
    }

    let sound_rate = match (first >> 2) & 0x03 {
        0 => 5512,
        1 => 11025,
        2 => 22050,
        _ => 44100,
    };

    Ok(AudioTag {
        sound_rate,
        sixteen_bit: first & 0x02 != 0,
        stereo: first & 0x01 != 0,
        packet_type,
        data: payload.slice(AUDIO_HEADER_LEN..),
    })
}

fn demux_video(payload: &Bytes) -> Result<VideoTag, DemuxError> {
    let Some(&first) = payload.first() else {
        return Err(DemuxError::Truncated {
            kind: MediaKind::Video,
            len: 0,
        });
    };

    let codec = first & 0x0F;
    if codec != CODEC_ID_AVC {
        return Err(DemuxError::UnsupportedVideoCodec(codec));
    }
    let frame_type =
        VideoFrameType::from_byte(first).ok_or(DemuxError::UnknownFrameType(first >> 4))?;

    if payload.len() < VIDEO_HEADER_LEN {
        return Err(DemuxError::Truncated {
            kind: MediaKind::Video,
            len: payload.len(),
        });
    }

    let packet_type =
        AvcPacketType::from_byte(payload[1]).ok_or(DemuxError::UnknownPacketType {
            kind: MediaKind::Video,
            value: payload[1],
        })?;

    // Signed 24-bit, sign-extended through the top byte
    let raw = i32::from_be_bytes([0, payload[2], payload[3], payload[4]]);
    let composition_time = (raw << 8) >> 8;

    Ok(VideoTag {
        frame_type,
        packet_type,
        composition_time,
        data: payload.slice(VIDEO_HEADER_LEN..),
    })
}
