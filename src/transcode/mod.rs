//! AAC to Opus transcoding
//!
//! The [`AudioBridge`] owns one decoder/encoder pair per session. Codecs are
//! created through a [`CodecFactory`] so the pipeline can run against the
//! real AAC decoder and Opus encoder or against deterministic fakes.

pub mod aac_decoder;
pub mod bridge;
pub mod opus_encoder;

#[cfg(test)]
pub(crate) mod fake;

use bytes::Bytes;
use thiserror::Error;

use crate::media::AudioSpecificConfig;

pub use aac_decoder::AacDecoder;
pub use bridge::{
    AudioBridge, BridgeError, BridgePhase, EncodedAudioSample, BLOCK_BYTES, BLOCK_SAMPLES,
    CLOCK_RATE, SAMPLE_DURATION,
};
pub use opus_encoder::OpusEncoder;

/// Failure reported by a codec backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CodecError(pub String);

impl CodecError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Decodes AAC access units to interleaved stereo s16le PCM
pub trait AudioDecoder: Send {
    fn decode(&mut self, access_unit: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// Encodes one frame of interleaved i16 PCM into a packet
pub trait AudioEncoder: Send {
    fn encode(&mut self, pcm: &[i16]) -> Result<Bytes, CodecError>;
}

/// Creates codec instances for a session
pub trait CodecFactory: Send + Sync {
    fn new_decoder(&self, config: &AudioSpecificConfig)
        -> Result<Box<dyn AudioDecoder>, CodecError>;

    fn new_encoder(&self, params: &EncoderParams) -> Result<Box<dyn AudioEncoder>, CodecError>;
}

/// Opus application mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Application {
    Voip,
    Audio,
    LowDelay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bitrate {
    /// Let the encoder choose
    Auto,
    /// Use as many bits as the packet allows
    Max,
    Bits(i32),
}

/// Upper limit on the coded audio bandwidth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bandwidth {
    Narrowband,
    Mediumband,
    Wideband,
    Superwideband,
    Fullband,
}

/// Encoder configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderParams {
    pub sample_rate: u32,
    pub channels: u8,
    pub application: Application,
    pub bitrate: Bitrate,
    pub max_bandwidth: Bandwidth,
    /// 0..=10
    pub complexity: u8,
    pub inband_fec: bool,
}

impl EncoderParams {
    /// Parameters used for every WebRTC audio track
    pub const fn webrtc() -> Self {
        Self {
            sample_rate: CLOCK_RATE,
            channels: 2,
            application: Application::Audio,
            bitrate: Bitrate::Auto,
            max_bandwidth: Bandwidth::Fullband,
            complexity: 9,
            inband_fec: true,
        }
    }
}

impl Default for EncoderParams {
    fn default() -> Self {
        Self::webrtc()
    }
}

/// Symphonia AAC decoder and libopus encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCodecs;

impl CodecFactory for DefaultCodecs {
    fn new_decoder(
        &self,
        config: &AudioSpecificConfig,
    ) -> Result<Box<dyn AudioDecoder>, CodecError> {
        Ok(Box::new(AacDecoder::new(config)?))
    }

    fn new_encoder(&self, params: &EncoderParams) -> Result<Box<dyn AudioEncoder>, CodecError> {
        Ok(Box::new(OpusEncoder::new(params)?))
    }
}
