//! Audio codec bridge
//!
//! ```text
//!                 sequence header (any state)
//!   Uninitialized ─────────────────────────────> Ready
//!        ^                                         │ access unit
//!        │ init failure                            v
//!        └──────────────────────────────────── Streaming ─┐
//!                                                   ^     │ access unit
//!                                                   └─────┘
//! ```
//!
//! Decoded PCM accumulates until a full 20 ms stereo block (3840 bytes at
//! 48 kHz) is available; each block becomes one Opus packet. After every
//! push the accumulator holds less than one block.

use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::{AudioDecoder, AudioEncoder, CodecError, CodecFactory, EncoderParams};
use crate::media::AudioSpecificConfig;

/// Opus clock rate
pub const CLOCK_RATE: u32 = 48_000;

const CHANNELS: usize = 2;

/// Interleaved samples per 20 ms block
pub const BLOCK_SAMPLES: usize = (CLOCK_RATE as usize / 50) * CHANNELS;

/// Bytes per 20 ms block of s16le stereo
pub const BLOCK_BYTES: usize = BLOCK_SAMPLES * 2;

pub const SAMPLE_DURATION: Duration = Duration::from_millis(20);

/// One Opus packet for the audio sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudioSample {
    pub data: Bytes,
    pub duration: Duration,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Access unit arrived before a usable sequence header
    #[error("audio codec not initialized, waiting for AAC sequence header")]
    NotReady,

    #[error("audio codec initialization failed: {0}")]
    Init(CodecError),

    #[error("AAC decode failed: {0}")]
    Runtime(CodecError),
}

/// Observable bridge state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgePhase {
    Uninitialized,
    Ready,
    Streaming,
}

struct Pipeline {
    decoder: Box<dyn AudioDecoder>,
    encoder: Box<dyn AudioEncoder>,
    pcm: BytesMut,
}

enum BridgeState {
    Uninitialized,
    Ready(Pipeline),
    Streaming(Pipeline),
}

/// Per-session AAC to Opus pipeline
pub struct AudioBridge {
    factory: Arc<dyn CodecFactory>,
    params: EncoderParams,
    state: BridgeState,
    config: Option<AudioSpecificConfig>,
    dropped_blocks: u64,
}

impl std::fmt::Debug for AudioBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioBridge")
            .field("phase", &self.phase())
            .field("buffered", &self.buffered_bytes())
            .field("dropped_blocks", &self.dropped_blocks)
            .finish()
    }
}

impl AudioBridge {
    pub fn new(factory: Arc<dyn CodecFactory>) -> Self {
        Self::with_params(factory, EncoderParams::webrtc())
    }

    pub fn with_params(factory: Arc<dyn CodecFactory>, params: EncoderParams) -> Self {
        Self {
            factory,
            params,
            state: BridgeState::Uninitialized,
            config: None,
            dropped_blocks: 0,
        }
    }

    pub fn phase(&self) -> BridgePhase {
        match self.state {
            BridgeState::Uninitialized => BridgePhase::Uninitialized,
            BridgeState::Ready(_) => BridgePhase::Ready,
            BridgeState::Streaming(_) => BridgePhase::Streaming,
        }
    }

    /// PCM bytes waiting for a full block
    pub fn buffered_bytes(&self) -> usize {
        self.pipeline().map(|p| p.pcm.len()).unwrap_or(0)
    }

    /// Blocks discarded because the encoder rejected them
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped_blocks
    }

    /// Configuration from the last accepted sequence header
    pub fn config(&self) -> Option<&AudioSpecificConfig> {
        self.config.as_ref()
    }

    /// Apply an AAC sequence header.
    ///
    /// Any existing decoder, encoder and buffered PCM are discarded first.
    /// On failure the bridge is left uninitialized.
    pub fn configure(&mut self, config: Bytes) -> Result<&AudioSpecificConfig, BridgeError> {
        self.reset();

        let config = AudioSpecificConfig::parse(config)
            .map_err(|e| BridgeError::Init(CodecError::new(e.to_string())))?;

        let decoder = self
            .factory
            .new_decoder(&config)
            .map_err(BridgeError::Init)?;
        let encoder = self
            .factory
            .new_encoder(&self.params)
            .map_err(BridgeError::Init)?;

        if config.sampling_frequency != self.params.sample_rate {
            tracing::warn!(
                aac_rate = config.sampling_frequency,
                opus_rate = self.params.sample_rate,
                "AAC sample rate differs from the Opus clock, PCM is not resampled"
            );
        }

        self.state = BridgeState::Ready(Pipeline {
            decoder,
            encoder,
            pcm: BytesMut::with_capacity(BLOCK_BYTES * 2),
        });
        Ok(self.config.insert(config))
    }

    /// Decode one raw AAC access unit and encode every complete block.
    ///
    /// A decode failure leaves the buffered PCM as it was.
    pub fn push_access_unit(
        &mut self,
        access_unit: &[u8],
    ) -> Result<Vec<EncodedAudioSample>, BridgeError> {
        let pipeline = self.pipeline_mut().ok_or(BridgeError::NotReady)?;

        let pcm = pipeline
            .decoder
            .decode(access_unit)
            .map_err(BridgeError::Runtime)?;
        pipeline.pcm.extend_from_slice(&pcm);

        let mut samples = Vec::with_capacity(pipeline.pcm.len() / BLOCK_BYTES);
        let mut dropped = 0;
        let mut block = [0i16; BLOCK_SAMPLES];
        while pipeline.pcm.len() >= BLOCK_BYTES {
            let bytes = pipeline.pcm.split_to(BLOCK_BYTES);
            for (sample, le) in block.iter_mut().zip(bytes.chunks_exact(2)) {
                *sample = i16::from_le_bytes([le[0], le[1]]);
            }

            match pipeline.encoder.encode(&block) {
                Ok(data) => samples.push(EncodedAudioSample {
                    data,
                    duration: SAMPLE_DURATION,
                }),
                Err(e) => {
                    dropped += 1;
                    tracing::warn!(error = %e, "Opus encode failed, dropping 20 ms block");
                }
            }
        }

        self.dropped_blocks += dropped;
        self.promote();
        Ok(samples)
    }

    /// Release codecs and buffered PCM
    pub fn reset(&mut self) {
        self.state = BridgeState::Uninitialized;
        self.config = None;
    }

    fn pipeline(&self) -> Option<&Pipeline> {
        match &self.state {
            BridgeState::Ready(p) | BridgeState::Streaming(p) => Some(p),
            BridgeState::Uninitialized => None,
        }
    }

    fn pipeline_mut(&mut self) -> Option<&mut Pipeline> {
        match &mut self.state {
            BridgeState::Ready(p) | BridgeState::Streaming(p) => Some(p),
            BridgeState::Uninitialized => None,
        }
    }

    fn promote(&mut self) {
        self.state = match std::mem::replace(&mut self.state, BridgeState::Uninitialized) {
            BridgeState::Ready(p) => BridgeState::Streaming(p),
            other => other,
        };
    }
}
