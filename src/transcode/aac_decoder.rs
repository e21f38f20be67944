//! AAC decoding via symphonia

use symphonia::core::audio::{Channels, SampleBuffer};
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_AAC};
use symphonia::core::formats::Packet;

use super::{AudioDecoder, CodecError};
use crate::media::AudioSpecificConfig;

/// Raw AAC access unit decoder producing interleaved stereo s16le
pub struct AacDecoder {
    decoder: Box<dyn Decoder>,
    /// Running timestamp in frames, only used to label packets
    ts: u64,
    frame_len: u64,
}

impl AacDecoder {
    pub fn new(config: &AudioSpecificConfig) -> Result<Self, CodecError> {
        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_AAC)
            .with_sample_rate(config.sampling_frequency)
            .with_extra_data(config.raw.to_vec().into_boxed_slice());

        let layout = match config.channels() {
            1 => Some(Channels::FRONT_LEFT),
            2 => Some(Channels::FRONT_LEFT | Channels::FRONT_RIGHT),
            _ => None,
        };
        if let Some(channels) = layout {
            params.with_channels(channels);
        }

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| CodecError::new(format!("AAC decoder: {}", e)))?;

        Ok(Self {
            decoder,
            ts: 0,
            frame_len: u64::from(config.samples_per_frame()),
        })
    }
}

impl AudioDecoder for AacDecoder {
    fn decode(&mut self, access_unit: &[u8]) -> Result<Vec<u8>, CodecError> {
        let packet = Packet::new_from_slice(0, self.ts, self.frame_len, access_unit);
        let decoded = self
            .decoder
            .decode(&packet)
            .map_err(|e| CodecError::new(e.to_string()))?;

        let spec = *decoded.spec();
        let frames = decoded.frames();
        self.ts += frames as u64;
        if frames == 0 {
            return Ok(Vec::new());
        }

        let mut samples = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        samples.copy_interleaved_ref(decoded);

        Ok(interleave_stereo(samples.samples(), spec.channels.count()))
    }
}

/// Interleaved samples with `channels` per frame to stereo s16le bytes.
///
/// Mono is duplicated to both channels; channels beyond the first two are
/// dropped.
pub(crate) fn interleave_stereo(samples: &[i16], channels: usize) -> Vec<u8> {
    if channels == 0 {
        return Vec::new();
    }

    let frames = samples.len() / channels;
    let mut out = Vec::with_capacity(frames * 4);
    for frame in samples.chunks_exact(channels) {
        let left = frame[0];
        let right = if channels == 1 { frame[0] } else { frame[1] };
        out.extend_from_slice(&left.to_le_bytes());
        out.extend_from_slice(&right.to_le_bytes());
    }
    out
}
