//! Deterministic codecs for pipeline tests
//!
//! A fake access unit is `[len: u32 BE, fill]` and decodes to `len` bytes of
//! `fill`. Anything else fails to decode. The fake encoder returns the first
//! interleaved sample of its block and fails on blocks made of [`FAIL_FILL`].

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{AudioDecoder, AudioEncoder, CodecError, CodecFactory, EncoderParams};
use crate::media::AudioSpecificConfig;

pub const FAIL_FILL: u8 = 0xEE;

#[derive(Debug, Default)]
pub struct FakeCodecs {
    fail_init: AtomicBool,
    decoders: AtomicUsize,
}

impl FakeCodecs {
    pub fn unit(pcm_len: usize, fill: u8) -> Vec<u8> {
        let mut unit = (pcm_len as u32).to_be_bytes().to_vec();
        unit.push(fill);
        unit
    }

    pub fn corrupt_unit() -> Vec<u8> {
        vec![0xFF]
    }

    pub fn fail_init(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::SeqCst);
    }

    pub fn decoders_created(&self) -> usize {
        self.decoders.load(Ordering::SeqCst)
    }
}

impl CodecFactory for FakeCodecs {
    fn new_decoder(
        &self,
        _config: &AudioSpecificConfig,
    ) -> Result<Box<dyn AudioDecoder>, CodecError> {
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(CodecError::new("decoder rejected config"));
        }
        self.decoders.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeDecoder))
    }

    fn new_encoder(&self, _params: &EncoderParams) -> Result<Box<dyn AudioEncoder>, CodecError> {
        Ok(Box::new(FakeEncoder))
    }
}

struct FakeDecoder;

impl AudioDecoder for FakeDecoder {
    fn decode(&mut self, access_unit: &[u8]) -> Result<Vec<u8>, CodecError> {
        match access_unit {
            [a, b, c, d, fill] => {
                let len = u32::from_be_bytes([*a, *b, *c, *d]) as usize;
                Ok(vec![*fill; len])
            }
            _ => Err(CodecError::new("corrupt access unit")),
        }
    }
}

struct FakeEncoder;

impl AudioEncoder for FakeEncoder {
    fn encode(&mut self, pcm: &[i16]) -> Result<Bytes, CodecError> {
        let first = pcm.first().copied().unwrap_or_default();
        if first == i16::from_le_bytes([FAIL_FILL, FAIL_FILL]) {
            return Err(CodecError::new("encoder rejected block"));
        }
        Ok(Bytes::copy_from_slice(&first.to_le_bytes()))
    }
}
