//! Opus encoding through libopus
//!
//! The encoder is driven through `audiopus_sys` directly because complexity
//! and maximum bandwidth are only reachable through `opus_encoder_ctl`.

use audiopus_sys as ffi;
use bytes::Bytes;
use std::ffi::CStr;
use std::ptr::NonNull;

use super::{Application, AudioEncoder, Bandwidth, Bitrate, CodecError, EncoderParams};

// Request and value codes from opus_defines.h
const OPUS_OK: i32 = 0;
const OPUS_AUTO: i32 = -1000;
const OPUS_BITRATE_MAX: i32 = -1;
const OPUS_APPLICATION_VOIP: i32 = 2048;
const OPUS_APPLICATION_AUDIO: i32 = 2049;
const OPUS_APPLICATION_RESTRICTED_LOWDELAY: i32 = 2051;
const OPUS_SET_BITRATE_REQUEST: i32 = 4002;
const OPUS_SET_MAX_BANDWIDTH_REQUEST: i32 = 4004;
const OPUS_SET_COMPLEXITY_REQUEST: i32 = 4010;
const OPUS_SET_INBAND_FEC_REQUEST: i32 = 4012;
const OPUS_BANDWIDTH_NARROWBAND: i32 = 1101;
const OPUS_BANDWIDTH_MEDIUMBAND: i32 = 1102;
const OPUS_BANDWIDTH_WIDEBAND: i32 = 1103;
const OPUS_BANDWIDTH_SUPERWIDEBAND: i32 = 1104;
const OPUS_BANDWIDTH_FULLBAND: i32 = 1105;

/// Recommended upper bound for one packet
const MAX_PACKET: usize = 4000;

/// libopus encoder handle
pub struct OpusEncoder {
    raw: NonNull<ffi::OpusEncoder>,
    channels: usize,
}

// SAFETY: the handle is owned exclusively and libopus keeps no thread-local
// state, so moving it between threads is sound. It is not shared (no Sync).
unsafe impl Send for OpusEncoder {}

impl OpusEncoder {
    pub fn new(params: &EncoderParams) -> Result<Self, CodecError> {
        if !matches!(params.channels, 1 | 2) {
            return Err(CodecError::new(format!(
                "Opus supports 1 or 2 channels, got {}",
                params.channels
            )));
        }
        if params.complexity > 10 {
            return Err(CodecError::new(format!(
                "Opus complexity must be 0-10, got {}",
                params.complexity
            )));
        }

        let application = match params.application {
            Application::Voip => OPUS_APPLICATION_VOIP,
            Application::Audio => OPUS_APPLICATION_AUDIO,
            Application::LowDelay => OPUS_APPLICATION_RESTRICTED_LOWDELAY,
        };

        let mut err: i32 = OPUS_OK;
        // SAFETY: plain constructor call; `err` outlives the call
        let raw = unsafe {
            ffi::opus_encoder_create(
                params.sample_rate as i32,
                i32::from(params.channels),
                application,
                &mut err,
            )
        };
        let raw = match NonNull::new(raw) {
            Some(raw) if err == OPUS_OK => raw,
            _ => return Err(opus_error("opus_encoder_create", err)),
        };

        let mut encoder = Self {
            raw,
            channels: usize::from(params.channels),
        };

        let bitrate = match params.bitrate {
            Bitrate::Auto => OPUS_AUTO,
            Bitrate::Max => OPUS_BITRATE_MAX,
            Bitrate::Bits(bits) => bits,
        };
        let bandwidth = match params.max_bandwidth {
            Bandwidth::Narrowband => OPUS_BANDWIDTH_NARROWBAND,
            Bandwidth::Mediumband => OPUS_BANDWIDTH_MEDIUMBAND,
            Bandwidth::Wideband => OPUS_BANDWIDTH_WIDEBAND,
            Bandwidth::Superwideband => OPUS_BANDWIDTH_SUPERWIDEBAND,
            Bandwidth::Fullband => OPUS_BANDWIDTH_FULLBAND,
        };

        encoder.ctl(OPUS_SET_BITRATE_REQUEST, bitrate)?;
        encoder.ctl(OPUS_SET_MAX_BANDWIDTH_REQUEST, bandwidth)?;
        encoder.ctl(OPUS_SET_COMPLEXITY_REQUEST, i32::from(params.complexity))?;
        encoder.ctl(OPUS_SET_INBAND_FEC_REQUEST, i32::from(params.inband_fec))?;

        Ok(encoder)
    }

    fn ctl(&mut self, request: i32, value: i32) -> Result<(), CodecError> {
        // SAFETY: every request used here takes a single opus_int32 argument
        let rc = unsafe { ffi::opus_encoder_ctl(self.raw.as_ptr(), request, value) };
        if rc == OPUS_OK {
            Ok(())
        } else {
            Err(opus_error("opus_encoder_ctl", rc))
        }
    }
}

impl AudioEncoder for OpusEncoder {
    fn encode(&mut self, pcm: &[i16]) -> Result<Bytes, CodecError> {
        if pcm.is_empty() || pcm.len() % self.channels != 0 {
            return Err(CodecError::new(format!(
                "PCM length {} is not a whole number of frames",
                pcm.len()
            )));
        }
        let frame_size = (pcm.len() / self.channels) as i32;

        let mut out = vec![0u8; MAX_PACKET];
        // SAFETY: `pcm` holds frame_size * channels samples and `out` is
        // MAX_PACKET bytes long
        let n = unsafe {
            ffi::opus_encode(
                self.raw.as_ptr(),
                pcm.as_ptr(),
                frame_size,
                out.as_mut_ptr(),
                MAX_PACKET as i32,
            )
        };
        if n < 0 {
            return Err(opus_error("opus_encode", n));
        }

        out.truncate(n as usize);
        Ok(Bytes::from(out))
    }
}

impl Drop for OpusEncoder {
    fn drop(&mut self) {
        // SAFETY: created by opus_encoder_create and destroyed exactly once
        unsafe { ffi::opus_encoder_destroy(self.raw.as_ptr()) }
    }
}

fn opus_error(call: &str, code: i32) -> CodecError {
    // SAFETY: opus_strerror returns a static NUL-terminated string for any code
    let msg = unsafe { CStr::from_ptr(ffi::opus_strerror(code)) };
    CodecError::new(format!("{} failed: {}", call, msg.to_string_lossy()))
}
