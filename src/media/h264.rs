//! H.264/AVC handling
//!
//! RTMP carries H.264 as AVCC: NAL units prefixed by a 4-byte big-endian
//! length. WebRTC H.264 tracks expect Annex-B, where each NAL unit is
//! preceded by the start code `00 00 00 01`.
//!
//! AVCDecoderConfigurationRecord (sequence header):
//! ```text
//! configurationVersion (1) | AVCProfileIndication (1) | profile_compatibility (1)
//! | AVCLevelIndication (1) | lengthSizeMinusOne (1, lower 2 bits)
//! | numOfSPS (1, lower 5 bits) | { spsLength (2) | spsNALUnit }*
//! | numOfPPS (1) | { ppsLength (2) | ppsNALUnit }*
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::Duration;

use crate::error::MediaError;

/// Annex-B start code
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Every access unit is timed as one frame at 30 fps, regardless of the
/// publisher's real frame rate or message timestamps
pub const FRAME_DURATION: Duration = Duration::from_nanos(1_000_000_000 / 30);

/// AVC packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcPacketType {
    /// AVCDecoderConfigurationRecord
    SequenceHeader,
    /// One or more length-prefixed NAL units
    Nalu,
    EndOfSequence,
}

impl AvcPacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AvcPacketType::SequenceHeader),
            1 => Some(AvcPacketType::Nalu),
            2 => Some(AvcPacketType::EndOfSequence),
            _ => None,
        }
    }
}

/// NAL unit types the bridge looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    Slice,
    /// IDR slice (keyframe)
    Idr,
    Sei,
    Sps,
    Pps,
    Aud,
    Other(u8),
}

impl NaluType {
    pub fn from_header(b: u8) -> Self {
        match b & 0x1F {
            1 => NaluType::Slice,
            5 => NaluType::Idr,
            6 => NaluType::Sei,
            7 => NaluType::Sps,
            8 => NaluType::Pps,
            9 => NaluType::Aud,
            other => NaluType::Other(other),
        }
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NaluType::Sps | NaluType::Pps)
    }
}

/// One Annex-B access unit ready for the video sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    pub data: Bytes,
    pub duration: Duration,
    /// Contains an IDR slice
    pub has_idr: bool,
    /// Contains an SPS or PPS
    pub has_parameter_sets: bool,
}

impl AccessUnit {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Prepend Annex-B parameter sets
    pub fn with_prefix(self, prefix: &[u8]) -> Self {
        if prefix.is_empty() {
            return self;
        }
        let mut data = BytesMut::with_capacity(prefix.len() + self.data.len());
        data.put_slice(prefix);
        data.put_slice(&self.data);
        Self {
            data: data.freeze(),
            has_parameter_sets: true,
            ..self
        }
    }
}

/// Convert a 4-byte length-prefixed NAL sequence into Annex-B.
///
/// Records are emitted in order until one cannot be taken: fewer than four
/// bytes left, a record whose `offset + length` reaches or passes the end of
/// the buffer, or a body that would run past the end. Such a record and
/// anything after it are dropped. Note that a well-formed final record whose
/// length field satisfies `offset + length == buffer length` is also dropped.
pub fn reframe(buf: &[u8]) -> AccessUnit {
    let mut out = BytesMut::with_capacity(buf.len());
    let mut has_idr = false;
    let mut has_parameter_sets = false;

    let mut offset = 0usize;
    while offset < buf.len() {
        if buf.len() - offset < 4 {
            break;
        }
        let len = u32::from_be_bytes([
            buf[offset],
            buf[offset + 1],
            buf[offset + 2],
            buf[offset + 3],
        ]) as usize;

        if offset.saturating_add(len) >= buf.len() {
            break;
        }
        let start = offset + 4;
        let end = match start.checked_add(len) {
            Some(end) if end <= buf.len() => end,
            _ => break,
        };

        let nal = &buf[start..end];
        if let Some(&header) = nal.first() {
            let nal_type = NaluType::from_header(header);
            has_idr |= nal_type == NaluType::Idr;
            has_parameter_sets |= nal_type.is_parameter_set();
        }

        out.put_slice(&START_CODE);
        out.put_slice(nal);
        offset = end;
    }

    AccessUnit {
        data: out.freeze(),
        duration: FRAME_DURATION,
        has_idr,
        has_parameter_sets,
    }
}

/// AVC decoder configuration (from sequence header)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcConfig {
    /// AVC profile (66=Baseline, 77=Main, 100=High, etc.)
    pub profile: u8,
    pub compatibility: u8,
    /// AVC level (e.g., 31 = 3.1)
    pub level: u8,
    /// NAL length field size in bytes
    pub nalu_length_size: u8,
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
}

impl AvcConfig {
    /// Parse an AVCDecoderConfigurationRecord
    pub fn parse(data: Bytes) -> Result<Self, MediaError> {
        if data.len() < 7 {
            return Err(MediaError::InvalidAvcPacket);
        }
        let mut data = data;

        if data.get_u8() != 1 {
            return Err(MediaError::InvalidAvcPacket);
        }
        let profile = data.get_u8();
        let compatibility = data.get_u8();
        let level = data.get_u8();
        let nalu_length_size = (data.get_u8() & 0x03) + 1;

        let num_sps = (data.get_u8() & 0x1F) as usize;
        let sps = read_parameter_sets(&mut data, num_sps)?;

        if data.is_empty() {
            return Err(MediaError::InvalidAvcPacket);
        }
        let num_pps = data.get_u8() as usize;
        let pps = read_parameter_sets(&mut data, num_pps)?;

        Ok(AvcConfig {
            profile,
            compatibility,
            level,
            nalu_length_size,
            sps,
            pps,
        })
    }

    pub fn profile_name(&self) -> &'static str {
        match self.profile {
            66 => "Baseline",
            77 => "Main",
            88 => "Extended",
            100 => "High",
            110 => "High 10",
            122 => "High 4:2:2",
            244 => "High 4:4:4",
            _ => "Unknown",
        }
    }

    /// SPS then PPS, each behind a start code
    pub fn annexb_parameter_sets(&self) -> Bytes {
        let mut out = BytesMut::new();
        for nal in self.sps.iter().chain(self.pps.iter()) {
            out.put_slice(&START_CODE);
            out.put_slice(nal);
        }
        out.freeze()
    }
}

fn read_parameter_sets(data: &mut Bytes, count: usize) -> Result<Vec<Bytes>, MediaError> {
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        if data.len() < 2 {
            return Err(MediaError::InvalidAvcPacket);
        }
        let len = data.get_u16() as usize;
        if data.len() < len {
            return Err(MediaError::InvalidAvcPacket);
        }
        sets.push(data.split_to(len));
    }
    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reframe_two_records() {
        let input = [
            0x00, 0x00, 0x00, 0x03, 0x41, 0x42, 0x43, 0x00, 0x00, 0x00, 0x02, 0x44, 0x45,
        ];
        let au = reframe(&input);
        assert_eq!(
            &au.data[..],
            &[0x00, 0x00, 0x00, 0x01, 0x41, 0x42, 0x43, 0x00, 0x00, 0x00, 0x01, 0x44, 0x45]
        );
        assert_eq!(au.duration, FRAME_DURATION);
    }

    #[test]
    fn test_reframe_drops_record_reaching_buffer_end() {
        // Single record: offset 0 + len 3 == 3, but the buffer is 7 bytes,
        // so the record is taken
        let au = reframe(&[0x00, 0x00, 0x00, 0x03, 0x41, 0x42, 0x43]);
        assert_eq!(&au.data[..], &[0x00, 0x00, 0x00, 0x01, 0x41, 0x42, 0x43]);

        // Second record starts at 7 with len 6: 7 + 6 == 13 == buffer length
        let input = [
            0x00, 0x00, 0x00, 0x03, 0x41, 0x42, 0x43, 0x00, 0x00, 0x00, 0x06, 0x44,
            0x45,
        ];
        let au = reframe(&input);
        assert_eq!(&au.data[..], &[0x00, 0x00, 0x00, 0x01, 0x41, 0x42, 0x43]);
    }

    #[test]
    fn test_reframe_adversarial_lengths() {
        let inputs: [&[u8]; 6] = [
            &[],
            &[0x00, 0x00, 0x01],
            &[0xFF, 0xFF, 0xFF, 0xFF, 0x41],
            &[0x00, 0x00, 0x00, 0x02, 0x41, 0x42, 0x43],
            &[0x00, 0x00, 0x00, 0x01, 0x41, 0x7F, 0xFF, 0xFF, 0xFF, 0x00],
            &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
        ];
        for input in inputs {
            let au = reframe(input);
            assert!(au.data.len() <= input.len());
        }

        // Truncated body after one good record
        let au = reframe(&[0x00, 0x00, 0x00, 0x01, 0x41, 0x7F, 0xFF, 0xFF, 0xFF, 0x00]);
        assert_eq!(&au.data[..], &[0x00, 0x00, 0x00, 0x01, 0x41]);
    }

    #[test]
    fn test_reframe_zero_length_record() {
        // len 0 at offset 0 is taken as an empty NAL
        let au = reframe(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x65, 0x00]);
        assert_eq!(
            &au.data[..],
            &[0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x65]
        );
        assert!(au.has_idr);
    }

    #[test]
    fn test_reframe_flags() {
        let input = [
            0x00, 0x00, 0x00, 0x02, 0x67, 0x64, 0x00, 0x00, 0x00, 0x02, 0x65, 0x88, 0x00,
        ];
        let au = reframe(&input);
        assert!(au.has_idr);
        assert!(au.has_parameter_sets);

        let au = reframe(&[0x00, 0x00, 0x00, 0x01, 0x41, 0x00]);
        assert!(!au.has_idr);
        assert!(!au.has_parameter_sets);
    }

    #[test]
    fn test_frame_duration() {
        assert_eq!(FRAME_DURATION.as_nanos(), 33_333_333);
    }

    fn sample_config() -> Bytes {
        Bytes::from_static(&[
            0x01, // version
            0x64, // profile (High)
            0x00, // compatibility
            0x1F, // level 3.1
            0xFF, // nalu length size = 4
            0xE1, // 1 SPS
            0x00, 0x04, // SPS length
            0x67, 0x64, 0x00, 0x1F, // SPS data
            0x01, // 1 PPS
            0x00, 0x03, // PPS length
            0x68, 0xEF, 0x38, // PPS data
        ])
    }

    #[test]
    fn test_avc_config_parse() {
        let config = AvcConfig::parse(sample_config()).unwrap();
        assert_eq!(config.profile, 100);
        assert_eq!(config.level, 31);
        assert_eq!(config.nalu_length_size, 4);
        assert_eq!(config.sps.len(), 1);
        assert_eq!(config.pps.len(), 1);
        assert_eq!(config.profile_name(), "High");
    }

    #[test]
    fn test_avc_config_rejects_truncated() {
        let data = sample_config();
        assert_eq!(
            AvcConfig::parse(data.slice(..10)),
            Err(MediaError::InvalidAvcPacket)
        );
        assert_eq!(
            AvcConfig::parse(Bytes::from_static(&[0x02, 0, 0, 0, 0, 0, 0])),
            Err(MediaError::InvalidAvcPacket)
        );
    }

    #[test]
    fn test_parameter_sets_prefix() {
        let config = AvcConfig::parse(sample_config()).unwrap();
        let prefix = config.annexb_parameter_sets();
        assert_eq!(
            &prefix[..],
            &[0, 0, 0, 1, 0x67, 0x64, 0x00, 0x1F, 0, 0, 0, 1, 0x68, 0xEF, 0x38]
        );

        let au = reframe(&[0x00, 0x00, 0x00, 0x01, 0x65, 0x00]).with_prefix(&prefix);
        assert!(au.has_parameter_sets);
        assert!(au.data.starts_with(&prefix));
        assert!(au.data.ends_with(&[0, 0, 0, 1, 0x65]));
    }
}
