//! AAC configuration parsing
//!
//! RTMP transports raw AAC access units (no ADTS). The decoder is configured
//! from the AudioSpecificConfig sent once in the sequence header.

use bytes::Bytes;

use crate::error::MediaError;

/// AAC packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacPacketType {
    /// AudioSpecificConfig
    SequenceHeader,
    /// One raw AAC access unit
    Raw,
}

impl AacPacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AacPacketType::SequenceHeader),
            1 => Some(AacPacketType::Raw),
            _ => None,
        }
    }
}

/// AudioSpecificConfig (ISO 14496-3), leading fields only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    /// Audio object type (2 = AAC LC, 5 = SBR)
    pub audio_object_type: u8,
    pub sampling_frequency_index: u8,
    pub sampling_frequency: u32,
    /// 1 = mono, 2 = stereo, 0 = defined in stream
    pub channel_configuration: u8,
    /// 960-sample frames instead of 1024
    pub frame_length_flag: bool,
    pub raw: Bytes,
}

impl AudioSpecificConfig {
    const SAMPLING_FREQUENCIES: [u32; 13] = [
        96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
    ];

    pub fn parse(data: Bytes) -> Result<Self, MediaError> {
        if data.len() < 2 {
            return Err(MediaError::InvalidAacPacket);
        }

        // 5 bits object type, 4 bits frequency index, [24 bits explicit rate],
        // 4 bits channel configuration, then GASpecificConfig flags
        let b0 = data[0];
        let b1 = data[1];

        let audio_object_type = (b0 >> 3) & 0x1F;
        if audio_object_type == 0 || audio_object_type == 31 {
            return Err(MediaError::InvalidAacPacket);
        }
        let sampling_frequency_index = ((b0 & 0x07) << 1) | (b1 >> 7);

        let (sampling_frequency, channel_configuration, frame_length_flag) =
            if sampling_frequency_index == 0x0F {
                if data.len() < 5 {
                    return Err(MediaError::InvalidAacPacket);
                }
                let rate = (u32::from(b1 & 0x7F) << 17)
                    | (u32::from(data[2]) << 9)
                    | (u32::from(data[3]) << 1)
                    | u32::from(data[4] >> 7);
                let channels = (data[4] >> 3) & 0x0F;
                (rate, channels, data[4] & 0x04 != 0)
            } else {
                let rate = Self::SAMPLING_FREQUENCIES
                    .get(sampling_frequency_index as usize)
                    .copied()
                    .ok_or(MediaError::InvalidAacPacket)?;
                (rate, (b1 >> 3) & 0x0F, b1 & 0x04 != 0)
            };

        Ok(AudioSpecificConfig {
            audio_object_type,
            sampling_frequency_index,
            sampling_frequency,
            channel_configuration,
            frame_length_flag,
            raw: data,
        })
    }

    pub fn profile_name(&self) -> &'static str {
        match self.audio_object_type {
            1 => "AAC Main",
            2 => "AAC LC",
            3 => "AAC SSR",
            4 => "AAC LTP",
            5 => "HE-AAC",
            29 => "HE-AACv2",
            _ => "AAC",
        }
    }

    /// Channel count implied by the configuration, 0 when signalled in-band
    pub fn channels(&self) -> u8 {
        match self.channel_configuration {
            7 => 8,
            c @ 0..=6 => c,
            _ => 0,
        }
    }

    pub fn samples_per_frame(&self) -> u32 {
        if self.frame_length_flag {
            960
        } else {
            1024
        }
    }
}
