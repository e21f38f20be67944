//! Statistics for bridge sessions

use std::time::{Duration, Instant};

use crate::media::MediaKind;

/// Per-session counters, logged when the session ends
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub started_at: Instant,
    /// Payload bytes of audio and video messages
    pub bytes_received: u64,
    pub video_messages: u64,
    pub audio_messages: u64,
    /// Annex-B access units delivered or attempted
    pub access_units: u64,
    pub keyframes: u64,
    /// Opus packets produced
    pub audio_samples: u64,
    /// Messages dropped on demux or codec errors
    pub dropped_units: u64,
    /// Samples produced while no viewer was attached
    pub undelivered_samples: u64,
    pub sink_errors: u64,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            bytes_received: 0,
            video_messages: 0,
            audio_messages: 0,
            access_units: 0,
            keyframes: 0,
            audio_samples: 0,
            dropped_units: 0,
            undelivered_samples: 0,
            sink_errors: 0,
        }
    }
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_message(&mut self, kind: MediaKind, bytes: usize) {
        self.bytes_received += bytes as u64;
        match kind {
            MediaKind::Audio => self.audio_messages += 1,
            MediaKind::Video => self.video_messages += 1,
        }
    }

    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Average inbound bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration().as_secs();
        if secs > 0 {
            (self.bytes_received * 8) / secs
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_message() {
        let mut stats = SessionStats::new();
        stats.record_message(MediaKind::Video, 1000);
        stats.record_message(MediaKind::Audio, 24);
        stats.record_message(MediaKind::Audio, 24);

        assert_eq!(stats.video_messages, 1);
        assert_eq!(stats.audio_messages, 2);
        assert_eq!(stats.bytes_received, 1048);
    }

    #[test]
    fn test_bitrate_before_one_second() {
        let mut stats = SessionStats::new();
        stats.record_message(MediaKind::Video, 1_000_000);
        assert_eq!(stats.bitrate(), 0);
    }

    #[test]
    fn test_bitrate() {
        let stats = SessionStats {
            started_at: Instant::now() - Duration::from_secs(10),
            bytes_received: 1_250_000,
            ..SessionStats::default()
        };
        assert_eq!(stats.bitrate(), 1_000_000);
    }
}
