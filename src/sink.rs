//! Output sinks
//!
//! A viewer exposes one sink per media type. Sessions push timed samples
//! into them without knowing what transport sits behind.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Self-contained sample with its playout duration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedSample {
    pub data: Bytes,
    pub duration: Duration,
}

impl TimedSample {
    pub fn new(data: Bytes, duration: Duration) -> Self {
        Self { data, duration }
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink is closed")]
    Closed,

    #[error("sample write failed: {0}")]
    Write(String),
}

#[async_trait]
pub trait MediaSink: Send + Sync {
    async fn write_sample(&self, sample: TimedSample) -> Result<(), SinkError>;
}

/// Video and audio sinks of one viewer
#[derive(Clone)]
pub struct SinkPair {
    pub video: Arc<dyn MediaSink>,
    pub audio: Arc<dyn MediaSink>,
}

impl std::fmt::Debug for SinkPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkPair").finish_non_exhaustive()
    }
}

/// Remote endpoint consuming one sink pair
#[async_trait]
pub trait Viewer: Send + Sync {
    fn sinks(&self) -> SinkPair;

    /// Tear down the transport. Must be idempotent.
    async fn close(&self);
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Sink that stores every sample, optionally failing all writes
    #[derive(Default)]
    pub struct RecordingSink {
        samples: Mutex<Vec<TimedSample>>,
        fail: AtomicBool,
    }

    impl RecordingSink {
        pub fn failing() -> Self {
            let sink = Self::default();
            sink.fail.store(true, Ordering::SeqCst);
            sink
        }

        pub fn samples(&self) -> Vec<TimedSample> {
            self.samples.lock().map(|s| s.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl MediaSink for RecordingSink {
        async fn write_sample(&self, sample: TimedSample) -> Result<(), SinkError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SinkError::Write("rejected".into()));
            }
            self.samples.lock().unwrap().push(sample);
            Ok(())
        }
    }

    /// Viewer backed by two recording sinks
    #[derive(Default)]
    pub struct RecordingViewer {
        pub video: Arc<RecordingSink>,
        pub audio: Arc<RecordingSink>,
        closes: AtomicUsize,
    }

    impl RecordingViewer {
        pub fn with_sinks(video: RecordingSink, audio: RecordingSink) -> Self {
            Self {
                video: Arc::new(video),
                audio: Arc::new(audio),
                closes: AtomicUsize::new(0),
            }
        }

        pub fn close_count(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Viewer for RecordingViewer {
        fn sinks(&self) -> SinkPair {
            SinkPair {
                video: self.video.clone(),
                audio: self.audio.clone(),
            }
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
