//! Ingest without WebRTC: runs the full pipeline into a counting viewer
//!
//! Run with: cargo run --example ingest_probe [BIND_ADDR]
//!
//! Publish with ffmpeg:
//!   ffmpeg -re -i input.mp4 -c:v libx264 -c:a aac -f flv rtmp://localhost/live/probe
//!
//! Prints sample counts every few seconds so the reframer and the Opus
//! encoder can be checked without a browser.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rtmp_webrtc_bridge::sink::SinkError;
use rtmp_webrtc_bridge::{
    BridgeHandlerFactory, DefaultCodecs, MediaSink, RtmpServer, ServerConfig, SinkPair,
    SinkRegistry, TimedSample, Viewer,
};

#[derive(Default)]
struct CountingSink {
    samples: AtomicU64,
    bytes: AtomicU64,
}

#[async_trait]
impl MediaSink for CountingSink {
    async fn write_sample(&self, sample: TimedSample) -> Result<(), SinkError> {
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.bytes
            .fetch_add(sample.data.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Default)]
struct CountingViewer {
    video: Arc<CountingSink>,
    audio: Arc<CountingSink>,
}

#[async_trait]
impl Viewer for CountingViewer {
    fn sinks(&self) -> SinkPair {
        SinkPair {
            video: self.video.clone(),
            audio: self.audio.clone(),
        }
    }

    async fn close(&self) {}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rtmp_webrtc_bridge=debug".into()),
        )
        .init();

    let addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "0.0.0.0:1935".to_string())
        .parse()?;

    let registry = Arc::new(SinkRegistry::new());
    let viewer = Arc::new(CountingViewer::default());
    registry.install_viewer(viewer.clone()).await;

    let stats = viewer.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            println!(
                "video: {} access units ({} bytes), audio: {} opus packets ({} bytes)",
                stats.video.samples.load(Ordering::Relaxed),
                stats.video.bytes.load(Ordering::Relaxed),
                stats.audio.samples.load(Ordering::Relaxed),
                stats.audio.bytes.load(Ordering::Relaxed),
            );
        }
    });

    let factory = BridgeHandlerFactory::new(registry, Arc::new(DefaultCodecs));
    let server = RtmpServer::new(ServerConfig::with_addr(addr), factory);
    println!("Publish to rtmp://{}/live/<name>", addr);

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
