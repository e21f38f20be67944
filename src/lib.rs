//! RTMP to WebRTC bridge
//!
//! A publisher pushes FLV-tagged H.264 + AAC over RTMP; a single WebRTC
//! viewer receives Annex-B H.264 and Opus.
//!
//! ```text
//! RTMP publisher ──> server::Connection ──> session::SessionHandler
//!                                              │ media::demux
//!                                  ┌───────────┴────────────┐
//!                          media::reframe         transcode::AudioBridge
//!                                  └───────────┬────────────┘
//!                                   registry::SinkRegistry
//!                                              │
//!                                  peer::PeerViewer tracks ──> browser
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rtmp_webrtc_bridge::{
//!     BridgeHandlerFactory, DefaultCodecs, RtmpServer, ServerConfig, SinkRegistry,
//! };
//!
//! # async fn example() -> rtmp_webrtc_bridge::error::Result<()> {
//! let registry = Arc::new(SinkRegistry::new());
//! let factory = BridgeHandlerFactory::new(registry.clone(), Arc::new(DefaultCodecs));
//! let server = RtmpServer::new(ServerConfig::default(), factory);
//! server.run().await
//! # }
//! ```

pub mod amf;
pub mod error;
pub mod http;
pub mod media;
pub mod peer;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod sink;
pub mod stats;
pub mod transcode;

pub use error::{Error, Result};
pub use registry::SinkRegistry;
pub use server::{RtmpServer, ServerConfig};
pub use session::{BridgeHandlerFactory, SessionHandler};
pub use sink::{MediaSink, SinkPair, TimedSample, Viewer};
pub use transcode::DefaultCodecs;
