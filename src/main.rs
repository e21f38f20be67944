use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use rtmp_webrtc_bridge::http::{build_router, AppState};
use rtmp_webrtc_bridge::peer::Negotiator;
use rtmp_webrtc_bridge::{
    BridgeHandlerFactory, DefaultCodecs, RtmpServer, ServerConfig, SinkRegistry,
};

/// Bridge an RTMP publisher to a WebRTC viewer
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// RTMP ingest address
    #[arg(long, env = "BRIDGE_RTMP_ADDR", default_value = "0.0.0.0:1935")]
    rtmp_addr: SocketAddr,

    /// HTTP address for the negotiation endpoint and static files
    #[arg(long, env = "BRIDGE_HTTP_ADDR", default_value = "0.0.0.0:8080")]
    http_addr: SocketAddr,

    /// Directory served for any path other than /createPeerConnection
    #[arg(long, env = "BRIDGE_STATIC_DIR", default_value = "static")]
    static_dir: PathBuf,

    /// STUN/TURN server URLs, comma separated
    #[arg(long, env = "BRIDGE_ICE_SERVERS", value_delimiter = ',')]
    ice_servers: Vec<String>,

    /// Maximum concurrent RTMP connections (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_connections: usize,

    /// Seconds without inbound data before an RTMP connection is dropped
    #[arg(long, default_value_t = 30)]
    idle_timeout: u64,
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rtmp_webrtc_bridge=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();

    let registry = Arc::new(SinkRegistry::new());
    let negotiator = Arc::new(Negotiator::new(registry.clone(), &args.ice_servers)?);

    let config = ServerConfig::with_addr(args.rtmp_addr)
        .max_connections(args.max_connections)
        .idle_timeout(Duration::from_secs(args.idle_timeout));
    let factory = BridgeHandlerFactory::new(registry.clone(), Arc::new(DefaultCodecs));
    let rtmp = RtmpServer::new(config, factory);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut rx = shutdown_rx.clone();
    let rtmp_task = tokio::spawn(async move {
        rtmp.run_until(async move {
            let _ = rx.wait_for(|stop| *stop).await;
        })
        .await
    });

    let listener = TcpListener::bind(args.http_addr).await?;
    tracing::info!(addr = %args.http_addr, static_dir = %args.static_dir.display(), "HTTP server listening");
    let app = build_router(AppState { negotiator }, &args.static_dir);

    let mut rx = shutdown_rx;
    let http_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.wait_for(|stop| *stop).await;
            })
            .await
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(true);

    rtmp_task.await??;
    http_task.await??;
    registry.close_all().await;
    Ok(())
}
