//! RTMP ingest listener
//!
//! Accepts TCP connections and spawns one [`Connection`] task per publisher.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::session::{HandlerFactory, SessionContext};

/// RTMP server
pub struct RtmpServer<F: HandlerFactory> {
    config: ServerConfig,
    factory: Arc<F>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl<F: HandlerFactory> RtmpServer<F> {
    pub fn new(config: ServerConfig, factory: F) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            factory: Arc::new(factory),
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Bind and serve until the process ends
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, std::future::pending::<()>()).await
    }

    /// Bind and serve until `shutdown` resolves
    pub async fn run_until<S>(&self, shutdown: S) -> Result<()>
    where
        S: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<S>(&self, listener: TcpListener, shutdown: S) -> Result<()>
    where
        S: std::future::Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "RTMP server listening");

        tokio::select! {
            _ = shutdown => {
                tracing::info!("RTMP server shutting down");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => self.handle_connection(socket, peer_addr),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        let permit = match &self.connection_semaphore {
            Some(sem) => match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            },
            None => None,
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session_id = session_id, peer = %peer_addr, "New connection");

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let ctx = SessionContext::new(session_id, peer_addr);
        let handler = self.factory.new_handler(&ctx);
        let connection = Connection::new(session_id, socket, peer_addr, self.config.clone(), handler);

        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = connection.run().await {
                tracing::info!(session_id = session_id, error = %e, "Connection error");
            }
        });
    }
}
