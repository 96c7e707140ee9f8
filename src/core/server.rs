//! Connection listener that feeds accepted sockets into the matchmaker

use log::{info, warn};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::core::matchmaker::Matchmaker;
use crate::error::{Result, RustyCaroError};
use crate::handlers::session::handle_tcp_client;

/// Listening server with its shared matchmaker
pub struct GameServer {
    listener: TcpListener,
    matchmaker: Arc<Matchmaker>,
    config: Arc<ServerConfig>,
}

impl GameServer {
    /// Bind the listening socket; failing to bind is fatal for startup
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let address = config.bind_address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            RustyCaroError::SystemError(format!("Failed to bind {}: {}", address, e))
        })?;

        Ok(Self {
            listener,
            matchmaker: Arc::new(Matchmaker::from_config(&config)),
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn matchmaker(&self) -> Arc<Matchmaker> {
        self.matchmaker.clone()
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Stopping only stops listening; sessions already running keep going.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        info!(
            "Caro server listening on {} (board {}x{}, rematch {:?}, on disconnect {:?})",
            addr,
            self.config.board_size,
            self.config.board_size,
            self.config.rematch_policy,
            self.config.disconnect_policy
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("No longer accepting connections on {}", addr);
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                        }
                        tokio::spawn(handle_tcp_client(
                            stream,
                            self.matchmaker.clone(),
                            self.config.clone(),
                        ));
                    }
                    Err(e) => warn!("Failed to accept connection: {}", e),
                },
            }
        }
    }

    /// Accept connections forever
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }
}
