//! Listener loop

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::ForwardError;
use crate::relay::RelayEngine;
use crate::Result;

/// Bound listener plus the relay engine every accepted connection is handed to
pub struct Forwarder {
    listener: TcpListener,
    engine: RelayEngine,
}

impl Forwarder {
    /// Bind the local listener. A failure here is fatal to the caller.
    pub async fn bind(config: &Config) -> std::result::Result<Self, ForwardError> {
        Self::bind_addr(&config.listen_addr(), RelayEngine::from_config(config)).await
    }

    /// Bind `listen_addr` and forward to whatever `engine` dials
    pub async fn bind_addr(
        listen_addr: &str,
        engine: RelayEngine,
    ) -> std::result::Result<Self, ForwardError> {
        info!("Binding TCP listener to {}", listen_addr);
        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|source| ForwardError::Bind {
                addr: listen_addr.to_string(),
                source,
            })?;

        Ok(Self { listener, engine })
    }

    /// Address actually bound, useful when the configured port was 0
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn target_addr(&self) -> &str {
        self.engine.target_addr()
    }

    /// Accept connections until `shutdown` fires. Each connection is relayed
    /// on its own task; the loop never waits on a relay.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!(
            "Listening on {}, forwarding to {}",
            self.local_addr()?,
            self.engine.target_addr()
        );

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            info!(client_addr = %addr, "Accepted connection from {}", addr);
                            let engine = self.engine.clone();
                            tokio::spawn(async move {
                                engine.handle(stream, addr).await;
                            });
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Received shutdown signal, stopping connection acceptance");
                    break;
                }
            }
        }

        debug!("Closing listener");
        Ok(())
    }
}
