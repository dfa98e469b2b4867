//! Sandbox server lifecycle management.
//!
//! Binds before spawning, so callers asking for port 0 learn the real port
//! from [`SandboxServer::addr`].

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::rest::{build_router, ApiState};

/// Handle to a sandbox running on a background task
pub struct SandboxServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task_handle: Option<JoinHandle<()>>,
}

impl SandboxServer {
    /// Bind `addr` and serve in the background
    pub async fn spawn(state: ApiState, addr: SocketAddr) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind sandbox to {}", addr))?;
        let addr = listener
            .local_addr()
            .context("Failed to read sandbox address")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let router = build_router(state);

        let handle = tokio::spawn(async move {
            tracing::info!("Sandbox listening on http://{}", addr);
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!("Sandbox server failed: {}", e);
            }
        });

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(handle),
        })
    }

    /// Loopback on an ephemeral port
    pub async fn spawn_local(state: ApiState) -> Result<Self> {
        Self::spawn(state, SocketAddr::from(([127, 0, 0, 1], 0))).await
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL suitable for `backend.base_url`
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting connections and wait for the server task
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
        tracing::info!("Sandbox server stopped");
    }
}

impl Drop for SandboxServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::FlowRegistry;

    #[tokio::test]
    async fn test_spawn_on_ephemeral_port() {
        let server = SandboxServer::spawn_local(ApiState::new(FlowRegistry::new()))
            .await
            .unwrap();
        assert_ne!(server.addr().port(), 0);
        assert!(server.base_url().starts_with("http://127.0.0.1:"));
        server.shutdown().await;
    }
}
