//! `SeminarServer` builder and server loop.
//!
//! The entry point for running a coordination server. It wires the
//! layers together — transport → protocol → services → live
//! coordination → gateway — spawns the expiry sweep, and accepts live
//! connections until the process is terminated.

use std::sync::Arc;

use seminar_gateway::AppState;
use seminar_live::{Coordinator, LiveConfig, spawn_expiry_sweep};
use seminar_protocol::JsonCodec;
use seminar_session::{ParticipantRegistry, RoleAuthority, SessionLifecycle};
use seminar_store::Store;
use seminar_transport::{Transport, WebSocketTransport};

use crate::SeminarError;
use crate::handler::handle_connection;

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState {
    pub(crate) coordinator: Arc<Coordinator>,
    pub(crate) authority: Arc<dyn RoleAuthority>,
    pub(crate) codec: JsonCodec,
    pub(crate) config: LiveConfig,
}

/// Builder for configuring and starting a Seminar server.
///
/// # Example
///
/// ```rust,ignore
/// let server = SeminarServer::builder()
///     .bind("0.0.0.0:8080")
///     .gateway_bind("0.0.0.0:8081")
///     .build(store, authority)
///     .await?;
/// server.run().await
/// ```
pub struct SeminarServerBuilder {
    bind_addr: String,
    gateway_addr: Option<String>,
    config: LiveConfig,
}

impl SeminarServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            gateway_addr: None,
            config: LiveConfig::default(),
        }
    }

    /// Sets the address for the live WebSocket listener.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Enables the REST gateway on the given address. Without this the
    /// server runs live connections only.
    pub fn gateway_bind(mut self, addr: &str) -> Self {
        self.gateway_addr = Some(addr.to_string());
        self
    }

    /// Sets the live-layer tunables (sweep interval, receive timeout).
    pub fn live_config(mut self, config: LiveConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the server: binds the listeners and assembles the service
    /// stack on top of the given store and role authority.
    pub async fn build(
        self,
        store: Arc<dyn Store>,
        authority: Arc<dyn RoleAuthority>,
    ) -> Result<SeminarServer, SeminarError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let gateway = match &self.gateway_addr {
            Some(addr) => Some(tokio::net::TcpListener::bind(addr).await.map_err(|e| {
                SeminarError::Config(format!("gateway bind {addr}: {e}"))
            })?),
            None => None,
        };

        let lifecycle = SessionLifecycle::new(Arc::clone(&store));
        let registry = ParticipantRegistry::new(store);
        let coordinator = Arc::new(Coordinator::new(lifecycle, registry));

        let state = Arc::new(ServerState {
            coordinator,
            authority,
            codec: JsonCodec,
            config: self.config,
        });

        Ok(SeminarServer {
            transport,
            gateway,
            state,
        })
    }
}

impl Default for SeminarServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Seminar coordination server.
///
/// Call [`run()`](Self::run) to start the sweep, the gateway, and the
/// accept loop.
pub struct SeminarServer {
    transport: WebSocketTransport,
    gateway: Option<tokio::net::TcpListener>,
    state: Arc<ServerState>,
}

impl SeminarServer {
    /// Creates a new builder.
    pub fn builder() -> SeminarServerBuilder {
        SeminarServerBuilder::new()
    }

    /// Returns the local address of the live WebSocket listener.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Returns the local address of the REST gateway, when enabled.
    pub fn gateway_addr(&self) -> Option<std::net::SocketAddr> {
        self.gateway.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// The coordinator backing this server. Useful for embedding and for
    /// driving the domain directly in tests.
    pub fn coordinator(&self) -> Arc<Coordinator> {
        Arc::clone(&self.state.coordinator)
    }

    /// Runs the server until the process is terminated.
    ///
    /// Spawns the expiry sweep and (when configured) the REST gateway,
    /// then accepts live connections, one handler task each.
    pub async fn run(mut self) -> Result<(), SeminarError> {
        let _sweep = spawn_expiry_sweep(
            Arc::clone(&self.state.coordinator),
            self.state.config.sweep_interval,
        );

        if let Some(listener) = self.gateway.take() {
            let app = seminar_gateway::router(AppState::new(
                Arc::clone(&self.state.coordinator),
                Arc::clone(&self.state.authority),
            ));
            let addr = listener.local_addr().ok();
            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!(error = %e, "gateway server exited");
                }
            });
            if let Some(addr) = addr {
                tracing::info!(%addr, "REST gateway running");
            }
        }

        tracing::info!("Seminar server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
