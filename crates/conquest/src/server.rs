//! `ConquestServer` builder and server loop.
//!
//! This is the entry point for running a Conquest server. It ties the
//! layers together: transport → gateway → session store → session actors,
//! plus the expiry sweeper and the HTTP status surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use conquest_protocol::{Codec, JsonCodec};
use conquest_runtime::SessionStore;
use conquest_session::SessionConfig;
use conquest_transport::{Transport, WebSocketTransport};
use conquest_turn::RuleEngine;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::gateway::handle_connection;
use crate::{ConquestError, ServerConfig, http};

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Shared server state passed to each connection task and HTTP handler.
pub(crate) struct ServerState<G: RuleEngine, C: Codec> {
    pub(crate) store: Mutex<SessionStore<G>>,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
    pub(crate) started: Instant,
}

impl<G: RuleEngine, C: Codec> ServerState<G, C> {
    /// Milliseconds since the server started; used for envelope
    /// timestamps and `server_time`.
    pub(crate) fn clock(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Builder for configuring and starting a Conquest server.
///
/// # Example
///
/// ```rust,ignore
/// use conquest::prelude::*;
///
/// let server = ConquestServer::builder()
///     .bind("0.0.0.0:8080")
///     .http_bind("0.0.0.0:8081")
///     .build::<MyGame>(MyGameConfig::default())
///     .await?;
/// server.run().await
/// ```
pub struct ConquestServerBuilder {
    config: ServerConfig,
}

impl ConquestServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Starts from an existing configuration, e.g. one read with
    /// [`ServerConfig::from_env`].
    pub fn from_config(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Sets the WebSocket listen address.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    /// Sets the HTTP status listen address.
    pub fn http_bind(mut self, addr: &str) -> Self {
        self.config.http_bind = Some(addr.to_string());
        self
    }

    /// Turns the HTTP status surface off.
    pub fn without_http(mut self) -> Self {
        self.config.http_bind = None;
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Binds the listeners and builds the server for game `G`.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<G: RuleEngine>(
        self,
        game_config: G::Config,
    ) -> Result<ConquestServer<G, JsonCodec>, ConquestError> {
        self.config.validate()?;

        let transport = WebSocketTransport::bind(&self.config.bind).await?;
        let http = match &self.config.http_bind {
            Some(addr) => Some(TcpListener::bind(addr).await?),
            None => None,
        };

        let state = Arc::new(ServerState {
            store: Mutex::new(SessionStore::new(
                self.config.session.clone(),
                game_config,
            )),
            codec: JsonCodec,
            config: self.config,
            started: Instant::now(),
        });

        Ok(ConquestServer {
            transport,
            http,
            state,
        })
    }
}

impl Default for ConquestServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A Conquest server with its listeners bound.
///
/// Call [`run()`](Self::run) to start serving.
pub struct ConquestServer<G: RuleEngine, C: Codec> {
    transport: WebSocketTransport,
    http: Option<TcpListener>,
    state: Arc<ServerState<G, C>>,
}

impl<G, C> ConquestServer<G, C>
where
    G: RuleEngine,
    C: Codec,
{
    /// Creates a new builder.
    pub fn builder() -> ConquestServerBuilder {
        ConquestServerBuilder::new()
    }

    /// Returns the WebSocket address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Returns the HTTP status address, if the surface is enabled.
    pub fn http_addr(&self) -> Option<std::io::Result<SocketAddr>> {
        self.http.as_ref().map(TcpListener::local_addr)
    }

    /// The HTTP status routes, sharing this server's state. Useful for
    /// mounting them elsewhere or driving them in-process.
    pub fn http_router(&self) -> axum::Router {
        http::router(Arc::clone(&self.state))
    }

    /// Runs the server: the expiry sweeper, the HTTP surface (if bound)
    /// and the WebSocket accept loop. Runs until the process is
    /// terminated.
    pub async fn run(mut self) -> Result<(), ConquestError> {
        tokio::spawn(sweep_expired(Arc::clone(&self.state)));

        if let Some(listener) = self.http.take() {
            let router = http::router(Arc::clone(&self.state));
            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, router).await {
                    tracing::error!(error = %e, "http surface stopped");
                }
            });
        }

        tracing::info!(
            bind = %self.state.config.bind,
            http = ?self.state.config.http_bind,
            "Conquest server running"
        );

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection::<G, C>(conn, state).await {
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

/// Periodically removes expired and stopped sessions.
async fn sweep_expired<G: RuleEngine, C: Codec>(state: Arc<ServerState<G, C>>) {
    let mut ticker = tokio::time::interval(state.config.sweep_interval);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let removed = state.store.lock().await.remove_expired(Instant::now()).await;
        if !removed.is_empty() {
            tracing::info!(count = removed.len(), "swept sessions");
        }
    }
}
