//! `PairplayServer` builder and accept loop.
//!
//! Ties the layers together: the accept loop only takes TCP connections.
//! Each one gets its own task that runs the WebSocket upgrade, finds the
//! room named in the request path and joins it with the connection's token.

use std::sync::Arc;

use pairplay_protocol::{Codec, JsonCodec};
use pairplay_room::{Directory, RoomConfig};
use pairplay_session::SessionConfig;
use pairplay_transport::{WebSocketConnection, WebSocketTransport};

use crate::handler::handle_connection;
use crate::PairplayError;

/// Path under which rooms are served: `/ws/tetris/<room-id>`.
pub const DEFAULT_PATH_PREFIX: &str = "/ws/tetris/";

/// Shared server state passed to each connection task.
pub(crate) struct ServerState<K: Codec> {
    pub(crate) directory: Arc<Directory<WebSocketConnection, K>>,
    pub(crate) path_prefix: String,
}

/// Builder for configuring and starting a pairplay server.
///
/// # Example
///
/// ```rust,ignore
/// use pairplay::prelude::*;
///
/// let server = PairplayServer::builder()
///     .bind("0.0.0.0:8100")
///     .room_config(RoomConfig {
///         idle_timeout: Some(Duration::from_secs(600)),
///         ..RoomConfig::default()
///     })
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct PairplayServerBuilder {
    bind_addr: String,
    path_prefix: String,
    room_config: RoomConfig,
    session_config: SessionConfig,
}

impl PairplayServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8100".to_string(),
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
            room_config: RoomConfig::default(),
            session_config: SessionConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the path prefix that precedes the room id.
    pub fn path_prefix(mut self, prefix: &str) -> Self {
        self.path_prefix = prefix.to_string();
        self
    }

    /// Sets the room configuration (idle reaper).
    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    /// Sets the per-participant channel configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Binds the listener. Rooms speak JSON.
    pub async fn build(self) -> Result<PairplayServer, PairplayError> {
        self.build_with_codec(JsonCodec).await
    }

    /// Binds the listener with rooms that use `codec`.
    pub async fn build_with_codec<K: Codec + Clone>(
        self,
        codec: K,
    ) -> Result<PairplayServer<K>, PairplayError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let directory = Directory::with_codec(
            codec,
            self.room_config,
            self.session_config,
        );

        let state = Arc::new(ServerState {
            directory,
            path_prefix: self.path_prefix,
        });
        Ok(PairplayServer { transport, state })
    }
}

impl Default for PairplayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound pairplay server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct PairplayServer<K: Codec = JsonCodec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<K>>,
}

impl PairplayServer {
    /// Creates a new builder.
    pub fn builder() -> PairplayServerBuilder {
        PairplayServerBuilder::new()
    }
}

impl<K: Codec + Clone> PairplayServer<K> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The room directory, for introspection.
    pub fn directory(&self) -> &Arc<Directory<WebSocketConnection, K>> {
        &self.state.directory
    }

    /// Runs the accept loop.
    ///
    /// Starts the idle reaper if one is configured, then spawns a task per
    /// accepted connection. Runs until the process is terminated.
    pub async fn run(self) -> Result<(), PairplayError> {
        let _reaper = self.state.directory.spawn_reaper();
        tracing::info!(
            prefix = %self.state.path_prefix,
            "pairplay server running"
        );

        loop {
            match self.transport.accept_pending().await {
                Ok(pending) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(pending, state).await
                        {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }
    }
}
