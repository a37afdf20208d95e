// ============================================
// File: crates/securechat-server/src/server.rs
// ============================================
//! # Server Orchestrator
//!
//! ## Creation Reason
//! Main relay implementation that wires storage, auth and routing to the
//! TCP listener and manages the server lifecycle.
//!
//! ## Main Functionality
//! - `Server`: Main server struct and lifecycle management
//! - One task per accepted connection, bounded by `max_clients`
//! - Graceful shutdown via Ctrl+C or [`Server::shutdown`]
//!
//! ## Server Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Server                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │                  Accept Loop                        │   │
//! │  │   permit ◄── Semaphore(max_clients)                 │   │
//! │  │   accept ──► spawn connection task                  │   │
//! │  └──────────────────────┬──────────────────────────────┘   │
//! │                         ▼                                   │
//! │  ┌──────────────┐   ┌──────────────────┐  ┌─────────────┐  │
//! │  │ Reader loop  │──►│ConnectionHandler │─►│ Writer task │  │
//! │  │ (per conn)   │   │                  │  │ (per conn)  │  │
//! │  └──────────────┘   └────────┬─────────┘  └─────────────┘  │
//! │                              ▼                              │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │  AuthService ─► IdentityDirectory      Router       │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Connection tasks own their state; only the directory and router
//!   are shared
//! - Shutdown waits up to 5 seconds for connection tasks to clean up
//!
//! ## Last Modified
//! v0.1.0 - Initial relay server

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use securechat_transport::{TcpLineConnection, TcpLineListener, DEFAULT_QUEUE_CAPACITY};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::handlers::{ConnectionHandler, ConnectionState};
use crate::services::{
    AuthService, IdentityDirectory, JsonFileDirectory, MemoryDirectory, Router,
};

/// How long shutdown waits for connection tasks.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ============================================
// Server
// ============================================

/// Main relay server.
///
/// # Lifecycle
/// 1. Create with `Server::new(config)`
/// 2. Start with `server.run().await`
/// 3. Shutdown via Ctrl+C or `server.shutdown()`
pub struct Server {
    /// Server configuration.
    config: ServerConfig,
    /// Shared identity storage.
    directory: Arc<dyn IdentityDirectory>,
    /// Logged-in client routes.
    router: Arc<Router>,
    /// Per-line command processing.
    handler: Arc<ConnectionHandler>,
    /// Shutdown flag.
    shutdown: Arc<AtomicBool>,
    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Creates a server, opening the configured directory.
    ///
    /// Without `storage.directory_path` identities live in memory only.
    ///
    /// # Errors
    /// `Storage` if the directory file exists but cannot be read.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let directory: Arc<dyn IdentityDirectory> = match &config.storage.directory_path {
            Some(path) => Arc::new(JsonFileDirectory::open(path.clone())?),
            None => {
                warn!("No directory_path configured, identities will not survive a restart");
                Arc::new(MemoryDirectory::new())
            }
        };
        Ok(Self::with_directory(config, directory))
    }

    /// Creates a server over an existing directory.
    #[must_use]
    pub fn with_directory(config: ServerConfig, directory: Arc<dyn IdentityDirectory>) -> Self {
        let auth = Arc::new(AuthService::new(
            Arc::clone(&directory),
            config.signup_timeout(),
        ));
        let router = Arc::new(Router::new());
        let handler = Arc::new(ConnectionHandler::new(auth, Arc::clone(&router)));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            directory,
            router,
            handler,
            shutdown: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// The live routing table.
    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// The identity directory.
    #[must_use]
    pub fn directory(&self) -> &Arc<dyn IdentityDirectory> {
        &self.directory
    }

    /// Runs the server until Ctrl+C or [`Server::shutdown`].
    ///
    /// # Errors
    /// Returns error if the listener cannot be bound or accepting fails
    /// fatally.
    pub async fn run(&self) -> Result<()> {
        info!("Starting securechat relay v{}", env!("CARGO_PKG_VERSION"));

        let listener = TcpLineListener::bind(self.config.listen_addr())
            .map_err(|e| ServerError::startup_failed(format!("TCP bind failed: {e}")))?;

        let signal_task = self.spawn_signal_task();
        let result = self.serve(listener).await;
        signal_task.abort();

        result
    }

    /// Accepts connections on `listener` until shutdown.
    ///
    /// # Errors
    /// Returns error on a fatal accept failure.
    pub async fn serve(&self, listener: TcpLineListener) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let max_clients = self.config.network.max_clients;
        let slots = Arc::new(Semaphore::new(max_clients));

        info!(
            addr = %listener.local_addr(),
            max_clients,
            identities = self.directory.len(),
            "Server started successfully"
        );

        let mut outcome = Ok(());
        while !self.shutdown.load(Ordering::SeqCst) {
            let permit = tokio::select! {
                _ = shutdown_rx.recv() => break,
                permit = Arc::clone(&slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let accepted = tokio::select! {
                _ = shutdown_rx.recv() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((connection, peer)) => self.spawn_connection(connection, peer, permit),
                Err(e) if e.is_fatal() => {
                    error!("Accept failed: {}", e);
                    outcome = Err(e.into());
                    break;
                }
                Err(e) => warn!("Accept error: {}", e),
            }
        }

        info!("Shutting down server...");
        self.shutdown();

        info!(
            connected = self.router.count(),
            clients = ?self.router.connected_ids(),
            longest = ?self.router.longest_connected(),
            "Relay statistics at shutdown"
        );

        let in_flight = u32::try_from(max_clients).unwrap_or(u32::MAX);
        match tokio::time::timeout(SHUTDOWN_GRACE, slots.acquire_many(in_flight)).await {
            Ok(_) => debug!("All connections closed"),
            Err(_) => warn!("Connections still open after shutdown grace period"),
        }

        info!("Server shutdown complete");
        outcome
    }

    /// Spawns the task owning one connection.
    fn spawn_connection(
        &self,
        connection: TcpLineConnection,
        peer: SocketAddr,
        permit: OwnedSemaphorePermit,
    ) {
        let handler = Arc::clone(&self.handler);
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let (mut reader, queue, writer) = connection.into_parts(DEFAULT_QUEUE_CAPACITY);
            let mut state = ConnectionState::new(peer.to_string(), queue);

            handler.serve(&mut reader, &mut state, shutdown_rx).await;

            // Dropping the last queue handle lets the writer flush and exit
            drop(state);
            if tokio::time::timeout(SHUTDOWN_GRACE, writer).await.is_err() {
                debug!(peer = %peer, "Writer did not finish in time");
            }
            drop(permit);
        });
    }

    /// Spawns the Ctrl+C watcher.
    fn spawn_signal_task(&self) -> JoinHandle<()> {
        let shutdown = Arc::clone(&self.shutdown);
        let shutdown_tx = self.shutdown_tx.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => {}
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => info!("Received shutdown signal"),
                        Err(e) => {
                            warn!("Failed to listen for Ctrl+C: {}", e);
                            return;
                        }
                    }
                    shutdown.store(true, Ordering::SeqCst);
                    let _ = shutdown_tx.send(());
                }
            }
        })
    }

    /// Triggers server shutdown programmatically.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// Returns `true` once shutdown has been requested.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listen_addr", &self.config.network.listen_addr)
            .field("max_clients", &self.config.network.max_clients)
            .field("directory", &self.directory)
            .field("router", &self.router)
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use securechat_core::crypto::IdentityKeyPair;
    use securechat_core::protocol::Command;
    use securechat_transport::{LineSink, LineSource};

    fn test_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.network.listen_addr = "127.0.0.1:0".parse().unwrap();
        config.network.max_clients = 4;
        config
    }

    async fn next(reader: &mut impl LineSource) -> String {
        tokio::time::timeout(Duration::from_secs(5), reader.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_signup_over_tcp_and_shutdown() {
        let server = Arc::new(Server::new(test_config()).unwrap());
        let listener = TcpLineListener::bind(server.config.listen_addr()).unwrap();
        let addr = listener.local_addr().to_string();

        let running = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(listener).await })
        };

        let key = IdentityKeyPair::generate(1024).unwrap();
        let (mut reader, queue, _writer) = TcpLineConnection::connect(&addr)
            .await
            .unwrap()
            .into_parts(8);

        queue
            .send_line(format!("SIGNUP alice {}", key.public_key()))
            .await
            .unwrap();
        let reply: Command = next(&mut reader).await.parse().unwrap();
        let Command::SignupSuccess { client_id } = reply else {
            panic!("unexpected reply {reply:?}");
        };

        queue.send_line(format!("LOGIN {client_id}")).await.unwrap();
        let Command::LoginNonce(challenge) = next(&mut reader).await.parse::<Command>().unwrap() else {
            panic!("expected LOGIN_NONCE");
        };
        let signature = key.sign(&challenge.signing_text()).unwrap();
        queue.send_line(format!("LOGIN_ACCEPT {signature}")).await.unwrap();
        assert_eq!(next(&mut reader).await, "LOGIN_SUCCESS");
        assert!(server.router().is_connected(client_id));

        server.shutdown();
        assert!(server.is_shutting_down());
        running.await.unwrap().unwrap();
        assert!(server.router().is_empty());
    }

    #[test]
    fn test_debug_format() {
        let server = Server::with_directory(test_config(), Arc::new(MemoryDirectory::new()));
        let debug = format!("{server:?}");
        assert!(debug.contains("max_clients"));
        assert!(server.directory().is_empty());
    }
}
