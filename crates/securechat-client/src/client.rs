// ============================================
// File: crates/securechat-client/src/client.rs
// ============================================
//! # Client Event Loop
//!
//! ## Creation Reason
//! Connects to the relay and runs the single task that owns all client
//! state, multiplexing relay lines, console lines and a timer.
//!
//! ## Event Loop
//! ```text
//!            ┌──────────────── tokio::select! ────────────────┐
//!  relay ───►│ server.next_line()  ─► handle_server_line      │
//!  stdin ───►│ user.next_line()    ─► handle_user_line        │──► Effects
//!  timer ───►│ ticker.tick()       ─► tick (handshake timeout)│     │
//!            └────────────────────────────────────────────────┘     │
//!                        notices ─► console   outbound ─► OutboundQueue
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Console input is read by its own task and fed through a channel so
//!   the loop can treat it like any other line source
//! - The loop ends on `-exit`, end of console input, relay disconnect
//!   or Ctrl+C
//!
//! ## Last Modified
//! v0.1.0 - Initial event loop

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use securechat_transport::{
    ChannelLineSource, LineSink, LineSource, OutboundQueue, TcpLineConnection,
    DEFAULT_QUEUE_CAPACITY,
};

use crate::config::ClientConfig;
use crate::effects::Notice;
use crate::error::Result;
use crate::handlers::{ChatClient, Flow};
use crate::services::{ClientStore, JsonFileStore, MemoryStore};

/// How often the loop checks for stalled key exchanges.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// How long to wait for queued lines to reach the relay on exit.
const FLUSH_GRACE: Duration = Duration::from_secs(2);

// ============================================
// Client
// ============================================

/// Interactive client bound to one relay.
///
/// # Lifecycle
/// 1. Create with `Client::new(config)`
/// 2. Run with `client.run().await` until the user exits
pub struct Client {
    config: ClientConfig,
    store: Arc<dyn ClientStore>,
}

impl Client {
    /// Creates a client, opening the configured store.
    ///
    /// # Errors
    /// `Storage` if the store file exists but cannot be read.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let store: Arc<dyn ClientStore> = match &config.storage.store_path {
            Some(path) => Arc::new(JsonFileStore::open(path.clone())?),
            None => {
                warn!("No store_path configured, the identity will be lost on exit");
                Arc::new(MemoryStore::new())
            }
        };
        Ok(Self::with_store(config, store))
    }

    /// Creates a client over an existing store.
    #[must_use]
    pub fn with_store(config: ClientConfig, store: Arc<dyn ClientStore>) -> Self {
        Self { config, store }
    }

    /// The local store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ClientStore> {
        &self.store
    }

    /// Connects and runs the console session until it ends.
    ///
    /// # Errors
    /// `Transport` if the relay cannot be reached or the connection fails.
    pub async fn run(&self) -> Result<()> {
        let connection = TcpLineConnection::connect(&self.config.network.server_addr).await?;
        info!(relay = ?connection.peer_addr(), "Connected to relay");
        let (mut reader, queue, writer) = connection.into_parts(DEFAULT_QUEUE_CAPACITY);

        let (console_tx, console_rx) = mpsc::channel(16);
        let console_task = tokio::spawn(read_console(console_tx));
        let mut console = ChannelLineSource::new(console_rx);

        let mut chat = ChatClient::from_config(Arc::clone(&self.store), &self.config);
        println!("SecureChat client. Type -help for commands.");

        let result = tokio::select! {
            result = drive(&mut chat, &mut reader, &mut console, &queue, print_notice) => result,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("Interrupted");
                Ok(())
            }
        };

        console_task.abort();
        drop(queue);
        if tokio::time::timeout(FLUSH_GRACE, writer).await.is_err() {
            debug!("Writer did not finish in time");
        }
        result
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("server_addr", &self.config.network.server_addr)
            .field("store", &self.store)
            .finish()
    }
}

// ============================================
// Event Loop
// ============================================

/// Runs `chat` against a relay connection and a user line source.
///
/// Returns `Ok(())` when the user exits, console input ends or the relay
/// closes the connection.
///
/// # Errors
/// `Transport` on a read failure or when the outbound queue is gone.
pub async fn drive<S, U, F>(
    chat: &mut ChatClient,
    server: &mut S,
    user: &mut U,
    queue: &OutboundQueue,
    mut show: F,
) -> Result<()>
where
    S: LineSource + ?Sized,
    U: LineSource + ?Sized,
    F: FnMut(&Notice),
{
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let fx = tokio::select! {
            line = server.next_line() => match line {
                Ok(Some(line)) => chat.handle_server_line(&line),
                Ok(None) => {
                    info!("Relay closed the connection");
                    show(&Notice::Error("Disconnected from relay".into()));
                    return Ok(());
                }
                Err(e) if e.is_disconnect() => {
                    info!("Relay connection lost: {}", e);
                    show(&Notice::Error("Disconnected from relay".into()));
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            },
            line = user.next_line() => match line {
                Ok(Some(line)) => match chat.handle_user_line(&line) {
                    (Flow::Exit, _) => return Ok(()),
                    (Flow::Continue, fx) => fx,
                },
                Ok(None) => {
                    debug!("Console input closed");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            },
            now = ticker.tick() => chat.tick(now.into_std()),
        };

        for notice in &fx.notices {
            show(notice);
        }
        for line in fx.outbound {
            queue.send_line(line).await?;
        }
    }
}

/// Prints a notice to the terminal.
fn print_notice(notice: &Notice) {
    if notice.is_problem() {
        eprintln!("{notice}");
    } else {
        println!("{notice}");
    }
}

/// Forwards stdin lines until EOF or until the loop stops listening.
async fn read_console(tx: mpsc::Sender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Console read failed: {}", e);
                break;
            }
        }
    }
}

// ============================================
// Tests
// ============================================
