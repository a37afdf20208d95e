// ============================================
// File: crates/securechat-transport/src/tcp.rs
// ============================================
//! # TCP Line Transport
//!
//! ## Creation Reason
//! Carries protocol frames as newline-terminated UTF-8 lines over TCP,
//! wrapping Tokio's stream types with the `LineSource` / `LineSink` traits.
//!
//! ## Main Functionality
//! - `TcpLineListener`: Bound listening socket (server)
//! - `TcpLineConnection::connect`: Outbound connection (client)
//! - `TcpLineConnection::into_parts`: Reader + writer task + queue handle
//!
//! ## Connection Anatomy
//! ```text
//!               ┌────────────────────┐
//!  socket ────► │ TcpLineReader      │ ──► next_line()
//!               └────────────────────┘
//!               ┌────────────────────┐
//!  socket ◄──── │ writer task        │ ◄── OutboundQueue (clones)
//!               └────────────────────┘
//! ```
//!
//! ## Design Choices
//! - Uses SO_REUSEADDR for quick rebinding after restart
//! - The writer task exits once every queue handle is dropped, then
//!   shuts down the write half so the peer sees EOF
//!
//! ## ⚠️ Important Note for Next Developer
//! - Lines longer than `MAX_LINE_LENGTH` end the connection
//! - Trailing `\r` is stripped so telnet-style clients work
//!
//! ## Last Modified
//! v0.1.0 - Initial TCP transport implementation

use std::net::SocketAddr;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::{Result, TransportError};
use crate::traits::{LineSource, OutboundQueue};

// ============================================
// Constants
// ============================================

/// Longest accepted line in bytes, terminator excluded.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Default capacity of a connection's outbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Listen backlog passed to the OS.
const LISTEN_BACKLOG: i32 = 1024;

// ============================================
// TcpLineListener
// ============================================

/// Listening socket producing line connections.
///
/// # Example
/// ```ignore
/// let listener = TcpLineListener::bind("0.0.0.0:35360".parse()?)?;
/// let (conn, peer) = listener.accept().await?;
/// let (reader, queue, writer) = conn.into_parts(DEFAULT_QUEUE_CAPACITY);
/// ```
#[derive(Debug)]
pub struct TcpLineListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpLineListener {
    /// Binds with `SO_REUSEADDR`.
    ///
    /// # Errors
    /// - `AddressInUse`: If the port is taken
    /// - `BindFailed`: Any other bind failure
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        info!("Binding TCP listener to {}", addr);

        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| TransportError::io("creating TCP socket", e))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| TransportError::io("setting SO_REUSEADDR", e))?;

        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::io("setting non-blocking", e))?;

        socket.bind(&addr.into()).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                TransportError::AddressInUse { addr }
            } else {
                TransportError::bind_failed(addr, e.to_string())
            }
        })?;

        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|e| TransportError::bind_failed(addr, e.to_string()))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener)
            .map_err(|e| TransportError::io("converting to tokio listener", e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::io("reading local address", e))?;

        info!("TCP listener bound to {}", local_addr);
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Waits for the next client.
    ///
    /// # Errors
    /// Returns error if accepting fails.
    pub async fn accept(&self) -> Result<(TcpLineConnection, SocketAddr)> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::io("accepting connection", e))?;
        debug!(peer = %peer, "Accepted connection");
        Ok((TcpLineConnection::from_stream(stream, Some(peer)), peer))
    }

    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

// ============================================
// TcpLineConnection
// ============================================

/// An established stream not yet split into reader and writer.
#[derive(Debug)]
pub struct TcpLineConnection {
    stream: TcpStream,
    peer: Option<SocketAddr>,
}

impl TcpLineConnection {
    /// Wraps an accepted or connected stream.
    #[must_use]
    pub fn from_stream(stream: TcpStream, peer: Option<SocketAddr>) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }
        Self { stream, peer }
    }

    /// Connects to `addr` (`host:port`).
    ///
    /// # Errors
    /// `ConnectFailed` if resolution or connection fails.
    pub async fn connect(addr: &str) -> Result<Self> {
        info!("Connecting to {}", addr);
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::connect_failed(addr, e.to_string()))?;
        let peer = stream.peer_addr().ok();
        Ok(Self::from_stream(stream, peer))
    }

    /// Remote address, if known.
    #[must_use]
    pub const fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Splits into a line reader, a queue handle and the writer task.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn into_parts(self, capacity: usize) -> (TcpLineReader, OutboundQueue, JoinHandle<()>) {
        let (read_half, write_half) = self.stream.into_split();
        let (queue, rx) = OutboundQueue::channel(capacity);
        let writer = tokio::spawn(run_writer(write_half, rx, self.peer));
        let reader = TcpLineReader {
            lines: BufReader::new(read_half).lines(),
        };
        (reader, queue, writer)
    }
}

// ============================================
// TcpLineReader
// ============================================

/// Reads newline-terminated UTF-8 lines.
///
/// `next_line` is cancel safe: a partly read line survives a dropped
/// future, so the reader can sit in a `select!` loop.
#[derive(Debug)]
pub struct TcpLineReader {
    lines: Lines<BufReader<OwnedReadHalf>>,
}

#[async_trait]
impl LineSource for TcpLineReader {
    async fn next_line(&mut self) -> Result<Option<String>> {
        let Some(line) = self.lines.next_line().await? else {
            return Ok(None);
        };
        if line.len() > MAX_LINE_LENGTH {
            return Err(TransportError::LineTooLong {
                limit: MAX_LINE_LENGTH,
            });
        }
        trace!(len = line.len(), "Line received");
        Ok(Some(line))
    }
}

// ============================================
// Writer Task
// ============================================

/// Drains the queue into the socket until every sender is dropped.
async fn run_writer(
    mut write_half: OwnedWriteHalf,
    mut rx: mpsc::Receiver<String>,
    peer: Option<SocketAddr>,
) {
    while let Some(mut line) = rx.recv().await {
        line.push('\n');
        if let Err(e) = write_half.write_all(line.as_bytes()).await {
            warn!(peer = ?peer, "Write failed: {}", e);
            break;
        }
    }
    // Stop accepting so producers see a closed queue
    rx.close();
    if let Err(e) = write_half.shutdown().await {
        trace!(peer = ?peer, "Shutdown after writer exit: {}", e);
    }
    debug!(peer = ?peer, "Writer task finished");
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::LineSink;

    async fn connected_pair() -> (TcpLineConnection, TcpLineConnection) {
        let listener = TcpLineListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().to_string();
        let (client, accepted) = tokio::join!(TcpLineConnection::connect(&addr), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_lines_roundtrip_over_tcp() {
        let (client, server) = connected_pair().await;
        let (_client_reader, client_queue, _client_writer) = client.into_parts(8);
        let (mut server_reader, _server_queue, _server_writer) = server.into_parts(8);

        client_queue.send_line("SIGNUP alice PK".into()).await.unwrap();
        client_queue.send_line("LOGIN 1".into()).await.unwrap();

        assert_eq!(
            server_reader.next_line().await.unwrap().as_deref(),
            Some("SIGNUP alice PK")
        );
        assert_eq!(server_reader.next_line().await.unwrap().as_deref(), Some("LOGIN 1"));
    }

    #[tokio::test]
    async fn test_eof_after_queue_dropped() {
        let (client, server) = connected_pair().await;
        let (_client_reader, client_queue, client_writer) = client.into_parts(8);
        let (mut server_reader, _server_queue, _server_writer) = server.into_parts(8);

        client_queue.send_line("LOGIN 1".into()).await.unwrap();
        drop(client_queue);
        client_writer.await.unwrap();

        assert_eq!(server_reader.next_line().await.unwrap().as_deref(), Some("LOGIN 1"));
        assert!(server_reader.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bind_in_use() {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let taken = std_listener.local_addr().unwrap();
        // An active listener blocks the port even with SO_REUSEADDR
        assert!(TcpLineListener::bind(taken).is_err());
    }
}
