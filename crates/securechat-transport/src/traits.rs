// ============================================
// File: crates/securechat-transport/src/traits.rs
// ============================================
//! # Transport Traits
//!
//! ## Creation Reason
//! Defines abstract interfaces for line-oriented I/O so connection
//! handlers can run over TCP in production and over channels in tests.
//!
//! ## Main Functionality
//! - `LineSource`: Yields one inbound frame (line) at a time
//! - `LineSink`: Enqueues one outbound frame
//! - `OutboundQueue`: Cloneable single-writer queue handle
//! - `ChannelLineSource`: `LineSource` over an mpsc receiver
//!
//! ## Single-Writer Model
//! ```text
//!  auth engine ──┐
//!  relay (other ─┼──► OutboundQueue (mpsc) ──► writer task ──► socket
//!   connections) │
//!  renew engine ─┘
//! ```
//! The queue is the only point where several producers meet for one
//! connection, so lines reach the socket whole and in enqueue order.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Lines passed to a sink must NOT contain `\n`; the writer appends it
//! - `next_line` returning `Ok(None)` means a clean end of stream
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definitions

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Result, TransportError};

// ============================================
// LineSource Trait
// ============================================

/// Inbound half of a line-framed connection.
///
/// # Example
/// ```ignore
/// async fn drain<S: LineSource>(source: &mut S) -> Result<()> {
///     while let Some(line) = source.next_line().await? {
///         handle(&line);
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait LineSource: Send {
    /// Waits for the next complete line, without its terminator.
    ///
    /// # Returns
    /// `Ok(None)` when the remote side closed the stream.
    ///
    /// # Errors
    /// Returns error on I/O failure, oversized or non-UTF-8 lines.
    async fn next_line(&mut self) -> Result<Option<String>>;
}

// ============================================
// LineSink Trait
// ============================================

/// Outbound half of a line-framed connection.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; several tasks may hold one.
#[async_trait]
pub trait LineSink: Send + Sync {
    /// Queues one line for sending.
    ///
    /// # Errors
    /// Returns `SendFailed` if the connection's writer is gone.
    async fn send_line(&self, line: String) -> Result<()>;

    /// Returns `true` while lines can still be queued.
    fn is_open(&self) -> bool;
}

// ============================================
// OutboundQueue
// ============================================

/// Cloneable handle to a connection's serialized output queue.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    tx: mpsc::Sender<String>,
}

impl OutboundQueue {
    /// Wraps an existing channel sender.
    #[must_use]
    pub const fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    /// Creates a queue together with the receiver a writer drains.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Returns `true` if both handles feed the same writer.
    #[must_use]
    pub fn same_queue(&self, other: &Self) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

#[async_trait]
impl LineSink for OutboundQueue {
    async fn send_line(&self, line: String) -> Result<()> {
        self.tx
            .send(line)
            .await
            .map_err(|_| TransportError::send_failed("outbound queue closed"))
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

// ============================================
// ChannelLineSource
// ============================================

/// `LineSource` backed by an mpsc receiver.
///
/// Used for in-memory connections and for feeding console input into
/// the same select loop as network input.
#[derive(Debug)]
pub struct ChannelLineSource {
    rx: mpsc::Receiver<String>,
}

impl ChannelLineSource {
    /// Wraps a receiver.
    #[must_use]
    pub const fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl LineSource for ChannelLineSource {
    async fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.rx.recv().await)
    }
}

// ============================================
// Tests
// ============================================
