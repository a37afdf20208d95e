// ============================================
// File: crates/securechat-transport/src/mock.rs
// ============================================
//! # In-Memory Transport
//!
//! ## Creation Reason
//! Lets connection handlers and client engines be exercised without
//! sockets: two endpoints wired to each other over channels.
//!
//! ## Usage in Tests
//! ```
//! use securechat_transport::mock::MockEndpoint;
//! use securechat_transport::traits::{LineSink, LineSource};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (client, mut server) = MockEndpoint::pair(16);
//! client.queue.send_line("LOGIN 1".into()).await.unwrap();
//! assert_eq!(server.source.next_line().await.unwrap().as_deref(), Some("LOGIN 1"));
//! # }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This is for testing only - do not use in production
//!
//! ## Last Modified
//! v0.1.0 - Initial mock implementation

use crate::traits::{ChannelLineSource, OutboundQueue};

// ============================================
// MockEndpoint
// ============================================

/// One side of an in-memory connection.
#[derive(Debug)]
pub struct MockEndpoint {
    /// Lines sent by the other side
    pub source: ChannelLineSource,
    /// Queue delivering to the other side
    pub queue: OutboundQueue,
}

impl MockEndpoint {
    /// Creates two endpoints wired to each other.
    #[must_use]
    pub fn pair(capacity: usize) -> (Self, Self) {
        let (a_queue, b_rx) = OutboundQueue::channel(capacity);
        let (b_queue, a_rx) = OutboundQueue::channel(capacity);
        (
            Self {
                source: ChannelLineSource::new(a_rx),
                queue: a_queue,
            },
            Self {
                source: ChannelLineSource::new(b_rx),
                queue: b_queue,
            },
        )
    }
}

// ============================================
// Tests
// ============================================
