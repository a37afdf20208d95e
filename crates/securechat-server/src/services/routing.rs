// ============================================
// File: crates/securechat-server/src/services/routing.rs
// ============================================
//! # Router
//!
//! ## Creation Reason
//! Maps logged-in client ids to their connection's outbound queue so a
//! frame from one connection can be relayed to another.
//!
//! ## Main Functionality
//! - `Router`: Client id to connection handle mapping
//! - Register on login, deregister on disconnect
//! - Fast O(1) lookups using DashMap
//!
//! ## Routing Table Structure
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Router Table                        │
//! ├─────────────────┬───────────────────────────────────┤
//! │  Client ID      │     Connection Handle             │
//! ├─────────────────┼───────────────────────────────────┤
//! │  1              │  OutboundQueue (conn A)           │
//! │  2              │  OutboundQueue (conn B)           │
//! │  7              │  OutboundQueue (conn C)           │
//! └─────────────────┴───────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```ignore
//! let router = Router::new();
//!
//! // Register once the login signature verifies
//! router.register(client_id, queue.clone());
//!
//! // Relay to a peer
//! if let Some(peer) = router.lookup(peer_id) {
//!     peer.send_line(frame).await?;
//! }
//!
//! // Remove when the connection closes
//! router.deregister(client_id, &queue);
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Only logged-in connections are ever registered
//! - `deregister` only removes the entry if it still belongs to the
//!   caller's connection, so a re-login elsewhere is not undone
//! - Never hold a map guard across an `.await`; `lookup` returns a clone
//!
//! ## Last Modified
//! v0.1.0 - Initial router

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use securechat_common::ClientId;
use securechat_transport::OutboundQueue;

// ============================================
// ConnectionHandle
// ============================================

/// A registered connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Queue feeding the connection's writer
    pub queue: OutboundQueue,
    /// When the client logged in
    pub registered_at: Instant,
}

impl ConnectionHandle {
    fn new(queue: OutboundQueue) -> Self {
        Self {
            queue,
            registered_at: Instant::now(),
        }
    }

    /// Time since login.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.registered_at.elapsed()
    }
}

// ============================================
// Router
// ============================================

/// Live client id to connection registry.
pub struct Router {
    routes: DashMap<ClientId, ConnectionHandle>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: DashMap::new(),
        }
    }

    /// Registers a connection for a client, replacing any previous one.
    ///
    /// Returns the queue of the replaced connection, if any.
    pub fn register(&self, client_id: ClientId, queue: OutboundQueue) -> Option<OutboundQueue> {
        let previous = self
            .routes
            .insert(client_id, ConnectionHandle::new(queue))
            .map(|handle| handle.queue);

        if previous.is_some() {
            debug!(client_id = %client_id, "Route replaced");
        } else {
            debug!(client_id = %client_id, "Route added");
        }

        previous
    }

    /// Removes the route if it still points at `queue`.
    ///
    /// Returns `true` if an entry was removed.
    pub fn deregister(&self, client_id: ClientId, queue: &OutboundQueue) -> bool {
        let removed = self
            .routes
            .remove_if(&client_id, |_, handle| handle.queue.same_queue(queue))
            .is_some();

        if removed {
            debug!(client_id = %client_id, "Route removed");
        }

        removed
    }

    /// Looks up the outbound queue of a logged-in client.
    #[must_use]
    pub fn lookup(&self, client_id: ClientId) -> Option<OutboundQueue> {
        self.routes.get(&client_id).map(|r| r.value().queue.clone())
    }

    /// Checks if a client is connected and logged in.
    #[must_use]
    pub fn is_connected(&self, client_id: ClientId) -> bool {
        self.routes.contains_key(&client_id)
    }

    /// Returns the number of registered clients.
    #[must_use]
    pub fn count(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if there are no registered clients.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered client ids, ascending.
    #[must_use]
    pub fn connected_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.routes.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Longest-connected client and its uptime.
    #[must_use]
    pub fn longest_connected(&self) -> Option<(ClientId, Duration)> {
        self.routes
            .iter()
            .map(|r| (*r.key(), r.value().uptime()))
            .max_by_key(|(_, uptime)| *uptime)
    }

    /// Clears all routes.
    pub fn clear(&self) {
        self.routes.clear();
        debug!("All routes cleared");
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use securechat_transport::{ChannelLineSource, LineSink, LineSource};

    fn id(value: u32) -> ClientId {
        ClientId::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_register_lookup() {
        let router = Router::new();
        let (queue, rx) = OutboundQueue::channel(4);
        let mut source = ChannelLineSource::new(rx);

        assert!(router.register(id(1), queue.clone()).is_none());
        assert!(router.is_connected(id(1)));

        let found = router.lookup(id(1)).unwrap();
        assert!(found.same_queue(&queue));
        found.send_line("SEND 2 DATA x".into()).await.unwrap();
        assert_eq!(source.next_line().await.unwrap().as_deref(), Some("SEND 2 DATA x"));
    }

    #[test]
    fn test_lookup_nonexistent() {
        let router = Router::new();
        assert!(router.lookup(id(9)).is_none());
        assert!(!router.is_connected(id(9)));
    }

    #[test]
    fn test_deregister_only_own_connection() {
        let router = Router::new();
        let (old_conn, _old_rx) = OutboundQueue::channel(1);
        let (new_conn, _new_rx) = OutboundQueue::channel(1);

        router.register(id(1), old_conn.clone());
        let replaced = router.register(id(1), new_conn.clone()).unwrap();
        assert!(replaced.same_queue(&old_conn));

        // The stale connection closing must not remove the fresh login
        assert!(!router.deregister(id(1), &old_conn));
        assert!(router.is_connected(id(1)));

        assert!(router.deregister(id(1), &new_conn));
        assert!(router.is_empty());
    }

    #[test]
    fn test_stats() {
        let router = Router::new();
        let (queue, _rx) = OutboundQueue::channel(1);

        router.register(id(3), queue.clone());
        router.register(id(1), queue.clone());
        router.register(id(2), queue);

        assert_eq!(router.count(), 3);
        assert_eq!(router.connected_ids(), vec![id(1), id(2), id(3)]);
        assert!(router.longest_connected().is_some());

        router.clear();
        assert!(router.is_empty());
        assert!(router.longest_connected().is_none());
    }
}
