//! Live-connection registry used for graceful shutdown.
//!
//! A worker owns one [`ConnectionRegistry`] and hands it to every connection it accepts.
//! Each connection holds a [`Registration`] for its whole lifetime, so it leaves the
//! registry on every exit path. Shutting the registry down cancels the stop signal of every
//! registered connection: idle ones close right away, busy ones finish their in-flight
//! response with `Connection: close`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<u64, CancellationToken>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    drained: Notify,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Adds a connection. It stays registered until the returned [`Registration`] is dropped.
    ///
    /// Connections registered after [`ConnectionRegistry::shutdown`] start out stopped.
    pub fn register(self: &Arc<Self>) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.shutdown.child_token();
        self.connections.insert(id, token.clone());
        debug!(id, live = self.connections.len(), "connection registered");

        Registration { id, token, registry: Arc::clone(self) }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    /// Stops one connection. Returns false if `id` is not registered.
    pub fn close(&self, id: u64) -> bool {
        match self.connections.get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Stops every registered connection, and every connection registered from now on.
    pub fn shutdown(&self) {
        info!(live = self.connections.len(), "shutting down connections");
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Waits until no connection is registered.
    pub async fn drained(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.connections.is_empty() {
                return;
            }
            notified.await;
        }
    }

    fn unregister(&self, id: u64) {
        self.connections.remove(&id);
        debug!(id, live = self.connections.len(), "connection unregistered");
        if self.connections.is_empty() {
            self.drained.notify_waiters();
        }
    }
}

/// Membership of one connection in a [`ConnectionRegistry`], removed on drop.
#[derive(Debug)]
pub struct Registration {
    id: u64,
    token: CancellationToken,
    registry: Arc<ConnectionRegistry>,
}

impl Registration {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The stop signal of this connection.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}
