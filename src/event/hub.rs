use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use tokio::sync::{Notify, RwLock, mpsc};

use crate::{product, user};

use super::ConnectionId;
use super::model::{OutboundFrame, Payload};

/// What the rest of the system may know about a live connection. The
/// transport itself stays encapsulated behind the payload channel.
#[derive(Clone, Debug)]
pub struct ConnectionInfo {
    pub sub: user::Sub,
    pub name: String,
    pub product_id: product::Id,
}

pub struct Connection {
    info: ConnectionInfo,
    sender: mpsc::UnboundedSender<Payload>,
    close: Arc<Notify>,
    /// Cleared by each reaper sweep, set back by a pong or heartbeat frame.
    ping_acked: AtomicBool,
}

impl Connection {
    pub fn new(info: ConnectionInfo, sender: mpsc::UnboundedSender<Payload>) -> Self {
        Self {
            info,
            sender,
            close: Arc::new(Notify::new()),
            ping_acked: AtomicBool::new(true),
        }
    }

    /// Handle the read loop waits on; fired when the hub evicts this
    /// connection.
    pub fn close_signal(&self) -> Arc<Notify> {
        self.close.clone()
    }
}

/// Evidence that a connection was evicted, handed to exactly one caller so
/// the offline flow runs once per eviction.
#[derive(Debug)]
pub struct Removed {
    pub sub: user::Sub,
    pub product_id: product::Id,
}

/// The in-memory registry of live connections and the only component allowed
/// to push frames at them. Register, unregister and broadcast may race from
/// any connection task plus the reaper; the map lock keeps them consistent.
#[derive(Default)]
pub struct Hub {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, conn: Connection) -> ConnectionId {
        let id = ConnectionId::random();
        debug!("registering connection {id} for {}", conn.info.sub);
        self.connections.write().await.insert(id, conn);
        id
    }

    /// Idempotent eviction; racing callers (client close, failed send,
    /// reaper) are all safe and exactly one receives `Some`. Removal drops
    /// the payload sender, which ends the write task — the single place the
    /// transport is closed — and fires the close signal for the read task.
    pub async fn unregister(&self, id: &ConnectionId) -> Option<Removed> {
        let conn = self.connections.write().await.remove(id)?;
        debug!("unregistered connection {id} for {}", conn.info.sub);

        conn.close.notify_one();

        Some(Removed {
            sub: conn.info.sub,
            product_id: conn.info.product_id,
        })
    }

    pub async fn info(&self, id: &ConnectionId) -> Option<ConnectionInfo> {
        self.connections.read().await.get(id).map(|c| c.info.clone())
    }

    /// Best-effort delivery to one connection. A failed enqueue means the
    /// write task is gone, so the connection is evicted on the spot and the
    /// removal is handed back to the caller.
    pub async fn send(&self, id: &ConnectionId, frame: OutboundFrame) -> Option<Removed> {
        let delivered = match self.connections.read().await.get(id) {
            Some(conn) => conn.sender.send(Payload::Frame(frame)).is_ok(),
            None => return None,
        };

        if delivered {
            None
        } else {
            self.unregister(id).await
        }
    }

    /// Delivers `frame` to every connection matching `predicate`. Enqueueing
    /// never blocks on socket I/O, so one slow or dead connection cannot
    /// stall the rest; dead ones are evicted and returned for the offline
    /// flow.
    pub async fn broadcast(
        &self,
        predicate: impl Fn(&ConnectionInfo) -> bool,
        frame: OutboundFrame,
    ) -> Vec<Removed> {
        let dead: Vec<ConnectionId> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .filter(|(_, conn)| predicate(&conn.info))
                .filter(|(_, conn)| conn.sender.send(Payload::Frame(frame.clone())).is_err())
                .map(|(id, _)| *id)
                .collect()
        };

        let mut removed = Vec::with_capacity(dead.len());
        for id in dead {
            if let Some(r) = self.unregister(&id).await {
                removed.push(r);
            }
        }
        removed
    }

    pub async fn ack_ping(&self, id: &ConnectionId) {
        if let Some(conn) = self.connections.read().await.get(id) {
            conn.ping_acked.store(true, Ordering::Relaxed);
        }
    }

    /// One reaper sweep: evicts every connection that did not ack the
    /// previous ping, then challenges the survivors again. A crashed client
    /// is therefore gone within two sweep intervals.
    pub async fn sweep_stale(&self) -> Vec<Removed> {
        let stale: Vec<ConnectionId> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .filter_map(|(id, conn)| {
                    if !conn.ping_acked.swap(false, Ordering::Relaxed) {
                        return Some(*id);
                    }
                    match conn.sender.send(Payload::Ping) {
                        Ok(()) => None,
                        Err(_) => Some(*id),
                    }
                })
                .collect()
        };

        let mut removed = Vec::with_capacity(stale.len());
        for id in stale {
            if let Some(r) = self.unregister(&id).await {
                removed.push(r);
            }
        }
        removed
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }
}
