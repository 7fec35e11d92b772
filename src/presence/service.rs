use std::sync::Arc;

use chrono::Utc;

use crate::event::hub::Hub;
use crate::event::model::OutboundFrame;
use crate::user;

use super::model::Status;
use super::store::PresenceStore;

/// Keeps the presence store in sync with connection lifecycle events and
/// pushes `userStatus` frames to every live connection. Status updates are
/// deliberately cross-conversation: a seller's online badge must refresh in
/// every open chat thread, whatever product it is scoped to.
#[derive(Clone)]
pub struct PresenceService {
    store: Arc<PresenceStore>,
    hub: Arc<Hub>,
}

impl PresenceService {
    pub fn new(store: Arc<PresenceStore>, hub: Arc<Hub>) -> Self {
        Self { store, hub }
    }

    /// A new live connection for `sub` was registered.
    pub async fn connected(&self, sub: &user::Sub) {
        self.store.mark_online(sub);
        self.store.touch(sub, Utc::now());
        self.publish_status(vec![sub.clone()]).await;
    }

    /// A live connection for `sub` was evicted from the hub. Only the drop of
    /// the last connection is announced, so racing unregisters produce a
    /// single offline broadcast.
    pub async fn disconnected(&self, sub: &user::Sub) {
        self.store.touch(sub, Utc::now());
        if self.store.mark_offline(sub) == 0 {
            self.publish_status(vec![sub.clone()]).await;
        }
    }

    /// Any observed activity: push heartbeat frame, poll fallback or an
    /// outbound message. Touches the watermark and republishes the status.
    pub async fn heartbeat(&self, sub: &user::Sub) {
        self.store.touch(sub, Utc::now());
        self.publish_status(vec![sub.clone()]).await;
    }

    pub fn get(&self, sub: &user::Sub) -> Option<Status> {
        self.store.get(sub, Utc::now())
    }

    /// Broadcasts the current status of each pending user. Connections found
    /// dead during a broadcast are unregistered by the hub; when that was a
    /// user's last connection their own offline status joins the queue, so
    /// the cascade settles without recursion.
    async fn publish_status(&self, mut pending: Vec<user::Sub>) {
        while let Some(sub) = pending.pop() {
            let Some(status) = self.get(&sub) else {
                continue;
            };

            let frame = OutboundFrame::user_status(&sub, &status);
            for removed in self.hub.broadcast(|_| true, frame).await {
                self.store.touch(&removed.sub, Utc::now());
                if self.store.mark_offline(&removed.sub) == 0 {
                    pending.push(removed.sub);
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use tokio::sync::mpsc;

    use crate::event::hub::{Connection, ConnectionInfo};
    use crate::event::model::Payload;
    use crate::product;

    use super::*;

    fn sub(s: &str) -> user::Sub {
        user::Sub(s.into())
    }

    fn connection(
        s: &str,
        product: &str,
    ) -> (Connection, mpsc::UnboundedReceiver<Payload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let info = ConnectionInfo {
            sub: sub(s),
            name: s.to_uppercase(),
            product_id: product::Id(product.into()),
        };
        (Connection::new(info, tx), rx)
    }

    fn statuses(rx: &mut mpsc::UnboundedReceiver<Payload>) -> Vec<(user::Sub, bool)> {
        let mut seen = Vec::new();
        while let Ok(payload) = rx.try_recv() {
            if let Payload::Frame(OutboundFrame::UserStatus {
                user_id, is_online, ..
            }) = payload
            {
                seen.push((user_id, is_online));
            }
        }
        seen
    }

    #[tokio::test]
    async fn should_broadcast_online_status_to_all_connections() {
        let hub = Arc::new(Hub::new());
        let service = PresenceService::new(Arc::new(PresenceStore::new()), hub.clone());

        let (conn, mut rx_other) = connection("u2", "p99");
        hub.register(conn).await;

        service.connected(&sub("u1")).await;

        assert_eq!(statuses(&mut rx_other), vec![(sub("u1"), true)]);
        assert!(service.get(&sub("u1")).unwrap().is_online);
    }

    #[tokio::test]
    async fn should_announce_offline_only_for_last_connection() {
        let hub = Arc::new(Hub::new());
        let service = PresenceService::new(Arc::new(PresenceStore::new()), hub.clone());

        let (conn, mut rx_watcher) = connection("u2", "p1");
        hub.register(conn).await;

        service.connected(&sub("u1")).await;
        service.connected(&sub("u1")).await;
        statuses(&mut rx_watcher);

        service.disconnected(&sub("u1")).await;
        assert_eq!(statuses(&mut rx_watcher), vec![]);
        assert!(service.get(&sub("u1")).unwrap().is_online);

        service.disconnected(&sub("u1")).await;
        assert_eq!(statuses(&mut rx_watcher), vec![(sub("u1"), false)]);
    }

    #[tokio::test]
    async fn should_cascade_offline_for_connections_dead_at_broadcast_time() {
        let hub = Arc::new(Hub::new());
        let service = PresenceService::new(Arc::new(PresenceStore::new()), hub.clone());

        // u2's receiver is dropped right away: the connection is dead but
        // still registered.
        let (conn, rx_dead) = connection("u2", "p1");
        hub.register(conn).await;
        service.connected(&sub("u2")).await;
        drop(rx_dead);

        let (conn, mut rx_watcher) = connection("u3", "p1");
        hub.register(conn).await;

        service.heartbeat(&sub("u1")).await;

        let seen = statuses(&mut rx_watcher);
        assert!(seen.contains(&(sub("u2"), false)));
        assert_eq!(hub.len().await, 1);
    }
}
