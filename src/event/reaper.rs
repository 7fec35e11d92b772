use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::task::JoinHandle;

use crate::presence::service::PresenceService;

use super::hub::Hub;

/// Background sweep evicting connections whose clients stopped answering
/// pings. Eviction is routine liveness handling, not an error: the only
/// visible effect is the usual offline broadcast for a user's last
/// connection. A ghost connection survives at most `2 * period`.
pub fn spawn(
    hub: Arc<Hub>,
    presence_service: PresenceService,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // the first tick completes immediately and would evict fresh
        // connections before they ever saw a ping
        interval.tick().await;

        loop {
            interval.tick().await;

            let removed = hub.sweep_stale().await;
            for r in removed {
                debug!("reaped stale connection of {}", r.sub);
                presence_service.disconnected(&r.sub).await;
            }
        }
    })
}
