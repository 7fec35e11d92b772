use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::user;

use super::model::Status;

/// A user with no live connection still counts as online this long after
/// their last observed activity; the poll fallback heartbeats every 60s.
pub const ONLINE_THRESHOLD_SECS: i64 = 120;

struct Entry {
    last_seen: DateTime<Utc>,
    live_connections: u32,
    /// When the last live connection went away. Activity older than this
    /// does not count toward the threshold, so a user who just closed their
    /// only connection reads offline immediately while a poll-only client
    /// stays online between heartbeats.
    disconnected_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn new(at: DateTime<Utc>) -> Self {
        Self {
            last_seen: at,
            live_connections: 0,
            disconnected_at: None,
        }
    }

    fn is_online(&self, now: DateTime<Utc>) -> bool {
        if self.live_connections > 0 {
            return true;
        }
        if let Some(disconnected_at) = self.disconnected_at {
            if self.last_seen <= disconnected_at {
                return false;
            }
        }
        (now - self.last_seen).num_seconds() < ONLINE_THRESHOLD_SECS
    }
}

/// Rolling activity watermark per user. Pure bookkeeping, no I/O; entries are
/// created lazily and never removed.
#[derive(Default)]
pub struct PresenceStore {
    users: RwLock<HashMap<user::Sub, Entry>>,
}

impl PresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances `last_seen` to `max(current, at)`. Out-of-order or racing
    /// touches can therefore never move the watermark backward.
    pub fn touch(&self, sub: &user::Sub, at: DateTime<Utc>) {
        let mut users = self.users.write().expect("presence store lock poisoned");
        let entry = users
            .entry(sub.clone())
            .or_insert_with(|| Entry::new(at));

        if at > entry.last_seen {
            entry.last_seen = at;
        }
    }

    /// Registers one more live connection; returns the new count.
    pub fn mark_online(&self, sub: &user::Sub) -> u32 {
        let mut users = self.users.write().expect("presence store lock poisoned");
        let entry = users
            .entry(sub.clone())
            .or_insert_with(|| Entry::new(Utc::now()));

        entry.live_connections += 1;
        entry.live_connections
    }

    /// Drops one live connection; returns how many remain so the caller can
    /// detect the last-connection transition. Never underflows.
    pub fn mark_offline(&self, sub: &user::Sub) -> u32 {
        let mut users = self.users.write().expect("presence store lock poisoned");
        match users.get_mut(sub) {
            Some(entry) => {
                entry.live_connections = entry.live_connections.saturating_sub(1);
                if entry.live_connections == 0 {
                    entry.disconnected_at = Some(Utc::now());
                }
                entry.live_connections
            }
            None => 0,
        }
    }

    pub fn get(&self, sub: &user::Sub, now: DateTime<Utc>) -> Option<Status> {
        let users = self.users.read().expect("presence store lock poisoned");
        users.get(sub).map(|entry| Status {
            last_seen: entry.last_seen,
            is_online: entry.is_online(now),
        })
    }
}
