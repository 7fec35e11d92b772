use chrono::{DateTime, Utc};
use serde::Serialize;

/// Snapshot of a user's presence. `is_online` comes from the single
/// derivation in the store, so the push and poll paths can never disagree.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub last_seen: DateTime<Utc>,
    pub is_online: bool,
}
