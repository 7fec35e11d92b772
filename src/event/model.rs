use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::presence::model::Status;
use crate::{product, user};

use super::hub::ConnectionInfo;

/// Frames a client may send over the websocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundFrame {
    Heartbeat { timestamp: DateTime<Utc> },
    Chat {
        message: String,
        recipient: user::Sub,
        timestamp: DateTime<Utc>,
    },
}

/// Frames the server pushes to clients.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundFrame {
    Welcome {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Chat {
        sender: Sender,
        message: String,
        timestamp: DateTime<Utc>,
        product_id: product::Id,
    },
    #[serde(rename_all = "camelCase")]
    UserStatus {
        user_id: user::Sub,
        is_online: bool,
        last_seen: DateTime<Utc>,
    },
    Error {
        error: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sender {
    pub user_id: user::Sub,
    pub name: String,
}

impl OutboundFrame {
    pub fn welcome(name: &str, product_id: &product::Id) -> Self {
        Self::Welcome {
            message: format!("Welcome, {name}! Connected to chat for product {product_id}"),
        }
    }

    pub fn chat(conn: &ConnectionInfo, message: &str, timestamp: DateTime<Utc>) -> Self {
        Self::Chat {
            sender: Sender {
                user_id: conn.sub.clone(),
                name: conn.name.clone(),
            },
            message: message.to_string(),
            timestamp,
            product_id: conn.product_id.clone(),
        }
    }

    pub fn user_status(sub: &user::Sub, status: &Status) -> Self {
        Self::UserStatus {
            user_id: sub.clone(),
            is_online: status.is_online,
            last_seen: status.last_seen,
        }
    }

    pub fn error(detail: impl Display) -> Self {
        Self::Error {
            error: detail.to_string(),
        }
    }
}

/// What a connection's write task consumes: either a frame to serialize or a
/// transport-level liveness probe from the reaper.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Frame(OutboundFrame),
    Ping,
}
