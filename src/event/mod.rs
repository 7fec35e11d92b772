use std::fmt::Display;

use axum::Router;
use axum::routing::get;
use uuid::Uuid;

use crate::state::AppState;

mod handler;
pub mod hub;
pub mod model;
pub mod reaper;

pub fn endpoints<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/ws", get(handler::ws))
        .with_state(state)
}

/// Process-unique handle for one live transport connection, assigned at
/// registration.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("authentication and productId required")]
    MissingHandshakeParams,
}
