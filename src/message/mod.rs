use std::fmt::Display;
use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use log::error;
use uuid::Uuid;

use crate::state::AppState;

mod handler;
pub mod model;
pub mod repository;
pub mod service;

type Result<T> = std::result::Result<T, Error>;
pub type Repository = Arc<dyn repository::MessageRepository + Send + Sync>;

pub const MAX_TEXT_LEN: usize = 4096;

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Id(pub Uuid);

impl Id {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn api<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/api/messages/active", get(handler::find_active))
        .route(
            "/api/messages/{product_id}/{recipient_id}",
            get(handler::find_history),
        )
        .with_state(state)
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("message text is empty")]
    EmptyText,
    #[error("message text exceeds {MAX_TEXT_LEN} characters")]
    TextTooLong,
    #[error("recipient is malformed")]
    InvalidRecipient,
    #[error("connection is not registered")]
    Unregistered,

    #[error(transparent)]
    _MongoDB(#[from] mongodb::error::Error),

    #[error(transparent)]
    _Bson(#[from] mongodb::bson::ser::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        error!("{self}");

        let (status, message) = match self {
            Self::EmptyText | Self::TextTooLong | Self::InvalidRecipient => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            Self::Unregistered => (StatusCode::GONE, self.to_string()),

            Self::_MongoDB(_) | Self::_Bson(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_owned(),
            ),
        };

        (status, message).into_response()
    }
}
