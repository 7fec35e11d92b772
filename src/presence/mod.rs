use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use log::error;

use crate::state::AppState;
use crate::user;

mod handler;
pub mod model;
pub mod service;
pub mod store;

pub fn api<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/api/user/last-seen/{sub}", get(handler::last_seen))
        .route("/api/user/update-last-seen", post(handler::update_last_seen))
        .with_state(state)
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no presence recorded for user: {0:?}")]
    NotFound(user::Sub),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        error!("{self}");

        let status = match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        };

        (status, self.to_string()).into_response()
    }
}
