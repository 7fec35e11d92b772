use axum::response::{IntoResponse, Response};

use crate::{auth, integration, message, presence};

pub type Result<T> = std::result::Result<T, Error>;

/// Umbrella over the per-module errors so handlers can use `?` freely; each
/// module decides its own status mapping.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub enum Error {
    _Auth(#[from] auth::Error),
    _Message(#[from] message::Error),
    _Presence(#[from] presence::Error),
    _Integration(#[from] integration::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Self::_Auth(e) => e.into_response(),
            Self::_Message(e) => e.into_response(),
            Self::_Presence(e) => e.into_response(),
            Self::_Integration(e) => {
                log::error!("{e}");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                )
                    .into_response()
            }
        }
    }
}
