use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;

use crate::user;

pub mod middleware;
pub mod service;

type Result<T> = std::result::Result<T, Error>;
pub type Service = Arc<dyn service::AuthService + Send + Sync>;

/// Verified identity attached to a request or a live connection. Copied from
/// the token at verification time and immutable afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Identity {
    pub sub: user::Sub,
    pub name: String,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unauthorized to access the resource")]
    Unauthorized,
    #[error("invalid token")]
    TokenMalformed,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        error!("{self}");

        let status = match self {
            Self::Unauthorized | Self::TokenMalformed => StatusCode::UNAUTHORIZED,
        };

        (status, self.to_string()).into_response()
    }
}
