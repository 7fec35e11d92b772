use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};

use crate::auth;

/// Guards the REST surface. The verified `Identity` is attached as a request
/// extension for handlers to pick up.
pub async fn authenticate(
    auth_service: State<auth::Service>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> crate::Result<Response> {
    let TypedHeader(bearer) = bearer.ok_or(super::Error::Unauthorized)?;
    let identity = auth_service.verify(bearer.token()).await?;

    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}
