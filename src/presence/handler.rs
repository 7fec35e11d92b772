use axum::Extension;
use axum::Json;
use axum::extract::{Path, State};

use crate::auth::Identity;
use crate::user;

use super::model::Status;
use super::service::PresenceService;

pub async fn last_seen(
    Extension(_identity): Extension<Identity>,
    Path(sub): Path<user::Sub>,
    presence_service: State<PresenceService>,
) -> crate::Result<Json<Status>> {
    let status = presence_service
        .get(&sub)
        .ok_or(super::Error::NotFound(sub))?;

    Ok(Json(status))
}

/// Heartbeat fallback for clients whose push channel is down: same touch and
/// broadcast as a websocket heartbeat frame.
pub async fn update_last_seen(
    Extension(identity): Extension<Identity>,
    presence_service: State<PresenceService>,
) -> crate::Result<Json<Status>> {
    presence_service.heartbeat(&identity.sub).await;

    let status = presence_service
        .get(&identity.sub)
        .ok_or(super::Error::NotFound(identity.sub))?;

    Ok(Json(status))
}
