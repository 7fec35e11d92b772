use axum::extract::{Path, State};
use axum::{Extension, Json};

use crate::auth::Identity;
use crate::{product, user};

use super::model::{ConversationSummary, MessageDto};
use super::service::MessageService;

/// The caller's open conversations, newest first.
pub async fn find_active(
    Extension(identity): Extension<Identity>,
    message_service: State<MessageService>,
) -> crate::Result<Json<Vec<ConversationSummary>>> {
    let conversations = message_service.find_active(&identity.sub).await?;
    Ok(Json(conversations))
}

pub async fn find_history(
    Extension(identity): Extension<Identity>,
    message_service: State<MessageService>,
    Path((product_id, recipient_id)): Path<(product::Id, user::Sub)>,
) -> crate::Result<Json<Vec<MessageDto>>> {
    let messages = message_service
        .find_history(&identity.sub, product_id, recipient_id)
        .await?;
    Ok(Json(messages))
}
