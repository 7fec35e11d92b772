use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::event::ConnectionId;
use crate::event::hub::Hub;
use crate::event::model::OutboundFrame;
use crate::presence::service::PresenceService;
use crate::{product, user};

use super::model::{ConversationKey, ConversationSummary, Message, MessageDto};

/// Relays inbound chat frames: validate, persist, then fan out to the live
/// connections of the two participants on that product.
#[derive(Clone)]
pub struct MessageService {
    repository: super::Repository,
    hub: Arc<Hub>,
    presence_service: PresenceService,
}

impl MessageService {
    pub fn new(
        repository: super::Repository,
        hub: Arc<Hub>,
        presence_service: PresenceService,
    ) -> Self {
        Self {
            repository,
            hub,
            presence_service,
        }
    }
}

impl MessageService {
    /// A persistence failure surfaces to the sender and nothing is broadcast:
    /// a message is never shown as delivered unless it is durably stored.
    /// There is no retry here; resubmission is the client's call.
    pub async fn submit(
        &self,
        conn_id: &ConnectionId,
        recipient: user::Sub,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> super::Result<Message> {
        let conn = self
            .hub
            .info(conn_id)
            .await
            .ok_or(super::Error::Unregistered)?;

        if text.trim().is_empty() {
            return Err(super::Error::EmptyText);
        }
        if text.chars().count() > super::MAX_TEXT_LEN {
            return Err(super::Error::TextTooLong);
        }
        if recipient.is_blank() {
            return Err(super::Error::InvalidRecipient);
        }

        let key = ConversationKey::new(
            conn.product_id.clone(),
            conn.sub.clone(),
            recipient.clone(),
        );
        let msg = Message::new(key, conn.sub.clone(), recipient.clone(), text, timestamp);

        self.repository.append(&msg).await?;

        let frame = OutboundFrame::chat(&conn, text, timestamp);
        let removed = self
            .hub
            .broadcast(
                |c| {
                    c.product_id == conn.product_id
                        && (c.sub == conn.sub || c.sub == recipient)
                },
                frame,
            )
            .await;
        for r in removed {
            self.presence_service.disconnected(&r.sub).await;
        }

        // sending counts as activity
        self.presence_service.heartbeat(&conn.sub).await;

        Ok(msg)
    }
}

impl MessageService {
    pub async fn find_active(&self, sub: &user::Sub) -> super::Result<Vec<ConversationSummary>> {
        self.repository.list_conversations(sub).await
    }

    pub async fn find_history(
        &self,
        sub: &user::Sub,
        product_id: product::Id,
        other: user::Sub,
    ) -> super::Result<Vec<MessageDto>> {
        let key = ConversationKey::new(product_id, sub.clone(), other);
        let messages = self.repository.list_messages(&key).await?;

        Ok(messages.into_iter().map(Into::into).collect())
    }
}
