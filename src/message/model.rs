use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{product, user};

use super::Id;

/// Identifies one product-scoped conversation between two participants. The
/// pair is stored sorted, so the key is the same whoever sends first.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationKey {
    pub product_id: product::Id,
    participants: [user::Sub; 2],
}

impl ConversationKey {
    pub fn new(product_id: product::Id, a: user::Sub, b: user::Sub) -> Self {
        let participants = if a <= b { [a, b] } else { [b, a] };
        Self {
            product_id,
            participants,
        }
    }

    pub fn participants(&self) -> (&user::Sub, &user::Sub) {
        (&self.participants[0], &self.participants[1])
    }

    /// The participant that is not `sub`. For a self-conversation both sides
    /// are `sub`, which still yields the right answer.
    pub fn other_than(&self, sub: &user::Sub) -> &user::Sub {
        if &self.participants[0] == sub {
            &self.participants[1]
        } else {
            &self.participants[0]
        }
    }
}

/// One persisted chat message. Immutable once appended: there is no update or
/// delete path anywhere in the subsystem.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "_id")]
    id: Id,
    conversation: ConversationKey,
    pub sender: user::Sub,
    pub recipient: user::Sub,
    pub text: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(
        conversation: ConversationKey,
        sender: user::Sub,
        recipient: user::Sub,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Id::random(),
            conversation,
            sender,
            recipient,
            text: text.to_string(),
            timestamp,
        }
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn conversation(&self) -> &ConversationKey {
        &self.conversation
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: Id,
    pub product_id: product::Id,
    pub sender: user::Sub,
    pub recipient: user::Sub,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl From<Message> for MessageDto {
    fn from(msg: Message) -> Self {
        Self {
            id: msg.id,
            product_id: msg.conversation.product_id,
            sender: msg.sender,
            recipient: msg.recipient,
            text: msg.text,
            timestamp: msg.timestamp,
        }
    }
}

/// One row of the conversation listing: the latest exchange per
/// `(other participant, product)` pair. Derived from the log, never stored.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub other_user_id: user::Sub,
    pub product_id: product::Id,
    pub last_message: MessageDto,
}

#[cfg(test)]
mod test {
    use super::*;

    fn sub(s: &str) -> user::Sub {
        user::Sub(s.into())
    }

    #[test]
    fn should_normalize_participant_order() {
        let p = product::Id("p42".into());

        let a_first = ConversationKey::new(p.clone(), sub("u1"), sub("u2"));
        let b_first = ConversationKey::new(p.clone(), sub("u2"), sub("u1"));

        assert_eq!(a_first, b_first);
        assert_eq!(a_first.participants(), (&sub("u1"), &sub("u2")));
    }

    #[test]
    fn should_distinguish_products() {
        let key1 = ConversationKey::new(product::Id("p1".into()), sub("u1"), sub("u2"));
        let key2 = ConversationKey::new(product::Id("p2".into()), sub("u1"), sub("u2"));

        assert_ne!(key1, key2);
    }

    #[test]
    fn should_resolve_other_participant() {
        let key = ConversationKey::new(product::Id("p1".into()), sub("u2"), sub("u1"));

        assert_eq!(key.other_than(&sub("u1")), &sub("u2"));
        assert_eq!(key.other_than(&sub("u2")), &sub("u1"));
    }
}
