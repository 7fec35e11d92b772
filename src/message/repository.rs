use std::collections::HashSet;

use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::options::FindOptions;

use crate::user;

use super::model::{ConversationKey, ConversationSummary, Message};

/// The durable, append-only message log. The store itself is an external
/// collaborator; this trait is the whole contract the subsystem relies on.
#[async_trait::async_trait]
pub trait MessageRepository {
    /// Durability point: a message may only be fanned out after this returns.
    async fn append(&self, msg: &Message) -> super::Result<()>;

    /// The caller's conversation listing, most recent first.
    async fn list_conversations(&self, sub: &user::Sub) -> super::Result<Vec<ConversationSummary>>;

    /// Full history of one conversation, oldest first.
    async fn list_messages(&self, key: &ConversationKey) -> super::Result<Vec<Message>>;
}

/// Groups a user's messages into one summary per conversation key. Newest
/// message wins; equal timestamps are broken by message id so the result is
/// deterministic.
fn summarize(mut messages: Vec<Message>, sub: &user::Sub) -> Vec<ConversationSummary> {
    messages.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.id().cmp(a.id()))
    });

    let mut seen = HashSet::new();
    let mut summaries = Vec::new();

    for msg in messages {
        let key = msg.conversation().clone();
        if !seen.insert(key.clone()) {
            continue;
        }

        summaries.push(ConversationSummary {
            other_user_id: key.other_than(sub).clone(),
            product_id: key.product_id,
            last_message: msg.into(),
        });
    }

    summaries
}

pub struct MongoMessageRepository {
    collection: mongodb::Collection<Message>,
}

impl MongoMessageRepository {
    pub fn new(database: &mongodb::Database) -> Self {
        Self {
            collection: database.collection("messages"),
        }
    }
}

#[async_trait::async_trait]
impl MessageRepository for MongoMessageRepository {
    async fn append(&self, msg: &Message) -> super::Result<()> {
        self.collection.insert_one(msg, None).await?;
        Ok(())
    }

    async fn list_conversations(&self, sub: &user::Sub) -> super::Result<Vec<ConversationSummary>> {
        let filter = doc! {
            "$or": [
                { "sender": sub.clone() },
                { "recipient": sub.clone() },
            ]
        };

        let cursor = self.collection.find(filter, None).await?;
        let messages = cursor.try_collect().await?;

        Ok(summarize(messages, sub))
    }

    async fn list_messages(&self, key: &ConversationKey) -> super::Result<Vec<Message>> {
        let filter = doc! { "conversation": mongodb::bson::to_bson(key)? };
        let asc_by_timestamp = FindOptions::builder()
            .sort(doc! { "timestamp": 1, "_id": 1 })
            .build();

        let cursor = self.collection.find(filter, asc_by_timestamp).await?;

        cursor.try_collect().await.map_err(super::Error::from)
    }
}

#[cfg(test)]
pub mod test {
    use std::sync::Mutex;

    use super::*;

    /// Log double backed by a `Vec`; mirrors the repository contract closely
    /// enough for relay and query tests.
    #[derive(Default)]
    pub struct InMemoryMessageRepository {
        messages: Mutex<Vec<Message>>,
    }

    impl InMemoryMessageRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn appended(&self) -> Vec<Message> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl MessageRepository for InMemoryMessageRepository {
        async fn append(&self, msg: &Message) -> crate::message::Result<()> {
            self.messages.lock().unwrap().push(msg.clone());
            Ok(())
        }

        async fn list_conversations(
            &self,
            sub: &user::Sub,
        ) -> crate::message::Result<Vec<ConversationSummary>> {
            let messages = self
                .messages
                .lock()
                .unwrap()
                .iter()
                .filter(|m| &m.sender == sub || &m.recipient == sub)
                .cloned()
                .collect();

            Ok(summarize(messages, sub))
        }

        async fn list_messages(
            &self,
            key: &ConversationKey,
        ) -> crate::message::Result<Vec<Message>> {
            let mut messages: Vec<Message> = self
                .messages
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.conversation() == key)
                .cloned()
                .collect();

            messages.sort_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.id().cmp(b.id()))
            });

            Ok(messages)
        }
    }

    /// Always-failing log for persist-before-broadcast tests.
    pub struct UnavailableMessageRepository;

    #[async_trait::async_trait]
    impl MessageRepository for UnavailableMessageRepository {
        async fn append(&self, _msg: &Message) -> crate::message::Result<()> {
            Err(storage_error())
        }

        async fn list_conversations(
            &self,
            _sub: &user::Sub,
        ) -> crate::message::Result<Vec<ConversationSummary>> {
            Err(storage_error())
        }

        async fn list_messages(
            &self,
            _key: &ConversationKey,
        ) -> crate::message::Result<Vec<Message>> {
            Err(storage_error())
        }
    }

    fn storage_error() -> crate::message::Error {
        crate::message::Error::from(mongodb::error::Error::custom("storage unavailable"))
    }

    mod summarize {
        use chrono::{DateTime, TimeDelta, Utc};

        use crate::product;

        use super::*;

        fn sub(s: &str) -> user::Sub {
            user::Sub(s.into())
        }

        fn message(
            product: &str,
            sender: &str,
            recipient: &str,
            text: &str,
            at: DateTime<Utc>,
        ) -> Message {
            let key = ConversationKey::new(product::Id(product.into()), sub(sender), sub(recipient));
            Message::new(key, sub(sender), sub(recipient), text, at)
        }

        #[test]
        fn should_keep_latest_message_per_conversation() {
            let t0 = Utc::now();
            let messages = vec![
                message("p1", "me", "u2", "old", t0),
                message("p1", "u2", "me", "new", t0 + TimeDelta::seconds(5)),
                message("p2", "me", "u2", "other product", t0),
            ];

            let summaries = summarize(messages, &sub("me"));

            assert_eq!(summaries.len(), 2);
            assert_eq!(summaries[0].last_message.text, "new");
            assert_eq!(summaries[0].other_user_id, sub("u2"));
            assert_eq!(summaries[0].product_id, product::Id("p1".into()));
            assert_eq!(summaries[1].last_message.text, "other product");
        }

        #[test]
        fn should_break_timestamp_ties_by_message_id() {
            let t0 = Utc::now();
            let a = message("p1", "me", "u2", "a", t0);
            let b = message("p1", "u2", "me", "b", t0);

            let winner = if a.id() > b.id() { "a" } else { "b" };
            let summaries = summarize(vec![a, b], &sub("me"));

            assert_eq!(summaries.len(), 1);
            assert_eq!(summaries[0].last_message.text, winner);
        }

        #[test]
        fn should_dedupe_regardless_of_direction() {
            let t0 = Utc::now();
            let messages = vec![
                message("p1", "me", "u2", "sent", t0),
                message("p1", "u2", "me", "received", t0 + TimeDelta::seconds(1)),
            ];

            let summaries = summarize(messages, &sub("me"));

            assert_eq!(summaries.len(), 1);
            assert_eq!(summaries[0].other_user_id, sub("u2"));
        }
    }
}
