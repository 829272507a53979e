use crate::models::Outcome;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::fmt;
use std::str::FromStr;
use tracing::instrument;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const IMAGE_PLACEHOLDER_METADATA: &str = "250, 250";
pub const VIDEO_PLACEHOLDER_METADATA: &str = "1m2s, YouTube";

#[derive(sqlx::Type, Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Media {
    #[default]
    #[sqlx(rename = "TXT")]
    #[serde(rename = "TXT")]
    Text,

    #[sqlx(rename = "IMG")]
    #[serde(rename = "IMG")]
    Image,

    #[sqlx(rename = "VID")]
    #[serde(rename = "VID")]
    Video,
}

impl Media {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "TXT",
            Self::Image => "IMG",
            Self::Video => "VID",
        }
    }

    #[must_use]
    pub const fn placeholder_metadata(self) -> &'static str {
        match self {
            Self::Text => "",
            Self::Image => IMAGE_PLACEHOLDER_METADATA,
            Self::Video => VIDEO_PLACEHOLDER_METADATA,
        }
    }
}

impl FromStr for Media {
    type Err = SendError;

    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        match kind {
            "TXT" => Ok(Self::Text),
            "IMG" => Ok(Self::Image),
            "VID" => Ok(Self::Video),
            _ => Err(SendError::UnknownMedia(kind.to_owned())),
        }
    }
}

impl fmt::Display for Media {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct Message {
    pub id: i64,
    pub sender: String,
    pub recipient: String,
    pub media: Media,
    pub metadata: String,
    pub body: String,
    /// `YYYY-MM-DD HH:MM:SS`, local time.
    pub sent_at: String,
}

/// Message store over the `messages` table. Sender and recipient are checked
/// against `users` on every insert since the schema has no foreign keys.
#[derive(Debug, Clone)]
#[must_use]
pub struct MessageRepository {
    pub(super) connection: SqlitePool,
    pub(super) caller_metadata: bool,
}

impl MessageRepository {
    pub async fn insert_message(
        &self,
        sender: &str,
        recipient: &str,
        body: &str,
        media: Media,
        metadata: &str,
    ) -> Outcome {
        let sent_at = Local::now().naive_local();
        let result = self
            .send(sender, recipient, body, media, metadata, sent_at)
            .await;
        Outcome::from_result(&result, "message sent")
    }

    #[instrument(skip(self, body, metadata))]
    pub async fn send(
        &self,
        sender: &str,
        recipient: &str,
        body: &str,
        media: Media,
        metadata: &str,
        sent_at: NaiveDateTime,
    ) -> Result<Message, SendError> {
        let metadata = if self.caller_metadata {
            metadata
        } else {
            media.placeholder_metadata()
        };
        let sent_at = sent_at.format(TIMESTAMP_FORMAT).to_string();

        // existence checks and insert are one statement, so they share one write lock
        let query = sqlx::query_as::<_, Message>(
            r"
                INSERT INTO messages (sender, recipient, media, metadata, body, sent_at)
                SELECT ?, ?, ?, ?, ?, ?
                WHERE EXISTS (SELECT 1 FROM users WHERE username = ?)
                  AND EXISTS (SELECT 1 FROM users WHERE username = ?)
                RETURNING id, sender, recipient, media, metadata, body, sent_at
            ",
        )
        .bind(sender)
        .bind(recipient)
        .bind(media)
        .bind(metadata)
        .bind(body)
        .bind(sent_at)
        .bind(sender)
        .bind(recipient);

        let message = query
            .fetch_optional(&self.connection)
            .await
            .inspect_err(|error| tracing::error!(?error, "Failed to insert message"))?
            .ok_or_else(|| {
                tracing::debug!("Rejecting message: unknown party");
                SendError::UnknownParty
            })?;

        tracing::debug!(message.id = message.id, "Stored new message");
        Ok(message)
    }

    /// Messages exchanged between two users in either direction, oldest
    /// first. A zero `page_size` returns the whole conversation.
    #[instrument(skip(self), err(Debug))]
    pub async fn conversation(
        &self,
        user_a: &str,
        user_b: &str,
        page_size: u32,
        page: u32,
    ) -> Result<Vec<Message>, sqlx::Error> {
        // a negative LIMIT means no limit in SQLite
        let limit = if page_size == 0 {
            -1
        } else {
            i64::from(page_size)
        };
        let offset = i64::from(page_size) * i64::from(page);

        let query = sqlx::query_as::<_, Message>(
            r"
                SELECT id, sender, recipient, media, metadata, body, sent_at
                FROM messages
                WHERE (sender = ? AND recipient = ?)
                   OR (sender = ? AND recipient = ?)
                ORDER BY sent_at, id
                LIMIT ? OFFSET ?
            ",
        )
        .bind(user_a)
        .bind(user_b)
        .bind(user_b)
        .bind(user_a)
        .bind(limit)
        .bind(offset);

        query
            .fetch_all(&self.connection)
            .await
            .inspect(|messages| tracing::trace!(count = messages.len(), "Fetched conversation"))
    }

    /// Storage failures are logged by [`Self::conversation`] and read as an
    /// empty conversation.
    pub async fn fetch_conversation(
        &self,
        user_a: &str,
        user_b: &str,
        page_size: u32,
        page: u32,
    ) -> Vec<Message> {
        self.conversation(user_a, user_b, page_size, page)
            .await
            .unwrap_or_default()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("invalid username")]
    UnknownParty,

    #[error("message failed to send")]
    UnknownMedia(String),

    #[error("message failed to send")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{Repository, StoreOptions};
    use chrono::NaiveDate;

    async fn repository_with_users(options: StoreOptions, users: &[&str]) -> Repository {
        let repository = Repository::in_memory(options).await.unwrap();
        for user in users {
            assert!(repository.accounts.create_user(user, "pw").await.success);
        }
        repository
    }

    fn at(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    async fn message_rows(repository: &Repository) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages")
            .fetch_one(&repository.connection)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn sent_text_message_is_fetched_back() {
        let repository = repository_with_users(StoreOptions::default(), &["alice", "bob"]).await;
        let messages = &repository.messages;

        let outcome = messages
            .insert_message("alice", "bob", "hi", Media::Text, "")
            .await;
        assert_eq!(outcome, Outcome::success("message sent"));

        let conversation = messages.fetch_conversation("alice", "bob", 0, 0).await;
        assert_eq!(conversation.len(), 1);
        let message = &conversation[0];
        assert_eq!(message.body, "hi");
        assert_eq!(message.media, Media::Text);
        assert_eq!(message.metadata, "");
        assert_eq!(message.sender, "alice");
        assert_eq!(message.recipient, "bob");
        assert!(NaiveDateTime::parse_from_str(&message.sent_at, TIMESTAMP_FORMAT).is_ok());
    }

    #[tokio::test]
    async fn unknown_recipient_writes_nothing() {
        let repository = repository_with_users(StoreOptions::default(), &["alice"]).await;

        let outcome = repository
            .messages
            .insert_message("alice", "ghost", "hi", Media::Text, "")
            .await;
        assert_eq!(outcome, Outcome::failure("invalid username"));

        let outcome = repository
            .messages
            .insert_message("ghost", "alice", "hi", Media::Text, "")
            .await;
        assert_eq!(outcome, Outcome::failure("invalid username"));
        assert_eq!(message_rows(&repository).await, 0);
    }

    #[tokio::test]
    async fn conversation_is_ordered_and_isolated() {
        let repository =
            repository_with_users(StoreOptions::default(), &["alice", "bob", "carol"]).await;
        let messages = &repository.messages;

        messages
            .send("bob", "alice", "second", Media::Text, "", at(10, 0, 2))
            .await
            .unwrap();
        messages
            .send("alice", "carol", "elsewhere", Media::Text, "", at(10, 0, 0))
            .await
            .unwrap();
        messages
            .send("alice", "bob", "first", Media::Text, "", at(10, 0, 1))
            .await
            .unwrap();
        messages
            .send("alice", "bob", "third", Media::Text, "", at(11, 0, 0))
            .await
            .unwrap();

        let bodies: Vec<_> = messages
            .fetch_conversation("alice", "bob", 0, 0)
            .await
            .into_iter()
            .map(|message| message.body)
            .collect();
        assert_eq!(bodies, ["first", "second", "third"]);

        let reversed = messages.fetch_conversation("bob", "alice", 0, 0).await;
        assert_eq!(reversed.len(), 3);
        assert!(reversed.iter().all(|message| message.body != "elsewhere"));
    }

    #[tokio::test]
    async fn pagination_windows_by_page_size() {
        let repository = repository_with_users(StoreOptions::default(), &["alice", "bob"]).await;
        let messages = &repository.messages;
        for (second, body) in ["m0", "m1", "m2", "m3", "m4"].into_iter().enumerate() {
            let second = u32::try_from(second).unwrap();
            messages
                .send("alice", "bob", body, Media::Text, "", at(9, 0, second))
                .await
                .unwrap();
        }

        let page = messages.fetch_conversation("alice", "bob", 2, 1).await;
        let bodies: Vec<_> = page.iter().map(|message| message.body.as_str()).collect();
        assert_eq!(bodies, ["m2", "m3"]);

        let last = messages.fetch_conversation("alice", "bob", 2, 2).await;
        assert_eq!(last.len(), 1);
        assert!(messages.fetch_conversation("alice", "bob", 2, 3).await.is_empty());
    }

    #[tokio::test]
    async fn same_second_messages_keep_insertion_order() {
        let repository = repository_with_users(StoreOptions::default(), &["alice", "bob"]).await;
        let messages = &repository.messages;
        for body in ["a", "b", "c"] {
            messages
                .send("alice", "bob", body, Media::Text, "", at(8, 0, 0))
                .await
                .unwrap();
        }

        let bodies: Vec<_> = messages
            .fetch_conversation("alice", "bob", 0, 0)
            .await
            .into_iter()
            .map(|message| message.body)
            .collect();
        assert_eq!(bodies, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn media_metadata_is_a_fixed_placeholder() {
        let repository = repository_with_users(StoreOptions::default(), &["alice", "bob"]).await;
        let messages = &repository.messages;

        messages
            .insert_message("alice", "bob", "cat.png", Media::Image, "1920, 1080")
            .await;
        messages
            .insert_message("alice", "bob", "clip", Media::Video, "3m, Vimeo")
            .await;
        messages
            .insert_message("alice", "bob", "plain", Media::Text, "ignored")
            .await;

        let conversation = messages.fetch_conversation("alice", "bob", 0, 0).await;
        let metadata: Vec<_> = conversation
            .iter()
            .map(|message| (message.media, message.metadata.as_str()))
            .collect();
        assert_eq!(
            metadata,
            [
                (Media::Image, IMAGE_PLACEHOLDER_METADATA),
                (Media::Video, VIDEO_PLACEHOLDER_METADATA),
                (Media::Text, ""),
            ]
        );
    }

    #[tokio::test]
    async fn caller_metadata_is_kept_when_enabled() {
        let options = StoreOptions {
            caller_metadata: true,
            ..StoreOptions::default()
        };
        let repository = repository_with_users(options, &["alice", "bob"]).await;

        let message = repository
            .messages
            .send("alice", "bob", "cat.png", Media::Image, "1920, 1080", at(7, 0, 0))
            .await
            .unwrap();
        assert_eq!(message.metadata, "1920, 1080");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_sends_all_succeed_on_disk() {
        let directory = tempfile::tempdir().unwrap();
        let repository = Repository::in_directory(directory.path(), StoreOptions::default()).await;
        for user in ["alice", "bob"] {
            assert!(repository.accounts.create_user(user, "pw").await.success);
        }

        let sends: Vec<_> = (0..64)
            .map(|index| {
                let messages = repository.messages.clone();
                tokio::spawn(async move {
                    messages
                        .insert_message("alice", "bob", &format!("m{index}"), Media::Text, "")
                        .await
                })
            })
            .collect();
        for send in sends {
            assert_eq!(send.await.unwrap(), Outcome::success("message sent"));
        }

        assert_eq!(message_rows(&repository).await, 64);
    }

    #[test]
    fn media_kinds_parse_from_wire_names() {
        assert_eq!("TXT".parse::<Media>().unwrap(), Media::Text);
        assert_eq!("IMG".parse::<Media>().unwrap(), Media::Image);
        assert_eq!("VID".parse::<Media>().unwrap(), Media::Video);

        let error = "GIF".parse::<Media>().unwrap_err();
        assert!(matches!(error, SendError::UnknownMedia(ref kind) if kind == "GIF"));
        assert_eq!(error.to_string(), "message failed to send");
    }

    #[tokio::test]
    async fn empty_conversation_is_not_an_error() {
        let repository = repository_with_users(StoreOptions::default(), &["alice", "bob"]).await;
        let conversation = repository
            .messages
            .conversation("alice", "bob", 10, 0)
            .await
            .unwrap();
        assert!(conversation.is_empty());
    }
}
