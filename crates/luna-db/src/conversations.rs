use chrono::{DateTime, Utc};
use luna_common::{
    CompanionId, ConversationId, Error, Message, MessageSender, Result, UserId,
};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use tracing::debug;

use crate::database::{Database, json_column, now_str, timestamp_column, to_json, ts};

/// The single running conversation between a user and one companion.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub user_id: UserId,
    pub companion_id: CompanionId,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Database {
    pub fn get_or_create_conversation(
        &self,
        user_id: &UserId,
        companion_id: &CompanionId,
    ) -> Result<Conversation> {
        {
            let conn = self.connection()?;
            let now = now_str();
            conn.execute(
                "INSERT OR IGNORE INTO conversations (id, user_id, companion_id, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    ConversationId::new().as_str(),
                    user_id.as_str(),
                    companion_id.as_str(),
                    now,
                    now
                ],
            )
            .map_err(|e| Error::Database(format!("failed to create conversation: {e}")))?;
        }

        self.get_conversation(user_id, companion_id)?
            .ok_or_else(|| Error::Database("conversation vanished after insert".into()))
    }

    /// Load a conversation with its messages in insertion order.
    pub fn get_conversation(
        &self,
        user_id: &UserId,
        companion_id: &CompanionId,
    ) -> Result<Option<Conversation>> {
        let conn = self.connection()?;
        let header = conn
            .query_row(
                "SELECT id, created_at, updated_at FROM conversations
                 WHERE user_id = ? AND companion_id = ?",
                params![user_id.as_str(), companion_id.as_str()],
                |row| {
                    Ok((
                        ConversationId::from_raw(row.get::<_, String>(0)?),
                        timestamp_column(row, 1)?,
                        timestamp_column(row, 2)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to load conversation: {e}")))?;

        let Some((id, created_at, updated_at)) = header else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(
                "SELECT id, sender, content, emotions, timestamp FROM messages
                 WHERE conversation_id = ? ORDER BY seq",
            )
            .map_err(|e| Error::Database(format!("failed to prepare message query: {e}")))?;
        let messages = stmt
            .query_map(params![id.as_str()], row_to_message)
            .map_err(|e| Error::Database(format!("failed to load messages: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect messages: {e}")))?;

        Ok(Some(Conversation {
            id,
            user_id: user_id.clone(),
            companion_id: companion_id.clone(),
            messages,
            created_at,
            updated_at,
        }))
    }

    /// Append messages in order. Either all of them land or none do.
    pub fn append_messages(&self, conversation_id: &ConversationId, messages: &[Message]) -> Result<()> {
        self.transaction(|tx| {
            for message in messages {
                tx.execute(
                    "INSERT INTO messages (id, conversation_id, sender, content, emotions, timestamp)
                     VALUES (?, ?, ?, ?, ?, ?)",
                    params![
                        message.id,
                        conversation_id.as_str(),
                        message.sender.as_str(),
                        message.content,
                        to_json(&message.emotions)?,
                        ts(message.timestamp),
                    ],
                )
                .map_err(|e| Error::Database(format!("failed to append message: {e}")))?;
            }
            let touched = tx
                .execute(
                    "UPDATE conversations SET updated_at = ? WHERE id = ?",
                    params![now_str(), conversation_id.as_str()],
                )
                .map_err(|e| Error::Database(format!("failed to touch conversation: {e}")))?;
            if touched == 0 {
                return Err(Error::NotFound(format!("conversation {conversation_id}")));
            }
            Ok(())
        })?;

        debug!(
            "appended {} messages to conversation {conversation_id}",
            messages.len()
        );
        Ok(())
    }

    /// Remove every message but keep the conversation itself. Returns how
    /// many messages were removed.
    pub fn clear_conversation(&self, conversation_id: &ConversationId) -> Result<usize> {
        let conn = self.connection()?;
        conn.execute(
            "DELETE FROM messages WHERE conversation_id = ?",
            params![conversation_id.as_str()],
        )
        .map_err(|e| Error::Database(format!("failed to clear conversation: {e}")))
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let sender: String = row.get(1)?;
    let sender = match sender.as_str() {
        "user" => MessageSender::User,
        _ => MessageSender::Companion,
    };
    Ok(Message {
        id: row.get(0)?,
        sender,
        content: row.get(2)?,
        emotions: json_column(row, 3)?,
        timestamp: timestamp_column(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::Database;
    use crate::companions::tests::companion;
    use crate::users::tests::user;
    use luna_common::{Emotion, EmotionScore, Message, MessageSender};

    #[test]
    fn get_or_create_returns_the_same_conversation() {
        let db = Database::in_memory().unwrap();
        let alice = user(&db, "alice@example.com");
        let luna = companion(&db, &alice.id, "Luna");

        let first = db.get_or_create_conversation(&alice.id, &luna.id).unwrap();
        let second = db.get_or_create_conversation(&alice.id, &luna.id).unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.messages.is_empty());
    }

    #[test]
    fn messages_come_back_in_order_with_emotions() {
        let db = Database::in_memory().unwrap();
        let alice = user(&db, "alice@example.com");
        let luna = companion(&db, &alice.id, "Luna");
        let convo = db.get_or_create_conversation(&alice.id, &luna.id).unwrap();

        let hello = Message::new(MessageSender::User, "I'm so happy today").with_emotions(vec![
            EmotionScore {
                emotion: Emotion::Joy,
                score: 1.0,
            },
        ]);
        let reply = Message::new(MessageSender::Companion, "That's wonderful!");
        db.append_messages(&convo.id, &[hello, reply]).unwrap();

        let loaded = db.get_conversation(&alice.id, &luna.id).unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].sender, MessageSender::User);
        assert_eq!(loaded.messages[0].dominant_emotion(), Some(Emotion::Joy));
        assert_eq!(loaded.messages[1].content, "That's wonderful!");
    }

    #[test]
    fn clear_keeps_the_conversation() {
        let db = Database::in_memory().unwrap();
        let alice = user(&db, "alice@example.com");
        let luna = companion(&db, &alice.id, "Luna");
        let convo = db.get_or_create_conversation(&alice.id, &luna.id).unwrap();
        db.append_messages(&convo.id, &[Message::new(MessageSender::User, "hi")])
            .unwrap();

        assert_eq!(db.clear_conversation(&convo.id).unwrap(), 1);
        let loaded = db.get_conversation(&alice.id, &luna.id).unwrap().unwrap();
        assert_eq!(loaded.id, convo.id);
        assert!(loaded.messages.is_empty());
    }

    #[test]
    fn deleting_the_companion_drops_its_conversation() {
        let db = Database::in_memory().unwrap();
        let alice = user(&db, "alice@example.com");
        let luna = companion(&db, &alice.id, "Luna");
        db.get_or_create_conversation(&alice.id, &luna.id).unwrap();

        db.delete_companion(&luna.id).unwrap();
        assert!(db.get_conversation(&alice.id, &luna.id).unwrap().is_none());
    }
}
