use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, OptionalExtension};

use parley_shared::cursor::Page;
use parley_shared::types::{ChatType, ContentType};

use crate::database::{conversion_error, not_found, placeholders, Database};
use crate::error::Result;
use crate::models::Message;

const SELECT_MESSAGE: &str = "SELECT id, local_chat_id, chat_type, clock_value, whisper_timestamp,
        timestamp, source, seen, mentioned, replied, response_to, deleted, deleted_for_me,
        content_type, text, album_id, mentions
 FROM user_messages";

/// Number of messages that flipped to seen, and how many of them were
/// mentions or replies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeenCounts {
    pub messages: u32,
    pub mentions: u32,
}

impl Database {
    /// Upsert `messages` in a single transaction.
    pub fn save_messages(&mut self, messages: &[Message]) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO user_messages (id, local_chat_id, chat_type, clock_value,
                     whisper_timestamp, timestamp, source, seen, mentioned, replied, response_to,
                     deleted, deleted_for_me, content_type, text, album_id, mentions, cursor)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                         ?17, ?18)",
            )?;
            for message in messages {
                let mentions = serde_json::to_string(&message.mentions)?;
                stmt.execute(params![
                    message.id,
                    message.chat_id,
                    message.chat_type.as_i64(),
                    message.clock,
                    message.whisper_timestamp,
                    message.timestamp,
                    message.from,
                    message.seen,
                    message.mentioned,
                    message.replied,
                    message.response_to,
                    message.deleted,
                    message.deleted_for_me,
                    message.content_type.as_i64(),
                    message.text,
                    message.album_id,
                    mentions,
                    message.cursor(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn message_by_id(&self, id: &str) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("{SELECT_MESSAGE} WHERE id = ?1"),
                params![id],
                row_to_message,
            )
            .map_err(not_found)
    }

    pub fn message_exists(&self, id: &str) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM user_messages WHERE id = ?1",
                params![id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Page through a chat's history, newest first.
    pub fn messages_by_chat_id(
        &self,
        chat_id: &str,
        cursor: Option<&str>,
        limit: u64,
    ) -> Result<Page<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_MESSAGE}
             WHERE local_chat_id = ?1 AND NOT deleted_for_me AND (?2 = '' OR cursor <= ?2)
             ORDER BY cursor DESC
             LIMIT ?3"
        ))?;
        let fetch = i64::try_from(limit.saturating_add(1)).unwrap_or(i64::MAX);
        let rows = stmt.query_map(
            params![chat_id, cursor.unwrap_or(""), fetch],
            row_to_message,
        )?;
        let rows = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Page::from_rows(rows, limit as usize, Message::cursor))
    }

    /// Every image posted under `album_id`, oldest first.
    pub fn album_messages(&self, chat_id: &str, album_id: &str) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_MESSAGE} WHERE local_chat_id = ?1 AND album_id = ?2 ORDER BY cursor ASC"
        ))?;
        let rows = stmt.query_map(params![chat_id, album_id], row_to_message)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn first_unseen_message_id(&self, chat_id: &str) -> Result<Option<String>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id FROM user_messages
                 WHERE local_chat_id = ?1 AND NOT seen AND NOT deleted AND NOT deleted_for_me
                 ORDER BY cursor ASC LIMIT 1",
                params![chat_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Mark the given messages of `chat_id` as seen.
    pub fn mark_messages_seen(&mut self, chat_id: &str, ids: &[String]) -> Result<SeenCounts> {
        if ids.is_empty() {
            return Ok(SeenCounts::default());
        }
        let in_ids = placeholders(ids.len());
        let args = || std::iter::once(chat_id).chain(ids.iter().map(String::as_str));

        let tx = self.conn_mut().transaction()?;
        let counts = tx.query_row(
            &format!(
                "SELECT COUNT(*), COALESCE(SUM(mentioned OR replied), 0) FROM user_messages
                 WHERE local_chat_id = ? AND NOT seen AND id IN ({in_ids})"
            ),
            params_from_iter(args()),
            |row| {
                Ok(SeenCounts {
                    messages: row.get(0)?,
                    mentions: row.get(1)?,
                })
            },
        )?;
        tx.execute(
            &format!(
                "UPDATE user_messages SET seen = 1
                 WHERE local_chat_id = ? AND NOT seen AND id IN ({in_ids})"
            ),
            params_from_iter(args()),
        )?;
        tx.commit()?;
        Ok(counts)
    }

    /// Mark every message of a chat up to `clock` as seen.
    pub fn mark_all_messages_seen(&self, chat_id: &str, clock: u64) -> Result<usize> {
        Ok(self.conn().execute(
            "UPDATE user_messages SET seen = 1
             WHERE local_chat_id = ?1 AND NOT seen AND clock_value <= ?2",
            params![chat_id, clock],
        )?)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let chat_type: i64 = row.get(2)?;
    let chat_type = ChatType::from_i64(chat_type).map_err(|e| conversion_error(2, Type::Integer, e))?;

    let content_type: i64 = row.get(13)?;
    let content_type =
        ContentType::from_i64(content_type).map_err(|e| conversion_error(13, Type::Integer, e))?;

    let mentions: String = row.get(16)?;
    let mentions: Vec<String> =
        serde_json::from_str(&mentions).map_err(|e| conversion_error(16, Type::Text, e))?;

    Ok(Message {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        chat_type,
        clock: row.get(3)?,
        whisper_timestamp: row.get(4)?,
        timestamp: row.get(5)?,
        from: row.get(6)?,
        seen: row.get(7)?,
        mentioned: row.get(8)?,
        replied: row.get(9)?,
        response_to: row.get(10)?,
        deleted: row.get(11)?,
        deleted_for_me: row.get(12)?,
        content_type,
        text: row.get(14)?,
        album_id: row.get(15)?,
        mentions,
    })
}
