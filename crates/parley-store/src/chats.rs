use rusqlite::params;
use rusqlite::types::Type;

use parley_shared::types::ChatType;

use crate::database::{conversion_error, not_found, Database};
use crate::error::Result;
use crate::models::{Chat, Message};

const SELECT_CHAT: &str = "SELECT id, chat_type, name, community_id, members, active, muted,
        muted_till, last_clock_value, timestamp, unviewed_messages_count,
        unviewed_mentions_count, read_messages_at_clock_value, deleted_at_clock_value,
        last_message
 FROM chats";

impl Database {
    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Upsert `chats` in a single transaction.
    pub fn save_chats(&mut self, chats: &[Chat]) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO chats (id, chat_type, name, community_id, members,
                     active, muted, muted_till, last_clock_value, timestamp,
                     unviewed_messages_count, unviewed_mentions_count,
                     read_messages_at_clock_value, deleted_at_clock_value, last_message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            )?;
            for chat in chats {
                let members = serde_json::to_string(&chat.members)?;
                let last_message = chat
                    .last_message
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                stmt.execute(params![
                    chat.id,
                    chat.chat_type.as_i64(),
                    chat.name,
                    chat.community_id,
                    members,
                    chat.active,
                    chat.muted,
                    chat.muted_till,
                    chat.last_clock_value,
                    chat.timestamp,
                    chat.unviewed_messages_count,
                    chat.unviewed_mentions_count,
                    chat.read_messages_at_clock_value,
                    chat.deleted_at_clock_value,
                    last_message,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn save_chat(&mut self, chat: &Chat) -> Result<()> {
        self.save_chats(std::slice::from_ref(chat))
    }

    /// Soft-delete: the chat is hidden and everything up to `clock` is
    /// discarded from now on.
    pub fn deactivate_chat(&self, id: &str, clock: u64) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE chats
             SET active = 0, deleted_at_clock_value = ?2,
                 unviewed_messages_count = 0, unviewed_mentions_count = 0
             WHERE id = ?1",
            params![id, clock],
        )?;
        Ok(affected > 0)
    }

    /// Clear every mute whose deadline is at or before `now`. Returns the ids
    /// of the chats that were unmuted.
    pub fn unmute_expired_chats(&mut self, now: u64) -> Result<Vec<String>> {
        let tx = self.conn_mut().transaction()?;
        let ids = {
            let mut stmt = tx.prepare(
                "SELECT id FROM chats WHERE muted = 1 AND muted_till > 0 AND muted_till <= ?1",
            )?;
            let rows = stmt.query_map(params![now], |row| row.get::<_, String>(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        for id in &ids {
            tx.execute(
                "UPDATE chats SET muted = 0, muted_till = 0 WHERE id = ?1",
                params![id],
            )?;
        }
        tx.commit()?;
        Ok(ids)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn chat(&self, id: &str) -> Result<Chat> {
        self.conn()
            .query_row(&format!("{SELECT_CHAT} WHERE id = ?1"), params![id], row_to_chat)
            .map_err(not_found)
    }

    pub fn chats(&self) -> Result<Vec<Chat>> {
        let mut stmt = self.conn().prepare(SELECT_CHAT)?;
        let rows = stmt.query_map([], row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }
}

fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let chat_type: i64 = row.get(1)?;
    let chat_type = ChatType::from_i64(chat_type).map_err(|e| conversion_error(1, Type::Integer, e))?;

    let members: String = row.get(4)?;
    let members: Vec<String> =
        serde_json::from_str(&members).map_err(|e| conversion_error(4, Type::Text, e))?;

    let last_message: Option<String> = row.get(14)?;
    let last_message: Option<Message> = last_message
        .map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(|e| conversion_error(14, Type::Text, e))?;

    Ok(Chat {
        id: row.get(0)?,
        chat_type,
        name: row.get(2)?,
        community_id: row.get(3)?,
        members,
        active: row.get(5)?,
        muted: row.get(6)?,
        muted_till: row.get(7)?,
        last_clock_value: row.get(8)?,
        timestamp: row.get(9)?,
        unviewed_messages_count: row.get(10)?,
        unviewed_mentions_count: row.get(11)?,
        read_messages_at_clock_value: row.get(12)?,
        deleted_at_clock_value: row.get(13)?,
        last_message,
    })
}
