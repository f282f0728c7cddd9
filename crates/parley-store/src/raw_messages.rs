use rusqlite::{params, OptionalExtension};

use crate::database::{not_found, Database};
use crate::error::Result;
use crate::models::RawMessage;

const SELECT_RAW: &str = "SELECT id, local_chat_id, payload, send_count, last_sent,
        resend_automatically, sent
 FROM raw_messages";

impl Database {
    /// Insert or replace a dispatch record. A record already confirmed as
    /// sent stays confirmed.
    pub fn save_raw_message(&mut self, raw: &RawMessage) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        let was_sent: Option<bool> = tx
            .query_row(
                "SELECT sent FROM raw_messages WHERE id = ?1",
                params![raw.id],
                |row| row.get(0),
            )
            .optional()?;
        let sent = raw.sent || was_sent.unwrap_or(false);
        tx.execute(
            "INSERT OR REPLACE INTO raw_messages (id, local_chat_id, payload, send_count,
                 last_sent, resend_automatically, sent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                raw.id,
                raw.local_chat_id,
                raw.payload,
                raw.send_count,
                raw.last_sent,
                raw.resend_automatically,
                sent,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn raw_message_by_id(&self, id: &str) -> Result<RawMessage> {
        self.conn()
            .query_row(&format!("{SELECT_RAW} WHERE id = ?1"), params![id], row_to_raw)
            .map_err(not_found)
    }

    /// Unconfirmed, auto-resendable records that have not exhausted their
    /// attempts.
    pub fn expired_raw_messages(&self, max_send_count: u32) -> Result<Vec<RawMessage>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_RAW} WHERE resend_automatically AND NOT sent AND send_count <= ?1"
        ))?;
        let rows = stmt.query_map(params![max_send_count], row_to_raw)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Count one more send attempt made at `at`.
    pub fn record_send_attempt(&self, id: &str, at: u64) -> Result<()> {
        self.conn().execute(
            "UPDATE raw_messages SET send_count = send_count + 1, last_sent = ?2 WHERE id = ?1",
            params![id, at],
        )?;
        Ok(())
    }

    /// Mark delivery confirmations. Ids without a record get a sent
    /// placeholder so the confirmation survives. Returns the number of
    /// placeholders created.
    pub fn mark_raw_messages_sent(&mut self, ids: &[String]) -> Result<usize> {
        let tx = self.conn_mut().transaction()?;
        let mut created = 0;
        for id in ids {
            let updated = tx.execute("UPDATE raw_messages SET sent = 1 WHERE id = ?1", params![id])?;
            if updated == 0 {
                tx.execute(
                    "INSERT INTO raw_messages (id, payload, sent) VALUES (?1, x'', 1)",
                    params![id],
                )?;
                created += 1;
            }
        }
        tx.commit()?;
        Ok(created)
    }
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawMessage> {
    Ok(RawMessage {
        id: row.get(0)?,
        local_chat_id: row.get(1)?,
        payload: row.get(2)?,
        send_count: row.get(3)?,
        last_sent: row.get(4)?,
        resend_automatically: row.get(5)?,
        sent: row.get(6)?,
    })
}
