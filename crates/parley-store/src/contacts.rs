use rusqlite::params;

use crate::database::{not_found, Database};
use crate::error::Result;
use crate::models::Contact;

impl Database {
    /// Upsert `contacts` in a single transaction.
    pub fn save_contacts(&mut self, contacts: &[Contact]) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO contacts (id, display_name, added, blocked, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for contact in contacts {
                stmt.execute(params![
                    contact.id,
                    contact.display_name,
                    contact.added,
                    contact.blocked,
                    contact.last_updated,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn contact(&self, id: &str) -> Result<Contact> {
        self.conn()
            .query_row(
                "SELECT id, display_name, added, blocked, last_updated FROM contacts WHERE id = ?1",
                params![id],
                row_to_contact,
            )
            .map_err(not_found)
    }

    pub fn contacts(&self) -> Result<Vec<Contact>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, display_name, added, blocked, last_updated FROM contacts")?;
        let rows = stmt.query_map([], row_to_contact)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

fn row_to_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        display_name: row.get(1)?,
        added: row.get(2)?,
        blocked: row.get(3)?,
        last_updated: row.get(4)?,
    })
}
