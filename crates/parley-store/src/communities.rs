use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Record the clock at which the user joined `community_id`. Events of
    /// the community dated before it do not raise notifications.
    pub fn save_community_join(&self, community_id: &str, joined_clock: u64) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO community_joins (community_id, joined_clock) VALUES (?1, ?2)",
            params![community_id, joined_clock],
        )?;
        Ok(())
    }

    pub fn community_joined_clock(&self, community_id: &str) -> Result<Option<u64>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT joined_clock FROM community_joins WHERE community_id = ?1",
                params![community_id],
                |row| row.get(0),
            )
            .optional()?)
    }
}
