//! Keyset pagination cursors.
//!
//! A cursor is the clock rendered as a 64-character zero-padded decimal
//! string followed by the uppercase hex of the row id. Descending byte-wise
//! order of cursors equals descending `(clock, id)` order.

use serde::{Deserialize, Serialize};

use crate::constants::CURSOR_CLOCK_WIDTH;

pub fn encode(clock: u64, id: &[u8]) -> String {
    format!(
        "{clock:0>width$}{}",
        hex::encode_upper(id),
        width = CURSOR_CLOCK_WIDTH
    )
}

/// Split a cursor back into its clock and id. Returns `None` for strings
/// that were not produced by [`encode`].
pub fn decode(cursor: &str) -> Option<(u64, Vec<u8>)> {
    if cursor.len() < CURSOR_CLOCK_WIDTH || !cursor.is_char_boundary(CURSOR_CLOCK_WIDTH) {
        return None;
    }
    let (clock, id) = cursor.split_at(CURSOR_CLOCK_WIDTH);
    let clock = clock.parse::<u64>().ok()?;
    let id = hex::decode(id).ok()?;
    Some((clock, id))
}

/// One page of a keyset-paginated listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor of the first row of the next page; `None` at end of data.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// Build a page from rows fetched with `LIMIT limit + 1`, in cursor
    /// descending order.
    pub fn from_rows(mut rows: Vec<T>, limit: usize, cursor_of: impl Fn(&T) -> String) -> Self {
        let next_cursor = if rows.len() > limit {
            let next = rows.get(limit).map(&cursor_of);
            rows.truncate(limit);
            next
        } else {
            None
        };
        Self {
            items: rows,
            next_cursor,
        }
    }
}
