//! v001 -- Initial schema creation.
//!
//! Creates chats, contacts, user messages, the Activity Center tables, the
//! outbound dispatch ledger and community join records.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    id                           TEXT PRIMARY KEY NOT NULL,
    chat_type                    INTEGER NOT NULL,
    name                         TEXT NOT NULL DEFAULT '',
    community_id                 TEXT,
    members                      TEXT NOT NULL DEFAULT '[]',   -- JSON array of contact ids
    active                       INTEGER NOT NULL DEFAULT 1,
    muted                        INTEGER NOT NULL DEFAULT 0,
    muted_till                   INTEGER NOT NULL DEFAULT 0,
    last_clock_value             INTEGER NOT NULL DEFAULT 0,
    timestamp                    INTEGER NOT NULL DEFAULT 0,
    unviewed_messages_count      INTEGER NOT NULL DEFAULT 0,
    unviewed_mentions_count      INTEGER NOT NULL DEFAULT 0,
    read_messages_at_clock_value INTEGER NOT NULL DEFAULT 0,
    deleted_at_clock_value       INTEGER NOT NULL DEFAULT 0,
    last_message                 TEXT                          -- JSON snapshot
);

-- ----------------------------------------------------------------
-- Contacts
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS contacts (
    id           TEXT PRIMARY KEY NOT NULL,   -- 0x + hex public key
    display_name TEXT NOT NULL DEFAULT '',
    added        INTEGER NOT NULL DEFAULT 0,
    blocked      INTEGER NOT NULL DEFAULT 0,
    last_updated INTEGER NOT NULL DEFAULT 0
);

-- ----------------------------------------------------------------
-- User messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS user_messages (
    id                TEXT PRIMARY KEY NOT NULL,
    local_chat_id     TEXT NOT NULL,
    chat_type         INTEGER NOT NULL,
    clock_value       INTEGER NOT NULL,
    whisper_timestamp INTEGER NOT NULL,
    timestamp         INTEGER NOT NULL,
    source            TEXT NOT NULL,
    seen              INTEGER NOT NULL DEFAULT 0,
    mentioned         INTEGER NOT NULL DEFAULT 0,
    replied           INTEGER NOT NULL DEFAULT 0,
    response_to       TEXT,
    deleted           INTEGER NOT NULL DEFAULT 0,
    deleted_for_me    INTEGER NOT NULL DEFAULT 0,
    content_type      INTEGER NOT NULL,
    text              TEXT NOT NULL DEFAULT '',
    album_id          TEXT,
    mentions          TEXT NOT NULL DEFAULT '[]',   -- JSON array of contact ids
    cursor            TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_user_messages_chat_cursor
    ON user_messages(local_chat_id, cursor);
CREATE INDEX IF NOT EXISTS idx_user_messages_album
    ON user_messages(local_chat_id, album_id);

-- ----------------------------------------------------------------
-- Activity Center
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS activity_center_notifications (
    id                          BLOB PRIMARY KEY NOT NULL,
    timestamp                   INTEGER NOT NULL,
    notification_type           INTEGER NOT NULL,
    chat_id                     TEXT NOT NULL DEFAULT '',
    community_id                TEXT,
    membership_status           INTEGER NOT NULL DEFAULT 0,
    message                     TEXT,                     -- JSON snapshot
    reply_message               TEXT,                     -- JSON snapshot
    author                      TEXT NOT NULL DEFAULT '',
    read                        INTEGER NOT NULL DEFAULT 0,
    accepted                    INTEGER NOT NULL DEFAULT 0,
    dismissed                   INTEGER NOT NULL DEFAULT 0,
    deleted                     INTEGER NOT NULL DEFAULT 0,
    contact_verification_status INTEGER NOT NULL DEFAULT 0,
    token_data                  TEXT,
    updated_at                  INTEGER NOT NULL DEFAULT 0,
    cursor                      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_activity_center_cursor
    ON activity_center_notifications(cursor);

CREATE TABLE IF NOT EXISTS activity_center_states (
    id         INTEGER PRIMARY KEY CHECK (id = 1),
    has_seen   INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

INSERT OR IGNORE INTO activity_center_states (id, has_seen, updated_at) VALUES (1, 1, 0);

-- ----------------------------------------------------------------
-- Outbound dispatch ledger
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS raw_messages (
    id                   TEXT PRIMARY KEY NOT NULL,
    local_chat_id        TEXT NOT NULL DEFAULT '',
    payload              BLOB NOT NULL,
    send_count           INTEGER NOT NULL DEFAULT 0,
    last_sent            INTEGER NOT NULL DEFAULT 0,
    resend_automatically INTEGER NOT NULL DEFAULT 0,
    sent                 INTEGER NOT NULL DEFAULT 0
);

-- ----------------------------------------------------------------
-- Community joins
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS community_joins (
    community_id TEXT PRIMARY KEY NOT NULL,
    joined_clock INTEGER NOT NULL
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
