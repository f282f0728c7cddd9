//! # parley-store
//!
//! Local storage for the Parley message-state engine, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for chats, contacts,
//! user messages, Activity Center notifications and the outbound dispatch
//! ledger. Every multi-row write runs in a single transaction.

pub mod chats;
pub mod communities;
pub mod contacts;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod notifications;
pub mod raw_messages;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
