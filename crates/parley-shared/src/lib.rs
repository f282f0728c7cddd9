//! # parley-shared
//!
//! Types shared by every Parley crate: identifiers, the per-chat logical
//! clock, the pagination cursor codec, the Activity Center notification
//! state machine and the application-message protocol carried inside
//! decrypted transport envelopes.

pub mod activity;
pub mod clock;
pub mod constants;
pub mod cursor;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::{SharedError, TransitionError};
