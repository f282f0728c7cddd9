//! # parley-client
//!
//! The Parley message-state engine: ingestion of retrieved envelopes, chat
//! bookkeeping, the Activity Center and the resend scheduler, on top of
//! `parley-store`.
//!
//! The engine is driven either by hand (`handle_retrieved_messages`,
//! `resend_expired_messages`) or by the loops spawned with
//! [`Messenger::start`].

pub mod activity_center;
pub mod background;
pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod ingestion;
pub mod messenger;
pub mod repository;
pub mod resend;
pub mod response;
pub mod settings;
pub mod transport;

pub use config::MessengerConfig;
pub use error::{MessengerError, Result};
pub use events::MessengerEvent;
pub use messenger::{Messenger, OutgoingMessage};
pub use resend::ResendReport;
pub use response::{MessengerResponse, PushNotification, PushReason};
pub use settings::{SettingsProvider, StaticSettings};
pub use transport::{Destination, Envelope, MemoryTransport, ReceivedMessage, Transport};
