use thiserror::Error;

use parley_shared::protocol::MessageKind;
use parley_shared::types::ChatType;
use parley_shared::{SharedError, TransitionError};
use parley_store::StoreError;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum MessengerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] SharedError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Illegal state transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    #[error("Chat {chat_id} does not accept {chat_type:?} messages")]
    UnsupportedChatType { chat_id: String, chat_type: ChatType },

    #[error("{0} is not a member of the chat")]
    NotAMember(String),

    #[error("Notification not found: {0}")]
    NotificationNotFound(String),

    #[error("{0:?} is only accepted from paired devices")]
    UnauthorizedSync(MessageKind),

    #[error("Node is offline")]
    Offline,

    #[error("Lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, MessengerError>;
