use thiserror::Error;

use crate::activity::{ContactVerificationStatus, MembershipStatus};

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Illegal state transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Unknown chat type: {0}")]
    UnknownChatType(i64),

    #[error("Unknown content type: {0}")]
    UnknownContentType(i64),

    #[error("Unknown notification type: {0}")]
    UnknownNotificationType(i64),

    #[error("Unknown status value: {0}")]
    UnknownStatus(i64),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
}

/// Rejections produced by the notification state machine.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    #[error("notification is deleted")]
    Deleted,

    #[error("contact verification cannot move from {from:?} to {to:?}")]
    Verification {
        from: ContactVerificationStatus,
        to: ContactVerificationStatus,
    },

    #[error("membership request cannot move from {from:?} to {to:?}")]
    Membership {
        from: MembershipStatus,
        to: MembershipStatus,
    },
}
