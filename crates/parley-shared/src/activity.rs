//! Activity Center notification vocabulary and state machine.
//!
//! A notification carries four independent flags. Every user action and
//! every cross-device sync goes through [`apply`], which is the only place
//! the legal transitions are encoded.

use serde::{Deserialize, Serialize};

use crate::error::{SharedError, TransitionError};

// ---------------------------------------------------------------------------
// Notification types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i64)]
pub enum ActivityCenterType {
    NewOneToOne = 1,
    NewPrivateGroupChat = 2,
    Mention = 3,
    Reply = 4,
    ContactRequest = 5,
    CommunityInvitation = 6,
    CommunityRequest = 7,
    CommunityMembershipRequest = 8,
    CommunityKicked = 9,
    ContactVerification = 10,
    ContactRequestRetracted = 11,
    CommunityTokenReceived = 12,
    FirstCommunityTokenReceived = 13,
    CommunityBanned = 14,
    CommunityUnbanned = 15,
}

impl ActivityCenterType {
    pub const ALL: [ActivityCenterType; 15] = [
        Self::NewOneToOne,
        Self::NewPrivateGroupChat,
        Self::Mention,
        Self::Reply,
        Self::ContactRequest,
        Self::CommunityInvitation,
        Self::CommunityRequest,
        Self::CommunityMembershipRequest,
        Self::CommunityKicked,
        Self::ContactVerification,
        Self::ContactRequestRetracted,
        Self::CommunityTokenReceived,
        Self::FirstCommunityTokenReceived,
        Self::CommunityBanned,
        Self::CommunityUnbanned,
    ];

    /// Types cleared when the user leaves or is removed from a community.
    pub const COMMUNITY_MEMBERSHIP: [ActivityCenterType; 4] = [
        Self::CommunityRequest,
        Self::CommunityKicked,
        Self::CommunityBanned,
        Self::CommunityUnbanned,
    ];

    pub fn from_i64(v: i64) -> Result<Self, SharedError> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_i64() == v)
            .ok_or(SharedError::UnknownNotificationType(v))
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

/// Read-state filter of notification listings and counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReadFilter {
    #[default]
    All,
    Read,
    Unread,
}

// ---------------------------------------------------------------------------
// Flag state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationFlags {
    pub read: bool,
    pub dismissed: bool,
    pub accepted: bool,
    pub deleted: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationAction {
    MarkRead,
    MarkUnread,
    Dismiss,
    Accept,
    Delete,
}

/// Apply `action` to `flags`. Deleted notifications are terminal: every
/// action on them is rejected except a repeated delete.
pub fn apply(
    flags: NotificationFlags,
    action: NotificationAction,
) -> Result<NotificationFlags, TransitionError> {
    if flags.deleted {
        return match action {
            NotificationAction::Delete => Ok(flags),
            _ => Err(TransitionError::Deleted),
        };
    }
    let mut next = flags;
    match action {
        NotificationAction::MarkRead => next.read = true,
        NotificationAction::MarkUnread => next.read = false,
        NotificationAction::Dismiss => {
            next.read = true;
            next.dismissed = true;
        }
        NotificationAction::Accept => {
            next.read = true;
            next.accepted = true;
        }
        NotificationAction::Delete => next.deleted = true,
    }
    Ok(next)
}

// ---------------------------------------------------------------------------
// Decision sub-states
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[repr(i64)]
pub enum ContactVerificationStatus {
    #[default]
    Unverified = 0,
    Pending = 1,
    Accepted = 2,
    Declined = 3,
    Canceled = 4,
    Trusted = 5,
    Untrustworthy = 6,
}

impl ContactVerificationStatus {
    pub fn from_i64(v: i64) -> Result<Self, SharedError> {
        Ok(match v {
            0 => Self::Unverified,
            1 => Self::Pending,
            2 => Self::Accepted,
            3 => Self::Declined,
            4 => Self::Canceled,
            5 => Self::Trusted,
            6 => Self::Untrustworthy,
            other => return Err(SharedError::UnknownStatus(other)),
        })
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn transition(self, to: Self) -> Result<Self, TransitionError> {
        use ContactVerificationStatus::*;
        let legal = self == to
            || matches!(
                (self, to),
                (Unverified, Pending)
                    | (Pending, Accepted)
                    | (Pending, Declined)
                    | (Pending, Canceled)
                    | (Accepted, Trusted)
                    | (Accepted, Untrustworthy)
            );
        if legal {
            Ok(to)
        } else {
            Err(TransitionError::Verification { from: self, to })
        }
    }

    /// Flag change implied by reaching this status.
    pub fn implied_action(self) -> Option<NotificationAction> {
        match self {
            Self::Accepted | Self::Trusted | Self::Untrustworthy => Some(NotificationAction::Accept),
            Self::Declined | Self::Canceled => Some(NotificationAction::Dismiss),
            Self::Unverified | Self::Pending => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[repr(i64)]
pub enum MembershipStatus {
    #[default]
    Idle = 0,
    Pending = 1,
    Accepted = 2,
    Declined = 3,
    AcceptedPending = 4,
    DeclinedPending = 5,
}

impl MembershipStatus {
    pub fn from_i64(v: i64) -> Result<Self, SharedError> {
        Ok(match v {
            0 => Self::Idle,
            1 => Self::Pending,
            2 => Self::Accepted,
            3 => Self::Declined,
            4 => Self::AcceptedPending,
            5 => Self::DeclinedPending,
            other => return Err(SharedError::UnknownStatus(other)),
        })
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn transition(self, to: Self) -> Result<Self, TransitionError> {
        use MembershipStatus::*;
        let legal = self == to
            || matches!(
                (self, to),
                (Idle, Pending)
                    | (Pending, Accepted)
                    | (Pending, Declined)
                    | (Pending, AcceptedPending)
                    | (Pending, DeclinedPending)
                    | (AcceptedPending, Accepted)
                    | (DeclinedPending, Declined)
            );
        if legal {
            Ok(to)
        } else {
            Err(TransitionError::Membership { from: self, to })
        }
    }

    pub fn implied_action(self) -> Option<NotificationAction> {
        match self {
            Self::Accepted => Some(NotificationAction::Accept),
            Self::Declined => Some(NotificationAction::Dismiss),
            Self::AcceptedPending | Self::DeclinedPending => Some(NotificationAction::MarkRead),
            Self::Idle | Self::Pending => None,
        }
    }
}
