use serde::{Deserialize, Serialize};

use crate::activity::{ContactVerificationStatus, MembershipStatus};
use crate::error::SharedError;
use crate::types::{ChatType, ContentType};

/// Every application message the engine understands. Payloads of decrypted
/// transport envelopes decode into exactly one of these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ApplicationMessage {
    /// User-authored chat message
    ChatMessage(ChatMessage),

    /// Community channel listing, may be re-delivered
    CommunityDescription(CommunityDescription),

    /// Paired-device mirror of Activity Center mutations
    SyncActivityCenterRead(SyncActivityCenterNotifications),
    SyncActivityCenterUnread(SyncActivityCenterNotifications),
    SyncActivityCenterAccepted(SyncActivityCenterNotifications),
    SyncActivityCenterDismissed(SyncActivityCenterNotifications),
    SyncActivityCenterDeleted(SyncActivityCenterNotifications),

    /// Paired-device mirror of a community join decision
    SyncCommunityRequestDecision(SyncCommunityRequestDecision),

    /// Paired-device mirror of a contact verification decision
    SyncContactVerification(SyncContactVerification),
}

/// Discriminant of [`ApplicationMessage`], used by the dedup allow-list and
/// in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    ChatMessage,
    CommunityDescription,
    SyncActivityCenterRead,
    SyncActivityCenterUnread,
    SyncActivityCenterAccepted,
    SyncActivityCenterDismissed,
    SyncActivityCenterDeleted,
    SyncCommunityRequestDecision,
    SyncContactVerification,
}

impl MessageKind {
    /// Kinds that are processed again when their id was already seen.
    pub fn allows_duplicates(self) -> bool {
        matches!(self, Self::CommunityDescription)
    }

    /// Kinds only accepted from the user's own paired devices.
    pub fn is_paired_device_sync(self) -> bool {
        !matches!(self, Self::ChatMessage | Self::CommunityDescription)
    }
}

impl ApplicationMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::ChatMessage(_) => MessageKind::ChatMessage,
            Self::CommunityDescription(_) => MessageKind::CommunityDescription,
            Self::SyncActivityCenterRead(_) => MessageKind::SyncActivityCenterRead,
            Self::SyncActivityCenterUnread(_) => MessageKind::SyncActivityCenterUnread,
            Self::SyncActivityCenterAccepted(_) => MessageKind::SyncActivityCenterAccepted,
            Self::SyncActivityCenterDismissed(_) => MessageKind::SyncActivityCenterDismissed,
            Self::SyncActivityCenterDeleted(_) => MessageKind::SyncActivityCenterDeleted,
            Self::SyncCommunityRequestDecision(_) => MessageKind::SyncCommunityRequestDecision,
            Self::SyncContactVerification(_) => MessageKind::SyncContactVerification,
        }
    }

    /// Serialize to bytes for transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SharedError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SharedError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// A chat message as authored by the sender.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// Target chat. For one-to-one messages this is the recipient's contact id.
    pub chat_id: String,
    pub chat_type: ChatType,
    /// Sender's logical clock, 0 when the sender did not assign one
    pub clock: u64,
    /// Sender's wall time in milliseconds
    pub timestamp: u64,
    pub content_type: ContentType,
    pub text: String,
    pub response_to: Option<String>,
    /// Groups the images of a multi-image post
    pub album_id: Option<String>,
    /// Contact ids mentioned in the text
    pub mentions: Vec<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommunityDescription {
    pub community_id: String,
    pub clock: u64,
    pub channels: Vec<CommunityChannel>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommunityChannel {
    pub chat_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncActivityCenterNotifications {
    pub clock: u64,
    pub ids: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestDecision {
    Accepted,
    Declined,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncCommunityRequestDecision {
    pub id: Vec<u8>,
    pub clock: u64,
    pub decision: RequestDecision,
    pub membership_status: MembershipStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncContactVerification {
    pub id: Vec<u8>,
    pub clock: u64,
    pub status: ContactVerificationStatus,
}
