use serde::{Deserialize, Serialize};

use parley_shared::activity::{
    ActivityCenterType, ContactVerificationStatus, MembershipStatus, NotificationFlags, ReadFilter,
};
use parley_shared::clock::{next_clock, TimeSource};
use parley_shared::constants::DEFAULT_PAGE_LIMIT;
use parley_shared::cursor;
use parley_shared::types::{id_bytes, ChatType, ContentType, UserId};

use crate::error::{Result, StoreError};

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A conversation and its unread bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    /// Chat id. One-to-one chats use the peer's contact id.
    pub id: String,
    pub chat_type: ChatType,
    pub name: String,
    /// Owning community (community channels only).
    pub community_id: Option<String>,
    /// Member contact ids (private groups only).
    pub members: Vec<String>,
    /// Inactive chats are kept but hidden; leaving a chat deactivates it.
    pub active: bool,
    pub muted: bool,
    /// Wall time (ms) at which the mute expires; 0 means until unmuted.
    pub muted_till: u64,
    /// Last value issued by the chat's logical clock.
    pub last_clock_value: u64,
    /// Wall time (ms) of the last clock issue.
    pub timestamp: u64,
    pub unviewed_messages_count: u32,
    pub unviewed_mentions_count: u32,
    /// Messages at or below this clock arrive already seen.
    pub read_messages_at_clock_value: u64,
    /// Messages at or below this clock are discarded.
    pub deleted_at_clock_value: u64,
    /// Preview of the newest message.
    pub last_message: Option<Message>,
}

impl Chat {
    pub fn new(id: impl Into<String>, chat_type: ChatType, now_ms: u64) -> Self {
        Self {
            id: id.into(),
            chat_type,
            name: String::new(),
            community_id: None,
            members: Vec::new(),
            active: true,
            muted: false,
            muted_till: 0,
            last_clock_value: 0,
            timestamp: now_ms,
            unviewed_messages_count: 0,
            unviewed_mentions_count: 0,
            read_messages_at_clock_value: 0,
            deleted_at_clock_value: 0,
            last_message: None,
        }
    }

    pub fn one_to_one(peer: &UserId, now_ms: u64) -> Self {
        let mut chat = Self::new(peer.contact_id(), ChatType::OneToOne, now_ms);
        chat.name = peer.short();
        chat
    }

    /// Issue the next logical clock for this chat together with the wall
    /// time it was issued at.
    pub fn next_clock_and_timestamp(&mut self, time: &dyn TimeSource) -> (u64, u64) {
        let now = time.now_ms();
        let clock = next_clock(&mut self.last_clock_value, now);
        self.timestamp = now;
        (clock, now)
    }

    /// Merge a message into the chat's clock and preview.
    pub fn update_from_message(&mut self, message: &Message) {
        if message.clock > self.last_clock_value {
            self.last_clock_value = message.clock;
        }
        let newer = self
            .last_message
            .as_ref()
            .map_or(true, |last| message.clock >= last.clock);
        if newer {
            self.last_message = Some(message.clone());
        }
    }

    pub fn is_one_to_one(&self) -> bool {
        self.chat_type == ChatType::OneToOne
    }

    pub fn is_private_group(&self) -> bool {
        self.chat_type == ChatType::PrivateGroup
    }

    pub fn is_community(&self) -> bool {
        self.chat_type == ChatType::CommunityChat
    }

    pub fn has_member(&self, contact_id: &str) -> bool {
        self.members.iter().any(|m| m == contact_id)
    }
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    /// `0x` + hex public key.
    pub id: String,
    pub display_name: String,
    /// Mutually added contact.
    pub added: bool,
    pub blocked: bool,
    pub last_updated: u64,
}

impl Contact {
    /// Minimal record for a sender we have never seen. Not marked as added.
    pub fn from_public_key(key: &UserId) -> Self {
        Self {
            id: key.contact_id(),
            display_name: key.short(),
            added: false,
            blocked: false,
            last_updated: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Content-derived id (`0x` + hex).
    pub id: String,
    pub chat_id: String,
    pub chat_type: ChatType,
    pub clock: u64,
    /// Wall time (ms) at which the envelope was received.
    pub whisper_timestamp: u64,
    /// Sender's wall time (ms).
    pub timestamp: u64,
    /// Sender contact id.
    pub from: String,
    pub seen: bool,
    pub mentioned: bool,
    pub replied: bool,
    pub response_to: Option<String>,
    pub deleted: bool,
    pub deleted_for_me: bool,
    pub content_type: ContentType,
    pub text: String,
    pub album_id: Option<String>,
    pub mentions: Vec<String>,
}

impl Message {
    pub fn cursor(&self) -> String {
        cursor::encode(self.clock, &id_bytes(&self.id))
    }
}

// ---------------------------------------------------------------------------
// Activity Center
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityCenterNotification {
    /// Raw id bytes. Message-derived notifications use the message id, album
    /// posts use the album id.
    pub id: Vec<u8>,
    pub timestamp: u64,
    pub notification_type: ActivityCenterType,
    pub chat_id: String,
    pub community_id: Option<String>,
    pub membership_status: MembershipStatus,
    pub author: String,
    pub message: Option<Message>,
    pub reply_message: Option<Message>,
    /// Images of the same album, hydrated on read; never persisted.
    #[serde(default)]
    pub album_messages: Vec<Message>,
    pub read: bool,
    pub accepted: bool,
    pub dismissed: bool,
    pub deleted: bool,
    pub contact_verification_status: ContactVerificationStatus,
    /// Opaque token payload (community token notifications).
    pub token_data: Option<String>,
    /// Logical clock of the last mutation, merge key across devices.
    pub updated_at: u64,
}

impl ActivityCenterNotification {
    pub fn new(
        id: Vec<u8>,
        notification_type: ActivityCenterType,
        chat_id: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            id,
            timestamp,
            notification_type,
            chat_id: chat_id.into(),
            community_id: None,
            membership_status: MembershipStatus::Idle,
            author: String::new(),
            message: None,
            reply_message: None,
            album_messages: Vec::new(),
            read: false,
            accepted: false,
            dismissed: false,
            deleted: false,
            contact_verification_status: ContactVerificationStatus::Unverified,
            token_data: None,
            updated_at: 0,
        }
    }

    pub fn flags(&self) -> NotificationFlags {
        NotificationFlags {
            read: self.read,
            dismissed: self.dismissed,
            accepted: self.accepted,
            deleted: self.deleted,
        }
    }

    pub fn set_flags(&mut self, flags: NotificationFlags) {
        self.read = flags.read;
        self.dismissed = flags.dismissed;
        self.accepted = flags.accepted;
        self.deleted = flags.deleted;
    }

    pub fn cursor(&self) -> String {
        cursor::encode(self.timestamp, &self.id)
    }

    /// Reject notifications that must never reach the table.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(StoreError::Validation("notification id is empty".into()));
        }
        if self.timestamp == 0 {
            return Err(StoreError::Validation(
                "notification timestamp is zero".into(),
            ));
        }
        Ok(())
    }
}

/// Singleton "has unseen" badge state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityCenterState {
    pub has_seen: bool,
    pub updated_at: u64,
}

/// Listing parameters for notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationQuery {
    pub cursor: Option<String>,
    pub limit: u64,
    /// Empty means every type.
    pub types: Vec<ActivityCenterType>,
    pub read: ReadFilter,
    /// When false, accepted notifications are filtered out.
    pub include_accepted: bool,
}

impl Default for NotificationQuery {
    fn default() -> Self {
        Self {
            cursor: None,
            limit: DEFAULT_PAGE_LIMIT,
            types: Vec::new(),
            read: ReadFilter::All,
            include_accepted: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch ledger
// ---------------------------------------------------------------------------

/// Outbound message and its delivery bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawMessage {
    pub id: String,
    pub local_chat_id: String,
    pub payload: Vec<u8>,
    pub send_count: u32,
    /// Wall time (ms) of the last send attempt.
    pub last_sent: u64,
    pub resend_automatically: bool,
    /// Delivery confirmed by the transport.
    pub sent: bool,
}

impl RawMessage {
    pub fn new(id: impl Into<String>, local_chat_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            local_chat_id: local_chat_id.into(),
            payload,
            send_count: 0,
            last_sent: 0,
            resend_automatically: false,
            sent: false,
        }
    }
}
