//! Per-kind handlers for decoded application messages.

use tracing::debug;

use parley_shared::activity::NotificationAction;
use parley_shared::clock::next_clock;
use parley_shared::protocol::{ApplicationMessage, ChatMessage, CommunityDescription};
use parley_shared::types::{ChatType, UserId};
use parley_store::{Chat, Message};

use crate::error::{MessengerError, Result};
use crate::ingestion::ReceivedMessageState;
use crate::messenger::Messenger;
use crate::transport::ReceivedMessage;

impl Messenger {
    pub(crate) fn handle_application_message(
        &self,
        state: &mut ReceivedMessageState,
        received: &ReceivedMessage,
        message: ApplicationMessage,
        whisper_timestamp: u64,
    ) -> Result<()> {
        match message {
            ApplicationMessage::ChatMessage(m) => {
                self.handle_chat_message(state, received, m, whisper_timestamp)
            }
            ApplicationMessage::CommunityDescription(d) => {
                self.handle_community_description(state, d, whisper_timestamp)
            }
            ApplicationMessage::SyncActivityCenterRead(s) => {
                self.handle_sync_notifications(state, NotificationAction::MarkRead, s)
            }
            ApplicationMessage::SyncActivityCenterUnread(s) => {
                self.handle_sync_notifications(state, NotificationAction::MarkUnread, s)
            }
            ApplicationMessage::SyncActivityCenterAccepted(s) => {
                self.handle_sync_notifications(state, NotificationAction::Accept, s)
            }
            ApplicationMessage::SyncActivityCenterDismissed(s) => {
                self.handle_sync_notifications(state, NotificationAction::Dismiss, s)
            }
            ApplicationMessage::SyncActivityCenterDeleted(s) => {
                self.handle_sync_notifications(state, NotificationAction::Delete, s)
            }
            ApplicationMessage::SyncCommunityRequestDecision(s) => {
                self.handle_sync_community_request_decision(state, s)
            }
            ApplicationMessage::SyncContactVerification(s) => {
                self.handle_sync_contact_verification(state, s)
            }
        }
    }

    /// Find the chat a chat message belongs to. One-to-one chats are
    /// created on first contact; every other chat must already exist.
    fn match_chat(
        &self,
        state: &ReceivedMessageState,
        message: &ChatMessage,
        sender_id: &str,
        from_me: bool,
        now: u64,
    ) -> Result<Chat> {
        let unsupported = |chat: &Chat| MessengerError::UnsupportedChatType {
            chat_id: chat.id.clone(),
            chat_type: message.chat_type,
        };

        match message.chat_type {
            ChatType::OneToOne => {
                // Our own messages name the peer, theirs come from the peer.
                let chat_id = if from_me { message.chat_id.as_str() } else { sender_id };
                match state.chat(self, chat_id) {
                    Some(chat) if chat.chat_type != ChatType::OneToOne => Err(unsupported(&chat)),
                    Some(mut chat) => {
                        if from_me {
                            chat.active = true;
                        }
                        Ok(chat)
                    }
                    None => {
                        let peer = UserId::from_hex(chat_id)?;
                        let mut chat = Chat::one_to_one(&peer, now);
                        chat.active =
                            from_me || state.contact(self, chat_id).is_some_and(|c| c.added);
                        Ok(chat)
                    }
                }
            }
            ChatType::Public | ChatType::CommunityChat => {
                let chat = state
                    .chat(self, &message.chat_id)
                    .ok_or_else(|| MessengerError::ChatNotFound(message.chat_id.clone()))?;
                if chat.chat_type != message.chat_type {
                    return Err(unsupported(&chat));
                }
                Ok(chat)
            }
            ChatType::PrivateGroup => {
                let chat = state
                    .chat(self, &message.chat_id)
                    .ok_or_else(|| MessengerError::ChatNotFound(message.chat_id.clone()))?;
                if chat.chat_type != ChatType::PrivateGroup {
                    return Err(unsupported(&chat));
                }
                if !chat.has_member(sender_id) {
                    return Err(MessengerError::NotAMember(sender_id.to_string()));
                }
                let me = self.my_contact_id();
                if !chat.has_member(&me) {
                    return Err(MessengerError::NotAMember(me));
                }
                Ok(chat)
            }
        }
    }

    fn handle_chat_message(
        &self,
        state: &mut ReceivedMessageState,
        received: &ReceivedMessage,
        message: ChatMessage,
        whisper_timestamp: u64,
    ) -> Result<()> {
        let sender_id = received.sender.contact_id();
        let from_me = received.sender == *self.identity();
        let me = self.my_contact_id();
        let mut chat = self.match_chat(state, &message, &sender_id, from_me, whisper_timestamp)?;

        let clock = if message.clock == 0 {
            next_clock(&mut chat.last_clock_value, whisper_timestamp)
        } else {
            message.clock
        };
        if chat.deleted_at_clock_value > 0 && clock <= chat.deleted_at_clock_value {
            debug!(chat_id = %chat.id, clock, "message predates chat deletion");
            return Ok(());
        }

        let reply_target = match &message.response_to {
            Some(target) => state.find_message(self, target)?,
            None => None,
        };
        let replied = !from_me && reply_target.as_ref().is_some_and(|t| t.from == me);
        let mentioned = !from_me && message.mentions.iter().any(|m| *m == me);
        let seen = from_me || chat.read_messages_at_clock_value >= clock;

        let new_message = Message {
            id: received.id.clone(),
            chat_id: chat.id.clone(),
            chat_type: chat.chat_type,
            clock,
            whisper_timestamp,
            timestamp: message.timestamp,
            from: sender_id.clone(),
            seen,
            mentioned,
            replied,
            response_to: message.response_to,
            deleted: false,
            deleted_for_me: false,
            content_type: message.content_type,
            text: message.text,
            album_id: message.album_id,
            mentions: message.mentions,
        };

        if !seen {
            // An album counts once.
            let counted = match &new_message.album_id {
                Some(album_id) => state.album_counted(self, &chat.id, album_id)?,
                None => false,
            };
            if !counted {
                chat.unviewed_messages_count = chat.unviewed_messages_count.saturating_add(1);
                if mentioned || replied || chat.is_one_to_one() {
                    chat.unviewed_mentions_count = chat.unviewed_mentions_count.saturating_add(1);
                }
            }
        }
        chat.update_from_message(&new_message);

        if let Some(name) = message.display_name.filter(|n| !n.is_empty()) {
            if let Some(mut contact) = state.contact(self, &sender_id) {
                if !from_me && contact.display_name != name && contact.last_updated <= clock {
                    contact.display_name = name;
                    contact.last_updated = clock;
                    state.stage_contact(contact);
                }
            }
        }

        if let Some(target) = reply_target {
            state.reply_targets.insert(new_message.id.clone(), target);
        }
        state.stage_chat(chat);
        state.messages.push(new_message);
        Ok(())
    }

    /// Create or rename the channels of a joined community.
    fn handle_community_description(
        &self,
        state: &mut ReceivedMessageState,
        description: CommunityDescription,
        now: u64,
    ) -> Result<()> {
        if self
            .db()?
            .community_joined_clock(&description.community_id)?
            .is_none()
        {
            debug!(community_id = %description.community_id, "description of a community we did not join");
            return Ok(());
        }

        for channel in description.channels {
            match state.chat(self, &channel.chat_id) {
                Some(mut chat) => {
                    if chat.chat_type != ChatType::CommunityChat
                        || chat.community_id.as_deref() != Some(description.community_id.as_str())
                    {
                        return Err(MessengerError::UnsupportedChatType {
                            chat_id: chat.id,
                            chat_type: ChatType::CommunityChat,
                        });
                    }
                    if chat.name != channel.name {
                        chat.name = channel.name;
                        state.stage_chat(chat);
                    }
                }
                None => {
                    let mut chat = Chat::new(channel.chat_id, ChatType::CommunityChat, now);
                    chat.name = channel.name;
                    chat.community_id = Some(description.community_id.clone());
                    chat.active = true;
                    state.stage_chat(chat);
                }
            }
        }
        Ok(())
    }
}
