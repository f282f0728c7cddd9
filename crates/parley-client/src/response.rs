use serde::{Deserialize, Serialize};

use parley_store::{ActivityCenterNotification, ActivityCenterState, Chat, Contact, Message};

/// Why a push notification was raised.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PushReason {
    DirectMessage,
    GroupMessage,
    Mention,
    Reply,
}

/// A push-style notification for a new message. Delivery is up to the
/// embedding application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushNotification {
    pub message_id: String,
    pub chat_id: String,
    pub author: String,
    pub reason: PushReason,
}

/// Everything a batch or a user action changed, for the layer above.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessengerResponse {
    pub chats: Vec<Chat>,
    pub messages: Vec<Message>,
    pub contacts: Vec<Contact>,
    pub notifications: Vec<PushNotification>,
    pub activity_center_notifications: Vec<ActivityCenterNotification>,
    pub activity_center_state: Option<ActivityCenterState>,
}

impl MessengerResponse {
    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
            && self.messages.is_empty()
            && self.contacts.is_empty()
            && self.notifications.is_empty()
            && self.activity_center_notifications.is_empty()
            && self.activity_center_state.is_none()
    }

    /// Add chats, replacing earlier copies of the same chat.
    pub fn add_chats(&mut self, chats: impl IntoIterator<Item = Chat>) {
        for chat in chats {
            self.chats.retain(|c| c.id != chat.id);
            self.chats.push(chat);
        }
    }

    /// Add notifications, replacing earlier copies with the same id.
    pub fn add_activity_center_notifications(
        &mut self,
        notifications: impl IntoIterator<Item = ActivityCenterNotification>,
    ) {
        for notification in notifications {
            self.activity_center_notifications
                .retain(|n| n.id != notification.id);
            self.activity_center_notifications.push(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_shared::activity::ActivityCenterType;
    use parley_shared::types::ChatType;

    #[test]
    fn later_copies_replace_earlier_ones() {
        let mut response = MessengerResponse::default();
        assert!(response.is_empty());

        let mut chat = Chat::new("general", ChatType::Public, 1);
        response.add_chats([chat.clone()]);
        chat.unviewed_messages_count = 3;
        response.add_chats([chat]);
        assert_eq!(response.chats.len(), 1);
        assert_eq!(response.chats[0].unviewed_messages_count, 3);

        let n = ActivityCenterNotification::new(vec![1], ActivityCenterType::Mention, "general", 1);
        response.add_activity_center_notifications([n.clone(), n]);
        assert_eq!(response.activity_center_notifications.len(), 1);
        assert!(!response.is_empty());
    }
}
