//! Ingestion pipeline.
//!
//! A retrieved batch is decrypted, decoded, deduplicated and dispatched to
//! the per-kind handlers while holding the `handle_messages` lock. Handlers
//! only stage their changes in a [`ReceivedMessageState`]; the batch is then
//! persisted (chats, messages, contacts) and notifications are derived from
//! the persisted messages. Envelopes are confirmed only after that.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, error, info, warn};

use parley_shared::activity::ActivityCenterType;
use parley_shared::clock::bump_clock;
use parley_shared::protocol::ApplicationMessage;
use parley_shared::types::{id_bytes, ContentType};
use parley_store::{ActivityCenterNotification, Chat, Contact, Message, StoreError};

use crate::error::Result;
use crate::messenger::Messenger;
use crate::response::{MessengerResponse, PushNotification, PushReason};
use crate::transport::{Envelope, FilterId, ReceivedMessage};

/// Working set of one batch.
#[derive(Debug, Default)]
pub(crate) struct ReceivedMessageState {
    /// Chats touched by the batch, not yet persisted.
    pub chats: HashMap<String, Chat>,
    /// Contacts touched by the batch, not yet persisted.
    pub contacts: HashMap<String, Contact>,
    /// New messages in arrival order.
    pub messages: Vec<Message>,
    /// Replied-to message per new message id.
    pub reply_targets: HashMap<String, Message>,
    /// Message ids handled so far in this batch.
    pub handled_ids: HashSet<String>,
    /// Output of the paired-device sync handlers.
    pub response: MessengerResponse,
    /// Notifications read through a sync message. Their messages are marked
    /// seen once the batch's chats are saved.
    pub deferred_seen: Vec<ActivityCenterNotification>,
}

impl ReceivedMessageState {
    pub fn chat(&self, messenger: &Messenger, id: &str) -> Option<Chat> {
        self.chats.get(id).cloned().or_else(|| messenger.chat(id))
    }

    pub fn contact(&self, messenger: &Messenger, id: &str) -> Option<Contact> {
        self.contacts.get(id).cloned().or_else(|| messenger.contact(id))
    }

    pub fn stage_chat(&mut self, chat: Chat) {
        self.chats.insert(chat.id.clone(), chat);
    }

    pub fn stage_contact(&mut self, contact: Contact) {
        self.contacts.insert(contact.id.clone(), contact);
    }

    fn is_duplicate(&self, messenger: &Messenger, id: &str) -> Result<bool> {
        if self.handled_ids.contains(id) {
            return Ok(true);
        }
        Ok(messenger.db()?.message_exists(id)?)
    }

    /// A message of this batch or of the database.
    pub fn find_message(&self, messenger: &Messenger, id: &str) -> Result<Option<Message>> {
        if let Some(m) = self.messages.iter().find(|m| m.id == id) {
            return Ok(Some(m.clone()));
        }
        match messenger.db()?.message_by_id(id) {
            Ok(m) => Ok(Some(m)),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether another image of the same album was already counted.
    pub fn album_counted(&self, messenger: &Messenger, chat_id: &str, album_id: &str) -> Result<bool> {
        let in_batch = self
            .messages
            .iter()
            .any(|m| m.chat_id == chat_id && m.album_id.as_deref() == Some(album_id));
        if in_batch {
            return Ok(true);
        }
        Ok(!messenger.db()?.album_messages(chat_id, album_id)?.is_empty())
    }
}

impl Messenger {
    /// Poll the transport once and ingest whatever it returned.
    pub async fn retrieve_and_handle(&self) -> Result<MessengerResponse> {
        let batch = self.transport.retrieve_all().await?;
        if batch.is_empty() {
            return Ok(MessengerResponse::default());
        }
        self.handle_retrieved_messages(batch).await
    }

    /// Ingest a batch of envelopes grouped by filter.
    ///
    /// Every envelope is marked processed. An envelope is confirmed only if
    /// all of its messages were handled and the batch was persisted.
    pub async fn handle_retrieved_messages(
        &self,
        batch: BTreeMap<FilterId, Vec<Envelope>>,
    ) -> Result<MessengerResponse> {
        let _guard = self.handle_messages.lock().await;

        let mut state = ReceivedMessageState::default();
        let mut processed = Vec::new();
        let mut to_confirm = Vec::new();

        for (filter, envelopes) in batch {
            for envelope in envelopes {
                processed.push(envelope.hash.clone());

                let received = match self.transport.decrypt(&envelope).await {
                    Ok(received) => received,
                    Err(e) => {
                        warn!(filter = %filter, error = %e, "failed to decrypt envelope");
                        continue;
                    }
                };

                let mut all_handled = true;
                for message in &received {
                    if let Err(e) = self.handle_received_message(&mut state, message, envelope.received_at) {
                        warn!(filter = %filter, message_id = %message.id, error = %e, "failed to handle message");
                        all_handled = false;
                    }
                }
                if all_handled {
                    to_confirm.push(envelope.hash.clone());
                }
            }
        }

        if let Err(e) = self.transport.mark_processed(&processed).await {
            warn!(error = %e, "failed to mark envelopes processed");
        }

        let response = self.save_data_and_prepare_response(state)?;

        if !to_confirm.is_empty() {
            if let Err(e) = self.transport.confirm_processed(&to_confirm).await {
                warn!(error = %e, "failed to confirm envelopes");
            }
        }

        if !response.is_empty() {
            info!(
                messages = response.messages.len(),
                chats = response.chats.len(),
                notifications = response.activity_center_notifications.len(),
                "batch handled"
            );
        }
        Ok(response)
    }

    fn handle_received_message(
        &self,
        state: &mut ReceivedMessageState,
        received: &ReceivedMessage,
        whisper_timestamp: u64,
    ) -> Result<()> {
        let from_me = received.sender == *self.identity();
        let sender_id = received.sender.contact_id();
        let known = state.contact(self, &sender_id);
        if known.as_ref().is_some_and(|c| c.blocked) {
            debug!(sender = %received.sender.short(), "dropping message from blocked contact");
            return Ok(());
        }

        let message = ApplicationMessage::from_bytes(&received.payload)?;
        let kind = message.kind();
        if !kind.allows_duplicates() && state.is_duplicate(self, &received.id)? {
            debug!(message_id = %received.id, ?kind, "skipping duplicate");
            return Ok(());
        }
        state.handled_ids.insert(received.id.clone());

        if kind.is_paired_device_sync() && !from_me {
            return Err(crate::error::MessengerError::UnauthorizedSync(kind));
        }
        if known.is_none() && !from_me {
            state.stage_contact(Contact::from_public_key(&received.sender));
        }

        self.handle_application_message(state, received, message, whisper_timestamp)
    }

    /// Persist a batch and derive its notifications. Chats, messages and
    /// contacts are saved in that order, each in one transaction, and only
    /// enter the in-memory repositories once saved.
    fn save_data_and_prepare_response(&self, mut state: ReceivedMessageState) -> Result<MessengerResponse> {
        let mut response = std::mem::take(&mut state.response);

        let chats: Vec<Chat> = state.chats.into_values().collect();
        if !chats.is_empty() {
            self.db()?.save_chats(&chats).map_err(|e| {
                error!(error = %e, "failed to save chats");
                e
            })?;
            for chat in &chats {
                self.chats.put(chat.id.clone(), chat.clone());
            }
        }

        if !state.messages.is_empty() {
            self.db()?.save_messages(&state.messages).map_err(|e| {
                error!(error = %e, "failed to save messages");
                e
            })?;
        }

        let contacts: Vec<Contact> = state.contacts.into_values().collect();
        if !contacts.is_empty() {
            self.db()?.save_contacts(&contacts).map_err(|e| {
                error!(error = %e, "failed to save contacts");
                e
            })?;
            for contact in &contacts {
                self.contacts.put(contact.id.clone(), contact.clone());
            }
        }

        response.add_chats(chats);
        response.contacts = contacts;

        if !state.deferred_seen.is_empty() {
            let touched = self.mark_notification_messages_seen(&state.deferred_seen)?;
            response.add_chats(touched);
        }

        let notifications_enabled = self.settings.notifications_enabled();
        for message in &state.messages {
            let Some(chat) = self.chat(&message.chat_id) else {
                continue;
            };
            let from_me = message.from == self.my_contact_id();

            if let Some(reason) = push_reason(&chat, message, from_me, notifications_enabled) {
                response.notifications.push(PushNotification {
                    message_id: message.id.clone(),
                    chat_id: chat.id.clone(),
                    author: message.from.clone(),
                    reason,
                });
            }

            let notification = match self.activity_center_notification_for(
                &chat,
                message,
                from_me,
                state.reply_targets.get(&message.id),
            )? {
                Some(n) => Some(n),
                None => self.contact_request_notification_for(&chat, message, from_me)?,
            };
            if let Some(notification) = notification {
                let saved = self.db()?.save_activity_center_notification(&notification);
                match saved {
                    Ok(ac_state) => {
                        response.activity_center_state = Some(ac_state);
                        response.add_activity_center_notifications([notification]);
                    }
                    Err(StoreError::Validation(reason)) => {
                        warn!(message_id = %message.id, reason = %reason, "notification rejected");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        response.messages = state.messages;
        Ok(response)
    }

    fn activity_center_notification_for(
        &self,
        chat: &Chat,
        message: &Message,
        from_me: bool,
        reply_target: Option<&Message>,
    ) -> Result<Option<ActivityCenterNotification>> {
        let joined_clock = match &chat.community_id {
            Some(community_id) if chat.is_community() => self.db()?.community_joined_clock(community_id)?,
            _ => None,
        };
        let Some(kind) = activity_center_type(chat, message, from_me, joined_clock) else {
            return Ok(None);
        };

        let id = match &message.album_id {
            Some(album_id) => id_bytes(album_id),
            None => id_bytes(&message.id),
        };
        let mut notification =
            ActivityCenterNotification::new(id, kind, chat.id.clone(), message.whisper_timestamp);
        notification.community_id = chat.community_id.clone();
        notification.author = message.from.clone();
        notification.message = Some(message.clone());
        notification.reply_message = reply_target.cloned();
        notification.read = message.seen;
        notification.updated_at = bump_clock(message.clock, self.now());
        if let Some(album_id) = &message.album_id {
            notification.album_messages = self.db()?.album_messages(&chat.id, album_id)?;
        }
        Ok(Some(notification))
    }

    /// Incoming contact request messages open a contact request
    /// notification, unless one from that sender is still undecided.
    fn contact_request_notification_for(
        &self,
        chat: &Chat,
        message: &Message,
        from_me: bool,
    ) -> Result<Option<ActivityCenterNotification>> {
        if from_me || !chat.is_one_to_one() || message.content_type != ContentType::ContactRequest {
            return Ok(None);
        }
        if self
            .db()?
            .active_contact_request_notification(&message.from)?
            .is_some()
        {
            return Ok(None);
        }

        let mut notification = ActivityCenterNotification::new(
            id_bytes(&message.id),
            ActivityCenterType::ContactRequest,
            chat.id.clone(),
            message.whisper_timestamp,
        );
        notification.author = message.from.clone();
        notification.message = Some(message.clone());
        notification.read = message.seen;
        notification.updated_at = bump_clock(message.clock, self.now());
        Ok(Some(notification))
    }
}

/// Whether a new message raises a push notification, and why.
pub(crate) fn push_reason(
    chat: &Chat,
    message: &Message,
    from_me: bool,
    notifications_enabled: bool,
) -> Option<PushReason> {
    if !notifications_enabled || chat.muted || from_me || message.seen {
        return None;
    }
    if message.mentioned {
        Some(PushReason::Mention)
    } else if message.replied {
        Some(PushReason::Reply)
    } else if chat.is_one_to_one() {
        Some(PushReason::DirectMessage)
    } else if chat.is_private_group() {
        Some(PushReason::GroupMessage)
    } else {
        None
    }
}

/// Activity Center type raised by a new message, if any. Community messages
/// older than the join are ignored.
pub(crate) fn activity_center_type(
    chat: &Chat,
    message: &Message,
    from_me: bool,
    joined_clock: Option<u64>,
) -> Option<ActivityCenterType> {
    if from_me || !chat.active || chat.muted {
        return None;
    }
    if !chat.is_community() && !chat.is_private_group() {
        return None;
    }
    if !message.mentioned && !message.replied {
        return None;
    }
    if chat.is_community() && joined_clock.is_some_and(|joined| message.clock < joined) {
        return None;
    }
    if message.mentioned {
        Some(ActivityCenterType::Mention)
    } else {
        Some(ActivityCenterType::Reply)
    }
}
