//! The message-state engine.
//!
//! A [`Messenger`] owns one identity's database, its in-memory chat and
//! contact repositories and the collaborators it talks to. Ingestion, the
//! Activity Center API and the resend scheduler are implemented as further
//! `impl Messenger` blocks in their own modules.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_shared::activity::NotificationAction;
use parley_shared::clock::TimeSource;
use parley_shared::cursor::Page;
use parley_shared::protocol::{ApplicationMessage, ChatMessage};
use parley_shared::types::{message_id, ChatType, ContentType, UserId};
use parley_store::{Chat, Contact, Database, Message, RawMessage};

use crate::activity_center::update_response;
use crate::config::MessengerConfig;
use crate::error::{MessengerError, Result};
use crate::events::{self, MessengerEvent};
use crate::repository::{ChatRepository, ContactRepository};
use crate::response::MessengerResponse;
use crate::settings::SettingsProvider;
use crate::transport::{Destination, Transport};

/// Content of a message about to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content_type: ContentType,
    pub text: String,
    pub response_to: Option<String>,
    pub album_id: Option<String>,
    pub mentions: Vec<String>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: ContentType::Text,
            text: text.into(),
            response_to: None,
            album_id: None,
            mentions: Vec::new(),
        }
    }
}

pub struct Messenger {
    identity: UserId,
    config: MessengerConfig,
    db: Mutex<Database>,
    pub(crate) chats: ChatRepository,
    pub(crate) contacts: ContactRepository,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) settings: Arc<dyn SettingsProvider>,
    time: Arc<dyn TimeSource>,
    /// Held for a whole ingestion batch and by every other writer of chat
    /// counters or clocks.
    pub(crate) handle_messages: tokio::sync::Mutex<()>,
    online: AtomicBool,
    paired_devices: AtomicBool,
    events: broadcast::Sender<MessengerEvent>,
    pub(crate) shutdown: CancellationToken,
}

impl Messenger {
    /// Build a messenger over an opened database, loading every chat and
    /// contact into memory.
    pub fn new(
        identity: UserId,
        db: Database,
        transport: Arc<dyn Transport>,
        settings: Arc<dyn SettingsProvider>,
        time: Arc<dyn TimeSource>,
        config: MessengerConfig,
    ) -> Result<Self> {
        let chats: ChatRepository = db.chats()?.into_iter().map(|c| (c.id.clone(), c)).collect();
        let contacts: ContactRepository = db
            .contacts()?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        info!(
            identity = %identity.short(),
            chats = chats.len(),
            contacts = contacts.len(),
            "messenger loaded"
        );

        Ok(Self {
            identity,
            config,
            db: Mutex::new(db),
            chats,
            contacts,
            transport,
            settings,
            time,
            handle_messages: tokio::sync::Mutex::new(()),
            online: AtomicBool::new(true),
            paired_devices: AtomicBool::new(false),
            events: events::channel(),
            shutdown: CancellationToken::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn identity(&self) -> &UserId {
        &self.identity
    }

    pub fn my_contact_id(&self) -> String {
        self.identity.contact_id()
    }

    pub fn config(&self) -> &MessengerConfig {
        &self.config
    }

    pub(crate) fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| MessengerError::Poisoned)
    }

    pub(crate) fn now(&self) -> u64 {
        self.time.now_ms()
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Whether Activity Center changes are mirrored to other devices.
    pub fn set_paired_devices(&self, enabled: bool) {
        self.paired_devices.store(enabled, Ordering::SeqCst);
    }

    pub fn has_paired_devices(&self) -> bool {
        self.paired_devices.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MessengerEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: MessengerEvent) {
        events::emit_event(&self.events, event);
    }

    // -----------------------------------------------------------------------
    // Chats and contacts
    // -----------------------------------------------------------------------

    pub fn chat(&self, id: &str) -> Option<Chat> {
        self.chats.get(&id.to_string())
    }

    pub fn chats(&self) -> Vec<Chat> {
        let mut chats = Vec::with_capacity(self.chats.len());
        self.chats.range(|_, chat| {
            chats.push(chat.clone());
            true
        });
        chats
    }

    pub fn contact(&self, id: &str) -> Option<Contact> {
        self.contacts.get(&id.to_string())
    }

    /// Create or replace a chat, e.g. after joining a public chat or a
    /// community channel.
    pub async fn save_chat(&self, chat: Chat) -> Result<Chat> {
        let _guard = self.handle_messages.lock().await;
        self.persist_chat(chat)
    }

    pub async fn save_contact(&self, contact: Contact) -> Result<()> {
        let _guard = self.handle_messages.lock().await;
        self.db()?.save_contacts(std::slice::from_ref(&contact))?;
        self.contacts.put(contact.id.clone(), contact);
        Ok(())
    }

    /// Leave a chat. The row is kept and everything up to the current clock
    /// is discarded.
    pub async fn deactivate_chat(&self, chat_id: &str) -> Result<Chat> {
        let _guard = self.handle_messages.lock().await;
        let mut chat = self.chat_or_err(chat_id)?;
        let (clock, _) = chat.next_clock_and_timestamp(self.time.as_ref());
        chat.active = false;
        chat.deleted_at_clock_value = clock;
        chat.unviewed_messages_count = 0;
        chat.unviewed_mentions_count = 0;
        self.persist_chat(chat)
    }

    /// Mute a chat until `till` (wall time, ms). `0` mutes until unmuted.
    pub async fn mute_chat(&self, chat_id: &str, till: u64) -> Result<Chat> {
        let _guard = self.handle_messages.lock().await;
        let mut chat = self.chat_or_err(chat_id)?;
        chat.muted = true;
        chat.muted_till = till;
        self.persist_chat(chat)
    }

    pub async fn unmute_chat(&self, chat_id: &str) -> Result<Chat> {
        let _guard = self.handle_messages.lock().await;
        let mut chat = self.chat_or_err(chat_id)?;
        chat.muted = false;
        chat.muted_till = 0;
        self.persist_chat(chat)
    }

    /// Clear expired mutes. Returns the ids of the chats that were unmuted.
    pub async fn unmute_expired_chats(&self) -> Result<Vec<String>> {
        let _guard = self.handle_messages.lock().await;
        let now = self.now();
        let ids = self.db()?.unmute_expired_chats(now)?;
        for id in &ids {
            if let Some(mut chat) = self.chats.get(id) {
                chat.muted = false;
                chat.muted_till = 0;
                self.chats.put(id.clone(), chat);
            }
        }
        Ok(ids)
    }

    /// Record that the user joined a community at `joined_clock`.
    pub fn join_community(&self, community_id: &str, joined_clock: u64) -> Result<()> {
        self.db()?.save_community_join(community_id, joined_clock)?;
        debug!(community_id, joined_clock, "community joined");
        Ok(())
    }

    /// Issue and persist the next logical clock of a chat.
    pub async fn next_clock(&self, chat_id: &str) -> Result<(u64, u64)> {
        let _guard = self.handle_messages.lock().await;
        let mut chat = self.chat_or_err(chat_id)?;
        let issued = chat.next_clock_and_timestamp(self.time.as_ref());
        self.persist_chat(chat)?;
        Ok(issued)
    }

    pub(crate) fn chat_or_err(&self, chat_id: &str) -> Result<Chat> {
        self.chat(chat_id)
            .ok_or_else(|| MessengerError::ChatNotFound(chat_id.to_string()))
    }

    /// Write a chat through to storage and the repository. Callers hold
    /// `handle_messages`.
    pub(crate) fn persist_chat(&self, chat: Chat) -> Result<Chat> {
        self.db()?.save_chat(&chat)?;
        self.chats.put(chat.id.clone(), chat.clone());
        Ok(chat)
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    pub fn messages_by_chat_id(
        &self,
        chat_id: &str,
        cursor: Option<&str>,
        limit: u64,
    ) -> Result<Page<Message>> {
        Ok(self.db()?.messages_by_chat_id(chat_id, cursor, limit)?)
    }

    pub fn first_unseen_message_id(&self, chat_id: &str) -> Result<Option<String>> {
        Ok(self.db()?.first_unseen_message_id(chat_id)?)
    }

    /// Mark messages seen. The notifications they raised are marked read
    /// and the change is mirrored to paired devices.
    pub async fn mark_messages_seen(
        &self,
        chat_id: &str,
        ids: &[String],
    ) -> Result<MessengerResponse> {
        let guard = self.handle_messages.lock().await;
        let chat = self
            .apply_messages_seen(chat_id, ids)?
            .ok_or_else(|| MessengerError::ChatNotFound(chat_id.to_string()))?;
        let clock = self.now();
        let update = self.read_notifications_for_messages(ids, clock)?;
        drop(guard);

        self.mirror_update(NotificationAction::MarkRead, clock, &update).await;
        let mut response = update_response(update);
        response.add_chats([chat]);
        Ok(response)
    }

    /// Mark a whole chat read up to its current clock and dismiss its
    /// notifications.
    pub async fn mark_all_read(&self, chat_id: &str) -> Result<MessengerResponse> {
        let guard = self.handle_messages.lock().await;
        let mut chat = self.chat_or_err(chat_id)?;
        self.db()?
            .mark_all_messages_seen(chat_id, chat.last_clock_value)?;
        chat.read_messages_at_clock_value = chat.last_clock_value;
        chat.unviewed_messages_count = 0;
        chat.unviewed_mentions_count = 0;
        let chat = self.persist_chat(chat)?;
        let clock = self.now();
        let update = self.dismiss_notifications_for_chat(chat_id, clock)?;
        drop(guard);

        self.mirror_update(NotificationAction::Dismiss, clock, &update).await;
        let mut response = update_response(update);
        response.add_chats([chat]);
        Ok(response)
    }

    /// Flip messages to seen and take them off the chat's counters. Callers
    /// hold `handle_messages`.
    pub(crate) fn apply_messages_seen(&self, chat_id: &str, ids: &[String]) -> Result<Option<Chat>> {
        let counts = self.db()?.mark_messages_seen(chat_id, ids)?;
        let Some(mut chat) = self.chat(chat_id) else {
            return Ok(None);
        };
        let mentions = if chat.is_one_to_one() {
            counts.messages
        } else {
            counts.mentions
        };
        chat.unviewed_messages_count = chat.unviewed_messages_count.saturating_sub(counts.messages);
        chat.unviewed_mentions_count = chat.unviewed_mentions_count.saturating_sub(mentions);
        self.persist_chat(chat).map(Some)
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Send a chat message. The message and the chat are persisted before
    /// the network send.
    pub async fn send_chat_message(
        &self,
        chat_id: &str,
        outgoing: OutgoingMessage,
    ) -> Result<MessengerResponse> {
        let guard = self.handle_messages.lock().await;
        let mut chat = self.chat_or_err(chat_id)?;
        let (clock, timestamp) = chat.next_clock_and_timestamp(self.time.as_ref());

        let application = ApplicationMessage::ChatMessage(ChatMessage {
            chat_id: chat.id.clone(),
            chat_type: chat.chat_type,
            clock,
            timestamp,
            content_type: outgoing.content_type,
            text: outgoing.text.clone(),
            response_to: outgoing.response_to.clone(),
            album_id: outgoing.album_id.clone(),
            mentions: outgoing.mentions.clone(),
            display_name: None,
        });
        let payload = application.to_bytes()?;

        let message = Message {
            id: message_id(&self.identity, &payload),
            chat_id: chat.id.clone(),
            chat_type: chat.chat_type,
            clock,
            whisper_timestamp: timestamp,
            timestamp,
            from: self.my_contact_id(),
            seen: true,
            mentioned: false,
            replied: false,
            response_to: outgoing.response_to,
            deleted: false,
            deleted_for_me: false,
            content_type: outgoing.content_type,
            text: outgoing.text,
            album_id: outgoing.album_id,
            mentions: outgoing.mentions,
        };
        chat.update_from_message(&message);
        self.db()?.save_messages(std::slice::from_ref(&message))?;
        let chat = self.persist_chat(chat)?;
        drop(guard);

        let mut raw = RawMessage::new(message.id.clone(), chat.id.clone(), payload);
        raw.resend_automatically = true;
        let destination = self.destination_for_chat(&chat);
        if let Err(e) = self.dispatch_message(raw, &destination).await {
            if !chat.chat_type.permits_automatic_resend() {
                return Err(e);
            }
            warn!(message_id = %message.id, error = %e, "send failed, left to the resend scheduler");
        }

        Ok(MessengerResponse {
            chats: vec![chat],
            messages: vec![message],
            ..MessengerResponse::default()
        })
    }

    /// Send a dispatch record. The record is saved before the network call
    /// and every attempt counts, whether or not it succeeded.
    pub(crate) async fn dispatch_message(
        &self,
        raw: RawMessage,
        destination: &Destination,
    ) -> Result<()> {
        self.db()?.save_raw_message(&raw)?;

        let sent = self.transport.send(destination, &raw).await;

        let now = self.now();
        self.db()?.record_send_attempt(&raw.id, now)?;

        match sent {
            Ok(()) => {
                debug!(message_id = %raw.id, chat_id = %raw.local_chat_id, "message dispatched");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Mirror a message to the user's other devices, when there are any.
    pub(crate) async fn send_to_paired_devices(&self, message: ApplicationMessage) -> Result<()> {
        if !self.has_paired_devices() {
            return Ok(());
        }
        let payload = message.to_bytes()?;
        let mut raw = RawMessage::new(
            message_id(&self.identity, &payload),
            self.my_contact_id(),
            payload,
        );
        raw.resend_automatically = false;
        self.dispatch_message(raw, &Destination::PairedDevices).await
    }

    pub(crate) fn destination_for_chat(&self, chat: &Chat) -> Destination {
        match chat.chat_type {
            ChatType::Public => Destination::Public {
                chat_id: chat.id.clone(),
            },
            ChatType::CommunityChat => Destination::Community {
                chat_id: chat.id.clone(),
                community_id: chat.community_id.clone().unwrap_or_default(),
            },
            ChatType::OneToOne => Destination::Direct {
                contact_id: chat.id.clone(),
            },
            ChatType::PrivateGroup => {
                let me = self.my_contact_id();
                Destination::Group {
                    members: chat.members.iter().filter(|m| **m != me).cloned().collect(),
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::transport::Destination;

    #[tokio::test]
    async fn sent_message_is_persisted_and_dispatched() {
        let h = harness();
        h.messenger.save_chat(group(100)).await.unwrap();
        h.time.set(50);

        let response = h
            .messenger
            .send_chat_message("group-1", OutgoingMessage::text("hello"))
            .await
            .unwrap();

        let message = &response.messages[0];
        assert_eq!(message.clock, 101);
        assert!(message.seen);
        assert_eq!(response.chats[0].last_clock_value, 101);

        let page = h.messenger.messages_by_chat_id("group-1", None, 10).unwrap();
        assert_eq!(page.items.len(), 1);

        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].0,
            Destination::Group {
                members: vec![ALICE.contact_id(), BOB.contact_id()]
            }
        );
        let raw = h.messenger.db().unwrap().raw_message_by_id(&message.id).unwrap();
        assert_eq!(raw.send_count, 1);
        assert_eq!(raw.last_sent, 50);
        assert!(raw.resend_automatically);
    }

    #[tokio::test]
    async fn failed_public_send_is_left_for_resend() {
        let h = harness();
        h.messenger
            .save_chat(Chat::new("general", ChatType::Public, 1))
            .await
            .unwrap();
        h.transport.set_fail_sends(true);

        let response = h
            .messenger
            .send_chat_message("general", OutgoingMessage::text("hi"))
            .await
            .unwrap();
        let raw = h
            .messenger
            .db()
            .unwrap()
            .raw_message_by_id(&response.messages[0].id)
            .unwrap();
        assert_eq!(raw.send_count, 1);
        assert!(!raw.sent);
    }

    #[tokio::test]
    async fn failed_direct_send_is_reported() {
        let h = harness();
        h.messenger
            .save_chat(Chat::one_to_one(&ALICE, 1))
            .await
            .unwrap();
        h.transport.set_fail_sends(true);

        let result = h
            .messenger
            .send_chat_message(&ALICE.contact_id(), OutgoingMessage::text("hi"))
            .await;
        assert!(matches!(result, Err(MessengerError::Transport(_))));
    }

    #[tokio::test]
    async fn sending_to_unknown_chat_fails() {
        let h = harness();
        let result = h
            .messenger
            .send_chat_message("nope", OutgoingMessage::text("hi"))
            .await;
        assert!(matches!(result, Err(MessengerError::ChatNotFound(_))));
    }

    #[tokio::test]
    async fn chats_survive_a_restart() {
        let h = harness();
        h.messenger.save_chat(group(7)).await.unwrap();
        h.messenger.mute_chat("group-1", 5_000).await.unwrap();

        let db = Database::open_at(&h._dir.path().join("parley.db")).unwrap();
        let reloaded = Messenger::new(
            ME,
            db,
            h.transport.clone(),
            Arc::new(crate::settings::StaticSettings::default()),
            h.time.clone(),
            MessengerConfig::default(),
        )
        .unwrap();
        let chat = reloaded.chat("group-1").unwrap();
        assert!(chat.muted);
        assert_eq!(chat.muted_till, 5_000);
        assert_eq!(chat.last_clock_value, 7);
    }

    #[tokio::test]
    async fn expired_mutes_are_cleared() {
        let h = harness();
        h.messenger.save_chat(group(0)).await.unwrap();
        h.messenger.mute_chat("group-1", 2_000).await.unwrap();

        assert!(h.messenger.unmute_expired_chats().await.unwrap().is_empty());
        h.time.set(2_000);
        assert_eq!(
            h.messenger.unmute_expired_chats().await.unwrap(),
            vec!["group-1".to_string()]
        );
        assert!(!h.messenger.chat("group-1").unwrap().muted);
    }

    #[tokio::test]
    async fn deactivated_chat_drops_older_messages() {
        let h = harness();
        h.messenger.save_chat(group(10)).await.unwrap();
        let chat = h.messenger.deactivate_chat("group-1").await.unwrap();
        assert!(!chat.active);
        assert_eq!(chat.deleted_at_clock_value, 1_000);

        let late = ApplicationMessage::ChatMessage(text(&chat, 900, "late"));
        let response = h.receive(ALICE, vec![late], 900).await;
        assert!(response.messages.is_empty());
    }

    #[tokio::test]
    async fn next_clock_is_persisted() {
        let h = harness();
        h.messenger.save_chat(group(2_000)).await.unwrap();
        assert_eq!(h.messenger.next_clock("group-1").await.unwrap(), (2_001, 1_000));
        assert_eq!(h.messenger.next_clock("group-1").await.unwrap(), (2_002, 1_000));
        let stored = h.messenger.db().unwrap().chat("group-1").unwrap();
        assert_eq!(stored.last_clock_value, 2_002);
    }

    async fn mentioned_in_group(h: &Harness) -> (Vec<u8>, String) {
        let chat = h.messenger.save_chat(group(100)).await.unwrap();
        let mut m = text(&chat, 0, "hey");
        m.mentions = vec![ME.contact_id()];
        let received = h.receive(ALICE, vec![ApplicationMessage::ChatMessage(m)], 50).await;
        assert!(h.messenger.has_unseen_activity_center_notifications().unwrap());
        (
            received.activity_center_notifications[0].id.clone(),
            received.messages[0].id.clone(),
        )
    }

    fn mirrored(h: &Harness) -> ApplicationMessage {
        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Destination::PairedDevices);
        ApplicationMessage::from_bytes(&sent[0].1.payload).unwrap()
    }

    #[tokio::test]
    async fn seeing_a_message_reads_its_notification() {
        let h = harness();
        let (notification_id, message_id) = mentioned_in_group(&h).await;
        h.messenger.set_paired_devices(true);

        let response = h
            .messenger
            .mark_messages_seen("group-1", &[message_id])
            .await
            .unwrap();

        assert_eq!(response.chats[0].unviewed_messages_count, 0);
        assert_eq!(response.chats[0].unviewed_mentions_count, 0);
        let read = &response.activity_center_notifications[0];
        assert_eq!(read.id, notification_id);
        assert!(read.read);
        assert!(response.activity_center_state.unwrap().has_seen);
        assert!(!h.messenger.has_unseen_activity_center_notifications().unwrap());
        match mirrored(&h) {
            ApplicationMessage::SyncActivityCenterRead(sync) => {
                assert_eq!(sync.ids, vec![notification_id]);
            }
            other => panic!("unexpected sync message {other:?}"),
        }
    }

    #[tokio::test]
    async fn reading_a_chat_dismisses_its_notifications() {
        let h = harness();
        let (notification_id, _) = mentioned_in_group(&h).await;
        h.messenger.set_paired_devices(true);

        let response = h.messenger.mark_all_read("group-1").await.unwrap();

        assert_eq!(response.chats[0].unviewed_mentions_count, 0);
        let dismissed = &response.activity_center_notifications[0];
        assert!(dismissed.read && dismissed.dismissed);
        assert!(response.activity_center_state.unwrap().has_seen);
        let stored = h
            .messenger
            .activity_center_notification_by_id(&notification_id)
            .unwrap()
            .unwrap();
        assert!(stored.dismissed);
        match mirrored(&h) {
            ApplicationMessage::SyncActivityCenterDismissed(sync) => {
                assert_eq!(sync.ids, vec![notification_id]);
            }
            other => panic!("unexpected sync message {other:?}"),
        }
    }

    #[tokio::test]
    async fn paired_device_syncs_are_not_left_for_resend() {
        let h = harness();
        let (_, message_id) = mentioned_in_group(&h).await;
        h.messenger.set_paired_devices(true);
        h.messenger
            .mark_messages_seen("group-1", &[message_id])
            .await
            .unwrap();
        assert!(!h.transport.sent()[0].1.resend_automatically);

        h.time.set(10_000_000);
        let report = h.messenger.resend_expired_messages().await.unwrap();
        assert_eq!(report, crate::resend::ResendReport::default());
        assert_eq!(h.transport.sent().len(), 1);
    }
}
