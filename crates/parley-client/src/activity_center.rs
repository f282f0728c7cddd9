//! Activity Center API.
//!
//! Local mutations are stamped with the current wall time and mirrored to
//! the user's paired devices. The same mutations arriving as sync messages
//! are applied with the sender's clock and never mirrored again.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use parley_shared::activity::{
    apply, ActivityCenterType, ContactVerificationStatus, MembershipStatus, NotificationAction,
    ReadFilter,
};
use parley_shared::cursor::Page;
use parley_shared::protocol::{
    ApplicationMessage, RequestDecision, SyncActivityCenterNotifications,
    SyncCommunityRequestDecision, SyncContactVerification,
};
use parley_shared::types::{format_id, id_bytes};
use parley_store::notifications::{NotificationSelector, NotificationUpdate};
use parley_store::{ActivityCenterNotification, ActivityCenterState, Chat, NotificationQuery};

use crate::error::{MessengerError, Result};
use crate::ingestion::ReceivedMessageState;
use crate::messenger::Messenger;
use crate::response::MessengerResponse;

/// The sync message mirroring `action` on `ids`.
fn sync_message(action: NotificationAction, clock: u64, ids: Vec<Vec<u8>>) -> ApplicationMessage {
    let sync = SyncActivityCenterNotifications { clock, ids };
    match action {
        NotificationAction::MarkRead => ApplicationMessage::SyncActivityCenterRead(sync),
        NotificationAction::MarkUnread => ApplicationMessage::SyncActivityCenterUnread(sync),
        NotificationAction::Accept => ApplicationMessage::SyncActivityCenterAccepted(sync),
        NotificationAction::Dismiss => ApplicationMessage::SyncActivityCenterDismissed(sync),
        NotificationAction::Delete => ApplicationMessage::SyncActivityCenterDeleted(sync),
    }
}

pub(crate) fn update_response(update: NotificationUpdate) -> MessengerResponse {
    let mut response = MessengerResponse {
        activity_center_state: Some(update.state),
        ..MessengerResponse::default()
    };
    response.add_activity_center_notifications(update.notifications);
    response
}

impl Messenger {
    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn activity_center_notifications(
        &self,
        query: &NotificationQuery,
    ) -> Result<Page<ActivityCenterNotification>> {
        let mut page = self.db()?.activity_center_notifications(query)?;
        self.hydrate_albums(&mut page.items)?;
        Ok(page)
    }

    pub fn activity_center_notifications_count(
        &self,
        types: &[ActivityCenterType],
        read: ReadFilter,
        include_accepted: bool,
    ) -> Result<BTreeMap<ActivityCenterType, u64>> {
        Ok(self
            .db()?
            .activity_center_notifications_count(types, read, include_accepted)?)
    }

    /// Lookup by id. Deleted notifications are returned too.
    pub fn activity_center_notification_by_id(
        &self,
        id: &[u8],
    ) -> Result<Option<ActivityCenterNotification>> {
        let found = self.db()?.activity_center_notification_by_id(id)?;
        let Some(notification) = found else {
            return Ok(None);
        };
        let mut items = [notification];
        self.hydrate_albums(&mut items)?;
        let [notification] = items;
        Ok(Some(notification))
    }

    pub fn activity_center_notifications_by_id(
        &self,
        ids: &[Vec<u8>],
    ) -> Result<Vec<ActivityCenterNotification>> {
        let mut items = self.db()?.activity_center_notifications_by_id(ids)?;
        self.hydrate_albums(&mut items)?;
        Ok(items)
    }

    pub fn activity_center_state(&self) -> Result<ActivityCenterState> {
        Ok(self.db()?.activity_center_state()?)
    }

    pub fn has_unseen_activity_center_notifications(&self) -> Result<bool> {
        Ok(!self.activity_center_state()?.has_seen)
    }

    pub fn unread_activity_center_notification_ids(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self.db()?.unread_notification_ids()?)
    }

    pub fn pending_activity_center_notification_ids(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self.db()?.pending_notification_ids()?)
    }

    pub fn has_pending_notifications_for_chat(&self, chat_id: &str) -> Result<bool> {
        Ok(self.db()?.has_pending_notifications_for_chat(chat_id)?)
    }

    pub fn active_contact_request_notification(
        &self,
        contact_id: &str,
    ) -> Result<Option<ActivityCenterNotification>> {
        Ok(self.db()?.active_contact_request_notification(contact_id)?)
    }

    fn hydrate_albums(&self, items: &mut [ActivityCenterNotification]) -> Result<()> {
        for notification in items {
            let album = notification
                .message
                .as_ref()
                .and_then(|m| m.album_id.clone().map(|album| (m.chat_id.clone(), album)));
            if let Some((chat_id, album_id)) = album {
                notification.album_messages = self.db()?.album_messages(&chat_id, &album_id)?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Local mutations
    // -----------------------------------------------------------------------

    /// Save a notification raised outside of message ingestion, e.g. a
    /// community or token event.
    pub fn add_activity_center_notification(
        &self,
        notification: &ActivityCenterNotification,
    ) -> Result<ActivityCenterState> {
        Ok(self.db()?.save_activity_center_notification(notification)?)
    }

    pub async fn mark_activity_center_notifications_read(
        &self,
        ids: &[Vec<u8>],
    ) -> Result<MessengerResponse> {
        self.mutate_notifications(NotificationSelector::Ids(ids), &[NotificationAction::MarkRead])
            .await
    }

    pub async fn mark_activity_center_notifications_unread(
        &self,
        ids: &[Vec<u8>],
    ) -> Result<MessengerResponse> {
        self.mutate_notifications(NotificationSelector::Ids(ids), &[NotificationAction::MarkUnread])
            .await
    }

    pub async fn accept_activity_center_notifications(
        &self,
        ids: &[Vec<u8>],
    ) -> Result<MessengerResponse> {
        self.mutate_notifications(NotificationSelector::Ids(ids), &[NotificationAction::Accept])
            .await
    }

    pub async fn dismiss_activity_center_notifications(
        &self,
        ids: &[Vec<u8>],
    ) -> Result<MessengerResponse> {
        self.mutate_notifications(NotificationSelector::Ids(ids), &[NotificationAction::Dismiss])
            .await
    }

    pub async fn delete_activity_center_notifications(
        &self,
        ids: &[Vec<u8>],
    ) -> Result<MessengerResponse> {
        self.mutate_notifications(NotificationSelector::Ids(ids), &[NotificationAction::Delete])
            .await
    }

    pub async fn mark_all_activity_center_notifications_read(&self) -> Result<MessengerResponse> {
        self.mutate_notifications(NotificationSelector::All, &[NotificationAction::MarkRead])
            .await
    }

    pub async fn accept_all_activity_center_notifications(&self) -> Result<MessengerResponse> {
        self.mutate_notifications(NotificationSelector::All, &[NotificationAction::Accept])
            .await
    }

    pub async fn dismiss_all_activity_center_notifications(&self) -> Result<MessengerResponse> {
        self.mutate_notifications(NotificationSelector::All, &[NotificationAction::Dismiss])
            .await
    }

    pub async fn dismiss_all_activity_center_notifications_from_user(
        &self,
        contact_id: &str,
    ) -> Result<MessengerResponse> {
        self.mutate_notifications(
            NotificationSelector::Author(contact_id),
            &[NotificationAction::Dismiss],
        )
        .await
    }

    /// Dismiss a chat's notifications. Contact requests and accepted
    /// notifications are left alone.
    pub async fn dismiss_all_activity_center_notifications_from_chat(
        &self,
        chat_id: &str,
    ) -> Result<MessengerResponse> {
        self.mutate_notifications(NotificationSelector::Chat(chat_id), &[NotificationAction::Dismiss])
            .await
    }

    pub async fn dismiss_all_activity_center_notifications_from_community(
        &self,
        community_id: &str,
    ) -> Result<MessengerResponse> {
        self.mutate_notifications(
            NotificationSelector::Community(community_id),
            &[NotificationAction::Dismiss],
        )
        .await
    }

    /// Dismiss the join, kick and ban notifications of a community.
    pub async fn dismiss_activity_center_notifications_by_community(
        &self,
        community_id: &str,
    ) -> Result<MessengerResponse> {
        self.mutate_notifications(
            NotificationSelector::CommunityMembership(community_id),
            &[NotificationAction::Dismiss],
        )
        .await
    }

    pub async fn accept_all_pending_group_chat_invitations_from_user(
        &self,
        contact_id: &str,
    ) -> Result<MessengerResponse> {
        self.mutate_notifications(
            NotificationSelector::GroupInvitesFrom(contact_id),
            &[NotificationAction::Accept],
        )
        .await
    }

    /// Drop the contact requests of a contact that retracted them.
    pub async fn delete_contact_request_notifications(
        &self,
        contact_id: &str,
    ) -> Result<MessengerResponse> {
        self.mutate_notifications(
            NotificationSelector::ContactRequestsFrom(contact_id),
            &[NotificationAction::Delete],
        )
        .await
    }

    /// Remove the notification raised by a message, e.g. after the message
    /// was deleted.
    pub async fn delete_activity_center_notification_for_message(
        &self,
        message_id: &str,
    ) -> Result<MessengerResponse> {
        let album_id = match self.db()?.message_by_id(message_id) {
            Ok(message) => message.album_id,
            Err(parley_store::StoreError::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        let id = id_bytes(album_id.as_deref().unwrap_or(message_id));
        self.mutate_notifications(
            NotificationSelector::Ids(&[id]),
            &[NotificationAction::Dismiss, NotificationAction::Delete],
        )
        .await
    }

    /// Apply actions locally, then mirror the resulting change. Read
    /// notifications also mark their messages seen.
    async fn mutate_notifications(
        &self,
        selector: NotificationSelector<'_>,
        actions: &[NotificationAction],
    ) -> Result<MessengerResponse> {
        let guard = self.handle_messages.lock().await;
        let clock = self.now();
        let update = self
            .db()?
            .apply_notification_actions(selector, actions, clock)?;
        let touched = if actions.last() == Some(&NotificationAction::MarkRead) {
            self.mark_notification_messages_seen(&update.notifications)?
        } else {
            Vec::new()
        };
        drop(guard);

        if let Some(action) = actions.last() {
            self.mirror_update(*action, clock, &update).await;
        }

        let mut response = update_response(update);
        response.add_chats(touched);
        Ok(response)
    }

    /// Mark the notifications raised by `message_ids` read, once the
    /// messages themselves were seen. Callers hold `handle_messages` and
    /// mirror the update after releasing it.
    pub(crate) fn read_notifications_for_messages(
        &self,
        message_ids: &[String],
        clock: u64,
    ) -> Result<NotificationUpdate> {
        let mut ids = Vec::with_capacity(message_ids.len());
        for message_id in message_ids {
            let album_id = match self.db()?.message_by_id(message_id) {
                Ok(message) => message.album_id,
                Err(parley_store::StoreError::NotFound) => None,
                Err(e) => return Err(e.into()),
            };
            let id = id_bytes(album_id.as_deref().unwrap_or(message_id));
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(self.db()?.apply_notification_actions(
            NotificationSelector::Ids(&ids),
            &[NotificationAction::MarkRead],
            clock,
        )?)
    }

    /// Dismiss the notifications of a chat that was read in full. Callers
    /// hold `handle_messages`.
    pub(crate) fn dismiss_notifications_for_chat(
        &self,
        chat_id: &str,
        clock: u64,
    ) -> Result<NotificationUpdate> {
        Ok(self.db()?.apply_notification_actions(
            NotificationSelector::Chat(chat_id),
            &[NotificationAction::Dismiss],
            clock,
        )?)
    }

    /// Mirror the rows changed by a local `action` to paired devices.
    pub(crate) async fn mirror_update(
        &self,
        action: NotificationAction,
        clock: u64,
        update: &NotificationUpdate,
    ) {
        if update.notifications.is_empty() {
            return;
        }
        let ids = update.notifications.iter().map(|n| n.id.clone()).collect();
        self.mirror(sync_message(action, clock, ids)).await;
    }

    /// Change a contact verification notification's status.
    pub async fn set_contact_verification_status(
        &self,
        id: &[u8],
        status: ContactVerificationStatus,
    ) -> Result<MessengerResponse> {
        let guard = self.handle_messages.lock().await;
        let clock = self.now();
        let response = self.apply_contact_verification(id, status, clock)?;
        drop(guard);
        self.mirror(ApplicationMessage::SyncContactVerification(SyncContactVerification {
            id: id.to_vec(),
            clock,
            status,
        }))
        .await;
        Ok(response)
    }

    /// Record the decision on a community membership request.
    pub async fn set_community_request_decision(
        &self,
        id: &[u8],
        decision: RequestDecision,
        membership_status: MembershipStatus,
    ) -> Result<MessengerResponse> {
        let guard = self.handle_messages.lock().await;
        let clock = self.now();
        let response = self.apply_community_request_decision(id, membership_status, clock)?;
        drop(guard);
        self.mirror(ApplicationMessage::SyncCommunityRequestDecision(
            SyncCommunityRequestDecision {
                id: id.to_vec(),
                clock,
                decision,
                membership_status,
            },
        ))
        .await;
        Ok(response)
    }

    /// Decide a live notification in one store transaction, so a
    /// concurrent delete is never undone. Callers hold `handle_messages`.
    fn decide(
        &self,
        id: &[u8],
        clock: u64,
        decide: impl FnOnce(&mut ActivityCenterNotification) -> Result<()>,
    ) -> Result<MessengerResponse> {
        let update = self
            .db()?
            .decide_notification(id, clock, decide)?
            .ok_or_else(|| MessengerError::NotificationNotFound(format_id(id)))?;
        Ok(update_response(update))
    }

    fn apply_contact_verification(
        &self,
        id: &[u8],
        status: ContactVerificationStatus,
        clock: u64,
    ) -> Result<MessengerResponse> {
        self.decide(id, clock, |notification| {
            notification.contact_verification_status =
                notification.contact_verification_status.transition(status)?;
            if let Some(action) = status.implied_action() {
                notification.set_flags(apply(notification.flags(), action)?);
            }
            Ok(())
        })
    }

    fn apply_community_request_decision(
        &self,
        id: &[u8],
        membership_status: MembershipStatus,
        clock: u64,
    ) -> Result<MessengerResponse> {
        self.decide(id, clock, |notification| {
            notification.membership_status =
                notification.membership_status.transition(membership_status)?;
            if let Some(action) = membership_status.implied_action() {
                notification.set_flags(apply(notification.flags(), action)?);
            }
            Ok(())
        })
    }

    async fn mirror(&self, message: ApplicationMessage) {
        let kind = message.kind();
        if let Err(e) = self.send_to_paired_devices(message).await {
            warn!(?kind, error = %e, "failed to sync activity center change to paired devices");
        }
    }

    /// Mark the messages behind mention and reply notifications as seen.
    /// Callers hold `handle_messages`.
    pub(crate) fn mark_notification_messages_seen(
        &self,
        notifications: &[ActivityCenterNotification],
    ) -> Result<Vec<Chat>> {
        let mut by_chat: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for notification in notifications {
            if !matches!(
                notification.notification_type,
                ActivityCenterType::Mention | ActivityCenterType::Reply
            ) {
                continue;
            }
            if let Some(message) = &notification.message {
                by_chat
                    .entry(message.chat_id.clone())
                    .or_default()
                    .push(message.id.clone());
            }
        }

        let mut chats = Vec::with_capacity(by_chat.len());
        for (chat_id, ids) in by_chat {
            if let Some(chat) = self.apply_messages_seen(&chat_id, &ids)? {
                chats.push(chat);
            }
        }
        Ok(chats)
    }

    // -----------------------------------------------------------------------
    // Incoming sync
    // -----------------------------------------------------------------------

    pub(crate) fn handle_sync_notifications(
        &self,
        state: &mut ReceivedMessageState,
        action: NotificationAction,
        sync: SyncActivityCenterNotifications,
    ) -> Result<()> {
        let update = self.db()?.apply_notification_actions(
            NotificationSelector::Ids(&sync.ids),
            &[action],
            sync.clock,
        )?;
        debug!(?action, changed = update.notifications.len(), "applied activity center sync");
        if action == NotificationAction::MarkRead {
            state.deferred_seen.extend(update.notifications.iter().cloned());
        }
        state.response.activity_center_state = Some(update.state);
        state
            .response
            .add_activity_center_notifications(update.notifications);
        Ok(())
    }

    pub(crate) fn handle_sync_contact_verification(
        &self,
        state: &mut ReceivedMessageState,
        sync: SyncContactVerification,
    ) -> Result<()> {
        let response = self.apply_contact_verification(&sync.id, sync.status, sync.clock)?;
        merge_sync_response(state, response);
        Ok(())
    }

    pub(crate) fn handle_sync_community_request_decision(
        &self,
        state: &mut ReceivedMessageState,
        sync: SyncCommunityRequestDecision,
    ) -> Result<()> {
        let response =
            self.apply_community_request_decision(&sync.id, sync.membership_status, sync.clock)?;
        merge_sync_response(state, response);
        Ok(())
    }
}

fn merge_sync_response(state: &mut ReceivedMessageState, response: MessengerResponse) {
    if response.activity_center_state.is_some() {
        state.response.activity_center_state = response.activity_center_state;
    }
    state
        .response
        .add_activity_center_notifications(response.activity_center_notifications);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::test_support::*;
    use crate::transport::Destination;

    async fn mentioned(h: &Harness) -> ActivityCenterNotification {
        let chat = h.messenger.save_chat(group(100)).await.unwrap();
        let mut m = text(&chat, 0, "hey");
        m.mentions = vec![ME.contact_id()];
        let response = h.receive(ALICE, vec![ApplicationMessage::ChatMessage(m)], 50).await;
        response.activity_center_notifications[0].clone()
    }

    fn sync_from_me(action: NotificationAction, clock: u64, id: &[u8]) -> ApplicationMessage {
        sync_message(action, clock, vec![id.to_vec()])
    }

    #[tokio::test]
    async fn reading_a_mention_marks_its_message_seen() {
        let h = harness();
        let notification = mentioned(&h).await;

        let response = h
            .messenger
            .mark_activity_center_notifications_read(&[notification.id.clone()])
            .await
            .unwrap();

        assert!(response.activity_center_notifications[0].read);
        assert!(response.activity_center_state.unwrap().has_seen);
        let chat = &response.chats[0];
        assert_eq!(chat.unviewed_messages_count, 0);
        assert_eq!(chat.unviewed_mentions_count, 0);
        let message_id = &notification.message.unwrap().id;
        assert!(h.messenger.db().unwrap().message_by_id(message_id).unwrap().seen);
    }

    #[tokio::test]
    async fn local_changes_are_mirrored_to_paired_devices() {
        let h = harness();
        let notification = mentioned(&h).await;

        h.messenger
            .dismiss_activity_center_notifications(&[notification.id.clone()])
            .await
            .unwrap();
        assert!(h.transport.sent().is_empty());

        h.messenger.set_paired_devices(true);
        h.messenger
            .accept_activity_center_notifications(&[notification.id.clone()])
            .await
            .unwrap();
        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Destination::PairedDevices);
        match ApplicationMessage::from_bytes(&sent[0].1.payload).unwrap() {
            ApplicationMessage::SyncActivityCenterAccepted(sync) => {
                assert_eq!(sync.ids, vec![notification.id]);
                assert_eq!(sync.clock, 1_000);
            }
            other => panic!("unexpected sync message {other:?}"),
        }
    }

    #[tokio::test]
    async fn mirroring_failure_does_not_undo_the_change() {
        let h = harness();
        let notification = mentioned(&h).await;
        h.messenger.set_paired_devices(true);
        h.transport.set_fail_sends(true);

        let response = h
            .messenger
            .dismiss_activity_center_notifications(&[notification.id.clone()])
            .await
            .unwrap();
        assert!(response.activity_center_notifications[0].dismissed);
    }

    #[tokio::test]
    async fn sync_from_own_device_applies_with_its_clock() {
        let h = harness();
        let notification = mentioned(&h).await;

        let response = h
            .receive(ME, vec![sync_from_me(NotificationAction::MarkRead, 5_000, &notification.id)], 60)
            .await;

        let synced = &response.activity_center_notifications[0];
        assert!(synced.read);
        assert_eq!(synced.updated_at, 5_000);
        // The read also cleared the chat counters, after the batch saved.
        let chat = h.messenger.chat("group-1").unwrap();
        assert_eq!(chat.unviewed_messages_count, 0);
        // Sync handlers never mirror back.
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn equal_clocks_resolve_to_the_last_applied_change() {
        let h = harness();
        let notification = mentioned(&h).await;
        let clock = notification.updated_at;

        h.receive(ME, vec![sync_from_me(NotificationAction::MarkRead, clock, &notification.id)], 60)
            .await;
        h.receive(ME, vec![sync_from_me(NotificationAction::MarkUnread, clock, &notification.id)], 61)
            .await;

        let stored = h
            .messenger
            .activity_center_notification_by_id(&notification.id)
            .unwrap()
            .unwrap();
        assert!(!stored.read);
        assert_eq!(stored.updated_at, clock + 2);
        assert!(h.messenger.has_unseen_activity_center_notifications().unwrap());
    }

    #[tokio::test]
    async fn deleting_for_a_message_syncs_deleted() {
        let h = harness();
        let notification = mentioned(&h).await;
        h.messenger.set_paired_devices(true);
        let message_id = notification.message.as_ref().unwrap().id.clone();

        h.messenger
            .delete_activity_center_notification_for_message(&message_id)
            .await
            .unwrap();

        let stored = h
            .messenger
            .activity_center_notification_by_id(&notification.id)
            .unwrap()
            .unwrap();
        assert!(stored.deleted && stored.dismissed);
        let page = h
            .messenger
            .activity_center_notifications(&NotificationQuery::default())
            .unwrap();
        assert!(page.items.is_empty());
        let payload = &h.transport.sent()[0].1.payload;
        assert!(matches!(
            ApplicationMessage::from_bytes(payload).unwrap(),
            ApplicationMessage::SyncActivityCenterDeleted(_)
        ));

        // Deleted is final.
        let response = h
            .messenger
            .mark_activity_center_notifications_unread(&[notification.id])
            .await
            .unwrap();
        assert!(response.activity_center_notifications.is_empty());
    }

    #[tokio::test]
    async fn dismissing_a_chat_spares_contact_requests() {
        let h = harness();
        let notification = mentioned(&h).await;
        let mut request = ActivityCenterNotification::new(
            vec![7],
            ActivityCenterType::ContactRequest,
            "group-1",
            10,
        );
        request.updated_at = 10;
        h.messenger.add_activity_center_notification(&request).unwrap();

        let response = h
            .messenger
            .dismiss_all_activity_center_notifications_from_chat("group-1")
            .await
            .unwrap();

        assert_eq!(response.activity_center_notifications.len(), 1);
        assert_eq!(response.activity_center_notifications[0].id, notification.id);
        assert!(h.messenger.has_pending_notifications_for_chat("group-1").unwrap());
    }

    #[tokio::test]
    async fn verification_status_moves_through_its_states() {
        let h = harness();
        let mut verification = ActivityCenterNotification::new(
            vec![9],
            ActivityCenterType::ContactVerification,
            ALICE.contact_id(),
            10,
        );
        verification.contact_verification_status = ContactVerificationStatus::Pending;
        verification.updated_at = 10;
        h.messenger.add_activity_center_notification(&verification).unwrap();

        let response = h
            .messenger
            .set_contact_verification_status(&[9], ContactVerificationStatus::Accepted)
            .await
            .unwrap();
        let updated = &response.activity_center_notifications[0];
        assert_eq!(updated.contact_verification_status, ContactVerificationStatus::Accepted);
        assert!(updated.accepted);
        assert_eq!(updated.updated_at, 1_000);

        let back = h
            .messenger
            .set_contact_verification_status(&[9], ContactVerificationStatus::Pending)
            .await;
        assert!(matches!(back, Err(MessengerError::Transition(_))));
    }

    #[tokio::test]
    async fn community_request_decision_from_own_device() {
        let h = harness();
        let mut request = ActivityCenterNotification::new(
            vec![4],
            ActivityCenterType::CommunityRequest,
            "",
            10,
        );
        request.community_id = Some("c1".into());
        request.membership_status = MembershipStatus::Pending;
        request.updated_at = 10;
        h.messenger.add_activity_center_notification(&request).unwrap();

        let decision = ApplicationMessage::SyncCommunityRequestDecision(SyncCommunityRequestDecision {
            id: vec![4],
            clock: 20,
            decision: RequestDecision::Declined,
            membership_status: MembershipStatus::Declined,
        });
        let response = h.receive(ME, vec![decision], 20).await;

        let updated = &response.activity_center_notifications[0];
        assert_eq!(updated.membership_status, MembershipStatus::Declined);
        assert!(updated.dismissed);
        assert_eq!(updated.updated_at, 20);
    }

    #[tokio::test]
    async fn decisions_never_revive_a_deleted_notification() {
        let h = harness();
        let mut verification = ActivityCenterNotification::new(
            vec![9],
            ActivityCenterType::ContactVerification,
            ALICE.contact_id(),
            10,
        );
        verification.contact_verification_status = ContactVerificationStatus::Pending;
        h.messenger.add_activity_center_notification(&verification).unwrap();

        let delete_ids = [vec![9]];
        let (deleted, decided) = tokio::join!(
            h.messenger.delete_activity_center_notifications(&delete_ids),
            h.messenger
                .set_contact_verification_status(&[9], ContactVerificationStatus::Accepted),
        );
        deleted.unwrap();
        assert!(matches!(
            decided,
            Ok(_) | Err(MessengerError::NotificationNotFound(_))
        ));
        let stored = h.messenger.activity_center_notification_by_id(&[9]).unwrap().unwrap();
        assert!(stored.deleted);

        // A decision synced from another device after the delete is refused.
        let decision = ApplicationMessage::SyncContactVerification(SyncContactVerification {
            id: vec![9],
            clock: 5_000,
            status: ContactVerificationStatus::Accepted,
        });
        let response = h.receive(ME, vec![decision], 60).await;
        assert!(response.activity_center_notifications.is_empty());

        let stored = h.messenger.activity_center_notification_by_id(&[9]).unwrap().unwrap();
        assert!(stored.deleted);
        assert!(!h.messenger.has_unseen_activity_center_notifications().unwrap());
    }

    #[tokio::test]
    async fn missing_notification_is_reported() {
        let h = harness();
        let result = h
            .messenger
            .set_contact_verification_status(&[1, 2], ContactVerificationStatus::Accepted)
            .await;
        assert!(matches!(result, Err(MessengerError::NotificationNotFound(_))));
    }

    #[tokio::test]
    async fn mark_all_read_clears_the_badge() {
        let h = harness();
        mentioned(&h).await;
        assert_eq!(h.messenger.unread_activity_center_notification_ids().unwrap().len(), 1);

        h.messenger.mark_all_activity_center_notifications_read().await.unwrap();

        assert!(h.messenger.unread_activity_center_notification_ids().unwrap().is_empty());
        assert!(!h.messenger.has_unseen_activity_center_notifications().unwrap());
        let counts = h
            .messenger
            .activity_center_notifications_count(&[], ReadFilter::Read, true)
            .unwrap();
        assert_eq!(counts.get(&ActivityCenterType::Mention), Some(&1));
    }
}
