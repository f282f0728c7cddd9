//! Activity Center persistence.
//!
//! Notifications are never physically removed. Every mutation goes through
//! [`apply`] from the shared state machine, bumps the row's `updated_at`
//! with the logical clock merge rule and recomputes the singleton
//! `activity_center_states` row inside the same transaction.

use std::collections::BTreeMap;

use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use parley_shared::activity::{
    apply, ActivityCenterType, ContactVerificationStatus, MembershipStatus, NotificationAction,
    ReadFilter,
};
use parley_shared::clock::bump_clock;
use parley_shared::cursor::Page;

use crate::database::{conversion_error, placeholders, Database};
use crate::error::{Result, StoreError};
use crate::models::{ActivityCenterNotification, ActivityCenterState, Message, NotificationQuery};

const SELECT_NOTIFICATION: &str = "SELECT a.id, a.timestamp, a.notification_type, a.chat_id,
        a.community_id, a.membership_status, a.message, a.reply_message, a.author, a.read,
        a.accepted, a.dismissed, a.deleted, a.contact_verification_status, a.token_data,
        a.updated_at
 FROM activity_center_notifications a";

/// Which notifications a bulk mutation targets. Deleted rows are never
/// selected.
#[derive(Debug, Clone, Copy)]
pub enum NotificationSelector<'a> {
    Ids(&'a [Vec<u8>]),
    All,
    /// Everything authored by a contact.
    Author(&'a str),
    /// Everything in a chat except contact requests and accepted entries.
    Chat(&'a str),
    /// Everything belonging to a community.
    Community(&'a str),
    /// Join/kick/ban notifications of a community.
    CommunityMembership(&'a str),
    /// Pending private group invitations from a contact.
    GroupInvitesFrom(&'a str),
    /// Contact requests authored by a contact.
    ContactRequestsFrom(&'a str),
}

impl NotificationSelector<'_> {
    fn where_clause(&self) -> (String, Vec<Value>) {
        match *self {
            Self::Ids(ids) => (
                format!("a.id IN ({})", placeholders(ids.len())),
                ids.iter().cloned().map(Value::Blob).collect(),
            ),
            Self::All => ("1".to_string(), Vec::new()),
            Self::Author(author) => ("a.author = ?".to_string(), vec![text(author)]),
            Self::Chat(chat_id) => (
                "a.chat_id = ? AND a.notification_type != ? AND NOT a.accepted".to_string(),
                vec![text(chat_id), kind(ActivityCenterType::ContactRequest)],
            ),
            Self::Community(community_id) => {
                ("a.community_id = ?".to_string(), vec![text(community_id)])
            }
            Self::CommunityMembership(community_id) => {
                let types = ActivityCenterType::COMMUNITY_MEMBERSHIP;
                let mut args = vec![text(community_id)];
                args.extend(types.iter().copied().map(kind));
                (
                    format!(
                        "a.community_id = ? AND a.notification_type IN ({})",
                        placeholders(types.len())
                    ),
                    args,
                )
            }
            Self::GroupInvitesFrom(author) => (
                "a.author = ? AND a.notification_type = ? AND NOT a.accepted AND NOT a.dismissed"
                    .to_string(),
                vec![text(author), kind(ActivityCenterType::NewPrivateGroupChat)],
            ),
            Self::ContactRequestsFrom(author) => (
                "a.author = ? AND a.notification_type = ?".to_string(),
                vec![text(author), kind(ActivityCenterType::ContactRequest)],
            ),
        }
    }
}

/// Result of a mutation: the rows that changed and the recomputed badge
/// state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationUpdate {
    pub notifications: Vec<ActivityCenterNotification>,
    pub state: ActivityCenterState,
}

impl Database {
    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Insert or replace a notification and recompute the badge state.
    /// Invalid notifications are rejected before anything is written.
    pub fn save_activity_center_notification(
        &mut self,
        notification: &ActivityCenterNotification,
    ) -> Result<ActivityCenterState> {
        notification.validate()?;

        let message = notification
            .message
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let reply_message = notification
            .reply_message
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO activity_center_notifications (id, timestamp,
                 notification_type, chat_id, community_id, membership_status, message,
                 reply_message, author, read, accepted, dismissed, deleted,
                 contact_verification_status, token_data, updated_at, cursor)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                notification.id,
                notification.timestamp,
                notification.notification_type.as_i64(),
                notification.chat_id,
                notification.community_id,
                notification.membership_status.as_i64(),
                message,
                reply_message,
                notification.author,
                notification.read,
                notification.accepted,
                notification.dismissed,
                notification.deleted,
                notification.contact_verification_status.as_i64(),
                notification.token_data,
                notification.updated_at,
                notification.cursor(),
            ],
        )?;
        let state = recompute_state(&tx, notification.updated_at)?;
        tx.commit()?;
        Ok(state)
    }

    /// Apply `actions`, in order, to every notification matched by
    /// `selector`. Rows the state machine rejects are left untouched.
    pub fn apply_notification_actions(
        &mut self,
        selector: NotificationSelector<'_>,
        actions: &[NotificationAction],
        updated_at: u64,
    ) -> Result<NotificationUpdate> {
        if let NotificationSelector::Ids(ids) = selector {
            if ids.is_empty() {
                return Ok(NotificationUpdate {
                    notifications: Vec::new(),
                    state: self.activity_center_state()?,
                });
            }
        }

        let (clause, args) = selector.where_clause();
        let tx = self.conn_mut().transaction()?;
        let rows = query_notifications(
            &tx,
            &format!("{SELECT_NOTIFICATION} WHERE NOT a.deleted AND {clause}"),
            args,
        )?;

        let mut changed = Vec::with_capacity(rows.len());
        for mut notification in rows {
            let flags = actions
                .iter()
                .try_fold(notification.flags(), |flags, action| apply(flags, *action));
            let Ok(flags) = flags else {
                continue;
            };
            notification.set_flags(flags);
            notification.updated_at = bump_clock(notification.updated_at, updated_at);
            tx.execute(
                "UPDATE activity_center_notifications
                 SET read = ?2, dismissed = ?3, accepted = ?4, deleted = ?5, updated_at = ?6
                 WHERE id = ?1",
                params![
                    notification.id,
                    notification.read,
                    notification.dismissed,
                    notification.accepted,
                    notification.deleted,
                    notification.updated_at,
                ],
            )?;
            changed.push(notification);
        }

        let state = recompute_state(&tx, updated_at)?;
        tx.commit()?;
        Ok(NotificationUpdate {
            notifications: changed,
            state,
        })
    }

    pub fn mark_notifications_read(&mut self, ids: &[Vec<u8>], updated_at: u64) -> Result<NotificationUpdate> {
        self.apply_notification_actions(
            NotificationSelector::Ids(ids),
            &[NotificationAction::MarkRead],
            updated_at,
        )
    }

    pub fn mark_notifications_unread(&mut self, ids: &[Vec<u8>], updated_at: u64) -> Result<NotificationUpdate> {
        self.apply_notification_actions(
            NotificationSelector::Ids(ids),
            &[NotificationAction::MarkUnread],
            updated_at,
        )
    }

    pub fn accept_notifications(&mut self, ids: &[Vec<u8>], updated_at: u64) -> Result<NotificationUpdate> {
        self.apply_notification_actions(
            NotificationSelector::Ids(ids),
            &[NotificationAction::Accept],
            updated_at,
        )
    }

    pub fn dismiss_notifications(&mut self, ids: &[Vec<u8>], updated_at: u64) -> Result<NotificationUpdate> {
        self.apply_notification_actions(
            NotificationSelector::Ids(ids),
            &[NotificationAction::Dismiss],
            updated_at,
        )
    }

    pub fn delete_notifications(&mut self, ids: &[Vec<u8>], updated_at: u64) -> Result<NotificationUpdate> {
        self.apply_notification_actions(
            NotificationSelector::Ids(ids),
            &[NotificationAction::Delete],
            updated_at,
        )
    }

    /// Remove the notification raised by a message, e.g. after the message
    /// itself was deleted. The row ends read, dismissed and deleted.
    pub fn delete_notifications_for_message(
        &mut self,
        ids: &[Vec<u8>],
        updated_at: u64,
    ) -> Result<NotificationUpdate> {
        self.apply_notification_actions(
            NotificationSelector::Ids(ids),
            &[NotificationAction::Dismiss, NotificationAction::Delete],
            updated_at,
        )
    }

    /// Read a live notification, let `decide` change its sub-state and
    /// flags, then write it back, all in one transaction. Returns `None`
    /// when the notification is missing or deleted. An error from `decide`
    /// leaves the row untouched.
    pub fn decide_notification<E>(
        &mut self,
        id: &[u8],
        updated_at: u64,
        decide: impl FnOnce(&mut ActivityCenterNotification) -> std::result::Result<(), E>,
    ) -> std::result::Result<Option<NotificationUpdate>, E>
    where
        E: From<StoreError>,
    {
        let tx = self.conn_mut().transaction().map_err(StoreError::from)?;
        let Some(mut notification) = query_notifications(
            &tx,
            &format!("{SELECT_NOTIFICATION} WHERE a.id = ? AND NOT a.deleted"),
            vec![Value::Blob(id.to_vec())],
        )?
        .pop() else {
            return Ok(None);
        };

        decide(&mut notification)?;
        notification.updated_at = bump_clock(notification.updated_at, updated_at);
        tx.execute(
            "UPDATE activity_center_notifications
             SET read = ?2, dismissed = ?3, accepted = ?4, deleted = ?5,
                 contact_verification_status = ?6, membership_status = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                notification.id,
                notification.read,
                notification.dismissed,
                notification.accepted,
                notification.deleted,
                notification.contact_verification_status.as_i64(),
                notification.membership_status.as_i64(),
                notification.updated_at,
            ],
        )
        .map_err(StoreError::from)?;
        let state = recompute_state(&tx, notification.updated_at)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(Some(NotificationUpdate {
            notifications: vec![notification],
            state,
        }))
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// One page of non-deleted notifications, newest first.
    pub fn activity_center_notifications(
        &self,
        query: &NotificationQuery,
    ) -> Result<Page<ActivityCenterNotification>> {
        let (mut clause, mut args) = filter_clause(&query.types, query.read, query.include_accepted);
        if let Some(cursor) = query.cursor.as_deref().filter(|c| !c.is_empty()) {
            clause.push_str(" AND a.cursor <= ?");
            args.push(text(cursor));
        }
        let fetch = i64::try_from(query.limit.saturating_add(1)).unwrap_or(i64::MAX);
        args.push(Value::Integer(fetch));

        let rows = query_notifications(
            self.conn(),
            &format!("{SELECT_NOTIFICATION} WHERE {clause} ORDER BY a.cursor DESC LIMIT ?"),
            args,
        )?;
        Ok(Page::from_rows(
            rows,
            query.limit as usize,
            ActivityCenterNotification::cursor,
        ))
    }

    /// Count of non-deleted notifications per type. Types without rows are
    /// absent from the map.
    pub fn activity_center_notifications_count(
        &self,
        types: &[ActivityCenterType],
        read: ReadFilter,
        include_accepted: bool,
    ) -> Result<BTreeMap<ActivityCenterType, u64>> {
        let (clause, args) = filter_clause(types, read, include_accepted);
        let mut stmt = self.conn().prepare(&format!(
            "SELECT a.notification_type, COUNT(1) FROM activity_center_notifications a
             WHERE {clause} GROUP BY a.notification_type"
        ))?;
        let rows = stmt.query_map(params_from_iter(args), |row| {
            let code: i64 = row.get(0)?;
            let kind = ActivityCenterType::from_i64(code)
                .map_err(|e| conversion_error(0, Type::Integer, e))?;
            Ok((kind, row.get::<_, u64>(1)?))
        })?;
        Ok(rows.collect::<std::result::Result<BTreeMap<_, _>, _>>()?)
    }

    /// Fetch a notification by id, deleted or not.
    pub fn activity_center_notification_by_id(
        &self,
        id: &[u8],
    ) -> Result<Option<ActivityCenterNotification>> {
        Ok(self
            .conn()
            .query_row(
                &format!("{SELECT_NOTIFICATION} WHERE a.id = ?1"),
                params![id],
                row_to_notification,
            )
            .optional()?)
    }

    /// Fetch notifications by id, deleted or not.
    pub fn activity_center_notifications_by_id(
        &self,
        ids: &[Vec<u8>],
    ) -> Result<Vec<ActivityCenterNotification>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        query_notifications(
            self.conn(),
            &format!(
                "{SELECT_NOTIFICATION} WHERE a.id IN ({}) ORDER BY a.cursor DESC",
                placeholders(ids.len())
            ),
            ids.iter().cloned().map(Value::Blob).collect(),
        )
    }

    /// Ids of every unread, non-deleted notification.
    pub fn unread_notification_ids(&self) -> Result<Vec<Vec<u8>>> {
        let mut stmt = self.conn().prepare(
            "SELECT id FROM activity_center_notifications WHERE NOT read AND NOT deleted",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Ids still awaiting a decision: not dismissed, accepted or deleted.
    pub fn pending_notification_ids(&self) -> Result<Vec<Vec<u8>>> {
        let mut stmt = self.conn().prepare(
            "SELECT id FROM activity_center_notifications
             WHERE NOT dismissed AND NOT accepted AND NOT deleted",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn has_pending_notifications_for_chat(&self, chat_id: &str) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM activity_center_notifications
                 WHERE chat_id = ?1 AND NOT deleted AND NOT dismissed AND NOT accepted
                 LIMIT 1",
                params![chat_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Latest undecided contact request from `contact_id`, if any.
    pub fn active_contact_request_notification(
        &self,
        contact_id: &str,
    ) -> Result<Option<ActivityCenterNotification>> {
        let mut rows = query_notifications(
            self.conn(),
            &format!(
                "{SELECT_NOTIFICATION}
                 WHERE a.author = ? AND a.notification_type = ?
                   AND NOT a.deleted AND NOT a.dismissed AND NOT a.accepted
                 ORDER BY a.cursor DESC LIMIT 1"
            ),
            vec![text(contact_id), kind(ActivityCenterType::ContactRequest)],
        )?;
        Ok(rows.pop())
    }

    pub fn activity_center_state(&self) -> Result<ActivityCenterState> {
        Ok(self.conn().query_row(
            "SELECT has_seen, updated_at FROM activity_center_states WHERE id = 1",
            [],
            |row| {
                Ok(ActivityCenterState {
                    has_seen: row.get(0)?,
                    updated_at: row.get(1)?,
                })
            },
        )?)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn kind(t: ActivityCenterType) -> Value {
    Value::Integer(t.as_i64())
}

/// Filters shared by listing and counting. Always excludes deleted rows.
fn filter_clause(
    types: &[ActivityCenterType],
    read: ReadFilter,
    include_accepted: bool,
) -> (String, Vec<Value>) {
    let mut clause = String::from("NOT a.deleted");
    let mut args = Vec::new();
    if !types.is_empty() {
        clause.push_str(&format!(
            " AND a.notification_type IN ({})",
            placeholders(types.len())
        ));
        args.extend(types.iter().copied().map(kind));
    }
    match read {
        ReadFilter::All => {}
        ReadFilter::Read => clause.push_str(" AND a.read"),
        ReadFilter::Unread => clause.push_str(" AND NOT a.read"),
    }
    if !include_accepted {
        clause.push_str(" AND NOT a.accepted");
    }
    (clause, args)
}

fn query_notifications(
    conn: &Connection,
    sql: &str,
    args: Vec<Value>,
) -> Result<Vec<ActivityCenterNotification>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(args), row_to_notification)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// `has_seen` is true iff no notification is both unread and not deleted.
fn recompute_state(conn: &Connection, updated_at: u64) -> Result<ActivityCenterState> {
    let unread: i64 = conn.query_row(
        "SELECT COUNT(1) FROM activity_center_notifications WHERE NOT read AND NOT deleted",
        [],
        |row| row.get(0),
    )?;
    let stored: u64 = conn.query_row(
        "SELECT updated_at FROM activity_center_states WHERE id = 1",
        [],
        |row| row.get(0),
    )?;
    let state = ActivityCenterState {
        has_seen: unread == 0,
        updated_at: stored.max(updated_at),
    };
    conn.execute(
        "UPDATE activity_center_states SET has_seen = ?1, updated_at = ?2 WHERE id = 1",
        params![state.has_seen, state.updated_at],
    )?;
    Ok(state)
}

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActivityCenterNotification> {
    let notification_type: i64 = row.get(2)?;
    let notification_type = ActivityCenterType::from_i64(notification_type)
        .map_err(|e| conversion_error(2, Type::Integer, e))?;

    let membership_status: i64 = row.get(5)?;
    let membership_status = MembershipStatus::from_i64(membership_status)
        .map_err(|e| conversion_error(5, Type::Integer, e))?;

    let verification: i64 = row.get(13)?;
    let contact_verification_status = ContactVerificationStatus::from_i64(verification)
        .map_err(|e| conversion_error(13, Type::Integer, e))?;

    Ok(ActivityCenterNotification {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        notification_type,
        chat_id: row.get(3)?,
        community_id: row.get(4)?,
        membership_status,
        author: row.get(8)?,
        message: snapshot(row, 6)?,
        reply_message: snapshot(row, 7)?,
        album_messages: Vec::new(),
        read: row.get(9)?,
        accepted: row.get(10)?,
        dismissed: row.get(11)?,
        deleted: row.get(12)?,
        contact_verification_status,
        token_data: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn snapshot(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<Message>> {
    let json: Option<String> = row.get(idx)?;
    json.map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(|e| conversion_error(idx, Type::Text, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::temp_db;
    use crate::messages::fixtures::message;
    use crate::StoreError;

    fn notification(id: u8, kind: ActivityCenterType, timestamp: u64) -> ActivityCenterNotification {
        let mut n = ActivityCenterNotification::new(vec![id], kind, "chat-1", timestamp);
        n.author = "0xaa".into();
        n
    }

    fn assert_state_matches_rows(db: &Database) {
        let unread: i64 = db
            .conn()
            .query_row(
                "SELECT COUNT(1) FROM activity_center_notifications WHERE NOT read AND NOT deleted",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(db.activity_center_state().unwrap().has_seen, unread == 0);
    }

    #[test]
    fn validation_rejects_before_write() {
        let (_dir, mut db) = temp_db();
        let empty_id = ActivityCenterNotification::new(Vec::new(), ActivityCenterType::Mention, "c", 1);
        assert!(matches!(
            db.save_activity_center_notification(&empty_id),
            Err(StoreError::Validation(_))
        ));
        let zero_ts = ActivityCenterNotification::new(vec![1], ActivityCenterType::Mention, "c", 0);
        assert!(db.save_activity_center_notification(&zero_ts).is_err());
        assert!(db.activity_center_notifications_by_id(&[vec![1]]).unwrap().is_empty());
        assert!(db.activity_center_state().unwrap().has_seen);
    }

    #[test]
    fn snapshot_survives_round_trip() {
        let (_dir, mut db) = temp_db();
        let mut n = notification(1, ActivityCenterType::Reply, 10);
        n.message = Some(message("0x01", "chat-1", 10));
        n.reply_message = Some(message("0x00", "chat-1", 9));
        db.save_activity_center_notification(&n).unwrap();
        assert_eq!(db.activity_center_notification_by_id(&[1]).unwrap(), Some(n));
    }

    #[test]
    fn unread_save_clears_has_seen_and_read_restores_it() {
        let (_dir, mut db) = temp_db();
        let state = db
            .save_activity_center_notification(&notification(1, ActivityCenterType::Mention, 10))
            .unwrap();
        assert!(!state.has_seen);

        let update = db.mark_notifications_read(&[vec![1]], 20).unwrap();
        assert!(update.state.has_seen);
        assert_eq!(update.notifications.len(), 1);
        assert!(db.activity_center_state().unwrap().has_seen);
    }

    #[test]
    fn last_applied_operation_wins_with_bumped_clock() {
        let (_dir, mut db) = temp_db();
        db.save_activity_center_notification(&notification(1, ActivityCenterType::Mention, 10))
            .unwrap();

        db.mark_notifications_read(&[vec![1]], 5).unwrap();
        let n = db.activity_center_notification_by_id(&[1]).unwrap().unwrap();
        assert!(n.read);
        assert_eq!(n.updated_at, 5);

        // A sync carrying the same clock is still applied.
        db.mark_notifications_unread(&[vec![1]], 5).unwrap();
        let n = db.activity_center_notification_by_id(&[1]).unwrap().unwrap();
        assert!(!n.read);
        assert_eq!(n.updated_at, 6);

        // An older clock is applied too and still moves updated_at forward.
        db.mark_notifications_read(&[vec![1]], 2).unwrap();
        let n = db.activity_center_notification_by_id(&[1]).unwrap().unwrap();
        assert!(n.read);
        assert_eq!(n.updated_at, 7);
    }

    #[test]
    fn deleted_rows_are_hidden_but_fetchable_by_id() {
        let (_dir, mut db) = temp_db();
        for i in 1..=3 {
            db.save_activity_center_notification(&notification(i, ActivityCenterType::Mention, i as u64))
                .unwrap();
        }
        db.delete_notifications(&[vec![2]], 10).unwrap();

        let page = db.activity_center_notifications(&NotificationQuery::default()).unwrap();
        let ids: Vec<Vec<u8>> = page.items.iter().map(|n| n.id.clone()).collect();
        assert_eq!(ids, vec![vec![3], vec![1]]);

        let by_id = db.activity_center_notifications_by_id(&[vec![2]]).unwrap();
        assert_eq!(by_id.len(), 1);
        assert!(by_id[0].deleted);
    }

    #[test]
    fn unread_rejected_on_deleted() {
        let (_dir, mut db) = temp_db();
        db.save_activity_center_notification(&notification(1, ActivityCenterType::Mention, 1))
            .unwrap();
        db.delete_notifications(&[vec![1]], 3).unwrap();
        let update = db.mark_notifications_unread(&[vec![1]], 4).unwrap();
        assert!(update.notifications.is_empty());
        let n = db.activity_center_notification_by_id(&[1]).unwrap().unwrap();
        assert!(n.deleted);
        assert_eq!(n.updated_at, 3);
        assert!(update.state.has_seen);
    }

    #[test]
    fn pagination_yields_every_row_once_in_order() {
        let (_dir, mut db) = temp_db();
        // Duplicate timestamps exercise the id tie-break.
        for i in 1..=9u8 {
            db.save_activity_center_notification(&notification(
                i,
                ActivityCenterType::Mention,
                u64::from(i / 2) + 1,
            ))
            .unwrap();
        }
        db.delete_notifications(&[vec![4]], 1).unwrap();

        let mut query = NotificationQuery {
            limit: 2,
            ..NotificationQuery::default()
        };
        let mut seen = Vec::new();
        loop {
            let page = db.activity_center_notifications(&query).unwrap();
            seen.extend(page.items.iter().map(|n| (n.timestamp, n.id.clone())));
            match page.next_cursor {
                Some(next) => query.cursor = Some(next),
                None => break,
            }
        }
        let mut expected: Vec<(u64, Vec<u8>)> = (1..=9u8)
            .filter(|i| *i != 4)
            .map(|i| (u64::from(i / 2) + 1, vec![i]))
            .collect();
        expected.sort_by(|a, b| b.cmp(a));
        assert_eq!(seen, expected);
    }

    #[test]
    fn filters_and_counts() {
        let (_dir, mut db) = temp_db();
        db.save_activity_center_notification(&notification(1, ActivityCenterType::Mention, 1))
            .unwrap();
        db.save_activity_center_notification(&notification(2, ActivityCenterType::Mention, 2))
            .unwrap();
        db.save_activity_center_notification(&notification(3, ActivityCenterType::Reply, 3))
            .unwrap();
        db.save_activity_center_notification(&notification(4, ActivityCenterType::ContactRequest, 4))
            .unwrap();
        db.mark_notifications_read(&[vec![1]], 5).unwrap();
        db.accept_notifications(&[vec![4]], 5).unwrap();

        let unread_mentions = db
            .activity_center_notifications(&NotificationQuery {
                types: vec![ActivityCenterType::Mention],
                read: ReadFilter::Unread,
                ..NotificationQuery::default()
            })
            .unwrap();
        assert_eq!(unread_mentions.items.len(), 1);
        assert_eq!(unread_mentions.items[0].id, vec![2]);

        let not_accepted = db
            .activity_center_notifications(&NotificationQuery {
                include_accepted: false,
                ..NotificationQuery::default()
            })
            .unwrap();
        assert_eq!(not_accepted.items.len(), 3);

        let counts = db
            .activity_center_notifications_count(&[], ReadFilter::All, true)
            .unwrap();
        assert_eq!(counts.get(&ActivityCenterType::Mention), Some(&2));
        assert_eq!(counts.get(&ActivityCenterType::Reply), Some(&1));
        assert_eq!(counts.get(&ActivityCenterType::ContactRequest), Some(&1));

        let read_counts = db
            .activity_center_notifications_count(&[ActivityCenterType::Mention], ReadFilter::Read, true)
            .unwrap();
        assert_eq!(read_counts.len(), 1);
        assert_eq!(read_counts.get(&ActivityCenterType::Mention), Some(&1));
    }

    #[test]
    fn dismiss_from_chat_skips_contact_requests_and_accepted() {
        let (_dir, mut db) = temp_db();
        db.save_activity_center_notification(&notification(1, ActivityCenterType::Mention, 1))
            .unwrap();
        db.save_activity_center_notification(&notification(2, ActivityCenterType::ContactRequest, 2))
            .unwrap();
        db.save_activity_center_notification(&notification(3, ActivityCenterType::Reply, 3))
            .unwrap();
        db.accept_notifications(&[vec![3]], 4).unwrap();

        let update = db
            .apply_notification_actions(
                NotificationSelector::Chat("chat-1"),
                &[NotificationAction::Dismiss],
                10,
            )
            .unwrap();
        let ids: Vec<Vec<u8>> = update.notifications.iter().map(|n| n.id.clone()).collect();
        assert_eq!(ids, vec![vec![1]]);
        assert!(db.has_pending_notifications_for_chat("chat-1").unwrap());
        assert_eq!(
            db.active_contact_request_notification("0xaa").unwrap().map(|n| n.id),
            Some(vec![2])
        );
    }

    #[test]
    fn community_membership_selector_only_hits_membership_types() {
        let (_dir, mut db) = temp_db();
        let mut kicked = notification(1, ActivityCenterType::CommunityKicked, 1);
        kicked.community_id = Some("comm".into());
        let mut mention = notification(2, ActivityCenterType::Mention, 2);
        mention.community_id = Some("comm".into());
        db.save_activity_center_notification(&kicked).unwrap();
        db.save_activity_center_notification(&mention).unwrap();

        let update = db
            .apply_notification_actions(
                NotificationSelector::CommunityMembership("comm"),
                &[NotificationAction::Dismiss],
                5,
            )
            .unwrap();
        assert_eq!(update.notifications.len(), 1);
        assert!(update.notifications[0].dismissed);
    }

    #[test]
    fn group_invites_from_user_are_accepted() {
        let (_dir, mut db) = temp_db();
        db.save_activity_center_notification(&notification(1, ActivityCenterType::NewPrivateGroupChat, 1))
            .unwrap();
        let update = db
            .apply_notification_actions(
                NotificationSelector::GroupInvitesFrom("0xaa"),
                &[NotificationAction::Accept],
                2,
            )
            .unwrap();
        assert!(update.notifications[0].accepted);
        assert!(update.notifications[0].read);
    }

    #[test]
    fn unbounded_limit_returns_everything() {
        let (_dir, mut db) = temp_db();
        for i in 1..=3u8 {
            let n = notification(i, ActivityCenterType::Mention, u64::from(i));
            db.save_activity_center_notification(&n).unwrap();
        }
        let page = db
            .activity_center_notifications(&NotificationQuery {
                limit: u64::MAX,
                ..NotificationQuery::default()
            })
            .unwrap();
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn decision_updates_status_and_flags_together() {
        let (_dir, mut db) = temp_db();
        let mut request = notification(1, ActivityCenterType::CommunityRequest, 1);
        request.membership_status = MembershipStatus::Pending;
        request.updated_at = 10;
        db.save_activity_center_notification(&request).unwrap();

        let update = db
            .decide_notification(&[1], 5, |n| -> Result<()> {
                n.membership_status = MembershipStatus::Accepted;
                n.read = true;
                n.accepted = true;
                Ok(())
            })
            .unwrap()
            .unwrap();
        assert_eq!(update.notifications[0].updated_at, 11);
        assert!(update.state.has_seen);

        let stored = db.activity_center_notification_by_id(&[1]).unwrap().unwrap();
        assert_eq!(stored.membership_status, MembershipStatus::Accepted);
        assert!(stored.accepted && stored.read);
        assert_state_matches_rows(&db);
    }

    #[test]
    fn decision_never_revives_a_deleted_notification() {
        let (_dir, mut db) = temp_db();
        let mut verification = notification(1, ActivityCenterType::ContactVerification, 1);
        verification.contact_verification_status = ContactVerificationStatus::Pending;
        db.save_activity_center_notification(&verification).unwrap();
        db.delete_notifications(&[vec![1]], 2).unwrap();

        let decided = db
            .decide_notification(&[1], 3, |n| -> Result<()> {
                n.contact_verification_status = ContactVerificationStatus::Accepted;
                Ok(())
            })
            .unwrap();
        assert!(decided.is_none());

        let stored = db.activity_center_notification_by_id(&[1]).unwrap().unwrap();
        assert!(stored.deleted);
        assert_eq!(stored.contact_verification_status, ContactVerificationStatus::Pending);
    }

    #[test]
    fn rejected_decision_writes_nothing() {
        let (_dir, mut db) = temp_db();
        db.save_activity_center_notification(&notification(1, ActivityCenterType::ContactVerification, 1))
            .unwrap();

        let result = db.decide_notification(&[1], 3, |n| -> Result<()> {
            n.read = true;
            Err(StoreError::Validation("rejected".into()))
        });
        assert!(matches!(result, Err(StoreError::Validation(_))));

        let stored = db.activity_center_notification_by_id(&[1]).unwrap().unwrap();
        assert!(!stored.read);
        assert!(!db.activity_center_state().unwrap().has_seen);
    }

    #[test]
    fn delete_for_message_sets_all_three_flags() {
        let (_dir, mut db) = temp_db();
        db.save_activity_center_notification(&notification(1, ActivityCenterType::Reply, 1))
            .unwrap();
        db.delete_notifications_for_message(&[vec![1]], 2).unwrap();
        let n = db.activity_center_notification_by_id(&[1]).unwrap().unwrap();
        assert!(n.read && n.dismissed && n.deleted);
        assert!(db.unread_notification_ids().unwrap().is_empty());
        assert!(db.pending_notification_ids().unwrap().is_empty());
    }

    #[test]
    fn state_tracks_rows_across_operation_sequences() {
        let (_dir, mut db) = temp_db();
        for i in 1..=5 {
            db.save_activity_center_notification(&notification(i, ActivityCenterType::Mention, i as u64))
                .unwrap();
            assert_state_matches_rows(&db);
        }
        let ops: [(NotificationAction, u8); 10] = [
            (NotificationAction::MarkRead, 1),
            (NotificationAction::MarkRead, 2),
            (NotificationAction::Delete, 3),
            (NotificationAction::MarkUnread, 1),
            (NotificationAction::Accept, 4),
            (NotificationAction::Dismiss, 5),
            (NotificationAction::MarkUnread, 3),
            (NotificationAction::MarkRead, 1),
            (NotificationAction::MarkUnread, 5),
            (NotificationAction::Delete, 5),
        ];
        for (clock, (action, id)) in ops.iter().enumerate() {
            db.apply_notification_actions(
                NotificationSelector::Ids(&[vec![*id]]),
                &[*action],
                clock as u64 + 10,
            )
            .unwrap();
            assert_state_matches_rows(&db);
        }
        assert!(db.activity_center_state().unwrap().has_seen);
    }
}
