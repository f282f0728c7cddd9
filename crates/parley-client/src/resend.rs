//! Resend scheduler.
//!
//! Unconfirmed dispatch records of chats that permit it are retried with an
//! exponential backoff: attempt `k` waits `base * 2^(k-1)` after the previous
//! send. Records stop being retried once their send count passes the
//! configured maximum.

use tracing::{debug, info, warn};

use parley_store::RawMessage;

use crate::error::{MessengerError, Result};
use crate::messenger::Messenger;

/// Outcome of one resend pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResendReport {
    pub resent: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ResendReport {
    pub fn is_empty(&self) -> bool {
        self.resent == 0 && self.failed == 0
    }
}

/// Delay before the next attempt of a record already sent `send_count`
/// times.
pub fn backoff_ms(send_count: u32, base_delay_ms: u64) -> u64 {
    if send_count == 0 {
        return 0;
    }
    1u64.checked_shl(send_count - 1)
        .map_or(u64::MAX, |factor| base_delay_ms.saturating_mul(factor))
}

/// Whether `raw` is due at `now`.
pub fn should_resend(raw: &RawMessage, now: u64, base_delay_ms: u64) -> bool {
    now.saturating_sub(raw.last_sent) >= backoff_ms(raw.send_count, base_delay_ms)
}

impl Messenger {
    /// Retry every due, unconfirmed record. A failing record is logged and
    /// does not stop the pass.
    pub async fn resend_expired_messages(&self) -> Result<ResendReport> {
        if !self.is_online() {
            return Err(MessengerError::Offline);
        }
        let mut report = ResendReport::default();
        if self.config().resend_disabled {
            return Ok(report);
        }

        let records = self
            .db()?
            .expired_raw_messages(self.config().resend_max_count)?;
        let now = self.now();
        let base = self.config().resend_base_delay_ms;

        for raw in records {
            if !should_resend(&raw, now, base) {
                continue;
            }
            let Some(chat) = self.chat(&raw.local_chat_id) else {
                debug!(message_id = %raw.id, chat_id = %raw.local_chat_id, "chat gone, not resending");
                report.skipped += 1;
                continue;
            };
            if !chat.chat_type.permits_automatic_resend() {
                report.skipped += 1;
                continue;
            }

            let destination = self.destination_for_chat(&chat);
            let id = raw.id.clone();
            let attempt = raw.send_count + 1;
            match self.dispatch_message(raw, &destination).await {
                Ok(()) => {
                    debug!(message_id = %id, attempt, "message resent");
                    report.resent += 1;
                }
                Err(e) => {
                    warn!(message_id = %id, attempt, error = %e, "resend failed");
                    report.failed += 1;
                }
            }
        }

        if !report.is_empty() {
            info!(
                resent = report.resent,
                skipped = report.skipped,
                failed = report.failed,
                "resend pass finished"
            );
        }
        Ok(report)
    }

    /// Record delivery confirmations for dispatched message ids.
    pub fn process_sent_messages(&self, ids: &[String]) -> Result<()> {
        if !self.is_online() {
            return Err(MessengerError::Offline);
        }
        let placeholders = self.db()?.mark_raw_messages_sent(ids)?;
        if placeholders > 0 {
            debug!(placeholders, "confirmations arrived before their records");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::test_support::*;
    use crate::messenger::OutgoingMessage;
    use parley_shared::types::ChatType;
    use parley_store::Chat;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_ms(0, 30_000), 0);
        assert_eq!(backoff_ms(1, 30_000), 30_000);
        assert_eq!(backoff_ms(2, 30_000), 60_000);
        assert_eq!(backoff_ms(3, 30_000), 120_000);
    }

    #[test]
    fn backoff_saturates() {
        assert_eq!(backoff_ms(64, 30_000), u64::MAX);
        assert_eq!(backoff_ms(40, u64::MAX / 2), u64::MAX);
    }

    #[test]
    fn due_records() {
        let mut raw = RawMessage::new("0x01", "general", vec![1]);
        assert!(should_resend(&raw, 0, 1_000));

        raw.send_count = 2;
        raw.last_sent = 10_000;
        assert!(!should_resend(&raw, 11_999, 1_000));
        assert!(should_resend(&raw, 12_000, 1_000));
        // Clock skew never makes a record due early.
        assert!(!should_resend(&raw, 5_000, 1_000));
    }

    async fn public_message(h: &Harness) -> String {
        h.messenger
            .save_chat(Chat::new("general", ChatType::Public, 1))
            .await
            .unwrap();
        h.messenger
            .send_chat_message("general", OutgoingMessage::text("hello"))
            .await
            .unwrap()
            .messages[0]
            .id
            .clone()
    }

    fn send_count(h: &Harness, id: &str) -> u32 {
        h.messenger.db().unwrap().raw_message_by_id(id).unwrap().send_count
    }

    #[tokio::test]
    async fn unconfirmed_messages_back_off_then_give_up() {
        let h = harness();
        h.transport.set_fail_sends(true);
        let id = public_message(&h).await;
        assert_eq!(send_count(&h, &id), 1);

        // Not due before the first backoff.
        h.time.set(30_999);
        assert_eq!(h.messenger.resend_expired_messages().await.unwrap(), ResendReport::default());

        h.time.set(31_000);
        let report = h.messenger.resend_expired_messages().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(send_count(&h, &id), 2);

        h.transport.set_fail_sends(false);
        h.time.set(91_000);
        assert_eq!(h.messenger.resend_expired_messages().await.unwrap().resent, 1);
        h.time.set(211_000);
        assert_eq!(h.messenger.resend_expired_messages().await.unwrap().resent, 1);
        assert_eq!(send_count(&h, &id), 4);

        h.time.set(10_000_000);
        assert!(h.messenger.resend_expired_messages().await.unwrap().is_empty());
        assert_eq!(h.transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn confirmed_messages_are_not_resent() {
        let h = harness();
        let id = public_message(&h).await;
        h.messenger.process_sent_messages(&[id.clone()]).unwrap();

        h.time.set(1_000_000);
        assert!(h.messenger.resend_expired_messages().await.unwrap().is_empty());
        assert!(h.messenger.db().unwrap().raw_message_by_id(&id).unwrap().sent);
    }

    #[tokio::test]
    async fn early_confirmation_leaves_a_placeholder() {
        let h = harness();
        h.messenger.process_sent_messages(&["0xfeed".to_string()]).unwrap();
        let raw = h.messenger.db().unwrap().raw_message_by_id("0xfeed").unwrap();
        assert!(raw.sent);
        assert!(raw.payload.is_empty());
    }

    #[tokio::test]
    async fn offline_node_does_nothing() {
        let h = harness();
        h.messenger.set_online(false);
        assert!(matches!(
            h.messenger.resend_expired_messages().await,
            Err(MessengerError::Offline)
        ));
        assert!(matches!(
            h.messenger.process_sent_messages(&["0x01".to_string()]),
            Err(MessengerError::Offline)
        ));
    }

    #[tokio::test]
    async fn records_of_missing_chats_are_skipped() {
        let h = harness();
        let mut raw = RawMessage::new("0x01", "gone", vec![1]);
        raw.resend_automatically = true;
        h.messenger.db().unwrap().save_raw_message(&raw).unwrap();

        let report = h.messenger.resend_expired_messages().await.unwrap();
        assert_eq!(report.skipped, 1);
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn disabled_scheduler_sends_nothing() {
        let config = crate::config::MessengerConfig {
            resend_disabled: true,
            ..Default::default()
        };
        let h = harness_with(config, false);
        h.transport.set_fail_sends(true);
        public_message(&h).await;
        h.transport.set_fail_sends(false);

        h.time.set(1_000_000);
        assert_eq!(h.messenger.resend_expired_messages().await.unwrap(), ResendReport::default());
        assert!(h.transport.sent().is_empty());
    }
}
