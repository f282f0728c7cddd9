//! Background loops: retrieval, resend, unmute sweep and delivery
//! confirmations. All of them stop on [`Messenger::shutdown`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::MessengerError;
use crate::events::MessengerEvent;
use crate::messenger::Messenger;

impl Messenger {
    /// Spawn the background loops. `confirmations` carries the ids of
    /// messages the transport confirmed as delivered.
    pub fn start(
        self: &Arc<Self>,
        confirmations: mpsc::UnboundedReceiver<Vec<String>>,
    ) -> Vec<JoinHandle<()>> {
        info!(resend_disabled = self.config().resend_disabled, "starting messenger loops");
        let mut handles = vec![
            tokio::spawn(Arc::clone(self).retrieve_loop()),
            tokio::spawn(Arc::clone(self).unmute_loop()),
            tokio::spawn(Arc::clone(self).confirmation_loop(confirmations)),
        ];
        if !self.config().resend_disabled {
            handles.push(tokio::spawn(Arc::clone(self).resend_loop()));
        }
        handles
    }

    /// Stop every background loop.
    pub fn shutdown(&self) {
        info!("messenger shutting down");
        self.shutdown.cancel();
    }

    async fn retrieve_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config().retrieve_tick());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            match self.retrieve_and_handle().await {
                Ok(response) if !response.is_empty() => {
                    self.emit(MessengerEvent::MessagesReceived(response));
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "retrieve failed"),
            }
        }
        debug!("retrieve loop stopped");
    }

    async fn resend_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config().resend_tick());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            match self.resend_expired_messages().await {
                Ok(report) if !report.is_empty() => {
                    self.emit(MessengerEvent::MessagesResent(report));
                }
                Ok(_) | Err(MessengerError::Offline) => {}
                Err(e) => warn!(error = %e, "resend pass failed"),
            }
        }
        debug!("resend loop stopped");
    }

    async fn unmute_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config().unmute_tick());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            match self.unmute_expired_chats().await {
                Ok(ids) if !ids.is_empty() => {
                    debug!(count = ids.len(), "chats unmuted");
                    self.emit(MessengerEvent::ChatsUnmuted(ids));
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "unmute sweep failed"),
            }
        }
        debug!("unmute loop stopped");
    }

    async fn confirmation_loop(self: Arc<Self>, mut confirmations: mpsc::UnboundedReceiver<Vec<String>>) {
        loop {
            let ids = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                ids = confirmations.recv() => match ids {
                    Some(ids) => ids,
                    None => break,
                },
            };
            match self.process_sent_messages(&ids) {
                Ok(()) => self.emit(MessengerEvent::MessagesConfirmed(ids)),
                Err(e) => warn!(count = ids.len(), error = %e, "failed to record confirmations"),
            }
        }
        debug!("confirmation loop stopped");
    }
}
