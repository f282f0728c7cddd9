//! Events published by the background loops.
//!
//! Subscribers receive them through a `tokio::sync::broadcast` channel; a
//! slow subscriber lags and misses events instead of blocking the engine.

use tokio::sync::broadcast;

use crate::resend::ResendReport;
use crate::response::MessengerResponse;

/// Capacity of the event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum MessengerEvent {
    /// A retrieved batch changed state.
    MessagesReceived(MessengerResponse),
    /// The resend scheduler finished a tick that retried something.
    MessagesResent(ResendReport),
    /// Delivery confirmations were recorded.
    MessagesConfirmed(Vec<String>),
    /// Expired mutes were cleared.
    ChatsUnmuted(Vec<String>),
}

pub(crate) fn channel() -> broadcast::Sender<MessengerEvent> {
    let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tx
}

/// Publish an event. Having no subscriber is not an error.
pub(crate) fn emit_event(tx: &broadcast::Sender<MessengerEvent>, event: MessengerEvent) {
    if tx.send(event).is_err() {
        tracing::trace!("no event subscribers");
    }
}
