//! Transport and encryption seam.
//!
//! The engine never sees wire envelopes in clear: the transport hands out
//! opaque [`Envelope`]s grouped by source filter, and decrypts each one into
//! the application messages it carries.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use parley_shared::protocol::ApplicationMessage;
use parley_shared::types::{message_id, UserId};
use parley_shared::SharedError;
use parley_store::RawMessage;

/// Identifier of the subscription an envelope arrived on.
pub type FilterId = String;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Decryption failed: {0}")]
    Decrypt(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Transport unavailable")]
    Unavailable,
}

/// A received transport message, still encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Transport-level hash, used for processed/confirmed bookkeeping.
    pub hash: Vec<u8>,
    /// Wall time (ms) at which the envelope was received.
    pub received_at: u64,
    pub payload: Vec<u8>,
}

/// A decrypted application message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Content-derived message id.
    pub id: String,
    pub sender: UserId,
    /// Encoded [`ApplicationMessage`].
    pub payload: Vec<u8>,
}

impl ReceivedMessage {
    pub fn new(sender: UserId, message: &ApplicationMessage) -> Result<Self, SharedError> {
        let payload = message.to_bytes()?;
        Ok(Self {
            id: message_id(&sender, &payload),
            sender,
            payload,
        })
    }
}

/// Where an outbound message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Public { chat_id: String },
    Community { chat_id: String, community_id: String },
    Direct { contact_id: String },
    Group { members: Vec<String> },
    /// The user's own other devices.
    PairedDevices,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Drain everything received since the last poll, per filter, in
    /// arrival order.
    async fn retrieve_all(&self) -> Result<BTreeMap<FilterId, Vec<Envelope>>, TransportError>;

    /// Decrypt an envelope into its application messages.
    async fn decrypt(&self, envelope: &Envelope) -> Result<Vec<ReceivedMessage>, TransportError>;

    /// Never hand these envelopes out again. Safe to repeat.
    async fn mark_processed(&self, hashes: &[Vec<u8>]) -> Result<(), TransportError>;

    /// Acknowledge these envelopes upstream.
    async fn confirm_processed(&self, hashes: &[Vec<u8>]) -> Result<(), TransportError>;

    async fn send(&self, destination: &Destination, raw: &RawMessage) -> Result<(), TransportError>;
}

// ---------------------------------------------------------------------------
// In-memory transport
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    inbox: BTreeMap<FilterId, Vec<Envelope>>,
    processed: Vec<Vec<u8>>,
    confirmed: Vec<Vec<u8>>,
    sent: Vec<(Destination, RawMessage)>,
    fail_sends: bool,
}

/// Loopback transport: envelopes are plain bincode, sends are recorded and
/// optionally confirmed straight away.
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
    confirmations: mpsc::UnboundedSender<Vec<String>>,
    auto_confirm: bool,
}

impl MemoryTransport {
    /// Returns the transport and the receiving end of its delivery
    /// confirmations.
    pub fn new(auto_confirm: bool) -> (Self, mpsc::UnboundedReceiver<Vec<String>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Mutex::new(MemoryState::default()),
                confirmations: tx,
                auto_confirm,
            },
            rx,
        )
    }

    /// Build an envelope carrying `messages`.
    pub fn seal(messages: &[ReceivedMessage], received_at: u64) -> Result<Envelope, SharedError> {
        let payload = bincode::serialize(messages)?;
        Ok(Envelope {
            hash: blake3::hash(&payload).as_bytes().to_vec(),
            received_at,
            payload,
        })
    }

    /// Queue an envelope for the next poll.
    pub fn deliver(&self, filter: impl Into<FilterId>, envelope: Envelope) {
        self.with_state(|s| s.inbox.entry(filter.into()).or_default().push(envelope));
    }

    pub fn sent(&self) -> Vec<(Destination, RawMessage)> {
        self.with_state(|s| s.sent.clone())
    }

    pub fn processed(&self) -> Vec<Vec<u8>> {
        self.with_state(|s| s.processed.clone())
    }

    pub fn confirmed(&self) -> Vec<Vec<u8>> {
        self.with_state(|s| s.confirmed.clone())
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.with_state(|s| s.fail_sends = fail);
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn retrieve_all(&self) -> Result<BTreeMap<FilterId, Vec<Envelope>>, TransportError> {
        Ok(self.with_state(|s| std::mem::take(&mut s.inbox)))
    }

    async fn decrypt(&self, envelope: &Envelope) -> Result<Vec<ReceivedMessage>, TransportError> {
        bincode::deserialize(&envelope.payload).map_err(|e| TransportError::Decrypt(e.to_string()))
    }

    async fn mark_processed(&self, hashes: &[Vec<u8>]) -> Result<(), TransportError> {
        self.with_state(|s| s.processed.extend_from_slice(hashes));
        Ok(())
    }

    async fn confirm_processed(&self, hashes: &[Vec<u8>]) -> Result<(), TransportError> {
        self.with_state(|s| s.confirmed.extend_from_slice(hashes));
        Ok(())
    }

    async fn send(&self, destination: &Destination, raw: &RawMessage) -> Result<(), TransportError> {
        let failed = self.with_state(|s| {
            if s.fail_sends {
                return true;
            }
            s.sent.push((destination.clone(), raw.clone()));
            false
        });
        if failed {
            return Err(TransportError::Send("simulated failure".into()));
        }
        if self.auto_confirm {
            // Receiver gone means nobody listens for confirmations anymore.
            let _ = self.confirmations.send(vec![raw.id.clone()]);
        }
        Ok(())
    }
}
