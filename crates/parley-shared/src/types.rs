use serde::{Deserialize, Serialize};

use crate::constants::{HEX_PREFIX, KDF_CONTEXT_MESSAGE_ID, PUBKEY_SIZE};
use crate::error::SharedError;

// User identity = Ed25519 public key (32 bytes)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub [u8; PUBKEY_SIZE]);

impl UserId {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, SharedError> {
        let s = s.strip_prefix(HEX_PREFIX).unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| SharedError::InvalidPublicKey(e.to_string()))?;
        if bytes.len() != PUBKEY_SIZE {
            return Err(SharedError::InvalidPublicKey(format!(
                "expected {PUBKEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut arr = [0u8; PUBKEY_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Contact id used as the key of the contact store and of one-to-one chats.
    pub fn contact_id(&self) -> String {
        format!("{HEX_PREFIX}{}", self.to_hex())
    }

    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.contact_id())
    }
}

/// Chat variants handled by the engine. Numeric codes are the persisted
/// representation and never change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum ChatType {
    OneToOne = 1,
    Public = 2,
    PrivateGroup = 3,
    CommunityChat = 6,
}

impl ChatType {
    pub fn from_i64(v: i64) -> Result<Self, SharedError> {
        match v {
            1 => Ok(Self::OneToOne),
            2 => Ok(Self::Public),
            3 => Ok(Self::PrivateGroup),
            6 => Ok(Self::CommunityChat),
            other => Err(SharedError::UnknownChatType(other)),
        }
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }

    /// Only broadcast chats are retried by the resend scheduler; direct and
    /// group chats rely on transport-level acknowledgements.
    pub fn permits_automatic_resend(self) -> bool {
        matches!(self, Self::Public | Self::CommunityChat)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum ContentType {
    Text = 1,
    Image = 2,
    ContactRequest = 3,
    System = 4,
}

impl ContentType {
    pub fn from_i64(v: i64) -> Result<Self, SharedError> {
        match v {
            1 => Ok(Self::Text),
            2 => Ok(Self::Image),
            3 => Ok(Self::ContactRequest),
            4 => Ok(Self::System),
            other => Err(SharedError::UnknownContentType(other)),
        }
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

/// Raw bytes of a `0x`-prefixed hex identifier. Identifiers that are not
/// valid hex are used verbatim.
pub fn id_bytes(id: &str) -> Vec<u8> {
    let stripped = id.strip_prefix(HEX_PREFIX).unwrap_or(id);
    hex::decode(stripped).unwrap_or_else(|_| id.as_bytes().to_vec())
}

/// Render raw identifier bytes as a `0x`-prefixed lowercase hex string.
pub fn format_id(bytes: &[u8]) -> String {
    format!("{HEX_PREFIX}{}", hex::encode(bytes))
}

/// Content-derived message id: BLAKE3 over the sender key and the encoded
/// application payload.
pub fn message_id(sender: &UserId, payload: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_MESSAGE_ID);
    hasher.update(&sender.0);
    hasher.update(payload);
    format_id(hasher.finalize().as_bytes())
}
