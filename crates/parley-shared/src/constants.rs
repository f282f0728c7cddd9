/// Width of the zero-padded decimal clock segment of a cursor.
pub const CURSOR_CLOCK_WIDTH: usize = 64;

/// Prefix used when rendering identifiers as hex strings.
pub const HEX_PREFIX: &str = "0x";

/// Ed25519 public key size in bytes
pub const PUBKEY_SIZE: usize = 32;

/// Default page size for notification and message listings
pub const DEFAULT_PAGE_LIMIT: u64 = 20;

/// Base delay of the resend backoff (30 seconds)
pub const RESEND_BASE_DELAY_MS: u64 = 30_000;

/// Dispatch records are retried while `send_count <= RESEND_MAX_COUNT`
pub const RESEND_MAX_COUNT: u32 = 3;

/// Resend scheduler tick
pub const RESEND_TICK_MS: u64 = 1_000;

/// Transport poll interval of the retrieve loop
pub const RETRIEVE_TICK_MS: u64 = 500;

/// Unmute sweep interval
pub const UNMUTE_TICK_MS: u64 = 60_000;

/// Key derivation context for content-derived message ids (BLAKE3)
pub const KDF_CONTEXT_MESSAGE_ID: &str = "parley-message-id-v1";
