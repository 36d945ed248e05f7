//! ─── Neuron Protocol Constants ──────────────────────────────────────────────
//!
//! Fixed values referenced by the handshake engine, challenge store,
//! admission gate, and Axon heartbeat loop. Anything configurable per
//! deployment lives in [`crate::config::Config`] instead — these are the
//! values the wire protocol and on-disk formats fix outright.

// ── Challenge store (C5) ─────────────────────────────────────────────────────

/// How long an issued challenge nonce remains redeemable.
pub const CHALLENGE_TTL_SECS: u64 = 30;

/// Hard cap on concurrently pending challenges across all connections.
pub const CHALLENGE_STORE_CAPACITY: usize = 1_000;

// ── Connection admission (C7) ────────────────────────────────────────────────

/// Default ceiling on concurrently admitted handshake sessions, including
/// sessions that have not yet authenticated.
pub const DEFAULT_MAX_CONCURRENT_HANDSHAKES: usize = 10;

/// Default deadline a connection may wait in the FIFO admission queue before
/// being rejected with a queue-timeout close.
pub const DEFAULT_QUEUE_TIMEOUT_MS: u64 = 30_000;

// ── Handshake engine (C6) ────────────────────────────────────────────────────

/// Default deadline for a connection to complete authentication after the
/// WebSocket upgrade, measured from the first byte received.
pub const DEFAULT_AUTH_TIMEOUT_MS: u64 = 30_000;

/// Default maximum size of a single wire message.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 64 * 1024;

// ── Axon registration & heartbeat (C9) ───────────────────────────────────────

/// Base interval between heartbeat ticks when registration is healthy.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 60_000;

/// Ceiling on the exponential backoff delay used when the registry is
/// unreachable, before full jitter is applied.
pub const DEFAULT_AXON_BACKOFF_CEILING_MS: u64 = 300_000;

/// Base multiplier in the full-jitter exponential backoff formula
/// `min(ceiling, 2^attempt * base_ms * rand[0,1))`.
pub const AXON_BACKOFF_BASE_MS: u64 = 5_000;

/// Consecutive heartbeat failures after which registration is considered
/// lost and re-registration is attempted from scratch.
pub const AXON_REREGISTER_AFTER_FAILURES: u32 = 3;

// ── Audit log (C2) ───────────────────────────────────────────────────────────

/// Length in hex characters of a SHA-256 digest as stored in the audit log.
pub const AUDIT_HASH_HEX_LEN: usize = 64;

// ── NPI validation ────────────────────────────────────────────────────────────

/// CMS Luhn check-digit constant added before the mod-10 check for the
/// 10-digit National Provider Identifier (the "80840" prefix trick).
pub const NPI_LUHN_ADDEND: u32 = 24;

/// NPIs are always exactly 10 digits.
pub const NPI_LENGTH: usize = 10;
