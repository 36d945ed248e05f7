use thiserror::Error;

/// Every error the broker's core can produce, matched against the error
/// table in the protocol specification. Variants are grouped by the
/// component that raises them.
#[derive(Debug, Error)]
pub enum NeuronError {
    // ── Consent / signature errors (C3) ───────────────────────────────────────
    #[error("invalid signature")]
    InvalidSignature,

    #[error("malformed consent token: {0}")]
    MalformedToken(String),

    #[error("consent token has expired")]
    ConsentExpired,

    // ── Challenge store errors (C5) ───────────────────────────────────────────
    #[error("too many pending challenges")]
    TooManyPending,

    // ── Relationship store errors (C4) ────────────────────────────────────────
    #[error("relationship not found: {0}")]
    NotFound(String),

    #[error("relationship already terminated")]
    AlreadyTerminated,

    #[error("wrong provider for relationship")]
    WrongProvider,

    #[error("an active relationship already exists for this patient/provider pair: {0}")]
    RelationshipConflict(String),

    // ── Handshake protocol errors (C6) ────────────────────────────────────────
    #[error("authentication timed out")]
    AuthTimeout,

    #[error("invalid wire message: {0}")]
    InvalidMessage(String),

    #[error("consent verification failed")]
    ConsentFailed,

    // ── Admission errors (C7) ─────────────────────────────────────────────────
    #[error("admission queue deadline exceeded")]
    QueueTimeout,

    // ── Axon registration/heartbeat errors (C9) ───────────────────────────────
    #[error("axon registry unreachable: {0}")]
    AxonUnreachable(String),

    #[error("axon registration lost (404)")]
    RegistrationLost,

    // ── Audit log errors (C2) ─────────────────────────────────────────────────
    #[error("audit write failed: {0}")]
    AuditWriteFailure(String),

    #[error("audit chain verification failed: {0}")]
    AuditChainInvalid(String),

    // ── Config / startup ───────────────────────────────────────────────────────
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("invalid NPI: {0}")]
    InvalidNpi(String),

    // ── Serialization / storage ────────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    // ── General ─────────────────────────────────────────────────────────────────
    #[error("internal error: {0}")]
    Internal(String),
}

impl NeuronError {
    /// Close code to use when this error terminates a handshake connection,
    /// per the wire protocol's error → close-code mapping. Returns `None`
    /// for errors that are not handshake-terminal.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            NeuronError::AuthTimeout => Some(4001),
            NeuronError::InvalidMessage(_) => Some(4002),
            NeuronError::ConsentFailed
            | NeuronError::InvalidSignature
            | NeuronError::MalformedToken(_)
            | NeuronError::ConsentExpired => Some(4003),
            NeuronError::Internal(_) | NeuronError::Storage(_) | NeuronError::Serialization(_) => {
                Some(1011)
            }
            _ => None,
        }
    }

    /// The wire error code string sent in a `handshake.error` envelope.
    pub fn wire_code(&self) -> &'static str {
        match self {
            NeuronError::AuthTimeout => "AUTH_TIMEOUT",
            NeuronError::InvalidMessage(_) => "INVALID_MESSAGE",
            NeuronError::ConsentFailed
            | NeuronError::InvalidSignature
            | NeuronError::MalformedToken(_)
            | NeuronError::ConsentExpired => "CONSENT_FAILED",
            _ => "INTERNAL",
        }
    }
}
