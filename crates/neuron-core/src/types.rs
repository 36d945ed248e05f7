use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

// ── RelationshipStatus ───────────────────────────────────────────────────────

/// Lifecycle state of a care relationship. `Terminated` is a one-way door —
/// no variant ever transitions out of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    Pending,
    Active,
    Suspended,
    Terminated,
}

impl fmt::Display for RelationshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

// ── Relationship ─────────────────────────────────────────────────────────────

/// A consented care relationship between a patient agent and a provider,
/// established by a completed handshake.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Relationship {
    pub relationship_id: String,
    pub patient_agent_id: String,
    pub provider_npi: String,
    pub status: RelationshipStatus,
    pub consented_actions: Vec<String>,
    /// Base64url-encoded 32-byte Ed25519 public key.
    pub patient_public_key: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Relationship {
    pub fn new(
        patient_agent_id: String,
        provider_npi: String,
        consented_actions: Vec<String>,
        patient_public_key: String,
        now: Timestamp,
    ) -> Self {
        Self {
            relationship_id: uuid::Uuid::new_v4().to_string(),
            patient_agent_id,
            provider_npi,
            status: RelationshipStatus::Active,
            consented_actions,
            patient_public_key,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Redacted projection of `Relationship` for the observability/admin query
/// surface (spec §6): everything but `patient_public_key`, which must never
/// leave the store through `list`/`get_by_id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationshipView {
    pub relationship_id: String,
    pub patient_agent_id: String,
    pub provider_npi: String,
    pub status: RelationshipStatus,
    pub consented_actions: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<&Relationship> for RelationshipView {
    fn from(rel: &Relationship) -> Self {
        Self {
            relationship_id: rel.relationship_id.clone(),
            patient_agent_id: rel.patient_agent_id.clone(),
            provider_npi: rel.provider_npi.clone(),
            status: rel.status,
            consented_actions: rel.consented_actions.clone(),
            created_at: rel.created_at,
            updated_at: rel.updated_at,
        }
    }
}

// ── TerminationRecord ────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TerminationRecord {
    pub termination_id: String,
    pub relationship_id: String,
    pub provider_npi: String,
    pub reason: String,
    pub terminated_at: Timestamp,
    pub audit_entry_sequence: u64,
}

// ── AuditCategory ────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Registration,
    Connection,
    Consent,
    ApiAccess,
    Admin,
    Termination,
    Sync,
}

// ── AuditEntry ───────────────────────────────────────────────────────────────

/// One hash-chained record in the append-only audit log. `hash` commits to
/// every other field via the canonical-JSON encoding in `neuron-crypto`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: u64,
    pub timestamp: Timestamp,
    pub category: AuditCategory,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub prev_hash: String,
    pub hash: String,
}

/// The genesis `prev_hash` value used by the first entry in a fresh log:
/// 64 ASCII zeros.
pub fn genesis_hash() -> String {
    "0".repeat(64)
}

// ── RegistrationStatus / AxonReachability ───────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Unregistered,
    Pending,
    Registered,
    Suspended,
}

/// Reachability as observed by the heartbeat loop, published to the
/// organization status snapshot (spec.md §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxonReachability {
    Healthy,
    Degraded,
}

/// A single provider sub-record tracked inside `RegistrationState`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderRegistration {
    pub provider_npi: String,
    pub axon_provider_id: Option<String>,
}

/// Single persisted row describing this organization's Axon enrollment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistrationState {
    pub organization_npi: String,
    pub organization_name: String,
    pub organization_type: String,
    pub registry_url: String,
    pub endpoint_url: String,
    pub registration_id: Option<String>,
    pub bearer_token: Option<String>,
    pub status: RegistrationStatus,
    pub providers: Vec<ProviderRegistration>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// ── Handshake-scoped types ───────────────────────────────────────────────────

/// The handshake-init data captured when a challenge nonce is issued, held
/// only in memory for the challenge TTL. Carries the original consent
/// token so the challenge-response stage can re-verify it fresh, with no
/// cached trust from the initial check (spec §4.6).
#[derive(Clone, Debug)]
pub struct HandshakeInit {
    pub patient_agent_id: String,
    pub provider_npi: String,
    pub patient_public_key: String,
    pub consent_token_payload: String,
    pub consent_token_signature: String,
}

#[derive(Clone, Debug)]
pub struct PendingChallenge {
    pub init: HandshakeInit,
    pub expires_at: std::time::Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Authenticating,
    Challenged,
    Completing,
    Closed,
}

#[derive(Clone, Debug)]
pub struct HandshakeSession {
    pub session_id: String,
    pub patient_agent_id: Option<String>,
    pub status: SessionStatus,
    pub started_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_hash_is_64_chars() {
        assert_eq!(genesis_hash().len(), 64);
        assert!(genesis_hash().chars().all(|c| c == '0'));
    }

    #[test]
    fn relationship_new_defaults_to_active() {
        let r = Relationship::new(
            "patient-1".into(),
            "1234567893".into(),
            vec!["read_records".into()],
            "abc".into(),
            1_700_000_000,
        );
        assert_eq!(r.status, RelationshipStatus::Active);
        assert_eq!(r.created_at, r.updated_at);
    }
}
