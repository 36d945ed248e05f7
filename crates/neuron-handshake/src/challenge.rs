//! Challenge store (C5): a TTL-bounded, capacity-capped, single-use nonce
//! table, shaped after a "guarded map, opportunistic purge on insert"
//! idiom. Held behind a `tokio::sync::Mutex` that is never held across an
//! await: every method here is synchronous once the lock is taken.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use neuron_core::types::{HandshakeInit, PendingChallenge};
use neuron_core::NeuronError;
use rand::RngCore;
use tokio::sync::Mutex;

const CHALLENGE_TTL: Duration = Duration::from_secs(neuron_core::CHALLENGE_TTL_SECS);

pub struct ChallengeStore {
    capacity: usize,
    entries: Mutex<HashMap<String, PendingChallenge>>,
}

impl ChallengeStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a fresh nonce for `init`, purging any expired entries first.
    /// Rejects with `TooManyPending` if the table is still at capacity
    /// after the purge.
    pub async fn issue(&self, init: HandshakeInit) -> Result<String, NeuronError> {
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries);

        if entries.len() >= self.capacity {
            return Err(NeuronError::TooManyPending);
        }

        let nonce = random_nonce();
        entries.insert(
            nonce.clone(),
            PendingChallenge {
                init,
                expires_at: Instant::now() + CHALLENGE_TTL,
            },
        );
        Ok(nonce)
    }

    /// Single-use consume: a successful call removes the entry. Unknown
    /// nonces are `MalformedToken`; expired (but still present) nonces are
    /// `ConsentExpired`.
    pub async fn consume(&self, nonce: &str) -> Result<HandshakeInit, NeuronError> {
        let mut entries = self.entries.lock().await;
        let challenge = entries
            .remove(nonce)
            .ok_or_else(|| NeuronError::MalformedToken("unknown challenge nonce".into()))?;

        if challenge.expires_at <= Instant::now() {
            return Err(NeuronError::ConsentExpired);
        }

        Ok(challenge.init)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

fn purge_expired(entries: &mut HashMap<String, PendingChallenge>) {
    let now = Instant::now();
    entries.retain(|_, c| c.expires_at > now);
}

fn random_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init(patient: &str) -> HandshakeInit {
        HandshakeInit {
            patient_agent_id: patient.to_string(),
            provider_npi: "1234567893".to_string(),
            patient_public_key: "pubkey".to_string(),
            consent_token_payload: "payload".to_string(),
            consent_token_signature: "sig".to_string(),
        }
    }

    #[tokio::test]
    async fn issue_then_consume_round_trips() {
        let store = ChallengeStore::new(10);
        let nonce = store.issue(init("patient-1")).await.unwrap();
        let recovered = store.consume(&nonce).await.unwrap();
        assert_eq!(recovered.patient_agent_id, "patient-1");
    }

    #[tokio::test]
    async fn consume_is_single_use() {
        let store = ChallengeStore::new(10);
        let nonce = store.issue(init("patient-1")).await.unwrap();
        store.consume(&nonce).await.unwrap();
        let err = store.consume(&nonce).await.unwrap_err();
        assert!(matches!(err, NeuronError::MalformedToken(_)));
    }

    #[tokio::test]
    async fn unknown_nonce_is_malformed() {
        let store = ChallengeStore::new(10);
        let err = store.consume("does-not-exist").await.unwrap_err();
        assert!(matches!(err, NeuronError::MalformedToken(_)));
    }

    #[tokio::test]
    async fn capacity_is_enforced() {
        let store = ChallengeStore::new(2);
        store.issue(init("p1")).await.unwrap();
        store.issue(init("p2")).await.unwrap();
        let err = store.issue(init("p3")).await.unwrap_err();
        assert!(matches!(err, NeuronError::TooManyPending));
    }

    #[tokio::test]
    async fn expired_challenge_is_rejected_on_consume() {
        let store = ChallengeStore::new(10);
        let nonce = {
            let mut entries = store.entries.lock().await;
            let nonce = random_nonce();
            entries.insert(
                nonce.clone(),
                PendingChallenge {
                    init: init("patient-1"),
                    expires_at: Instant::now() - Duration::from_secs(1),
                },
            );
            nonce
        };
        let err = store.consume(&nonce).await.unwrap_err();
        assert!(matches!(err, NeuronError::ConsentExpired));
    }
}
