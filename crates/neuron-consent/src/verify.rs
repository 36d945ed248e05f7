//! Stateless Ed25519 consent-token verifier (C3).
//!
//! Order of operations is semantically significant (spec §4.3): signature
//! check first, then JSON parse, then required-claims shape check, then
//! expiry. The component caches nothing between calls — every `verify_*`
//! call is independent and safe to re-invoke on every connection.

use neuron_core::error::NeuronError;
use serde::{Deserialize, Serialize};

/// The claims carried by a consent token, verbatim per spec §3/Glossary.
/// `consented_actions` is opaque scope data — this crate never interprets
/// it, only validates its shape (an array of strings) and carries it
/// through.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsentClaims {
    pub patient_agent_id: String,
    pub provider_npi: String,
    pub consented_actions: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Verify a consent token: Ed25519 signature over `payload` using
/// `public_key_b64`, then parse and validate `payload` as JSON claims, then
/// check expiry against the current wall clock.
///
/// `now_unix` is injected so callers (and this crate's own tests) can pin
/// time deterministically; `neuron-handshake` passes `chrono::Utc::now()`.
pub fn verify_consent_token(
    payload: &str,
    signature_b64: &str,
    public_key_b64: &str,
    now_unix: i64,
) -> Result<ConsentClaims, NeuronError> {
    // 1. Ed25519 signature check — the primitive itself is pre-hashed, no
    //    external digest is applied before the call.
    neuron_crypto::verify_signature(public_key_b64, payload.as_bytes(), signature_b64)
        .map_err(|_| NeuronError::InvalidSignature)?;

    // 2. JSON parse of the payload.
    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| NeuronError::MalformedToken(format!("payload is not valid JSON: {e}")))?;

    // 3. Required claims present with correct shapes.
    let claims: ConsentClaims = serde_json::from_value(value)
        .map_err(|e| NeuronError::MalformedToken(format!("missing or malformed claim: {e}")))?;

    // 4. Expiry.
    if now_unix >= claims.exp {
        return Err(NeuronError::ConsentExpired);
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuron_crypto::NeuronSigner;

    fn payload(patient: &str, npi: &str, iat: i64, exp: i64) -> String {
        serde_json::json!({
            "patient_agent_id": patient,
            "provider_npi": npi,
            "consented_actions": ["office_visit", "lab_results"],
            "iat": iat,
            "exp": exp,
        })
        .to_string()
    }

    #[test]
    fn valid_token_round_trips() {
        let signer = NeuronSigner::generate();
        let body = payload("patient-001", "1234567893", 1_700_000_000, 1_700_003_600);
        let sig = signer.sign(body.as_bytes());

        let claims =
            verify_consent_token(&body, &sig, &signer.public_key_b64, 1_700_000_500).unwrap();
        assert_eq!(claims.patient_agent_id, "patient-001");
        assert_eq!(claims.provider_npi, "1234567893");
        assert_eq!(claims.consented_actions, vec!["office_visit", "lab_results"]);
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let signer = NeuronSigner::generate();
        let other = NeuronSigner::generate();
        let body = payload("patient-001", "1234567893", 1_700_000_000, 1_700_003_600);
        // Signed by `other`, presented against `signer`'s public key.
        let sig = other.sign(body.as_bytes());

        let err = verify_consent_token(&body, &sig, &signer.public_key_b64, 1_700_000_500)
            .unwrap_err();
        assert!(matches!(err, NeuronError::InvalidSignature));
    }

    #[test]
    fn expired_token_is_rejected() {
        let signer = NeuronSigner::generate();
        let body = payload("patient-001", "1234567893", 1_700_000_000, 1_700_003_600);
        let sig = signer.sign(body.as_bytes());

        // now_unix == exp is already expired ("now_unix() < exp" is the rule).
        let err =
            verify_consent_token(&body, &sig, &signer.public_key_b64, 1_700_003_600).unwrap_err();
        assert!(matches!(err, NeuronError::ConsentExpired));
    }

    #[test]
    fn missing_claim_is_malformed() {
        let signer = NeuronSigner::generate();
        let body = serde_json::json!({
            "patient_agent_id": "patient-001",
            "provider_npi": "1234567893",
            // consented_actions, iat, exp all missing.
        })
        .to_string();
        let sig = signer.sign(body.as_bytes());

        let err = verify_consent_token(&body, &sig, &signer.public_key_b64, 0).unwrap_err();
        assert!(matches!(err, NeuronError::MalformedToken(_)));
    }

    #[test]
    fn no_hidden_state_between_calls() {
        let signer = NeuronSigner::generate();
        let body = payload("patient-001", "1234567893", 1_700_000_000, 1_700_003_600);
        let sig = signer.sign(body.as_bytes());

        let first = verify_consent_token(&body, &sig, &signer.public_key_b64, 1_700_000_500);
        let second = verify_consent_token(&body, &sig, &signer.public_key_b64, 1_700_000_500);
        assert_eq!(first.unwrap(), second.unwrap());
    }
}
