//! The five handshake wire envelopes (spec §4.6), tagged JSON enums keyed
//! by a `type` field so a single `serde_json::from_str` dispatches to the
//! right variant.

use serde::{Deserialize, Serialize};

/// Messages the patient agent sends.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "handshake.auth")]
    Auth {
        consent_token_payload: String,
        consent_token_signature: String,
        patient_agent_id: String,
        patient_public_key: String,
        patient_endpoint: String,
    },
    #[serde(rename = "handshake.challenge_response")]
    ChallengeResponse { signed_nonce: String },
}

/// Messages the broker sends back.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "handshake.challenge")]
    Challenge {
        nonce: String,
        provider_npi: String,
        organization_npi: String,
    },
    #[serde(rename = "handshake.complete")]
    Complete {
        relationship_id: String,
        provider_endpoint: String,
        status: CompletionStatus,
    },
    #[serde(rename = "handshake.error")]
    Error { code: String, message: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Existing,
    New,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_message_round_trips() {
        let msg = InboundMessage::Auth {
            consent_token_payload: "payload".into(),
            consent_token_signature: "sig".into(),
            patient_agent_id: "patient-1".into(),
            patient_public_key: "pubkey".into(),
            patient_endpoint: "https://patient.example/agent".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"handshake.auth\""));
        let back: InboundMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, InboundMessage::Auth { .. }));
    }

    #[test]
    fn complete_message_tags_status() {
        let msg = OutboundMessage::Complete {
            relationship_id: "rel-1".into(),
            provider_endpoint: "https://org.example/provider/1234567893".into(),
            status: CompletionStatus::New,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"status\":\"new\""));
    }

    #[test]
    fn unknown_type_tag_fails_to_parse() {
        let err = serde_json::from_str::<InboundMessage>(r#"{"type":"bogus"}"#);
        assert!(err.is_err());
    }
}
