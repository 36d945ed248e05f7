//! Handshake engine (C6): the fixed per-connection state machine driving
//! a `tokio::select!` event loop (message vs. timer vs. cancellation)
//! over a generic [`HandshakeTransport`], so the engine is
//! transport-agnostic and testable without a real socket.

use std::sync::Arc;
use std::time::Duration;

use neuron_core::types::{AuditCategory, HandshakeInit};
use neuron_core::NeuronError;
use neuron_store::RelationshipStore;

use crate::challenge::ChallengeStore;
use crate::message::{CompletionStatus, InboundMessage, OutboundMessage};

/// A single WebSocket frame, abstracted away from any particular socket
/// library. `Binary` frames are always rejected (spec §4.6 invariant).
#[derive(Clone, Debug)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// What the engine drives a connection over. `neuron-server` implements
/// this atop `axum::extract::ws::WebSocket`; tests implement it atop an
/// in-memory channel pair.
pub trait HandshakeTransport: Send {
    /// Await the next frame. `Ok(None)` means the peer closed the stream.
    async fn recv(&mut self) -> Result<Option<Frame>, NeuronError>;
    async fn send_text(&mut self, text: String) -> Result<(), NeuronError>;
    /// Close the underlying socket with `code`. Must be idempotent.
    async fn close(&mut self, code: u16) -> Result<(), NeuronError>;
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub organization_npi: String,
    /// Base URL the broker advertises; `provider_endpoint` is this plus
    /// `/{provider_npi}` (spec §4.6: "opaque... its value is ignored by
    /// the core but is part of the contract").
    pub provider_endpoint_base: String,
    pub auth_timeout: Duration,
    pub max_payload_bytes: usize,
}

pub struct HandshakeEngine {
    challenges: Arc<ChallengeStore>,
    relationships: Arc<RelationshipStore>,
    audit: Arc<neuron_audit::AuditLog>,
    config: EngineConfig,
}

/// Outcome of a completed handshake, for the server's session bookkeeping.
#[derive(Clone, Debug)]
pub struct HandshakeOutcome {
    pub relationship_id: String,
    pub status: CompletionStatus,
}

impl HandshakeEngine {
    pub fn new(
        challenges: Arc<ChallengeStore>,
        relationships: Arc<RelationshipStore>,
        audit: Arc<neuron_audit::AuditLog>,
        config: EngineConfig,
    ) -> Self {
        Self {
            challenges,
            relationships,
            audit,
            config,
        }
    }

    /// Drive one connection end to end. Returns the completed
    /// relationship outcome on success; on any failure the transport has
    /// already been sent `handshake.error` and closed with the matching
    /// code, and the error is also returned for the caller's own logging.
    pub async fn run<T: HandshakeTransport>(&self, transport: &mut T) -> Result<HandshakeOutcome, NeuronError> {
        let auth_msg = match self.await_auth(transport).await {
            Ok(msg) => msg,
            Err(e) => return Err(e),
        };

        let (consent_token_payload, consent_token_signature, patient_agent_id, patient_public_key, _patient_endpoint) =
            match auth_msg {
                InboundMessage::Auth {
                    consent_token_payload,
                    consent_token_signature,
                    patient_agent_id,
                    patient_public_key,
                    patient_endpoint,
                } => (
                    consent_token_payload,
                    consent_token_signature,
                    patient_agent_id,
                    patient_public_key,
                    patient_endpoint,
                ),
                InboundMessage::ChallengeResponse { .. } => {
                    return self
                        .fail(
                            transport,
                            None,
                            NeuronError::InvalidMessage("expected handshake.auth first".into()),
                        )
                        .await;
                }
            };

        self.audit_event(AuditCategory::Connection, "connection.handshake_started", Some(&patient_agent_id), None);

        let claims = match neuron_consent::verify_consent_token(
            &consent_token_payload,
            &consent_token_signature,
            &patient_public_key,
            now(),
        ) {
            Ok(c) => c,
            Err(e) => return self.fail(transport, Some(&patient_agent_id), e).await,
        };

        // LOOKUP
        match self.relationships.find_active_pair(&claims.patient_agent_id, &claims.provider_npi) {
            Ok(Some(existing)) => {
                return self.complete(transport, &existing.relationship_id, &existing.provider_npi, CompletionStatus::Existing).await;
            }
            Ok(None) => {}
            Err(e) => return self.fail(transport, Some(&patient_agent_id), e).await,
        }

        let init = HandshakeInit {
            patient_agent_id: claims.patient_agent_id.clone(),
            provider_npi: claims.provider_npi.clone(),
            patient_public_key: patient_public_key.clone(),
            consent_token_payload: consent_token_payload.clone(),
            consent_token_signature: consent_token_signature.clone(),
        };
        let nonce = match self.challenges.issue(init).await {
            Ok(n) => n,
            Err(e) => return self.fail(transport, Some(&patient_agent_id), e).await,
        };

        if let Err(e) = transport
            .send_text(
                serde_json::to_string(&OutboundMessage::Challenge {
                    nonce: nonce.clone(),
                    provider_npi: claims.provider_npi.clone(),
                    organization_npi: self.config.organization_npi.clone(),
                })
                .map_err(|e| NeuronError::Serialization(e.to_string()))?,
            )
            .await
        {
            return Err(e);
        }

        // CHALLENGED
        let response_msg = match self.await_next_message(transport).await {
            Ok(msg) => msg,
            Err(e) => return self.fail(transport, Some(&patient_agent_id), e).await,
        };

        let signed_nonce = match response_msg {
            InboundMessage::ChallengeResponse { signed_nonce } => signed_nonce,
            InboundMessage::Auth { .. } => {
                return self
                    .fail(
                        transport,
                        Some(&patient_agent_id),
                        NeuronError::InvalidMessage("expected handshake.challenge_response".into()),
                    )
                    .await
            }
        };

        let init = match self.challenges.consume(&nonce).await {
            Ok(init) => init,
            Err(e) => return self.fail(transport, Some(&patient_agent_id), e).await,
        };

        // VERIFYING: nonce signature, then the consent token again, fresh.
        if neuron_crypto::verify_signature(&init.patient_public_key, nonce.as_bytes(), &signed_nonce).is_err() {
            return self.fail(transport, Some(&patient_agent_id), NeuronError::ConsentFailed).await;
        }

        let claims = match neuron_consent::verify_consent_token(
            &init.consent_token_payload,
            &init.consent_token_signature,
            &init.patient_public_key,
            now(),
        ) {
            Ok(c) => c,
            Err(e) => return self.fail(transport, Some(&patient_agent_id), e).await,
        };

        if claims.provider_npi != init.provider_npi {
            return self.fail(transport, Some(&patient_agent_id), NeuronError::WrongProvider).await;
        }

        // PERSISTING
        let relationship = neuron_core::types::Relationship::new(
            claims.patient_agent_id.clone(),
            claims.provider_npi.clone(),
            claims.consented_actions.clone(),
            init.patient_public_key.clone(),
            now(),
        );
        let relationship = match self.relationships.create(relationship) {
            Ok(r) => r,
            Err(e) => return self.fail(transport, Some(&patient_agent_id), e).await,
        };
        self.audit_event(
            AuditCategory::Consent,
            "consent.relationship_established",
            Some(&relationship.patient_agent_id),
            Some(serde_json::json!({ "relationship_id": relationship.relationship_id })),
        );

        self.complete(transport, &relationship.relationship_id, &relationship.provider_npi, CompletionStatus::New).await
    }

    async fn await_auth<T: HandshakeTransport>(&self, transport: &mut T) -> Result<InboundMessage, NeuronError> {
        let outcome = tokio::time::timeout(self.config.auth_timeout, self.await_next_message(transport)).await;
        match outcome {
            Ok(inner) => inner,
            Err(_) => {
                self.audit_event(AuditCategory::Connection, "connection.timeout", None, None);
                transport.send_text(
                    serde_json::to_string(&OutboundMessage::Error {
                        code: NeuronError::AuthTimeout.wire_code().to_string(),
                        message: NeuronError::AuthTimeout.to_string(),
                    })
                    .unwrap_or_default(),
                )
                .await
                .ok();
                transport.close(NeuronError::AuthTimeout.close_code().unwrap_or(1011)).await.ok();
                Err(NeuronError::AuthTimeout)
            }
        }
    }

    async fn await_next_message<T: HandshakeTransport>(&self, transport: &mut T) -> Result<InboundMessage, NeuronError> {
        let frame = transport.recv().await?.ok_or_else(|| NeuronError::InvalidMessage("connection closed".into()))?;
        let text = match frame {
            Frame::Text(t) => t,
            Frame::Binary(_) => return Err(NeuronError::InvalidMessage("binary frames are rejected".into())),
        };
        if text.len() > self.config.max_payload_bytes {
            return Err(NeuronError::InvalidMessage("payload exceeds max size".into()));
        }
        serde_json::from_str(&text).map_err(|e| NeuronError::InvalidMessage(format!("malformed envelope: {e}")))
    }

    async fn fail<T: HandshakeTransport>(
        &self,
        transport: &mut T,
        actor: Option<&str>,
        err: NeuronError,
    ) -> Result<HandshakeOutcome, NeuronError> {
        self.audit_event(
            AuditCategory::Connection,
            "connection.handshake_failed",
            actor,
            Some(serde_json::json!({ "error": err.wire_code() })),
        );
        transport
            .send_text(
                serde_json::to_string(&OutboundMessage::Error {
                    code: err.wire_code().to_string(),
                    message: err.to_string(),
                })
                .unwrap_or_default(),
            )
            .await
            .ok();
        transport.close(err.close_code().unwrap_or(1011)).await.ok();
        Err(err)
    }

    async fn complete<T: HandshakeTransport>(
        &self,
        transport: &mut T,
        relationship_id: &str,
        provider_npi: &str,
        status: CompletionStatus,
    ) -> Result<HandshakeOutcome, NeuronError> {
        let provider_endpoint = format!("{}/{}", self.config.provider_endpoint_base, provider_npi);
        let send_result = transport
            .send_text(
                serde_json::to_string(&OutboundMessage::Complete {
                    relationship_id: relationship_id.to_string(),
                    provider_endpoint,
                    status,
                })
                .map_err(|e| NeuronError::Serialization(e.to_string()))?,
            )
            .await;

        self.audit_event(
            AuditCategory::Connection,
            "connection.handshake_completed",
            None,
            Some(serde_json::json!({ "relationship_id": relationship_id, "status": status })),
        );

        transport.close(1000).await.ok();
        send_result?;

        Ok(HandshakeOutcome {
            relationship_id: relationship_id.to_string(),
            status,
        })
    }

    fn audit_event(&self, category: AuditCategory, action: &str, actor: Option<&str>, details: Option<serde_json::Value>) {
        if let Err(e) = self.audit.append(category, action, actor.map(str::to_string), details, now()) {
            tracing::error!(error = %e, action, "failed to write audit entry for handshake event");
        }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
