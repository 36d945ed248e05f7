//! `AxonClient`: a thin `reqwest::Client` wrapper with typed call helpers.
//!
//! One `reqwest::Client` field, a private call helper, typed public
//! methods per endpoint — plain REST POST/PUT framing, since the Axon
//! registry is a REST service, not a JSON-RPC node.

use neuron_core::NeuronError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize)]
pub struct OrganizationEnrollRequest {
    pub organization_npi: String,
    pub organization_name: String,
    pub organization_type: String,
    pub neuron_endpoint_url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OrganizationEnrollResponse {
    pub registration_id: String,
    pub bearer_token: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProviderEnrollRequest {
    pub provider_npi: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProviderEnrollResponse {
    pub axon_provider_id: String,
}

#[derive(Clone, Debug, Serialize)]
struct EndpointUpdateRequest<'a> {
    endpoint_url: &'a str,
}

/// A thin wrapper around `reqwest::Client` for talking to the Axon
/// registry. Holds no registration state of its own — the caller (the
/// registrar and the heartbeat loop) supplies the `registration_id` and
/// `bearer_token` on every call, since those are persisted elsewhere
/// (`neuron-store`'s `RegistrationState` row).
pub struct AxonClient {
    registry_url: String,
    http: reqwest::Client,
}

impl AxonClient {
    pub fn new(registry_url: impl Into<String>) -> Self {
        Self {
            registry_url: registry_url.into(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.registry_url.trim_end_matches('/'), path)
    }

    /// Enroll the organization itself. Axon responds with the assigned
    /// `registration_id` and a bearer token used on every subsequent call.
    pub async fn enroll_organization(
        &self,
        req: &OrganizationEnrollRequest,
    ) -> Result<OrganizationEnrollResponse, NeuronError> {
        let resp = self
            .http
            .post(self.url("/v1/organizations"))
            .json(req)
            .send()
            .await
            .map_err(|e| NeuronError::AxonUnreachable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(NeuronError::AxonUnreachable(format!(
                "organization enrollment returned {}",
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| NeuronError::AxonUnreachable(format!("malformed enrollment response: {e}")))
    }

    /// Enroll a single provider NPI under an already-registered
    /// organization.
    pub async fn enroll_provider(
        &self,
        registration_id: &str,
        bearer_token: &str,
        provider_npi: &str,
    ) -> Result<ProviderEnrollResponse, NeuronError> {
        let resp = self
            .http
            .post(self.url(&format!("/v1/organizations/{registration_id}/providers")))
            .bearer_auth(bearer_token)
            .json(&ProviderEnrollRequest {
                provider_npi: provider_npi.to_string(),
            })
            .send()
            .await
            .map_err(|e| NeuronError::AxonUnreachable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(NeuronError::AxonUnreachable(format!(
                "provider enrollment returned {}",
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| NeuronError::AxonUnreachable(format!("malformed provider response: {e}")))
    }

    /// Send one heartbeat/endpoint-update beat. A 404 means the
    /// registration no longer exists on the registry side (e.g. the
    /// registry was reset) and maps to `RegistrationLost` so the caller can
    /// re-enroll without tearing down the whole loop. Any other non-success
    /// status or transport failure maps to `AxonUnreachable`.
    pub async fn send_heartbeat(
        &self,
        registration_id: &str,
        bearer_token: &str,
        endpoint_url: &str,
    ) -> Result<(), NeuronError> {
        let resp = self
            .http
            .put(self.url(&format!("/v1/organizations/{registration_id}/heartbeat")))
            .bearer_auth(bearer_token)
            .json(&EndpointUpdateRequest { endpoint_url })
            .send()
            .await
            .map_err(|e| NeuronError::AxonUnreachable(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(NeuronError::RegistrationLost);
        }
        if !resp.status().is_success() {
            return Err(NeuronError::AxonUnreachable(format!(
                "heartbeat returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}
