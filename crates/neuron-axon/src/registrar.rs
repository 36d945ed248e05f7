//! Axon enrollment (C9, steps 1–3 of spec §4.9): load persisted
//! `RegistrationState`, enroll the organization if unassigned, then enroll
//! any configured provider NPI that isn't registered yet.

use std::sync::Arc;

use neuron_core::types::{ProviderRegistration, RegistrationState, RegistrationStatus};
use neuron_core::NeuronError;
use neuron_store::StateDb;
use tracing::info;

use crate::client::{AxonClient, OrganizationEnrollRequest};

pub struct RegistrarConfig {
    pub organization_npi: String,
    pub organization_name: String,
    pub organization_type: String,
    pub registry_url: String,
    pub neuron_endpoint_url: String,
    pub provider_npis: Vec<String>,
}

/// Ensure the organization (and every configured provider) is registered
/// with Axon, returning the up-to-date `RegistrationState`. Idempotent:
/// re-running against an already-`registered` state only fills in any
/// providers that are still missing.
pub async fn ensure_registered(
    client: &AxonClient,
    db: &Arc<StateDb>,
    config: &RegistrarConfig,
    now: i64,
) -> Result<RegistrationState, NeuronError> {
    let mut state = db.get_registration()?.unwrap_or_else(|| RegistrationState {
        organization_npi: config.organization_npi.clone(),
        organization_name: config.organization_name.clone(),
        organization_type: config.organization_type.clone(),
        registry_url: config.registry_url.clone(),
        endpoint_url: config.neuron_endpoint_url.clone(),
        registration_id: None,
        bearer_token: None,
        status: RegistrationStatus::Unregistered,
        providers: Vec::new(),
        created_at: now,
        updated_at: now,
    });

    if state.registration_id.is_none() {
        let resp = client
            .enroll_organization(&OrganizationEnrollRequest {
                organization_npi: config.organization_npi.clone(),
                organization_name: config.organization_name.clone(),
                organization_type: config.organization_type.clone(),
                neuron_endpoint_url: config.neuron_endpoint_url.clone(),
            })
            .await?;

        state.registration_id = Some(resp.registration_id.clone());
        state.bearer_token = Some(resp.bearer_token);
        state.status = RegistrationStatus::Registered;
        state.updated_at = now;
        db.put_registration(&state)?;
        info!(registration_id = %resp.registration_id, "organization registered with Axon");
    }

    let registration_id = state.registration_id.clone().expect("just registered above");
    let bearer_token = state.bearer_token.clone().expect("set alongside registration_id");

    for npi in &config.provider_npis {
        if state.providers.iter().any(|p| &p.provider_npi == npi) {
            continue;
        }
        let resp = client.enroll_provider(&registration_id, &bearer_token, npi).await?;
        state.providers.push(ProviderRegistration {
            provider_npi: npi.clone(),
            axon_provider_id: Some(resp.axon_provider_id.clone()),
        });
        state.updated_at = now;
        db.put_registration(&state)?;
        info!(provider_npi = %npi, axon_provider_id = %resp.axon_provider_id, "provider registered with Axon");
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_starts_unregistered() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(StateDb::open(dir.path()).unwrap());
        assert!(db.get_registration().unwrap().is_none());
    }
}
