//! Organization snapshot and administrative provider mutations for the
//! observability surface the external REST layer reads (spec §6).

use std::sync::Arc;

use neuron_core::npi::validate_npi;
use neuron_core::types::{AxonReachability, ProviderRegistration, RegistrationState};
use neuron_core::NeuronError;
use neuron_store::StateDb;
use serde::Serialize;
use tracing::info;

use crate::client::AxonClient;

/// `{npi, name, type, axon_status, providers}` — assembled from the
/// persisted `RegistrationState` plus the heartbeat's live reachability
/// reading, which the caller supplies (this module has no loop of its own).
#[derive(Clone, Debug, Serialize)]
pub struct OrganizationSnapshot {
    pub npi: String,
    pub name: String,
    #[serde(rename = "type")]
    pub organization_type: String,
    pub axon_status: AxonReachability,
    pub providers: Vec<ProviderRegistration>,
}

/// `None` if the organization hasn't been registered yet (no row on disk).
pub fn organization_snapshot(
    db: &StateDb,
    axon_status: AxonReachability,
) -> Result<Option<OrganizationSnapshot>, NeuronError> {
    Ok(db.get_registration()?.map(|state| OrganizationSnapshot {
        npi: state.organization_npi,
        name: state.organization_name,
        organization_type: state.organization_type,
        axon_status,
        providers: state.providers,
    }))
}

/// Add a provider NPI to the organization's roster and enroll it with Axon
/// immediately. Idempotent: an NPI already on the roster is returned
/// unchanged rather than enrolled a second time.
pub async fn add_provider(
    client: &AxonClient,
    db: &Arc<StateDb>,
    provider_npi: &str,
    now: i64,
) -> Result<RegistrationState, NeuronError> {
    validate_npi(provider_npi)?;

    let mut state = db
        .get_registration()?
        .ok_or_else(|| NeuronError::ConfigInvalid("organization is not yet registered".into()))?;

    if state.providers.iter().any(|p| p.provider_npi == provider_npi) {
        return Ok(state);
    }

    let (registration_id, bearer_token) = match (&state.registration_id, &state.bearer_token) {
        (Some(r), Some(b)) => (r.clone(), b.clone()),
        _ => {
            return Err(NeuronError::ConfigInvalid(
                "organization has no active Axon registration".into(),
            ))
        }
    };

    let resp = client.enroll_provider(&registration_id, &bearer_token, provider_npi).await?;
    state.providers.push(ProviderRegistration {
        provider_npi: provider_npi.to_string(),
        axon_provider_id: Some(resp.axon_provider_id.clone()),
    });
    state.updated_at = now;
    db.put_registration(&state)?;
    info!(provider_npi, axon_provider_id = %resp.axon_provider_id, "provider added");
    Ok(state)
}

/// Drop a provider NPI from the roster. `AxonClient` exposes no
/// deregistration endpoint, so this only updates the local roster — any
/// stale Axon-side record is left for an out-of-band Axon-side cleanup.
pub fn remove_provider(
    db: &Arc<StateDb>,
    provider_npi: &str,
    now: i64,
) -> Result<RegistrationState, NeuronError> {
    let mut state = db
        .get_registration()?
        .ok_or_else(|| NeuronError::NotFound("organization registration".into()))?;

    let before = state.providers.len();
    state.providers.retain(|p| p.provider_npi != provider_npi);
    if state.providers.len() == before {
        return Err(NeuronError::NotFound(provider_npi.to_string()));
    }

    state.updated_at = now;
    db.put_registration(&state)?;
    info!(provider_npi, "provider removed");
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(providers: Vec<ProviderRegistration>) -> RegistrationState {
        RegistrationState {
            organization_npi: "1234567893".into(),
            organization_name: "Acme Clinic".into(),
            organization_type: "clinic".into(),
            registry_url: "https://axon.example".into(),
            endpoint_url: "https://neuron.example".into(),
            registration_id: Some("reg-1".into()),
            bearer_token: Some("token-1".into()),
            status: neuron_core::types::RegistrationStatus::Registered,
            providers,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
        }
    }

    #[test]
    fn snapshot_is_none_before_registration() {
        let dir = tempfile::tempdir().unwrap();
        let db = StateDb::open(dir.path()).unwrap();
        let snap = organization_snapshot(&db, AxonReachability::Degraded).unwrap();
        assert!(snap.is_none());
    }

    #[test]
    fn snapshot_reflects_persisted_state_and_live_reachability() {
        let dir = tempfile::tempdir().unwrap();
        let db = StateDb::open(dir.path()).unwrap();
        db.put_registration(&state_with(vec![])).unwrap();

        let snap = organization_snapshot(&db, AxonReachability::Healthy).unwrap().unwrap();
        assert_eq!(snap.npi, "1234567893");
        assert_eq!(snap.axon_status, AxonReachability::Healthy);
        assert!(snap.providers.is_empty());
    }

    #[test]
    fn remove_provider_drops_the_matching_entry() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(StateDb::open(dir.path()).unwrap());
        db.put_registration(&state_with(vec![ProviderRegistration {
            provider_npi: "1234567893".into(),
            axon_provider_id: Some("axon-prov-1".into()),
        }]))
        .unwrap();

        let updated = remove_provider(&db, "1234567893", 1_700_001_000).unwrap();
        assert!(updated.providers.is_empty());
    }

    #[test]
    fn remove_provider_not_on_roster_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(StateDb::open(dir.path()).unwrap());
        db.put_registration(&state_with(vec![])).unwrap();

        let err = remove_provider(&db, "1234567893", 1_700_001_000).unwrap_err();
        assert!(matches!(err, NeuronError::NotFound(_)));
    }

    #[test]
    fn remove_provider_before_registration_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(StateDb::open(dir.path()).unwrap());
        let err = remove_provider(&db, "1234567893", 1_700_001_000).unwrap_err();
        assert!(matches!(err, NeuronError::NotFound(_)));
    }
}
