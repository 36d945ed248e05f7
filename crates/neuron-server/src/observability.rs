//! Process status snapshot for the observability surface the external
//! REST layer reads (spec §6): `{status, uptime_seconds, organization,
//! axon, active_sessions, providers}`.

use neuron_axon::{organization_snapshot, HeartbeatSnapshot, OrganizationSnapshot};
use neuron_core::types::ProviderRegistration;
use neuron_core::NeuronError;
use neuron_store::StateDb;
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct StatusSnapshot {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub organization: Option<OrganizationSnapshot>,
    pub axon: AxonStatus,
    pub active_sessions: usize,
    pub providers: Vec<ProviderRegistration>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AxonStatus {
    pub status: neuron_core::types::AxonReachability,
    pub attempt: u32,
    pub last_success_at: Option<i64>,
}

/// Assemble one status snapshot from the store's persisted registration
/// row, the heartbeat loop's live reachability reading, the server's own
/// session count, and how long the process has been up.
pub fn status_snapshot(
    db: &StateDb,
    heartbeat: &HeartbeatSnapshot,
    active_sessions: usize,
    started_at: std::time::Instant,
) -> Result<StatusSnapshot, NeuronError> {
    let organization = organization_snapshot(db, heartbeat.status)?;
    let providers = organization
        .as_ref()
        .map(|o| o.providers.clone())
        .unwrap_or_default();

    Ok(StatusSnapshot {
        status: "running",
        uptime_seconds: started_at.elapsed().as_secs(),
        organization,
        axon: AxonStatus {
            status: heartbeat.status,
            attempt: heartbeat.attempt,
            last_success_at: heartbeat.last_success_at,
        },
        active_sessions,
        providers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuron_core::types::{RegistrationState, RegistrationStatus};

    #[test]
    fn snapshot_without_registration_has_empty_organization_and_providers() {
        let dir = tempfile::tempdir().unwrap();
        let db = StateDb::open(dir.path()).unwrap();
        let heartbeat = HeartbeatSnapshot::default();

        let snap = status_snapshot(&db, &heartbeat, 0, std::time::Instant::now()).unwrap();
        assert_eq!(snap.status, "running");
        assert!(snap.organization.is_none());
        assert!(snap.providers.is_empty());
        assert_eq!(snap.active_sessions, 0);
    }

    #[test]
    fn snapshot_reports_registered_providers_and_session_count() {
        let dir = tempfile::tempdir().unwrap();
        let db = StateDb::open(dir.path()).unwrap();
        db.put_registration(&RegistrationState {
            organization_npi: "1234567893".into(),
            organization_name: "Acme Clinic".into(),
            organization_type: "clinic".into(),
            registry_url: "https://axon.example".into(),
            endpoint_url: "https://neuron.example".into(),
            registration_id: Some("reg-1".into()),
            bearer_token: Some("token-1".into()),
            status: RegistrationStatus::Registered,
            providers: vec![],
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
        })
        .unwrap();

        let heartbeat = HeartbeatSnapshot {
            status: neuron_core::types::AxonReachability::Healthy,
            attempt: 0,
            last_success_at: Some(1_700_000_500),
        };

        let snap = status_snapshot(&db, &heartbeat, 3, std::time::Instant::now()).unwrap();
        assert_eq!(snap.active_sessions, 3);
        assert_eq!(snap.organization.unwrap().npi, "1234567893");
        assert_eq!(snap.axon.last_success_at, Some(1_700_000_500));
    }
}
