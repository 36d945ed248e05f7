//! Termination handler (C10): patient-initiated relationship teardown.
//!
//! `RelationshipStore::terminate_with` holds the store's write lock across
//! the whole critical section: it validates first (`NotFound` /
//! `AlreadyTerminated` / `WrongProvider`, mutating nothing), then invokes
//! the audit-write closure below, and only then commits the status flip
//! and the `TerminationRecord` insert together in one `sled` transaction
//! (`StateDb::commit_termination`). Holding the lock across the audit
//! write closes the race the old two-step version had: a concurrent
//! `terminate()` can no longer land between this call's validation and
//! its commit, so the audit log can never record a termination whose
//! relationship mutation didn't also happen. If the audit write itself
//! fails, `terminate_with` returns before anything is persisted.

use std::sync::Arc;

use neuron_core::types::{AuditCategory, Relationship, TerminationRecord};
use neuron_core::NeuronError;

use crate::relationships::RelationshipStore;

pub struct TerminationHandler {
    relationships: Arc<RelationshipStore>,
    audit: Arc<neuron_audit::AuditLog>,
}

impl TerminationHandler {
    pub fn new(relationships: Arc<RelationshipStore>, audit: Arc<neuron_audit::AuditLog>) -> Self {
        Self { relationships, audit }
    }

    /// Terminate `relationship_id` on behalf of `provider_npi`, recording
    /// `reason` in the audit trail and in the returned `TerminationRecord`.
    pub fn terminate(
        &self,
        relationship_id: &str,
        provider_npi: &str,
        reason: &str,
        now: i64,
    ) -> Result<(Relationship, TerminationRecord), NeuronError> {
        let audit = Arc::clone(&self.audit);
        let relationship_id_owned = relationship_id.to_string();
        let provider_npi_owned = provider_npi.to_string();
        let reason_owned = reason.to_string();

        let (updated, record) = self.relationships.terminate_with(
            relationship_id,
            provider_npi,
            now,
            move || {
                let audit_entry = audit.append(
                    AuditCategory::Termination,
                    "termination.relationship_terminated",
                    Some(provider_npi_owned.clone()),
                    Some(serde_json::json!({
                        "relationship_id": relationship_id_owned,
                        "reason": reason_owned,
                    })),
                    now,
                )?;
                Ok(TerminationRecord {
                    termination_id: uuid::Uuid::new_v4().to_string(),
                    relationship_id: relationship_id_owned.clone(),
                    provider_npi: provider_npi_owned.clone(),
                    reason: reason_owned.clone(),
                    terminated_at: now,
                    audit_entry_sequence: audit_entry.sequence,
                })
            },
        )?;

        tracing::info!(
            relationship_id,
            provider_npi,
            termination_id = %record.termination_id,
            "relationship terminated"
        );

        Ok((updated, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StateDb;
    use neuron_core::types::{Relationship, RelationshipStatus};
    use std::sync::Arc;

    fn handler() -> (TerminationHandler, Arc<RelationshipStore>) {
        let store_dir = tempfile::tempdir().unwrap();
        let db = Arc::new(StateDb::open(store_dir.path()).unwrap());
        std::mem::forget(store_dir);
        let relationships = Arc::new(RelationshipStore::new(db));

        let audit_dir = tempfile::tempdir().unwrap();
        let audit_path = audit_dir.path().join("audit.log");
        std::mem::forget(audit_dir);
        let audit = Arc::new(neuron_audit::AuditLog::open(&audit_path).unwrap());

        let handler = TerminationHandler::new(relationships.clone(), audit);
        (handler, relationships)
    }

    fn rel(patient: &str, npi: &str) -> Relationship {
        Relationship::new(
            patient.to_string(),
            npi.to_string(),
            vec!["office_visit".into()],
            "pubkey".into(),
            1_700_000_000,
        )
    }

    #[test]
    fn happy_path_terminates_and_records_audit_sequence() {
        let (handler, relationships) = handler();
        let created = relationships.create(rel("patient-1", "1234567893")).unwrap();

        let (updated, record) = handler
            .terminate(&created.relationship_id, "1234567893", "patient requested", 1_700_001_000)
            .unwrap();

        assert_eq!(updated.status, RelationshipStatus::Terminated);
        assert_eq!(record.relationship_id, created.relationship_id);
        assert_eq!(record.audit_entry_sequence, 1);
    }

    #[test]
    fn unknown_relationship_is_not_found() {
        let (handler, _relationships) = handler();
        let err = handler
            .terminate("does-not-exist", "1234567893", "x", 1_700_001_000)
            .unwrap_err();
        assert!(matches!(err, NeuronError::NotFound(_)));
    }

    #[test]
    fn already_terminated_is_rejected_without_second_audit_entry() {
        let (handler, relationships) = handler();
        let created = relationships.create(rel("patient-1", "1234567893")).unwrap();
        handler
            .terminate(&created.relationship_id, "1234567893", "first", 1_700_001_000)
            .unwrap();

        let err = handler
            .terminate(&created.relationship_id, "1234567893", "second", 1_700_002_000)
            .unwrap_err();
        assert!(matches!(err, NeuronError::AlreadyTerminated));
    }

    #[test]
    fn wrong_provider_is_rejected_and_relationship_stays_active() {
        let (handler, relationships) = handler();
        let created = relationships.create(rel("patient-1", "1234567893")).unwrap();

        let err = handler
            .terminate(&created.relationship_id, "9999999999", "not mine", 1_700_001_000)
            .unwrap_err();
        assert!(matches!(err, NeuronError::WrongProvider));

        let still = relationships.find_by_id(&created.relationship_id).unwrap().unwrap();
        assert_eq!(still.status, RelationshipStatus::Active);
    }
}
