//! Relationship store (C4): transactional CRUD plus the two lifecycle
//! invariants spec §3 fixes — at most one non-`terminated` row per
//! `(patient_agent_id, provider_npi)` pair, and `terminated` is a one-way
//! door. `create`/`update_status` serialize through a `std::sync::Mutex`
//! guarding the check-then-write sequence, since `sled` alone only
//! guarantees per-key atomicity, not the cross-row uniqueness check this
//! invariant needs.

use std::sync::{Arc, Mutex};

use neuron_core::types::{Relationship, RelationshipStatus, RelationshipView};
use neuron_core::NeuronError;

use crate::db::StateDb;

pub struct RelationshipStore {
    db: Arc<StateDb>,
    write_lock: Mutex<()>,
}

impl RelationshipStore {
    pub fn new(db: Arc<StateDb>) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
        }
    }

    /// Insert a new relationship, rejecting it if a non-terminated row
    /// already exists for the same `(patient_agent_id, provider_npi)` pair.
    pub fn create(&self, record: Relationship) -> Result<Relationship, NeuronError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| NeuronError::Internal("relationship store lock poisoned".into()))?;

        if let Some(existing) = self
            .db
            .find_active_pair(&record.patient_agent_id, &record.provider_npi)?
        {
            return Err(NeuronError::RelationshipConflict(existing.relationship_id));
        }

        self.db.put_relationship(&record)?;
        tracing::info!(
            relationship_id = %record.relationship_id,
            patient_agent_id = %record.patient_agent_id,
            provider_npi = %record.provider_npi,
            "relationship created"
        );
        Ok(record)
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<Relationship>, NeuronError> {
        self.db.get_relationship(id)
    }

    pub fn find_by_patient(&self, patient_agent_id: &str) -> Result<Vec<Relationship>, NeuronError> {
        self.db.find_by_patient(patient_agent_id)
    }

    pub fn find_by_provider(&self, provider_npi: &str) -> Result<Vec<Relationship>, NeuronError> {
        self.db.find_by_provider(provider_npi)
    }

    pub fn find_by_status(&self, status: RelationshipStatus) -> Result<Vec<Relationship>, NeuronError> {
        self.db.find_by_status(status)
    }

    /// The existing active (non-terminated) relationship for a pair, if
    /// any — used by the handshake engine's "existing relationship
    /// short-circuit" (spec §4.6).
    pub fn find_active_pair(
        &self,
        patient_agent_id: &str,
        provider_npi: &str,
    ) -> Result<Option<Relationship>, NeuronError> {
        self.db.find_active_pair(patient_agent_id, provider_npi)
    }

    /// List relationships for the administrative/observability query
    /// surface (spec §6), with optional filters and offset/limit paging.
    /// Returns `RelationshipView`, which drops `patient_public_key` —
    /// callers that need the raw row (e.g. consent re-verification) use
    /// `find_by_id`.
    pub fn list(
        &self,
        status: Option<RelationshipStatus>,
        provider_npi: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RelationshipView>, NeuronError> {
        let mut all = self.db.iter_all_relationships()?;
        if let Some(status) = status {
            all.retain(|r| r.status == status);
        }
        if let Some(npi) = provider_npi {
            all.retain(|r| r.provider_npi == npi);
        }
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all
            .iter()
            .skip(offset)
            .take(limit)
            .map(RelationshipView::from)
            .collect())
    }

    /// Redacted single-relationship lookup for the same observability
    /// surface `list` serves — `patient_public_key` dropped, `None` if the
    /// id doesn't exist.
    pub fn get_by_id(&self, id: &str) -> Result<Option<RelationshipView>, NeuronError> {
        Ok(self.db.get_relationship(id)?.map(|r| RelationshipView::from(&r)))
    }

    /// Flip `status`. Fails loudly (`AlreadyTerminated`) if the current
    /// status is already `terminated` — that state never mutates again.
    pub fn update_status(
        &self,
        relationship_id: &str,
        new_status: RelationshipStatus,
        now: i64,
    ) -> Result<Relationship, NeuronError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| NeuronError::Internal("relationship store lock poisoned".into()))?;

        let mut rel = self
            .db
            .get_relationship(relationship_id)?
            .ok_or_else(|| NeuronError::NotFound(relationship_id.to_string()))?;

        if rel.status == RelationshipStatus::Terminated {
            return Err(NeuronError::AlreadyTerminated);
        }

        rel.status = new_status;
        rel.updated_at = now;
        self.db.put_relationship(&rel)?;
        Ok(rel)
    }

    pub fn db(&self) -> &Arc<StateDb> {
        &self.db
    }

    /// Terminate `relationship_id` on behalf of `provider_npi`, with
    /// `write_audit` invoked to produce the `TerminationRecord` *after*
    /// the pre-check below passes but *before* anything is persisted —
    /// and all of it under one `write_lock` acquisition, so a concurrent
    /// `terminate_with`/`update_status` call can never land between the
    /// validation and the commit. The actual status flip and
    /// `TerminationRecord` insert then commit together in a single
    /// `StateDb::commit_termination` transaction, which re-validates
    /// authoritatively. If `write_audit` itself fails, nothing here is
    /// persisted and the relationship is untouched.
    pub fn terminate_with<F>(
        &self,
        relationship_id: &str,
        provider_npi: &str,
        now: i64,
        write_audit: F,
    ) -> Result<(Relationship, neuron_core::types::TerminationRecord), NeuronError>
    where
        F: FnOnce() -> Result<neuron_core::types::TerminationRecord, NeuronError>,
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| NeuronError::Internal("relationship store lock poisoned".into()))?;

        let existing = self
            .db
            .get_relationship(relationship_id)?
            .ok_or_else(|| NeuronError::NotFound(relationship_id.to_string()))?;
        if existing.status == RelationshipStatus::Terminated {
            return Err(NeuronError::AlreadyTerminated);
        }
        if existing.provider_npi != provider_npi {
            return Err(NeuronError::WrongProvider);
        }

        let record = write_audit()?;

        let updated = self
            .db
            .commit_termination(relationship_id, provider_npi, now, &record)?;
        Ok((updated, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuron_core::types::Relationship;

    fn store() -> RelationshipStore {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(StateDb::open(dir.path()).unwrap());
        std::mem::forget(dir); // keep the tempdir alive for the test's duration
        RelationshipStore::new(db)
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
    fn create_then_find_round_trips_consented_actions_order() {
        let store = store();
        let mut r = rel("patient-1", "1234567893");
        r.consented_actions = vec!["b".into(), "a".into(), "c".into()];
        let created = store.create(r).unwrap();
        let found = store.find_by_id(&created.relationship_id).unwrap().unwrap();
        assert_eq!(found.consented_actions, vec!["b", "a", "c"]);
    }

    #[test]
    fn duplicate_non_terminated_pair_is_rejected() {
        let store = store();
        store.create(rel("patient-1", "1234567893")).unwrap();
        let err = store.create(rel("patient-1", "1234567893")).unwrap_err();
        assert!(matches!(err, NeuronError::RelationshipConflict(_)));
    }

    #[test]
    fn terminated_relationship_frees_the_pair_for_a_new_one() {
        let store = store();
        let first = store.create(rel("patient-1", "1234567893")).unwrap();
        store
            .update_status(&first.relationship_id, RelationshipStatus::Terminated, 1_700_001_000)
            .unwrap();
        // Open question #2: a new handshake for the same pair is permitted.
        let second = store.create(rel("patient-1", "1234567893"));
        assert!(second.is_ok());
    }

    #[test]
    fn terminated_relationship_cannot_be_mutated_again() {
        let store = store();
        let r = store.create(rel("patient-1", "1234567893")).unwrap();
        store
            .update_status(&r.relationship_id, RelationshipStatus::Terminated, 1_700_001_000)
            .unwrap();
        let err = store
            .update_status(&r.relationship_id, RelationshipStatus::Active, 1_700_002_000)
            .unwrap_err();
        assert!(matches!(err, NeuronError::AlreadyTerminated));
    }

    #[test]
    fn list_filters_and_paginates() {
        let store = store();
        for i in 0..5 {
            store.create(rel(&format!("patient-{i}"), "1234567893")).unwrap();
        }
        let page = store.list(Some(RelationshipStatus::Active), None, 1, 2).unwrap();
        assert_eq!(page.len(), 2);
    }
}
