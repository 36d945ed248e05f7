//! Sled-backed row store: one tree per logical table, `bincode` on the
//! wire to disk. Full-table scans back the non-primary-key query methods —
//! the same shape as this workspace's other secondary-index-free scan
//! helpers.
//!
//! `sled` stands in here for "the abstract transactional key/row store"
//! spec §3 calls for — durable SQL persistence mechanics are an explicit
//! non-goal (spec §1); this is the in-process substitute a deployment's
//! outer layer could swap for a real SQL driver without this crate's public
//! API changing.

use std::path::Path;

use neuron_core::types::{Relationship, RelationshipStatus, RegistrationState, TerminationRecord};
use neuron_core::NeuronError;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;

pub struct StateDb {
    _db: sled::Db,
    relationships: sled::Tree,
    termination_records: sled::Tree,
    registration: sled::Tree,
}

const REGISTRATION_KEY: &[u8] = b"singleton";

impl StateDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, NeuronError> {
        let db = sled::open(path).map_err(|e| NeuronError::Storage(e.to_string()))?;
        let relationships = db
            .open_tree("relationships")
            .map_err(|e| NeuronError::Storage(e.to_string()))?;
        let termination_records = db
            .open_tree("termination_records")
            .map_err(|e| NeuronError::Storage(e.to_string()))?;
        let registration = db
            .open_tree("registration")
            .map_err(|e| NeuronError::Storage(e.to_string()))?;
        Ok(Self {
            _db: db,
            relationships,
            termination_records,
            registration,
        })
    }

    // ── Relationships ─────────────────────────────────────────────────────────

    pub fn get_relationship(&self, id: &str) -> Result<Option<Relationship>, NeuronError> {
        match self
            .relationships
            .get(id.as_bytes())
            .map_err(|e| NeuronError::Storage(e.to_string()))?
        {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| NeuronError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn put_relationship(&self, rel: &Relationship) -> Result<(), NeuronError> {
        let bytes =
            bincode::serialize(rel).map_err(|e| NeuronError::Serialization(e.to_string()))?;
        self.relationships
            .insert(rel.relationship_id.as_bytes(), bytes)
            .map_err(|e| NeuronError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn iter_all_relationships(&self) -> Result<Vec<Relationship>, NeuronError> {
        let mut out = Vec::new();
        for item in self.relationships.iter() {
            let (_, bytes) = item.map_err(|e| NeuronError::Storage(e.to_string()))?;
            out.push(
                bincode::deserialize(&bytes)
                    .map_err(|e| NeuronError::Serialization(e.to_string()))?,
            );
        }
        Ok(out)
    }

    pub fn find_by_patient(&self, patient_agent_id: &str) -> Result<Vec<Relationship>, NeuronError> {
        Ok(self
            .iter_all_relationships()?
            .into_iter()
            .filter(|r| r.patient_agent_id == patient_agent_id)
            .collect())
    }

    pub fn find_by_provider(&self, provider_npi: &str) -> Result<Vec<Relationship>, NeuronError> {
        Ok(self
            .iter_all_relationships()?
            .into_iter()
            .filter(|r| r.provider_npi == provider_npi)
            .collect())
    }

    pub fn find_by_status(&self, status: RelationshipStatus) -> Result<Vec<Relationship>, NeuronError> {
        Ok(self
            .iter_all_relationships()?
            .into_iter()
            .filter(|r| r.status == status)
            .collect())
    }

    /// Find the (at most one) non-terminated relationship for a
    /// `(patient_agent_id, provider_npi)` pair.
    pub fn find_active_pair(
        &self,
        patient_agent_id: &str,
        provider_npi: &str,
    ) -> Result<Option<Relationship>, NeuronError> {
        Ok(self
            .iter_all_relationships()?
            .into_iter()
            .find(|r| {
                r.patient_agent_id == patient_agent_id
                    && r.provider_npi == provider_npi
                    && r.status != RelationshipStatus::Terminated
            }))
    }

    pub fn count_relationships(&self) -> u64 {
        self.relationships.len() as u64
    }

    /// Flip `relationship_id` to `terminated` and insert `record` in one
    /// `sled` transaction spanning both trees — either both land or
    /// neither does. Re-validates status/provider inside the transaction
    /// (the authoritative check; callers may also pre-check under their
    /// own lock to fail fast without touching the audit log first).
    pub fn commit_termination(
        &self,
        relationship_id: &str,
        provider_npi: &str,
        now: i64,
        record: &TerminationRecord,
    ) -> Result<Relationship, NeuronError> {
        let result = (&self.relationships, &self.termination_records).transaction(
            |(rel_tree, term_tree)| {
                let bytes = rel_tree.get(relationship_id.as_bytes())?.ok_or_else(|| {
                    ConflictableTransactionError::Abort(NeuronError::NotFound(
                        relationship_id.to_string(),
                    ))
                })?;
                let mut rel: Relationship = bincode::deserialize(&bytes).map_err(|e| {
                    ConflictableTransactionError::Abort(NeuronError::Serialization(e.to_string()))
                })?;

                if rel.status == RelationshipStatus::Terminated {
                    return Err(ConflictableTransactionError::Abort(NeuronError::AlreadyTerminated));
                }
                if rel.provider_npi != provider_npi {
                    return Err(ConflictableTransactionError::Abort(NeuronError::WrongProvider));
                }

                rel.status = RelationshipStatus::Terminated;
                rel.updated_at = now;
                let rel_bytes = bincode::serialize(&rel).map_err(|e| {
                    ConflictableTransactionError::Abort(NeuronError::Serialization(e.to_string()))
                })?;
                rel_tree.insert(relationship_id.as_bytes(), rel_bytes)?;

                let record_bytes = bincode::serialize(record).map_err(|e| {
                    ConflictableTransactionError::Abort(NeuronError::Serialization(e.to_string()))
                })?;
                term_tree.insert(record.termination_id.as_bytes(), record_bytes)?;

                Ok(rel)
            },
        );

        match result {
            Ok(rel) => Ok(rel),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(NeuronError::Storage(e.to_string())),
        }
    }

    // ── Termination records ───────────────────────────────────────────────────

    pub fn put_termination_record(&self, record: &TerminationRecord) -> Result<(), NeuronError> {
        let bytes =
            bincode::serialize(record).map_err(|e| NeuronError::Serialization(e.to_string()))?;
        self.termination_records
            .insert(record.termination_id.as_bytes(), bytes)
            .map_err(|e| NeuronError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn get_termination_record(
        &self,
        termination_id: &str,
    ) -> Result<Option<TerminationRecord>, NeuronError> {
        match self
            .termination_records
            .get(termination_id.as_bytes())
            .map_err(|e| NeuronError::Storage(e.to_string()))?
        {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| NeuronError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    // ── Registration state (single row) ───────────────────────────────────────

    pub fn get_registration(&self) -> Result<Option<RegistrationState>, NeuronError> {
        match self
            .registration
            .get(REGISTRATION_KEY)
            .map_err(|e| NeuronError::Storage(e.to_string()))?
        {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| NeuronError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn put_registration(&self, state: &RegistrationState) -> Result<(), NeuronError> {
        let bytes =
            bincode::serialize(state).map_err(|e| NeuronError::Serialization(e.to_string()))?;
        self.registration
            .insert(REGISTRATION_KEY, bytes)
            .map_err(|e| NeuronError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn flush(&self) -> Result<(), NeuronError> {
        self._db.flush().map_err(|e| NeuronError::Storage(e.to_string()))?;
        Ok(())
    }
}
