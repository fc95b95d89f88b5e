// lib/src/storage_engine/patient_storage.rs

use std::sync::Arc;

use async_trait::async_trait;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};
use sled::Transactional;
use tracing::{debug, info};

use models::errors::{Entity, WardError, WardResult};
use models::ids::{ensure_valid_id, ActorId, PatientId};
use models::patient::{Demographics, PatientRecord, SearchIndexEntry};

use crate::codec::{decode_document, encode_document, DocumentCodec};
use crate::storage_engine::{id_from_key, id_key, run_txn, tx_next_id, WardTrees, PATIENT_SEQ};
use crate::util::Clock;

/// Storage operations on the canonical patient documents and the
/// clear-text name index.
#[async_trait]
pub trait PatientStorageEngine: Send + Sync + std::fmt::Debug + 'static {
    /// Registers a new patient. The sealed record and its index row are
    /// written in one atomic unit; if either write fails, nothing is
    /// persisted.
    async fn create(&self, demographics: Demographics, actor: ActorId) -> WardResult<PatientId>;
    /// Loads and opens one patient document.
    async fn load(&self, patient_id: PatientId) -> WardResult<PatientRecord>;
    /// Overwrites a patient document. Multi-step mutations go through the
    /// allocation engine's transactions instead.
    async fn save(&self, patient_id: PatientId, record: &PatientRecord) -> WardResult<()>;
    /// Case-insensitive substring search over the name index. An empty
    /// fragment matches nothing.
    async fn search(&self, fragment: &str) -> WardResult<Vec<SearchIndexEntry>>;
}

/// Sled-backed implementation of `PatientStorageEngine`.
#[derive(Clone, Debug)]
pub struct SledPatientStorage {
    trees: WardTrees,
    codec: Arc<dyn DocumentCodec>,
    clock: Arc<dyn Clock>,
}

impl SledPatientStorage {
    pub fn new(trees: WardTrees, codec: Arc<dyn DocumentCodec>, clock: Arc<dyn Clock>) -> Self {
        SledPatientStorage { trees, codec, clock }
    }
}

/// Loads a patient row inside a transaction.
pub(crate) fn tx_load_patient(
    patients: &TransactionalTree,
    codec: &dyn DocumentCodec,
    patient_id: PatientId,
) -> ConflictableTransactionResult<PatientRecord, WardError> {
    let blob = patients.get(id_key(patient_id))?.ok_or(
        ConflictableTransactionError::Abort(WardError::NotFound(Entity::Patient, patient_id)),
    )?;
    decode_document(codec, &blob).map_err(ConflictableTransactionError::Abort)
}

/// Seals and writes a patient row inside a transaction.
pub(crate) fn tx_save_patient(
    patients: &TransactionalTree,
    codec: &dyn DocumentCodec,
    record: &PatientRecord,
) -> ConflictableTransactionResult<(), WardError> {
    let blob = encode_document(codec, record).map_err(ConflictableTransactionError::Abort)?;
    patients.insert(id_key(record.id), blob)?;
    Ok(())
}

#[async_trait]
impl PatientStorageEngine for SledPatientStorage {
    async fn create(&self, demographics: Demographics, actor: ActorId) -> WardResult<PatientId> {
        let now = self.clock.now();
        let full_name = demographics.full_name();
        let result = (&self.trees.patients, &self.trees.search, &self.trees.meta).transaction(
            |(patients, search, meta)| {
                let patient_id = tx_next_id(meta, PATIENT_SEQ)?;
                let record = PatientRecord::new(patient_id, demographics.clone(), actor, now);
                tx_save_patient(patients, self.codec.as_ref(), &record)?;
                search.insert(id_key(patient_id), full_name.as_bytes())?;
                Ok(patient_id)
            },
        );
        let patient_id = run_txn(result)?;
        info!(patient_id, actor, "patient registered");
        Ok(patient_id)
    }

    async fn load(&self, patient_id: PatientId) -> WardResult<PatientRecord> {
        ensure_valid_id(patient_id, "patient id")?;
        let blob = self
            .trees
            .patients
            .get(id_key(patient_id))?
            .ok_or(WardError::NotFound(Entity::Patient, patient_id))?;
        decode_document(self.codec.as_ref(), &blob)
    }

    async fn save(&self, patient_id: PatientId, record: &PatientRecord) -> WardResult<()> {
        ensure_valid_id(patient_id, "patient id")?;
        let blob = encode_document(self.codec.as_ref(), record)?;
        self.trees.patients.insert(id_key(patient_id), blob)?;
        Ok(())
    }

    async fn search(&self, fragment: &str) -> WardResult<Vec<SearchIndexEntry>> {
        let needle = fragment.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let mut hits = Vec::new();
        for item in self.trees.search.iter() {
            let (key, value) = item?;
            let full_name = String::from_utf8_lossy(&value).into_owned();
            if full_name.to_lowercase().contains(&needle) {
                hits.push(SearchIndexEntry {
                    patient_id: id_from_key(&key)?,
                    full_name,
                });
            }
        }
        debug!(fragment, hits = hits.len(), "name index searched");
        Ok(hits)
    }
}
