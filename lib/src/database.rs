// lib/src/database.rs

use std::sync::Arc;

use tracing::info;

use models::beds::BedOccupancy;
use models::bedticket::{ClinicalEntry, NewClinicalEntry};
use models::errors::WardResult;
use models::ids::{ActorId, BedId, PatientId, StayId};
use models::patient::{Demographics, PatientRecord, SearchIndexEntry};

use crate::codec::{DocumentCodec, EnvelopeCodec};
use crate::config::WardConfig;
use crate::engine::allocation::{AllocationEngine, SledAllocationEngine};
use crate::engine::query::QueryFacade;
use crate::storage_engine::bedticket_storage::SledBedTicketStorage;
use crate::storage_engine::patient_storage::SledPatientStorage;
use crate::storage_engine::WardTrees;
use crate::util::{Clock, SystemClock};

/// Owns the storage, the allocation engine and the query facade; the
/// convenience entry point collaborators construct.
#[derive(Clone, Debug)]
pub struct WardDatabase {
    engine: Arc<SledAllocationEngine>,
    query: QueryFacade,
}

impl WardDatabase {
    /// Opens the database described by `config` with the default codec and
    /// the system clock.
    pub fn open(config: &WardConfig) -> WardResult<Self> {
        let codec: Arc<dyn DocumentCodec> = Arc::new(EnvelopeCodec::new(&config.codec_key_id));
        Self::open_with(config, codec, Arc::new(SystemClock))
    }

    /// Opens the database with an explicit codec and clock.
    pub fn open_with(
        config: &WardConfig,
        codec: Arc<dyn DocumentCodec>,
        clock: Arc<dyn Clock>,
    ) -> WardResult<Self> {
        let mut sled_config = sled::Config::new().cache_capacity(config.cache_capacity);
        sled_config = match &config.data_directory {
            Some(path) => sled_config.path(path),
            None => sled_config.temporary(true),
        };
        let db = sled_config.open()?;
        let trees = WardTrees::open(db)?;

        let patients = Arc::new(SledPatientStorage::new(
            trees.clone(),
            codec.clone(),
            clock.clone(),
        ));
        let bedtickets = Arc::new(SledBedTicketStorage::new(
            trees.clone(),
            codec.clone(),
            clock.clone(),
        ));
        let engine = Arc::new(SledAllocationEngine::new(
            trees,
            patients.clone(),
            bedtickets.clone(),
            codec,
            clock,
            config.max_txn_retries,
        ));
        let query = QueryFacade::new(patients, bedtickets);
        info!("ward database opened");
        Ok(WardDatabase { engine, query })
    }

    /// The allocation engine.
    pub fn engine(&self) -> &Arc<SledAllocationEngine> {
        &self.engine
    }

    /// The read-only facade.
    pub fn query(&self) -> &QueryFacade {
        &self.query
    }

    // --- Proxy methods to the engine and facade for convenience ---

    pub async fn register_patient(
        &self,
        demographics: Demographics,
        actor: ActorId,
    ) -> WardResult<PatientId> {
        self.engine.register_patient(demographics, actor).await
    }

    pub async fn admit(&self, patient_id: PatientId, bed_id: BedId) -> WardResult<StayId> {
        self.engine.admit(patient_id, bed_id).await
    }

    pub async fn discharge(&self, patient_id: PatientId) -> WardResult<()> {
        self.engine.discharge(patient_id).await
    }

    pub async fn append_entry(
        &self,
        stay_id: StayId,
        entry: NewClinicalEntry,
        actor: ActorId,
    ) -> WardResult<ClinicalEntry> {
        self.engine.append_entry(stay_id, entry, actor).await
    }

    pub async fn read_entries(&self, stay_id: StayId) -> WardResult<Vec<ClinicalEntry>> {
        self.engine.read_entries(stay_id).await
    }

    pub async fn patient(&self, patient_id: PatientId) -> WardResult<PatientRecord> {
        self.query.patient(patient_id).await
    }

    pub async fn search(&self, fragment: &str) -> WardResult<Vec<SearchIndexEntry>> {
        self.query.search(fragment).await
    }

    pub async fn bed_board(&self) -> WardResult<Vec<BedOccupancy>> {
        self.query.bed_board().await
    }
}

#[cfg(test)]
mod tests {
    use super::WardDatabase;
    use crate::config::WardConfig;
    use models::patient::Demographics;

    #[tokio::test]
    async fn should_open_a_temporary_database_and_serve_queries() {
        let db = WardDatabase::open(&WardConfig::temporary()).unwrap();
        let demographics = Demographics {
            fname: "Jane".to_string(),
            lname: "Perera".to_string(),
            ..Demographics::default()
        };
        let pid = db.register_patient(demographics, 7).await.unwrap();

        let hits = db.search("jane").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].patient_id, pid);
        assert!(db.bed_board().await.unwrap().is_empty());
    }
}
