// lib/src/engine/query.rs

use std::sync::Arc;

use models::beds::BedOccupancy;
use models::bedticket::ClinicalEntry;
use models::errors::WardResult;
use models::ids::{PatientId, StayId};
use models::patient::{PatientRecord, SearchIndexEntry};

use crate::storage_engine::bedticket_storage::BedTicketStorageEngine;
use crate::storage_engine::patient_storage::PatientStorageEngine;

/// Read-only accessors over the stores. Bypasses the allocation engine
/// entirely; nothing here mutates.
#[derive(Clone, Debug)]
pub struct QueryFacade {
    patients: Arc<dyn PatientStorageEngine>,
    bedtickets: Arc<dyn BedTicketStorageEngine>,
}

impl QueryFacade {
    pub fn new(
        patients: Arc<dyn PatientStorageEngine>,
        bedtickets: Arc<dyn BedTicketStorageEngine>,
    ) -> Self {
        QueryFacade { patients, bedtickets }
    }

    /// Fetches and opens one patient document.
    pub async fn patient(&self, patient_id: PatientId) -> WardResult<PatientRecord> {
        self.patients.load(patient_id).await
    }

    /// Case-insensitive name search over the clear-text index.
    pub async fn search(&self, fragment: &str) -> WardResult<Vec<SearchIndexEntry>> {
        self.patients.search(fragment).await
    }

    /// The ward's bed-occupancy board.
    pub async fn bed_board(&self) -> WardResult<Vec<BedOccupancy>> {
        self.bedtickets.bed_board().await
    }

    /// A stay's entry log, newest first.
    pub async fn stay_entries(&self, stay_id: StayId) -> WardResult<Vec<ClinicalEntry>> {
        self.bedtickets.load_entries(stay_id).await
    }
}
