// lib/src/engine/allocation.rs

use std::sync::Arc;

use async_trait::async_trait;
use sled::transaction::ConflictableTransactionError;
use sled::Transactional;
use tracing::{debug, info};

use models::beds::BedOccupancy;
use models::bedticket::{ClinicalEntry, NewClinicalEntry};
use models::errors::{WardError, WardResult};
use models::ids::{ensure_valid_id, ActorId, BedId, PatientId, StayId};
use models::patient::Demographics;

use crate::codec::DocumentCodec;
use crate::storage_engine::bedticket_storage::{
    append_entry_txn, tx_create_stay, tx_load_stay, tx_save_stay, BedTicketStorageEngine,
    SledBedTicketStorage,
};
use crate::storage_engine::patient_storage::{
    tx_load_patient, tx_save_patient, PatientStorageEngine, SledPatientStorage,
};
use crate::storage_engine::{decode_row, encode_row, id_key, run_txn, WardTrees};
use crate::util::{with_retries, Clock};

/// The cross-store admission state machine.
///
/// Every operation runs as one serializable transaction over the trees it
/// touches; on any error the transaction aborts and no partial state is
/// visible to later reads. `admit` opens a stay, `discharge` closes it,
/// and entries can only be appended while it is open.
#[async_trait]
pub trait AllocationEngine: Send + Sync + std::fmt::Debug + 'static {
    /// Registers a new patient record plus its search-index row.
    async fn register_patient(
        &self,
        demographics: Demographics,
        actor: ActorId,
    ) -> WardResult<PatientId>;
    /// Opens a stay for the patient and claims the bed.
    async fn admit(&self, patient_id: PatientId, bed_id: BedId) -> WardResult<StayId>;
    /// Closes the patient's active stay and frees its bed.
    async fn discharge(&self, patient_id: PatientId) -> WardResult<()>;
    /// Appends a clinical entry to an active stay's log.
    async fn append_entry(
        &self,
        stay_id: StayId,
        entry: NewClinicalEntry,
        actor: ActorId,
    ) -> WardResult<ClinicalEntry>;
    /// Reads a stay's entries, newest first.
    async fn read_entries(&self, stay_id: StayId) -> WardResult<Vec<ClinicalEntry>>;
}

/// Sled-backed allocation engine, composing the patient and bed-ticket
/// stores inside shared serializable transactions.
#[derive(Clone, Debug)]
pub struct SledAllocationEngine {
    trees: WardTrees,
    patients: Arc<SledPatientStorage>,
    bedtickets: Arc<SledBedTicketStorage>,
    codec: Arc<dyn DocumentCodec>,
    clock: Arc<dyn Clock>,
    max_txn_retries: u32,
}

impl SledAllocationEngine {
    pub fn new(
        trees: WardTrees,
        patients: Arc<SledPatientStorage>,
        bedtickets: Arc<SledBedTicketStorage>,
        codec: Arc<dyn DocumentCodec>,
        clock: Arc<dyn Clock>,
        max_txn_retries: u32,
    ) -> Self {
        SledAllocationEngine {
            trees,
            patients,
            bedtickets,
            codec,
            clock,
            max_txn_retries,
        }
    }
}

#[async_trait]
impl AllocationEngine for SledAllocationEngine {
    async fn register_patient(
        &self,
        demographics: Demographics,
        actor: ActorId,
    ) -> WardResult<PatientId> {
        self.patients.create(demographics, actor).await
    }

    async fn admit(&self, patient_id: PatientId, bed_id: BedId) -> WardResult<StayId> {
        ensure_valid_id(patient_id, "patient id")?;
        ensure_valid_id(bed_id, "bed id")?;
        let now = self.clock.now();
        let codec = self.codec.as_ref();
        let stay_id = with_retries(self.max_txn_retries, || {
            let result = (
                &self.trees.patients,
                &self.trees.bedtickets,
                &self.trees.beds,
                &self.trees.meta,
            )
                .transaction(|(patients, bedtickets, beds, meta)| {
                    // the bed must be free before anything else is touched
                    let mut bed_row = match beds.get(id_key(bed_id))? {
                        Some(raw) => decode_row::<BedOccupancy>(&raw)
                            .map_err(ConflictableTransactionError::Abort)?,
                        None => BedOccupancy::vacant(bed_id, now),
                    };
                    if !bed_row.is_vacant() {
                        return Err(ConflictableTransactionError::Abort(WardError::BedOccupied(
                            bed_id,
                        )));
                    }

                    let mut record = tx_load_patient(patients, codec, patient_id)?;
                    if record.active_stay.is_some() {
                        return Err(ConflictableTransactionError::Abort(
                            WardError::AlreadyAdmitted(patient_id),
                        ));
                    }

                    let stay_id = tx_create_stay(bedtickets, meta, Some(bed_id))?;
                    record
                        .open_stay(stay_id, now)
                        .map_err(ConflictableTransactionError::Abort)?;
                    tx_save_patient(patients, codec, &record)?;

                    bed_row.claim(patient_id, stay_id, record.demographics.full_name(), now);
                    beds.insert(
                        id_key(bed_id),
                        encode_row(&bed_row).map_err(ConflictableTransactionError::Abort)?,
                    )?;
                    Ok(stay_id)
                });
            run_txn(result)
        })?;
        info!(patient_id, bed_id, stay_id, "patient admitted");
        Ok(stay_id)
    }

    async fn discharge(&self, patient_id: PatientId) -> WardResult<()> {
        ensure_valid_id(patient_id, "patient id")?;
        let now = self.clock.now();
        let codec = self.codec.as_ref();
        let (stay_id, bed) = with_retries(self.max_txn_retries, || {
            let result = (&self.trees.patients, &self.trees.bedtickets, &self.trees.beds)
                .transaction(|(patients, bedtickets, beds)| {
                    let mut record = tx_load_patient(patients, codec, patient_id)?;
                    let stay_id = record
                        .close_stay(now)
                        .map_err(ConflictableTransactionError::Abort)?;
                    tx_save_patient(patients, codec, &record)?;

                    let mut stay = tx_load_stay(bedtickets, stay_id)?;
                    stay.closed_at = Some(now);
                    let bed = stay.bed;
                    tx_save_stay(bedtickets, stay_id, &stay)?;

                    // free the bed this stay was holding
                    if let Some(bed_id) = bed {
                        if let Some(raw) = beds.get(id_key(bed_id))? {
                            let mut bed_row = decode_row::<BedOccupancy>(&raw)
                                .map_err(ConflictableTransactionError::Abort)?;
                            if bed_row.stay_id == Some(stay_id) {
                                bed_row.release(now);
                                beds.insert(
                                    id_key(bed_id),
                                    encode_row(&bed_row)
                                        .map_err(ConflictableTransactionError::Abort)?,
                                )?;
                            }
                        }
                    }
                    Ok((stay_id, bed))
                });
            run_txn(result)
        })?;
        info!(patient_id, stay_id, bed = ?bed, "patient discharged");
        Ok(())
    }

    async fn append_entry(
        &self,
        stay_id: StayId,
        entry: NewClinicalEntry,
        actor: ActorId,
    ) -> WardResult<ClinicalEntry> {
        ensure_valid_id(stay_id, "stay id")?;
        let now = self.clock.now();
        let codec = self.codec.as_ref();
        let span = tracing::info_span!("append_entry", stay_id, actor);
        let _guard = span.enter();
        let appended = with_retries(self.max_txn_retries, || {
            append_entry_txn(&self.trees, codec, stay_id, &entry, now)
        })?;
        debug!(local_id = appended.local_id, "clinical entry recorded");
        Ok(appended)
    }

    async fn read_entries(&self, stay_id: StayId) -> WardResult<Vec<ClinicalEntry>> {
        self.bedtickets.load_entries(stay_id).await
    }
}

#[cfg(test)]
mod tests {
    use crate::config::WardConfig;
    use crate::database::WardDatabase;
    use models::bedticket::{EntryCategory, NewClinicalEntry};
    use models::errors::WardError;
    use models::patient::Demographics;

    fn demographics(fname: &str, lname: &str) -> Demographics {
        Demographics {
            fname: fname.to_string(),
            lname: lname.to_string(),
            ..Demographics::default()
        }
    }

    fn note(kind: &str) -> NewClinicalEntry {
        NewClinicalEntry {
            category: EntryCategory::Diagnosis,
            kind: kind.to_string(),
            note: "stable".to_string(),
            attachments: Vec::new(),
        }
    }

    fn open_db() -> WardDatabase {
        WardDatabase::open(&WardConfig::temporary()).expect("open temporary database")
    }

    #[tokio::test]
    async fn should_set_active_stay_and_claim_bed_on_admit() {
        let db = open_db();
        let pid = db
            .register_patient(demographics("Jane", "Perera"), 7)
            .await
            .unwrap();
        let stay = db.admit(pid, 5).await.unwrap();

        let record = db.patient(pid).await.unwrap();
        assert_eq!(record.active_stay, Some(stay));
        assert_eq!(record.stay_history.len(), 1);
        assert_eq!(record.stay_history[0].stay_id, stay);
        assert!(record.stay_history[0].is_open());

        let board = db.bed_board().await.unwrap();
        let bed = board.iter().find(|b| b.bed_id == 5).unwrap();
        assert_eq!(bed.patient_id, Some(pid));
        assert_eq!(bed.stay_id, Some(stay));
        assert_eq!(bed.occupant.as_deref(), Some("Jane Perera"));
    }

    #[tokio::test]
    async fn should_refuse_admitting_an_admitted_patient() {
        let db = open_db();
        let pid = db
            .register_patient(demographics("Jane", "Perera"), 7)
            .await
            .unwrap();
        db.admit(pid, 5).await.unwrap();
        // a different bed changes nothing
        let err = db.admit(pid, 6).await.unwrap_err();
        assert!(matches!(err, WardError::AlreadyAdmitted(p) if p == pid));
    }

    #[tokio::test]
    async fn should_refuse_occupied_beds_without_touching_the_caller() {
        let db = open_db();
        let p1 = db
            .register_patient(demographics("Jane", "Perera"), 7)
            .await
            .unwrap();
        let p2 = db
            .register_patient(demographics("John", "Silva"), 7)
            .await
            .unwrap();
        db.admit(p1, 3).await.unwrap();

        let err = db.admit(p2, 3).await.unwrap_err();
        assert!(matches!(err, WardError::BedOccupied(3)));

        // the losing patient's record carries no trace of the attempt
        let record = db.patient(p2).await.unwrap();
        assert_eq!(record.active_stay, None);
        assert!(record.stay_history.is_empty());
    }

    #[tokio::test]
    async fn should_close_history_and_free_bed_on_discharge() {
        let db = open_db();
        let pid = db
            .register_patient(demographics("Jane", "Perera"), 7)
            .await
            .unwrap();
        let stay = db.admit(pid, 5).await.unwrap();
        db.discharge(pid).await.unwrap();

        let record = db.patient(pid).await.unwrap();
        assert_eq!(record.active_stay, None);
        assert_eq!(record.stay_history.len(), 1);
        assert_eq!(record.stay_history[0].stay_id, stay);
        assert!(record.stay_history[0].discharged_at.is_some());

        let board = db.bed_board().await.unwrap();
        let bed = board.iter().find(|b| b.bed_id == 5).unwrap();
        assert!(bed.is_vacant());
        assert_eq!(bed.occupant, None);
    }

    #[tokio::test]
    async fn should_refuse_discharge_without_active_stay() {
        let db = open_db();
        let pid = db
            .register_patient(demographics("Jane", "Perera"), 7)
            .await
            .unwrap();
        let err = db.discharge(pid).await.unwrap_err();
        assert!(matches!(err, WardError::NoActiveStay(p) if p == pid));
    }

    #[tokio::test]
    async fn should_append_newest_first_without_duplicate_ids() {
        let db = open_db();
        let pid = db
            .register_patient(demographics("Jane", "Perera"), 7)
            .await
            .unwrap();
        let stay = db.admit(pid, 5).await.unwrap();
        for i in 1..=4u64 {
            let appended = db.append_entry(stay, note(&format!("note {i}")), 7).await.unwrap();
            assert_eq!(appended.local_id, i);
        }
        let entries = db.read_entries(stay).await.unwrap();
        let ids: Vec<u64> = entries.iter().map(|e| e.local_id).collect();
        assert_eq!(ids, vec![4, 3, 2, 1]);
    }

    #[tokio::test]
    async fn should_refuse_entries_on_a_discharged_stay() {
        let db = open_db();
        let pid = db
            .register_patient(demographics("Jane", "Perera"), 7)
            .await
            .unwrap();
        let stay = db.admit(pid, 5).await.unwrap();
        db.append_entry(stay, note("initial"), 7).await.unwrap();
        db.discharge(pid).await.unwrap();

        let err = db.append_entry(stay, note("late addendum"), 7).await.unwrap_err();
        assert!(matches!(err, WardError::StayClosed(s) if s == stay));
        // the closed log is still readable
        assert_eq!(db.read_entries(stay).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn should_validate_ids_before_any_work() {
        let db = open_db();
        assert!(matches!(
            db.admit(0, 5).await,
            Err(WardError::InvalidId(_))
        ));
        assert!(matches!(
            db.admit(1, 0).await,
            Err(WardError::InvalidId(_))
        ));
        assert!(matches!(
            db.discharge(0).await,
            Err(WardError::InvalidId(_))
        ));
        assert!(matches!(
            db.append_entry(0, note("x"), 7).await,
            Err(WardError::InvalidId(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn should_give_one_bed_to_exactly_one_of_two_racers() {
        let db = open_db();
        let p1 = db
            .register_patient(demographics("Jane", "Perera"), 7)
            .await
            .unwrap();
        let p2 = db
            .register_patient(demographics("John", "Silva"), 7)
            .await
            .unwrap();

        let db1 = db.clone();
        let db2 = db.clone();
        let h1 = tokio::spawn(async move { db1.admit(p1, 9).await });
        let h2 = tokio::spawn(async move { db2.admit(p2, 9).await });
        let results = [h1.await.unwrap(), h2.await.unwrap()];

        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        let err = results.into_iter().find_map(Result::err).unwrap();
        assert!(matches!(err, WardError::BedOccupied(9)));

        let board = db.bed_board().await.unwrap();
        let bed = board.iter().find(|b| b.bed_id == 9).unwrap();
        assert!(!bed.is_vacant());
    }

    #[tokio::test]
    async fn should_run_the_full_admission_cycle() {
        let db = open_db();
        let pid = db
            .register_patient(demographics("Jane", "Perera"), 7)
            .await
            .unwrap();
        let stay = db.admit(pid, 5).await.unwrap();

        let first = db.append_entry(stay, note("initial"), 7).await.unwrap();
        assert_eq!(first.local_id, 1);

        db.discharge(pid).await.unwrap();
        let record = db.patient(pid).await.unwrap();
        assert_eq!(record.active_stay, None);
        assert_eq!(record.stay_history.len(), 1);
        assert!(record.stay_history[0].discharged_at.is_some());

        // bed and patient are both free again
        let second_stay = db.admit(pid, 5).await.unwrap();
        assert_ne!(second_stay, stay);
        let record = db.patient(pid).await.unwrap();
        assert_eq!(record.active_stay, Some(second_stay));
        assert_eq!(record.stay_history.len(), 2);
    }
}
