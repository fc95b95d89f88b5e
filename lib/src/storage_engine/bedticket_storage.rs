// lib/src/storage_engine/bedticket_storage.rs

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};
use sled::Transactional;
use tracing::debug;

use models::beds::BedOccupancy;
use models::bedticket::{ClinicalEntry, NewClinicalEntry};
use models::errors::{Entity, WardError, WardResult};
use models::ids::{ensure_valid_id, BedId, StayId};

use crate::codec::{decode_document, encode_document, DocumentCodec};
use crate::storage_engine::{decode_row, encode_row, id_key, run_txn, tx_next_id, WardTrees, STAY_SEQ};
use crate::util::Clock;

/// Storage row for one bed ticket.
///
/// The entry log is an opaque sealed blob, absent until the first entry.
/// `bed` is the slot claimed at admission and `closed_at` is stamped at
/// discharge, so the discharge and append paths only ever touch rows they
/// already hold under the transaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct StayRow {
    pub records: Option<Vec<u8>>,
    pub bed: Option<BedId>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl StayRow {
    pub(crate) fn fresh(bed: Option<BedId>) -> Self {
        StayRow {
            records: None,
            bed,
            closed_at: None,
        }
    }
}

/// Storage operations on bed tickets: the per-stay entry log and the
/// bed-occupancy table.
#[async_trait]
pub trait BedTicketStorageEngine: Send + Sync + std::fmt::Debug + 'static {
    /// Allocates a stay id and persists an empty entry log.
    async fn create_stay(&self) -> WardResult<StayId>;
    /// Returns a stay's entries, newest first; empty for a fresh stay.
    async fn load_entries(&self, stay_id: StayId) -> WardResult<Vec<ClinicalEntry>>;
    /// Appends an entry at the head of an active stay's log, assigning
    /// `local_id = count + 1` under the stay's row lock.
    async fn append_entry(&self, stay_id: StayId, entry: NewClinicalEntry)
        -> WardResult<ClinicalEntry>;
    /// The bed-occupancy board, in bed-id order.
    async fn bed_board(&self) -> WardResult<Vec<BedOccupancy>>;
}

/// Sled-backed implementation of `BedTicketStorageEngine`.
#[derive(Clone, Debug)]
pub struct SledBedTicketStorage {
    trees: WardTrees,
    codec: Arc<dyn DocumentCodec>,
    clock: Arc<dyn Clock>,
}

impl SledBedTicketStorage {
    pub fn new(trees: WardTrees, codec: Arc<dyn DocumentCodec>, clock: Arc<dyn Clock>) -> Self {
        SledBedTicketStorage { trees, codec, clock }
    }
}

/// Creates a fresh stay row inside a transaction.
pub(crate) fn tx_create_stay(
    bedtickets: &TransactionalTree,
    meta: &TransactionalTree,
    bed: Option<BedId>,
) -> ConflictableTransactionResult<StayId, WardError> {
    let stay_id = tx_next_id(meta, STAY_SEQ)?;
    let row = encode_row(&StayRow::fresh(bed)).map_err(ConflictableTransactionError::Abort)?;
    bedtickets.insert(id_key(stay_id), row)?;
    Ok(stay_id)
}

/// Loads a stay row inside a transaction.
pub(crate) fn tx_load_stay(
    bedtickets: &TransactionalTree,
    stay_id: StayId,
) -> ConflictableTransactionResult<StayRow, WardError> {
    let raw = bedtickets.get(id_key(stay_id))?.ok_or(
        ConflictableTransactionError::Abort(WardError::NotFound(Entity::Stay, stay_id)),
    )?;
    decode_row(&raw).map_err(ConflictableTransactionError::Abort)
}

/// Writes a stay row back inside a transaction.
pub(crate) fn tx_save_stay(
    bedtickets: &TransactionalTree,
    stay_id: StayId,
    row: &StayRow,
) -> ConflictableTransactionResult<(), WardError> {
    let raw = encode_row(row).map_err(ConflictableTransactionError::Abort)?;
    bedtickets.insert(id_key(stay_id), raw)?;
    Ok(())
}

/// Opens a row's sealed entry log; a fresh stay has no log yet.
pub(crate) fn open_entry_log(
    codec: &dyn DocumentCodec,
    row: &StayRow,
) -> WardResult<Vec<ClinicalEntry>> {
    match &row.records {
        Some(blob) => decode_document(codec, blob),
        None => Ok(Vec::new()),
    }
}

/// The append transaction: load, assign `count + 1`, prepend, persist.
/// One serialized read-modify-write per stay row, so concurrent appends
/// cannot hand out the same `local_id`.
pub(crate) fn append_entry_txn(
    trees: &WardTrees,
    codec: &dyn DocumentCodec,
    stay_id: StayId,
    entry: &NewClinicalEntry,
    now: DateTime<Utc>,
) -> WardResult<ClinicalEntry> {
    let result = trees.bedtickets.transaction(|bedtickets| {
        let mut row = tx_load_stay(bedtickets, stay_id)?;
        if row.closed_at.is_some() {
            return Err(ConflictableTransactionError::Abort(WardError::StayClosed(
                stay_id,
            )));
        }
        let mut entries =
            open_entry_log(codec, &row).map_err(ConflictableTransactionError::Abort)?;
        let appended = ClinicalEntry::from_new(entry.clone(), entries.len() as u64 + 1, now);
        entries.insert(0, appended.clone());
        row.records =
            Some(encode_document(codec, &entries).map_err(ConflictableTransactionError::Abort)?);
        tx_save_stay(bedtickets, stay_id, &row)?;
        Ok(appended)
    });
    run_txn(result)
}

#[async_trait]
impl BedTicketStorageEngine for SledBedTicketStorage {
    async fn create_stay(&self) -> WardResult<StayId> {
        let result = (&self.trees.bedtickets, &self.trees.meta)
            .transaction(|(bedtickets, meta)| tx_create_stay(bedtickets, meta, None));
        run_txn(result)
    }

    async fn load_entries(&self, stay_id: StayId) -> WardResult<Vec<ClinicalEntry>> {
        ensure_valid_id(stay_id, "stay id")?;
        let raw = self
            .trees
            .bedtickets
            .get(id_key(stay_id))?
            .ok_or(WardError::NotFound(Entity::Stay, stay_id))?;
        let row: StayRow = decode_row(&raw)?;
        open_entry_log(self.codec.as_ref(), &row)
    }

    async fn append_entry(
        &self,
        stay_id: StayId,
        entry: NewClinicalEntry,
    ) -> WardResult<ClinicalEntry> {
        ensure_valid_id(stay_id, "stay id")?;
        let appended =
            append_entry_txn(&self.trees, self.codec.as_ref(), stay_id, &entry, self.clock.now())?;
        debug!(stay_id, local_id = appended.local_id, "clinical entry appended");
        Ok(appended)
    }

    async fn bed_board(&self) -> WardResult<Vec<BedOccupancy>> {
        let mut rows = Vec::new();
        // big-endian keys iterate in bed-id order
        for item in self.trees.beds.iter() {
            let (_key, value) = item?;
            rows.push(decode_row::<BedOccupancy>(&value)?);
        }
        Ok(rows)
    }
}
