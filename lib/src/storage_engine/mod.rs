// lib/src/storage_engine/mod.rs

pub mod bedticket_storage;
pub mod patient_storage;

use std::fmt;

use bincode::config::{self, BigEndian, Configuration, Fixint};
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::{Db, Tree};

use models::errors::{WardError, WardResult};

/// Tree (table) names inside the database.
pub(crate) const PATIENTS_TREE: &str = "patients";
pub(crate) const SEARCH_TREE: &str = "patients_search";
pub(crate) const BEDTICKETS_TREE: &str = "bedtickets";
pub(crate) const BEDS_TREE: &str = "beds";
pub(crate) const META_TREE: &str = "meta";

/// Sequence keys in the meta tree.
pub(crate) const PATIENT_SEQ: &[u8] = b"patients_seq";
pub(crate) const STAY_SEQ: &[u8] = b"bedtickets_seq";

/// The set of trees backing the ward database. Tree handles are cheap
/// clones of the same underlying storage, so stores and the allocation
/// engine can share them and open transactions spanning any subset.
#[derive(Clone)]
pub struct WardTrees {
    pub(crate) db: Db,
    pub(crate) patients: Tree,
    pub(crate) search: Tree,
    pub(crate) bedtickets: Tree,
    pub(crate) beds: Tree,
    pub(crate) meta: Tree,
}

impl fmt::Debug for WardTrees {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WardTrees").finish_non_exhaustive()
    }
}

impl WardTrees {
    /// Opens every tree the engine uses on the given database.
    pub fn open(db: Db) -> WardResult<Self> {
        let patients = db.open_tree(PATIENTS_TREE)?;
        let search = db.open_tree(SEARCH_TREE)?;
        let bedtickets = db.open_tree(BEDTICKETS_TREE)?;
        let beds = db.open_tree(BEDS_TREE)?;
        let meta = db.open_tree(META_TREE)?;
        Ok(WardTrees {
            db,
            patients,
            search,
            bedtickets,
            beds,
            meta,
        })
    }

    /// Flushes everything to durable storage.
    pub fn flush(&self) -> WardResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// Big-endian row key for an id, so iteration yields rows in id order.
pub(crate) fn id_key(id: u64) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

pub(crate) fn id_from_key(key: &[u8]) -> WardResult<u64> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| WardError::CorruptDocument("malformed row key".to_string()))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Standard bincode configuration for storage rows.
fn bincode_config() -> Configuration<BigEndian, Fixint> {
    config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

pub(crate) fn encode_row<T: Serialize>(value: &T) -> WardResult<Vec<u8>> {
    Ok(encode_to_vec(value, bincode_config())?)
}

pub(crate) fn decode_row<T: DeserializeOwned>(bytes: &[u8]) -> WardResult<T> {
    let (value, _) = decode_from_slice(bytes, bincode_config())?;
    Ok(value)
}

/// Allocates the next id from a sequence key, inside the owning
/// transaction; an aborted transaction never burns an id.
pub(crate) fn tx_next_id(
    meta: &TransactionalTree,
    seq: &[u8],
) -> ConflictableTransactionResult<u64, WardError> {
    let next = match meta.get(seq)? {
        Some(raw) => {
            let bytes: [u8; 8] = raw.as_ref().try_into().map_err(|_| {
                ConflictableTransactionError::Abort(WardError::CorruptDocument(
                    "malformed sequence counter".to_string(),
                ))
            })?;
            u64::from_be_bytes(bytes) + 1
        }
        None => 1,
    };
    meta.insert(seq, &next.to_be_bytes()[..])?;
    Ok(next)
}

/// Maps a finished transaction into a ward result: aborts carry the domain
/// error through, storage failures surface as `StoreUnavailable`.
pub(crate) fn run_txn<T>(
    result: sled::transaction::TransactionResult<T, WardError>,
) -> WardResult<T> {
    result.map_err(|err| match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => WardError::from(e),
    })
}

#[cfg(test)]
mod tests {
    use super::{id_from_key, id_key, run_txn, tx_next_id, WardTrees, PATIENT_SEQ};
    use models::errors::WardError;

    fn trees() -> WardTrees {
        let db = sled::Config::new().temporary(true).open().unwrap();
        WardTrees::open(db).unwrap()
    }

    #[test]
    fn should_round_trip_row_keys() {
        assert_eq!(id_from_key(&id_key(42)).unwrap(), 42);
        assert!(matches!(
            id_from_key(b"short"),
            Err(WardError::CorruptDocument(_))
        ));
    }

    #[test]
    fn should_allocate_dense_monotonic_ids() {
        let trees = trees();
        for expected in 1..=5u64 {
            let allocated = run_txn(
                trees
                    .meta
                    .transaction(|meta| tx_next_id(meta, PATIENT_SEQ)),
            )
            .unwrap();
            assert_eq!(allocated, expected);
        }
    }

    #[test]
    fn should_keep_sequences_independent() {
        let trees = trees();
        let patient = run_txn(
            trees
                .meta
                .transaction(|meta| tx_next_id(meta, PATIENT_SEQ)),
        )
        .unwrap();
        let stay = run_txn(
            trees
                .meta
                .transaction(|meta| tx_next_id(meta, super::STAY_SEQ)),
        )
        .unwrap();
        assert_eq!(patient, 1);
        assert_eq!(stay, 1);
    }
}
