// models/src/lib.rs

pub mod beds;
pub mod bedticket;
pub mod errors;
pub mod ids;
pub mod patient;

pub use beds::BedOccupancy;
pub use bedticket::{Attachment, ClinicalEntry, EntryCategory, NewClinicalEntry};
pub use errors::{Entity, WardError, WardResult};
pub use ids::{ActorId, BedId, PatientId, StayId};
pub use patient::{
    AdmissionInfo, DateParts, Demographics, PatientRecord, SearchIndexEntry, StayHistoryEntry,
};
