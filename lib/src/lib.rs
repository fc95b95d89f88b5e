// lib/src/lib.rs

pub mod codec;
pub mod config;
pub mod database;
pub mod engine;
pub mod storage_engine;
pub mod util;

pub use codec::{DocumentCodec, EnvelopeCodec};
pub use config::WardConfig;
pub use database::WardDatabase;
pub use engine::allocation::{AllocationEngine, SledAllocationEngine};
pub use engine::query::QueryFacade;
pub use storage_engine::bedticket_storage::{BedTicketStorageEngine, SledBedTicketStorage};
pub use storage_engine::patient_storage::{PatientStorageEngine, SledPatientStorage};
pub use util::{init_tracing, Clock, SystemClock};
