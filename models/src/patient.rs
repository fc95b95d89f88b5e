// models/src/patient.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{WardError, WardResult};
use crate::ids::{ActorId, PatientId, StayId};

/// A calendar date split into parts, as the intake forms capture it.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct DateParts {
    pub d: u8,
    pub m: u8,
    pub y: i32,
}

/// Admission-desk metadata recorded at registration time.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct AdmissionInfo {
    #[serde(default)]
    pub date: DateParts,
    #[serde(default)]
    pub doctor_in_charge: String,
}

/// Patient demographics as captured by the registration form.
///
/// The whole struct travels inside the patient's sealed blob; the only
/// clear-text projection of it is the full name in the search index.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    pub fname: String,
    pub lname: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub dob: DateParts,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub admission: AdmissionInfo,
    /// Additional named fields the intake form may carry.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Demographics {
    /// The clear-text name stored in the search index.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.fname.trim(), self.lname.trim())
            .trim()
            .to_string()
    }
}

/// One admission episode in a patient's history. Append-only except for
/// the in-place `discharged_at` update on discharge.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StayHistoryEntry {
    pub stay_id: StayId,
    pub admitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discharged_at: Option<DateTime<Utc>>,
}

impl StayHistoryEntry {
    pub fn is_open(&self) -> bool {
        self.discharged_at.is_none()
    }
}

/// The canonical patient document, persisted as one opaque sealed blob
/// keyed by the patient id.
///
/// Invariant: `active_stay` is `Some(s)` exactly when one history entry is
/// open and its `stay_id` is `s`. The only mutations are the `open_stay` /
/// `close_stay` transitions below, which the allocation engine runs inside
/// a load-lock-mutate-persist cycle on the patient's row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: PatientId,
    pub demographics: Demographics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_stay: Option<StayId>,
    #[serde(default)]
    pub stay_history: Vec<StayHistoryEntry>,
    pub created_by: ActorId,
    pub created_at: DateTime<Utc>,
}

impl PatientRecord {
    /// A freshly registered patient: no stays, nothing active.
    pub fn new(
        id: PatientId,
        demographics: Demographics,
        created_by: ActorId,
        created_at: DateTime<Utc>,
    ) -> Self {
        PatientRecord {
            id,
            demographics,
            active_stay: None,
            stay_history: Vec::new(),
            created_by,
            created_at,
        }
    }

    /// Opens a new stay: sets the active pointer and appends the history
    /// entry. Fails with `AlreadyAdmitted` while another stay is open.
    pub fn open_stay(&mut self, stay_id: StayId, admitted_at: DateTime<Utc>) -> WardResult<()> {
        if self.active_stay.is_some() {
            return Err(WardError::AlreadyAdmitted(self.id));
        }
        self.active_stay = Some(stay_id);
        self.stay_history.push(StayHistoryEntry {
            stay_id,
            admitted_at,
            discharged_at: None,
        });
        Ok(())
    }

    /// Closes the active stay: clears the pointer and stamps the matching
    /// history entry. Returns the closed stay's id.
    pub fn close_stay(&mut self, discharged_at: DateTime<Utc>) -> WardResult<StayId> {
        let stay_id = self
            .active_stay
            .take()
            .ok_or(WardError::NoActiveStay(self.id))?;
        match self.stay_history.iter_mut().find(|h| h.stay_id == stay_id) {
            Some(entry) => entry.discharged_at = Some(discharged_at),
            None => {
                return Err(WardError::CorruptDocument(format!(
                    "patient {} history has no entry for stay {}",
                    self.id, stay_id
                )));
            }
        }
        Ok(stay_id)
    }
}

/// One clear-text row of the denormalized name index.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SearchIndexEntry {
    pub patient_id: PatientId,
    pub full_name: String,
}
