// models/src/beds.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BedId, PatientId, StayId};

/// One row of the ward's bed-occupancy board.
///
/// Clear text on purpose: the board is the denormalized read surface for
/// the ward desk, like the name index. `patient_id` and `stay_id` are set
/// and cleared together.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BedOccupancy {
    pub bed_id: BedId,
    pub patient_id: Option<PatientId>,
    pub stay_id: Option<StayId>,
    /// Occupant full name, denormalized for display.
    pub occupant: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl BedOccupancy {
    /// A vacant bed row.
    pub fn vacant(bed_id: BedId, updated_at: DateTime<Utc>) -> Self {
        BedOccupancy {
            bed_id,
            patient_id: None,
            stay_id: None,
            occupant: None,
            updated_at,
        }
    }

    pub fn is_vacant(&self) -> bool {
        self.patient_id.is_none()
    }

    /// Claims the bed for a stay.
    pub fn claim(&mut self, patient_id: PatientId, stay_id: StayId, occupant: String, at: DateTime<Utc>) {
        self.patient_id = Some(patient_id);
        self.stay_id = Some(stay_id);
        self.occupant = Some(occupant);
        self.updated_at = at;
    }

    /// Releases the bed; the row stays on the board.
    pub fn release(&mut self, at: DateTime<Utc>) {
        self.patient_id = None;
        self.stay_id = None;
        self.occupant = None;
        self.updated_at = at;
    }
}
