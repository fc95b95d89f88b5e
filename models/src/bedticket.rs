// models/src/bedticket.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of entry categories used by the ward forms.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryCategory {
    Diagnosis,
    Report,
    Other,
}

/// Descriptor of a file attached to a clinical entry. The payload lives in
/// file storage; only the descriptor rides in the entry log.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub original_name: String,
    pub stored_name: String,
    pub size: u64,
    pub content_type: String,
}

/// One clinical note in a stay's log.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClinicalEntry {
    /// Count-derived id, unique within the owning stay only.
    pub local_id: u64,
    pub category: EntryCategory,
    /// Free-text label refining the category.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
}

/// A clinical entry as submitted, before the store assigns its id and
/// timestamp.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NewClinicalEntry {
    pub category: EntryCategory,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl ClinicalEntry {
    /// Materializes a submitted entry for the head of a stay's log.
    pub fn from_new(new: NewClinicalEntry, local_id: u64, created_at: DateTime<Utc>) -> Self {
        ClinicalEntry {
            local_id,
            category: new.category,
            kind: new.kind,
            note: new.note,
            attachments: new.attachments,
            created_at,
        }
    }
}
