// models/src/errors.rs

use std::fmt;

pub use thiserror::Error;

/// The kind of record an identifier failed to resolve to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Entity {
    Patient,
    Stay,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Patient => write!(f, "patient"),
            Entity::Stay => write!(f, "stay"),
        }
    }
}

/// Errors surfaced by the admission engine and its stores.
///
/// Callers see exactly these kinds; raw storage or serialization errors
/// never cross the engine boundary. Every failing engine operation has
/// rolled its transaction back before one of these is returned.
#[derive(Debug, Error)]
pub enum WardError {
    #[error("identifier '{0}' is not a positive integer")]
    InvalidId(String),
    #[error("{0} {1} was not found")]
    NotFound(Entity, u64),
    #[error("bed {0} already has an occupant")]
    BedOccupied(u64),
    #[error("patient {0} already has an active bed ticket")]
    AlreadyAdmitted(u64),
    #[error("patient {0} has no active bed ticket")]
    NoActiveStay(u64),
    #[error("stay {0} is discharged and no longer accepts entries")]
    StayClosed(u64),
    #[error("stored document is corrupt: {0}")]
    CorruptDocument(String),
    #[error("document serialization failed: {0}")]
    Serialization(String),
    #[error("transaction conflict: {0}")]
    TransactionConflict(String),
    #[error("storage unavailable: {0}")]
    StoreUnavailable(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl WardError {
    /// True when the caller must change the request; retrying as-is cannot
    /// succeed.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            WardError::InvalidId(_)
                | WardError::NotFound(..)
                | WardError::BedOccupied(_)
                | WardError::AlreadyAdmitted(_)
                | WardError::NoActiveStay(_)
                | WardError::StayClosed(_)
        )
    }

    /// True when re-running the whole operation from fresh reads may
    /// succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WardError::TransactionConflict(_))
    }
}

#[cfg(feature = "sled-errors")]
impl From<sled::Error> for WardError {
    fn from(err: sled::Error) -> Self {
        WardError::StoreUnavailable(format!("sled: {}", err))
    }
}

#[cfg(feature = "bincode-errors")]
impl From<bincode::error::EncodeError> for WardError {
    fn from(err: bincode::error::EncodeError) -> Self {
        WardError::Serialization(format!("bincode encode error: {}", err))
    }
}

#[cfg(feature = "bincode-errors")]
impl From<bincode::error::DecodeError> for WardError {
    fn from(err: bincode::error::DecodeError) -> Self {
        WardError::CorruptDocument(format!("bincode decode error: {}", err))
    }
}

/// A type alias for a `Result` that returns a `WardError` on failure.
pub type WardResult<T> = Result<T, WardError>;

#[cfg(test)]
mod tests {
    use super::{Entity, WardError};

    #[test]
    fn should_classify_client_errors() {
        assert!(WardError::InvalidId("x".to_string()).is_client_error());
        assert!(WardError::NotFound(Entity::Patient, 3).is_client_error());
        assert!(WardError::BedOccupied(5).is_client_error());
        assert!(WardError::AlreadyAdmitted(1).is_client_error());
        assert!(WardError::NoActiveStay(1).is_client_error());
        assert!(WardError::StayClosed(9).is_client_error());
        assert!(!WardError::StoreUnavailable("down".to_string()).is_client_error());
        assert!(!WardError::CorruptDocument("bad".to_string()).is_client_error());
    }

    #[test]
    fn should_retry_only_transaction_conflicts() {
        assert!(WardError::TransactionConflict("busy".to_string()).is_retryable());
        assert!(!WardError::StoreUnavailable("down".to_string()).is_retryable());
        assert!(!WardError::BedOccupied(5).is_retryable());
    }

    #[test]
    fn should_render_entity_in_not_found() {
        let err = WardError::NotFound(Entity::Stay, 42);
        assert_eq!(err.to_string(), "stay 42 was not found");
    }
}
