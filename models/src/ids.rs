// models/src/ids.rs

use crate::errors::{WardError, WardResult};

/// Patient ids are assigned by the store at registration and never reused.
pub type PatientId = u64;

/// Stay (bed ticket) ids are globally unique and monotonically increasing.
pub type StayId = u64;

/// Physical bed slots, provisioned outside the engine.
pub type BedId = u64;

/// The already-authenticated user performing an operation.
pub type ActorId = u64;

/// Checks that a caller-supplied id is well formed. Zero is reserved.
pub fn ensure_valid_id(id: u64, what: &str) -> WardResult<()> {
    if id == 0 {
        return Err(WardError::InvalidId(format!("{what} 0")));
    }
    Ok(())
}

/// Parses a raw textual id as the transport boundary delivers it.
pub fn parse_id(raw: &str) -> WardResult<u64> {
    match raw.trim().parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(WardError::InvalidId(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::{ensure_valid_id, parse_id};
    use crate::errors::WardError;

    #[test]
    fn should_parse_positive_ids() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert_eq!(parse_id(" 7 ").unwrap(), 7);
    }

    #[test]
    fn should_reject_malformed_ids() {
        for raw in ["", "0", "-3", "12abc", "4.5"] {
            assert!(matches!(parse_id(raw), Err(WardError::InvalidId(_))), "{raw:?}");
        }
    }

    #[test]
    fn should_reject_zero() {
        assert!(ensure_valid_id(1, "patient id").is_ok());
        assert!(matches!(
            ensure_valid_id(0, "patient id"),
            Err(WardError::InvalidId(_))
        ));
    }
}
