// lib/src/util.rs

use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use tracing::debug;

use models::errors::WardResult;

/// Injected time source, so transaction timestamps are testable.
pub trait Clock: Send + Sync + fmt::Debug + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Installs the fmt subscriber once; later calls are no-ops. Honors
/// `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    TRACING_INIT.get_or_init(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}

/// Re-runs an operation while it fails with a retryable conflict, up to
/// `max_attempts` total attempts. Every retry restarts the operation from
/// fresh reads.
pub(crate) fn with_retries<T>(
    max_attempts: u32,
    mut op: impl FnMut() -> WardResult<T>,
) -> WardResult<T> {
    let mut attempt = 1;
    loop {
        match op() {
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                debug!(attempt, "transaction conflict, retrying");
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Clock;
    use chrono::{DateTime, TimeZone, Utc};

    /// A clock pinned to one instant.
    #[derive(Clone, Copy, Debug)]
    pub(crate) struct FixedClock(pub DateTime<Utc>);

    impl FixedClock {
        pub(crate) fn default_instant() -> Self {
            FixedClock(Utc.with_ymd_and_hms(2024, 3, 2, 9, 30, 0).unwrap())
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::with_retries;
    use models::errors::{WardError, WardResult};

    #[test]
    fn should_retry_conflicts_until_success() {
        let mut calls = 0;
        let result: WardResult<u32> = with_retries(5, || {
            calls += 1;
            if calls < 3 {
                Err(WardError::TransactionConflict("busy".to_string()))
            } else {
                Ok(99)
            }
        });
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls, 3);
    }

    #[test]
    fn should_give_up_after_the_bound() {
        let mut calls = 0;
        let result: WardResult<u32> = with_retries(3, || {
            calls += 1;
            Err(WardError::TransactionConflict("busy".to_string()))
        });
        assert!(matches!(result, Err(WardError::TransactionConflict(_))));
        assert_eq!(calls, 3);
    }

    #[test]
    fn should_not_retry_client_errors() {
        let mut calls = 0;
        let result: WardResult<u32> = with_retries(3, || {
            calls += 1;
            Err(WardError::BedOccupied(5))
        });
        assert!(matches!(result, Err(WardError::BedOccupied(5))));
        assert_eq!(calls, 1);
    }
}
