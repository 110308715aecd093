#![forbid(unsafe_code)]

use std::time::Duration;

use flagdesk_storage::StorageError;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreCallError {
    #[error("{operation} still unavailable after {attempts} attempts: {last}")]
    Exhausted {
        operation: &'static str,
        attempts: u32,
        last: StorageError,
    },
    #[error(transparent)]
    Rejected(StorageError),
}

/// Bounded retry for store calls. Only transient failures are retried; every other error
/// is returned on the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn mvp_v1() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(2_000),
        }
    }

    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }

    pub fn run<T>(
        &self,
        operation: &'static str,
        mut call: impl FnMut() -> Result<T, StorageError>,
    ) -> Result<T, StoreCallError> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call() {
                Ok(v) => return Ok(v),
                Err(e) if !e.is_transient() => return Err(StoreCallError::Rejected(e)),
                Err(e) if attempt >= max_attempts => {
                    return Err(StoreCallError::Exhausted {
                        operation,
                        attempts: attempt,
                        last: e,
                    })
                }
                Err(e) => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        error = %e,
                        "transient store failure, retrying"
                    );
                    if !self.backoff.is_zero() {
                        std::thread::sleep(self.backoff);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
