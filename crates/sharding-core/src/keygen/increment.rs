use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::{ShardingError, ShardingResult};

use super::KeyGenerator;

/// Process-local counter, handy for tests and single-node deployments.
///
/// Keys run from `start` up to and including `i64::MAX`.
#[derive(Debug)]
pub struct IncrementKeyGenerator {
    start: i64,
    issued: AtomicU64,
}

impl IncrementKeyGenerator {
    pub fn new(start: i64) -> Self {
        Self {
            start,
            issued: AtomicU64::new(0),
        }
    }
}

impl Default for IncrementKeyGenerator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl KeyGenerator for IncrementKeyGenerator {
    fn next_key(&self) -> ShardingResult<i64> {
        let start = self.start;
        let issued = self
            .issued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                start.checked_add_unsigned(n).and(n.checked_add(1))
            })
            .map_err(|n| {
                ShardingError::KeyGeneratorExhausted(format!(
                    "increment generator issued {n} keys from {start}"
                ))
            })?;
        Ok(start.wrapping_add_unsigned(issued))
    }
}
