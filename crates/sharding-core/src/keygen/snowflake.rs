//! Snowflake style keys: 41-bit milliseconds since 2016-11-01 UTC, a 10-bit
//! worker id and a 12-bit per-millisecond sequence.
//!
//! Keys are unique per worker id for the life of the process.  When the wall
//! clock steps backwards the generator keeps counting on its last logical
//! millisecond instead of failing, so ordering across clock adjustments is
//! only approximate.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::warn;

use crate::errors::{ShardingError, ShardingResult};
use crate::guards::{
    MAX_SEQUENCE, MAX_TIMESTAMP_DELTA, MAX_WORKER_ID, SNOWFLAKE_EPOCH_MILLIS,
    SNOWFLAKE_SEQUENCE_BITS, SNOWFLAKE_WORKER_ID_BITS, WORKER_ID_ENV,
};

use super::KeyGenerator;

/// Millisecond wall clock, injectable for tests.
pub trait TimeSource: Send + Sync {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct State {
    last_millis: u64,
    sequence: u64,
}

pub struct SnowflakeKeyGenerator {
    worker_id: u16,
    clock: Arc<dyn TimeSource>,
    state: Mutex<State>,
}

impl SnowflakeKeyGenerator {
    pub fn new(worker_id: u16) -> ShardingResult<Self> {
        Self::with_time_source(worker_id, Arc::new(SystemTimeSource))
    }

    pub fn with_time_source(worker_id: u16, clock: Arc<dyn TimeSource>) -> ShardingResult<Self> {
        if worker_id > MAX_WORKER_ID {
            return Err(ShardingError::InvalidConfiguration(format!(
                "snowflake worker id {worker_id} exceeds {MAX_WORKER_ID}"
            )));
        }
        Ok(Self {
            worker_id,
            clock,
            state: Mutex::new(State::default()),
        })
    }

    /// Worker id from `SHARDING_KEYGEN_WORKER_ID`, `0` when unset.
    pub fn from_env() -> ShardingResult<Self> {
        Self::new(worker_id_from_env()?)
    }

    pub fn worker_id(&self) -> u16 {
        self.worker_id
    }
}

/// Explicit worker id, else the environment, else `0`.
pub(crate) fn snowflake_from_config(worker_id: Option<u16>) -> ShardingResult<SnowflakeKeyGenerator> {
    match worker_id {
        Some(id) => SnowflakeKeyGenerator::new(id),
        None => SnowflakeKeyGenerator::from_env(),
    }
}

fn worker_id_from_env() -> ShardingResult<u16> {
    match std::env::var(WORKER_ID_ENV) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            ShardingError::InvalidConfiguration(format!(
                "{WORKER_ID_ENV}='{raw}' is not a valid worker id"
            ))
        }),
        Err(_) => Ok(0),
    }
}

impl KeyGenerator for SnowflakeKeyGenerator {
    fn next_key(&self) -> ShardingResult<i64> {
        let now = self.clock.now_millis().saturating_sub(SNOWFLAKE_EPOCH_MILLIS);
        let mut state = self.state.lock();

        if now > state.last_millis {
            state.last_millis = now;
            state.sequence = 0;
        } else {
            if now < state.last_millis {
                warn!(
                    now,
                    last = state.last_millis,
                    "clock moved backwards; continuing from last issued millisecond"
                );
            }
            if state.sequence >= MAX_SEQUENCE {
                state.last_millis += 1;
                state.sequence = 0;
            } else {
                state.sequence += 1;
            }
        }

        if state.last_millis > MAX_TIMESTAMP_DELTA {
            return Err(ShardingError::KeyGeneratorExhausted(format!(
                "snowflake timestamp {} exceeds 41 bits",
                state.last_millis
            )));
        }

        let key = (state.last_millis << (SNOWFLAKE_WORKER_ID_BITS + SNOWFLAKE_SEQUENCE_BITS))
            | (u64::from(self.worker_id) << SNOWFLAKE_SEQUENCE_BITS)
            | state.sequence;
        Ok(key as i64)
    }
}

impl fmt::Debug for SnowflakeKeyGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeKeyGenerator")
            .field("worker_id", &self.worker_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};

    use rayon::prelude::*;

    use super::*;

    #[derive(Debug)]
    struct ManualClock(AtomicU64);

    impl ManualClock {
        fn at(offset: u64) -> Arc<Self> {
            Arc::new(Self(AtomicU64::new(SNOWFLAKE_EPOCH_MILLIS + offset)))
        }

        fn set(&self, offset: u64) {
            self.0.store(SNOWFLAKE_EPOCH_MILLIS + offset, Ordering::SeqCst);
        }
    }

    impl TimeSource for ManualClock {
        fn now_millis(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn parts(key: i64) -> (u64, u64, u64) {
        let key = key as u64;
        (
            key >> 22,
            (key >> 12) & u64::from(MAX_WORKER_ID),
            key & MAX_SEQUENCE,
        )
    }

    #[test]
    fn key_layout() {
        let clock = ManualClock::at(1_000);
        let generator = SnowflakeKeyGenerator::with_time_source(7, clock.clone()).unwrap();
        assert_eq!(parts(generator.next_key().unwrap()), (1_000, 7, 0));
        assert_eq!(parts(generator.next_key().unwrap()), (1_000, 7, 1));
        clock.set(1_001);
        assert_eq!(parts(generator.next_key().unwrap()), (1_001, 7, 0));
    }

    #[test]
    fn sequence_overflow_borrows_next_millisecond() {
        let clock = ManualClock::at(5);
        let generator = SnowflakeKeyGenerator::with_time_source(0, clock).unwrap();
        let keys: Vec<i64> = (0..=MAX_SEQUENCE + 1)
            .map(|_| generator.next_key().unwrap())
            .collect();
        assert_eq!(parts(keys[MAX_SEQUENCE as usize]), (5, 0, MAX_SEQUENCE));
        assert_eq!(parts(*keys.last().unwrap()), (6, 0, 0));
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn clock_going_backwards_keeps_keys_unique() {
        let clock = ManualClock::at(100);
        let generator = SnowflakeKeyGenerator::with_time_source(1, clock.clone()).unwrap();
        let before = generator.next_key().unwrap();
        clock.set(50);
        let after = generator.next_key().unwrap();
        assert!(after > before);
        assert_eq!(parts(after), (100, 1, 1));
    }

    #[test]
    fn rejects_out_of_range_worker_id() {
        assert!(SnowflakeKeyGenerator::new(MAX_WORKER_ID + 1).is_err());
    }

    #[test]
    fn timestamp_overflow_is_exhaustion() {
        let clock = ManualClock::at(MAX_TIMESTAMP_DELTA + 1);
        let generator = SnowflakeKeyGenerator::with_time_source(0, clock).unwrap();
        assert!(matches!(
            generator.next_key(),
            Err(ShardingError::KeyGeneratorExhausted(_))
        ));
    }

    #[test]
    fn concurrent_keys_are_distinct() {
        let generator = SnowflakeKeyGenerator::new(3).unwrap();
        let keys: Vec<i64> = (0..20_000)
            .into_par_iter()
            .map(|_| generator.next_key().unwrap())
            .collect();
        let distinct: HashSet<i64> = keys.iter().copied().collect();
        assert_eq!(distinct.len(), keys.len());
    }
}
