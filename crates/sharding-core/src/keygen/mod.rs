//! Distributed key generation for auto-generated columns.
//!
//! Generators are shared, injectable trait objects; each implementation owns
//! the only mutable state it needs behind an atomic or a lock.

mod increment;
mod snowflake;

pub use increment::IncrementKeyGenerator;
pub(crate) use snowflake::snowflake_from_config;
pub use snowflake::{SnowflakeKeyGenerator, SystemTimeSource, TimeSource};

use std::fmt;

use crate::errors::ShardingResult;

/// Supplies unique keys; concurrent callers never observe the same value.
pub trait KeyGenerator: Send + Sync + fmt::Debug {
    fn next_key(&self) -> ShardingResult<i64>;
}
