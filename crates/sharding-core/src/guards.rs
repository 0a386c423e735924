//! Shared bounds for expression expansion and key generation.

/// Upper bound on the number of data nodes one expression may expand to.
pub const MAX_DATA_NODES: usize = 65_536;

// Snowflake layout: 41-bit timestamp | 10-bit worker | 12-bit sequence
pub const SNOWFLAKE_SEQUENCE_BITS: u32 = 12;
pub const SNOWFLAKE_WORKER_ID_BITS: u32 = 10;
pub const SNOWFLAKE_TIMESTAMP_BITS: u32 = 41;
pub const MAX_WORKER_ID: u16 = (1 << SNOWFLAKE_WORKER_ID_BITS) - 1;
pub const MAX_SEQUENCE: u64 = (1 << SNOWFLAKE_SEQUENCE_BITS) - 1;
pub const MAX_TIMESTAMP_DELTA: u64 = (1 << SNOWFLAKE_TIMESTAMP_BITS) - 1;

/// 2016-11-01T00:00:00Z in milliseconds since the Unix epoch.
pub const SNOWFLAKE_EPOCH_MILLIS: u64 = 1_477_958_400_000;

/// Environment variable consulted for the snowflake worker id.
pub const WORKER_ID_ENV: &str = "SHARDING_KEYGEN_WORKER_ID";
