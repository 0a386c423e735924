//! Sharding core: rule model and routing engine for a transparent database
//! sharding layer.
//!
//! Callers address logical tables.  A [`ShardingRule`] built from
//! [`ShardingRuleConfig`] resolves each table's data node expression, evaluates
//! database then table strategies against the conditions the SQL layer
//! extracted, keeps binding tables aligned within one [`RoutingContext`] and
//! fills in generated keys for inserts.  Executing and merging the resulting
//! [`RoutingPlan`]s is left to the caller.

pub mod config;
pub mod errors;
pub mod guards;
pub mod keygen;
pub mod models;
pub mod registry;
pub mod routing;
pub mod rule;
pub mod strategy;

pub use config::{KeyGeneratorConfig, ShardingRuleConfig, StrategyConfig, TableRuleConfig};
pub use errors::{ShardingError, ShardingResult};
pub use keygen::{IncrementKeyGenerator, KeyGenerator, SnowflakeKeyGenerator};
pub use models::{
    DataNode, GeneratedKey, Row, RoutingPlan, ShardingCondition, ShardingOperator, ShardingValue,
    StatementKind, StatementRoute,
};
pub use registry::AlgorithmRegistry;
pub use routing::{RoutingContext, Statement, TableConditions};
pub use rule::expression::{expand_inline, resolve_data_nodes};
pub use rule::sharding::ShardingRule;
pub use rule::table::TableRule;
pub use strategy::ShardingStrategy;
