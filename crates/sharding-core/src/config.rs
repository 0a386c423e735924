//! Configuration structures consumed by [`ShardingRule::new`].
//!
//! Parsing configuration files is the caller's job; these types only describe
//! an already-loaded rule set and can be deserialised from JSON with
//! [`ShardingRuleConfig::from_json`].
//!
//! [`ShardingRule::new`]: crate::rule::sharding::ShardingRule::new

use serde::{Deserialize, Serialize};

use crate::errors::ShardingResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShardingRuleConfig {
    pub tables: Vec<TableRuleConfig>,
    /// Comma separated logical table names, e.g. `"t_order, t_order_item"`.
    pub binding_table_groups: Vec<String>,
    pub default_database_strategy: Option<StrategyConfig>,
    pub default_table_strategy: Option<StrategyConfig>,
    pub default_key_generator: Option<KeyGeneratorConfig>,
    /// Unconfigured logical tables route here instead of failing.
    pub default_data_source_name: Option<String>,
}

impl ShardingRuleConfig {
    pub fn from_json(json: &str) -> ShardingResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableRuleConfig {
    pub logical_table: String,
    /// Data node expression; `None` means one node per known data source
    /// named after the logical table.
    pub actual_data_nodes: Option<String>,
    pub database_strategy: Option<StrategyConfig>,
    pub table_strategy: Option<StrategyConfig>,
    pub key_generator_column: Option<String>,
    pub key_generator: Option<KeyGeneratorConfig>,
}

impl TableRuleConfig {
    pub fn new(logical_table: impl Into<String>) -> Self {
        Self {
            logical_table: logical_table.into(),
            ..Self::default()
        }
    }

    pub fn with_data_nodes(mut self, expression: impl Into<String>) -> Self {
        self.actual_data_nodes = Some(expression.into());
        self
    }

    pub fn with_database_strategy(mut self, strategy: StrategyConfig) -> Self {
        self.database_strategy = Some(strategy);
        self
    }

    pub fn with_table_strategy(mut self, strategy: StrategyConfig) -> Self {
        self.table_strategy = Some(strategy);
        self
    }

    pub fn with_key_generator(
        mut self,
        column: impl Into<String>,
        generator: Option<KeyGeneratorConfig>,
    ) -> Self {
        self.key_generator_column = Some(column.into());
        self.key_generator = generator;
        self
    }
}

/// Strategy descriptor; algorithm fields name entries of an
/// [`AlgorithmRegistry`](crate::registry::AlgorithmRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    None,
    Inline {
        sharding_column: String,
        algorithm_expression: String,
    },
    Standard {
        sharding_column: String,
        precise_algorithm: String,
        #[serde(default)]
        range_algorithm: Option<String>,
    },
    Complex {
        sharding_columns: Vec<String>,
        algorithm: String,
    },
    Hint {
        #[serde(default)]
        algorithm: Option<String>,
    },
}

impl StrategyConfig {
    pub fn standard(
        column: impl Into<String>,
        precise: impl Into<String>,
        range: Option<&str>,
    ) -> Self {
        StrategyConfig::Standard {
            sharding_column: column.into(),
            precise_algorithm: precise.into(),
            range_algorithm: range.map(str::to_string),
        }
    }

    pub fn inline(column: impl Into<String>, expression: impl Into<String>) -> Self {
        StrategyConfig::Inline {
            sharding_column: column.into(),
            algorithm_expression: expression.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyGeneratorConfig {
    /// `worker_id` falls back to `SHARDING_KEYGEN_WORKER_ID`, then `0`.
    Snowflake {
        #[serde(default)]
        worker_id: Option<u16>,
    },
    Increment {
        #[serde(default = "default_increment_start")]
        start: i64,
    },
    /// A generator registered by name in the algorithm registry.
    Named { name: String },
}

fn default_increment_start() -> i64 {
    1
}
