//! Error types for the sharding core.

/// Top-level error enum for rule construction, routing and key generation.
///
/// Every variant is a deterministic function of configuration and statement
/// shape; none of them is worth retrying without new input.
#[derive(Debug, thiserror::Error)]
pub enum ShardingError {
    #[error("Invalid data node expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("Unknown logical table: {0}")]
    UnknownTable(String),

    #[error("Missing sharding value for column '{column}' of table '{table}'")]
    MissingShardingValue { table: String, column: String },

    #[error("Missing hint value for table '{0}'")]
    MissingHint(String),

    #[error("Write to table '{table}' cannot be routed precisely on column(s) {columns:?}")]
    AmbiguousShardTarget { table: String, columns: Vec<String> },

    #[error("Sharding algorithm for table '{table}' returned '{target}', which is not an available target")]
    RoutingAlgorithm { table: String, target: String },

    #[error("Binding table '{table}' does not align with '{reference}': {reason}")]
    BindingTableMismatch {
        table: String,
        reference: String,
        reason: String,
    },

    #[error("Key generator exhausted: {0}")]
    KeyGeneratorExhausted(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unknown {kind} algorithm: {name}")]
    UnknownAlgorithm { kind: &'static str, name: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ShardingError {
    pub(crate) fn invalid_expression(expression: &str, reason: impl Into<String>) -> Self {
        ShardingError::InvalidExpression {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }
}

pub type ShardingResult<T> = Result<T, ShardingError>;
