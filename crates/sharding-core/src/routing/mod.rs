//! Statement-level routing input and per-statement state.

pub mod context;

pub use context::{BindingReference, RoutingContext};

use crate::models::{Row, ShardingCondition, ShardingValue, StatementKind};

/// Conditions extracted for one logical table of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConditions {
    pub logical_table: String,
    pub conditions: Vec<ShardingCondition>,
}

impl TableConditions {
    pub fn new(logical_table: impl Into<String>, conditions: Vec<ShardingCondition>) -> Self {
        Self {
            logical_table: logical_table.into(),
            conditions,
        }
    }
}

/// What the SQL layer hands over for one statement.
///
/// For inserts the first table is the insert target and `rows` hold its
/// values; generated keys are written into `rows` during routing.
#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    pub tables: Vec<TableConditions>,
    pub rows: Vec<Row>,
    pub database_hints: Vec<(String, ShardingValue)>,
    pub table_hints: Vec<(String, ShardingValue)>,
    pub allow_broadcast: bool,
}

impl Statement {
    pub fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            tables: Vec::new(),
            rows: Vec::new(),
            database_hints: Vec::new(),
            table_hints: Vec::new(),
            allow_broadcast: true,
        }
    }

    pub fn table(mut self, logical_table: &str, conditions: Vec<ShardingCondition>) -> Self {
        self.tables.push(TableConditions::new(logical_table, conditions));
        self
    }

    pub fn row(mut self, row: Row) -> Self {
        self.rows.push(row);
        self
    }

    pub fn database_hint(mut self, logical_table: &str, value: impl Into<ShardingValue>) -> Self {
        self.database_hints.push((logical_table.to_string(), value.into()));
        self
    }

    pub fn table_hint(mut self, logical_table: &str, value: impl Into<ShardingValue>) -> Self {
        self.table_hints.push((logical_table.to_string(), value.into()));
        self
    }

    pub fn with_broadcast(mut self, allow: bool) -> Self {
        self.allow_broadcast = allow;
        self
    }

    /// Fresh context seeded with this statement's hints.
    pub fn context(&self) -> RoutingContext {
        let mut ctx = RoutingContext::new().with_broadcast(self.allow_broadcast);
        for (table, value) in &self.database_hints {
            ctx.add_database_hint(table, value.clone());
        }
        for (table, value) in &self.table_hints {
            ctx.add_table_hint(table, value.clone());
        }
        ctx
    }
}
