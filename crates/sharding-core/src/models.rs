//! Core value types shared by the resolver, strategies and the routing engine.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Bound;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Data nodes
// ---------------------------------------------------------------------------

/// A physical `(data source, table)` pair that can execute SQL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DataNode {
    data_source: String,
    table: String,
}

impl DataNode {
    pub(crate) fn new(data_source: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            table: table.into(),
        }
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for DataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.data_source, self.table)
    }
}

// ---------------------------------------------------------------------------
// Sharding values and conditions
// ---------------------------------------------------------------------------

/// A literal extracted from a predicate or an insert row.
///
/// Integers sort before strings so that mixed sets still have a total order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShardingValue {
    Int(i64),
    Str(String),
}

impl ShardingValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ShardingValue::Int(v) => Some(*v),
            ShardingValue::Str(s) => s.trim().parse().ok(),
        }
    }
}

impl Ord for ShardingValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ShardingValue::Int(a), ShardingValue::Int(b)) => a.cmp(b),
            (ShardingValue::Str(a), ShardingValue::Str(b)) => a.cmp(b),
            (ShardingValue::Int(_), ShardingValue::Str(_)) => Ordering::Less,
            (ShardingValue::Str(_), ShardingValue::Int(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for ShardingValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ShardingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardingValue::Int(v) => write!(f, "{v}"),
            ShardingValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ShardingValue {
    fn from(value: i64) -> Self {
        ShardingValue::Int(value)
    }
}

impl From<i32> for ShardingValue {
    fn from(value: i32) -> Self {
        ShardingValue::Int(value.into())
    }
}

impl From<&str> for ShardingValue {
    fn from(value: &str) -> Self {
        ShardingValue::Str(value.to_string())
    }
}

impl From<String> for ShardingValue {
    fn from(value: String) -> Self {
        ShardingValue::Str(value)
    }
}

/// Predicate operator extracted by the SQL layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardingOperator {
    Equal(ShardingValue),
    In(Vec<ShardingValue>),
    Range {
        lower: Bound<ShardingValue>,
        upper: Bound<ShardingValue>,
    },
}

/// One `(column, operator, value(s))` condition on a logical table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardingCondition {
    pub column: String,
    pub operator: ShardingOperator,
}

impl ShardingCondition {
    pub fn equal(column: impl Into<String>, value: impl Into<ShardingValue>) -> Self {
        Self {
            column: column.into(),
            operator: ShardingOperator::Equal(value.into()),
        }
    }

    pub fn in_list<V: Into<ShardingValue>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            column: column.into(),
            operator: ShardingOperator::In(values.into_iter().map(Into::into).collect()),
        }
    }

    /// `column BETWEEN lower AND upper`, both ends inclusive.
    pub fn between(
        column: impl Into<String>,
        lower: impl Into<ShardingValue>,
        upper: impl Into<ShardingValue>,
    ) -> Self {
        Self::range(
            column,
            Bound::Included(lower.into()),
            Bound::Included(upper.into()),
        )
    }

    pub fn range(
        column: impl Into<String>,
        lower: Bound<ShardingValue>,
        upper: Bound<ShardingValue>,
    ) -> Self {
        Self {
            column: column.into(),
            operator: ShardingOperator::Range { lower, upper },
        }
    }

    pub fn is_on(&self, column: &str) -> bool {
        self.column.eq_ignore_ascii_case(column)
    }

    pub fn is_range(&self) -> bool {
        matches!(self.operator, ShardingOperator::Range { .. })
    }

    /// Discrete values for equals / in-list conditions, `None` for ranges.
    pub fn discrete_values(&self) -> Option<&[ShardingValue]> {
        match &self.operator {
            ShardingOperator::Equal(value) => Some(std::slice::from_ref(value)),
            ShardingOperator::In(values) => Some(values.as_slice()),
            ShardingOperator::Range { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    pub fn is_write(self) -> bool {
        !matches!(self, StatementKind::Select)
    }
}

/// An insert row keyed by column name, in column order.
pub type Row = IndexMap<String, ShardingValue>;

/// A value written by the key generator into an insert row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedKey {
    pub row_index: usize,
    pub column: String,
    pub value: i64,
}

// ---------------------------------------------------------------------------
// Routing output
// ---------------------------------------------------------------------------

/// The ordered, duplicate-free set of data nodes one logical table routes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingPlan {
    pub logical_table: String,
    pub data_nodes: Vec<DataNode>,
    /// Set when at least one axis fell back to every candidate.
    pub broadcast: bool,
    /// Binding table whose plan this one was derived from.
    pub bound_to: Option<String>,
}

impl RoutingPlan {
    pub fn data_source_names(&self) -> Vec<&str> {
        let names: IndexSet<&str> = self.data_nodes.iter().map(DataNode::data_source).collect();
        names.into_iter().collect()
    }

    pub fn actual_tables(&self, data_source: &str) -> Vec<&str> {
        self.data_nodes
            .iter()
            .filter(|node| node.data_source() == data_source)
            .map(DataNode::table)
            .collect()
    }

    pub fn is_single_node(&self) -> bool {
        self.data_nodes.len() == 1
    }
}

/// Routing result of a whole statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementRoute {
    pub plans: Vec<RoutingPlan>,
    /// Union of all plans' data nodes, first appearance order.
    pub data_nodes: Vec<DataNode>,
    pub generated_keys: Vec<GeneratedKey>,
}
