//! Per logical table configuration: resolved data nodes, strategies and key
//! generation.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::errors::{ShardingError, ShardingResult};
use crate::keygen::KeyGenerator;
use crate::models::DataNode;
use crate::rule::expression::resolve_data_nodes;
use crate::strategy::ShardingStrategy;

#[derive(Clone)]
pub struct TableRule {
    logical_table: String,
    data_nodes: Vec<DataNode>,
    /// Physical tables per data source, both in data node order.
    tables_by_source: IndexMap<String, Vec<String>>,
    database_strategy: Option<ShardingStrategy>,
    table_strategy: Option<ShardingStrategy>,
    generate_key_column: Option<String>,
    key_generator: Option<Arc<dyn KeyGenerator>>,
}

impl TableRule {
    /// Build a rule, resolving `expression` right away.
    ///
    /// Without an expression the table gets one node per known data source,
    /// named after the logical table.  When `known_data_sources` is non-empty
    /// every resolved data source must belong to it.
    pub fn new(
        logical_table: &str,
        expression: Option<&str>,
        known_data_sources: &[String],
    ) -> ShardingResult<Self> {
        let data_nodes = match expression {
            Some(expression) => resolve_data_nodes(expression)?,
            None => known_data_sources
                .iter()
                .map(|ds| DataNode::new(ds.as_str(), logical_table))
                .collect(),
        };
        if data_nodes.is_empty() {
            return Err(ShardingError::InvalidConfiguration(format!(
                "table '{logical_table}' has no data nodes and no data sources are known"
            )));
        }

        let mut tables_by_source: IndexMap<String, Vec<String>> = IndexMap::new();
        for node in &data_nodes {
            if !known_data_sources.is_empty()
                && !known_data_sources.iter().any(|ds| ds == node.data_source())
            {
                return Err(ShardingError::InvalidConfiguration(format!(
                    "table '{logical_table}' references unknown data source '{}'",
                    node.data_source()
                )));
            }
            tables_by_source
                .entry(node.data_source().to_string())
                .or_default()
                .push(node.table().to_string());
        }

        Ok(Self {
            logical_table: logical_table.to_string(),
            data_nodes,
            tables_by_source,
            database_strategy: None,
            table_strategy: None,
            generate_key_column: None,
            key_generator: None,
        })
    }

    pub fn with_database_strategy(mut self, strategy: ShardingStrategy) -> Self {
        self.database_strategy = Some(strategy);
        self
    }

    pub fn with_table_strategy(mut self, strategy: ShardingStrategy) -> Self {
        self.table_strategy = Some(strategy);
        self
    }

    pub fn with_key_generator(
        mut self,
        column: impl Into<String>,
        generator: Arc<dyn KeyGenerator>,
    ) -> Self {
        self.generate_key_column = Some(column.into());
        self.key_generator = Some(generator);
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn logical_table(&self) -> &str {
        &self.logical_table
    }

    pub fn data_nodes(&self) -> &[DataNode] {
        &self.data_nodes
    }

    /// Distinct data sources in first-appearance order.
    pub fn data_source_names(&self) -> Vec<String> {
        self.tables_by_source.keys().cloned().collect()
    }

    pub fn actual_tables(&self, data_source: &str) -> &[String] {
        self.tables_by_source
            .get(data_source)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn tables_by_source(&self) -> &IndexMap<String, Vec<String>> {
        &self.tables_by_source
    }

    pub fn contains_actual_table(&self, table: &str) -> bool {
        self.data_nodes
            .iter()
            .any(|node| node.table() == table)
    }

    /// Position of `node`'s table within its data source's table list.
    pub fn data_node_index(&self, node: &DataNode) -> Option<usize> {
        self.actual_tables(node.data_source())
            .iter()
            .position(|table| table == node.table())
    }

    /// Own database strategy, else `default`.
    pub fn database_strategy<'a>(&'a self, default: &'a ShardingStrategy) -> &'a ShardingStrategy {
        self.database_strategy.as_ref().unwrap_or(default)
    }

    /// Own table strategy, else `default`.
    pub fn table_strategy<'a>(&'a self, default: &'a ShardingStrategy) -> &'a ShardingStrategy {
        self.table_strategy.as_ref().unwrap_or(default)
    }

    pub fn generate_key_column(&self) -> Option<&str> {
        self.generate_key_column.as_deref()
    }

    pub fn is_generate_key_column(&self, column: &str) -> bool {
        self.generate_key_column
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(column))
    }

    pub fn key_generator(&self) -> Option<&Arc<dyn KeyGenerator>> {
        self.key_generator.as_ref()
    }
}

impl fmt::Debug for TableRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableRule")
            .field("logical_table", &self.logical_table)
            .field("data_nodes", &self.data_nodes.len())
            .field("data_sources", &self.tables_by_source.keys().collect::<Vec<_>>())
            .field("generate_key_column", &self.generate_key_column)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::IncrementKeyGenerator;

    fn known() -> Vec<String> {
        vec!["ds0".to_string(), "ds1".to_string()]
    }

    #[test]
    fn groups_tables_per_data_source() {
        let rule = TableRule::new("t_order", Some("ds${0..1}.t_order_${0..1}"), &known()).unwrap();
        assert_eq!(rule.data_nodes().len(), 4);
        assert_eq!(rule.data_source_names(), known());
        assert_eq!(rule.actual_tables("ds1"), ["t_order_0", "t_order_1"]);
        assert!(rule.actual_tables("ds9").is_empty());
        assert!(rule.contains_actual_table("t_order_1"));
        assert!(!rule.contains_actual_table("T_ORDER_1"));
        assert_eq!(rule.data_node_index(&DataNode::new("ds1", "t_order_1")), Some(1));
    }

    #[test]
    fn missing_expression_spans_known_data_sources() {
        let rule = TableRule::new("t_config", None, &known()).unwrap();
        let nodes: Vec<String> = rule.data_nodes().iter().map(ToString::to_string).collect();
        assert_eq!(nodes, vec!["ds0.t_config", "ds1.t_config"]);
    }

    #[test]
    fn rejects_unknown_data_source() {
        let err = TableRule::new("t_order", Some("ds2.t_order"), &known()).unwrap_err();
        assert!(matches!(err, ShardingError::InvalidConfiguration(_)));
    }

    #[test]
    fn propagates_expression_errors() {
        let err = TableRule::new("t_order", Some("ds0.t_${1..0}"), &known()).unwrap_err();
        assert!(matches!(err, ShardingError::InvalidExpression { .. }));
    }

    #[test]
    fn strategies_fall_back_to_defaults() {
        let default = ShardingStrategy::None;
        let rule = TableRule::new("t_order", Some("ds0.t_order"), &known()).unwrap();
        assert!(rule.database_strategy(&default).is_none());
        let rule = rule.with_table_strategy(ShardingStrategy::Hint(Default::default()));
        assert!(matches!(rule.table_strategy(&default), ShardingStrategy::Hint(_)));
    }

    #[test]
    fn key_generation_column() {
        let rule = TableRule::new("t_order", Some("ds0.t_order"), &known())
            .unwrap()
            .with_key_generator("order_id", Arc::new(IncrementKeyGenerator::default()));
        assert!(rule.is_generate_key_column("ORDER_ID"));
        assert!(!rule.is_generate_key_column("user_id"));
        assert_eq!(rule.key_generator().unwrap().next_key().unwrap(), 1);
    }
}
