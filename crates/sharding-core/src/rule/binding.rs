//! Binding table groups: logical tables that shard identically, so a plan
//! computed for one member can be mapped node by node onto the others.

use crate::errors::{ShardingError, ShardingResult};
use crate::models::DataNode;

use super::table::TableRule;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingTableGroup {
    name: String,
    tables: Vec<String>,
}

impl BindingTableGroup {
    /// Parse `"t_order, t_order_item"`.  Fewer than two distinct members is a
    /// configuration error.
    pub fn parse(group: &str) -> ShardingResult<Self> {
        let mut tables: Vec<String> = Vec::new();
        for table in group.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if !tables.iter().any(|t| t.eq_ignore_ascii_case(table)) {
                tables.push(table.to_string());
            }
        }
        if tables.len() < 2 {
            return Err(ShardingError::InvalidConfiguration(format!(
                "binding group '{group}' needs at least two tables"
            )));
        }
        Ok(Self {
            name: tables.join(","),
            tables,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn contains(&self, logical_table: &str) -> bool {
        self.tables.iter().any(|t| t.eq_ignore_ascii_case(logical_table))
    }

    /// Check that `member` exposes the same data sources as `reference` and the
    /// same number of tables in each.
    pub(crate) fn check_aligned(reference: &TableRule, member: &TableRule) -> ShardingResult<()> {
        let mismatch = |reason: String| ShardingError::BindingTableMismatch {
            table: member.logical_table().to_string(),
            reference: reference.logical_table().to_string(),
            reason,
        };
        let expected = reference.tables_by_source();
        let actual = member.tables_by_source();
        if expected.len() != actual.len() {
            return Err(mismatch(format!(
                "{} data sources vs {}",
                actual.len(),
                expected.len()
            )));
        }
        for (data_source, tables) in expected {
            let Some(member_tables) = actual.get(data_source) else {
                return Err(mismatch(format!("missing data source '{data_source}'")));
            };
            if member_tables.len() != tables.len() {
                return Err(mismatch(format!(
                    "{} tables in '{data_source}' vs {}",
                    member_tables.len(),
                    tables.len()
                )));
            }
        }
        Ok(())
    }

    /// Map `nodes` of `reference` onto `member` by data source and position.
    pub(crate) fn align(
        reference: &TableRule,
        member: &TableRule,
        nodes: &[DataNode],
    ) -> ShardingResult<Vec<DataNode>> {
        nodes
            .iter()
            .map(|node| {
                reference
                    .data_node_index(node)
                    .and_then(|index| member.actual_tables(node.data_source()).get(index))
                    .map(|table| DataNode::new(node.data_source(), table.as_str()))
                    .ok_or_else(|| ShardingError::BindingTableMismatch {
                        table: member.logical_table().to_string(),
                        reference: reference.logical_table().to_string(),
                        reason: format!("no counterpart for {node}"),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, expression: &str) -> TableRule {
        TableRule::new(name, Some(expression), &[]).unwrap()
    }

    #[test]
    fn parses_comma_separated_members() {
        let group = BindingTableGroup::parse(" t_order ,t_order_item,T_ORDER").unwrap();
        assert_eq!(group.tables(), ["t_order", "t_order_item"]);
        assert!(group.contains("T_Order_Item"));
        assert!(!group.contains("t_config"));
        assert!(BindingTableGroup::parse("t_order").is_err());
    }

    #[test]
    fn aligns_by_position_within_data_source() {
        let orders = rule("t_order", "ds${0..1}.t_order_${0..1}");
        let items = rule("t_order_item", "ds${0..1}.t_order_item_${0..1}");
        BindingTableGroup::check_aligned(&orders, &items).unwrap();

        let nodes = [DataNode::new("ds1", "t_order_1"), DataNode::new("ds0", "t_order_0")];
        let aligned = BindingTableGroup::align(&orders, &items, &nodes).unwrap();
        assert_eq!(
            aligned,
            vec![
                DataNode::new("ds1", "t_order_item_1"),
                DataNode::new("ds0", "t_order_item_0"),
            ]
        );
    }

    #[test]
    fn rejects_misaligned_members() {
        let orders = rule("t_order", "ds${0..1}.t_order_${0..1}");
        let fewer_tables = rule("t_order_item", "ds${0..1}.t_order_item_0");
        let other_sources = rule("t_order_item", "ds${1..2}.t_order_item_${0..1}");
        for member in [&fewer_tables, &other_sources] {
            assert!(matches!(
                BindingTableGroup::check_aligned(&orders, member),
                Err(ShardingError::BindingTableMismatch { .. })
            ));
        }
    }
}
